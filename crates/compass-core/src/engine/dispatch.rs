use super::config::RunConfig;
use super::error::EngineError;
use super::runner::SampleTask;
use crate::core::io::atomic::write_atomic;
use serde_json::Value;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, info, instrument};

const CONFIG_FILE_NAME: &str = "compass_config.json";

/// One remote job: re-run the program in single-sample mode for one sample.
#[derive(Debug, Clone, PartialEq)]
pub struct JobDescription {
    pub name: String,
    pub sample: usize,
    pub command: Vec<String>,
    pub working_dir: PathBuf,
    pub stdout: PathBuf,
    pub stderr: PathBuf,
}

impl JobDescription {
    /// A POSIX shell script that runs the job's command from its working directory.
    pub fn script(&self) -> String {
        let command = self
            .command
            .iter()
            .map(|arg| shell_quote(arg))
            .collect::<Vec<_>>()
            .join(" ");
        format!(
            "#!/bin/sh\ncd {}\n{}\n",
            shell_quote(&self.working_dir.to_string_lossy()),
            command
        )
    }
}

fn shell_quote(arg: &str) -> String {
    format!("'{}'", arg.replace('\'', r"'\''"))
}

/// Submission side of an external batch queue.
pub trait BatchScheduler: Send + Sync {
    /// Submits `job` and returns the scheduler's job identifier.
    fn submit(&self, job: &JobDescription) -> Result<String, EngineError>;
}

/// Submits jobs to a Torque/PBS queue by piping the job script to `qsub`.
#[derive(Debug, Clone)]
pub struct TorqueScheduler {
    queue: String,
    qsub: PathBuf,
}

impl TorqueScheduler {
    pub fn new(queue: impl Into<String>) -> Self {
        Self {
            queue: queue.into(),
            qsub: PathBuf::from("qsub"),
        }
    }

    pub fn with_qsub(mut self, qsub: impl Into<PathBuf>) -> Self {
        self.qsub = qsub.into();
        self
    }

    pub fn arguments(&self, job: &JobDescription) -> Vec<String> {
        vec![
            "-q".to_string(),
            self.queue.clone(),
            "-N".to_string(),
            job.name.clone(),
            "-o".to_string(),
            job.stdout.to_string_lossy().into_owned(),
            "-e".to_string(),
            job.stderr.to_string_lossy().into_owned(),
            "-d".to_string(),
            job.working_dir.to_string_lossy().into_owned(),
        ]
    }
}

impl BatchScheduler for TorqueScheduler {
    fn submit(&self, job: &JobDescription) -> Result<String, EngineError> {
        let fail = |message: String| EngineError::Dispatch {
            job: job.name.clone(),
            message,
        };

        let mut child = Command::new(&self.qsub)
            .args(self.arguments(job))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| fail(format!("cannot start '{}': {e}", self.qsub.display())))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| fail("qsub stdin is not available".to_string()))?;
        stdin
            .write_all(job.script().as_bytes())
            .map_err(|e| fail(format!("cannot write job script: {e}")))?;
        drop(stdin);

        let output = child
            .wait_with_output()
            .map_err(|e| fail(format!("qsub did not finish: {e}")))?;
        if !output.status.success() {
            return Err(fail(format!(
                "qsub exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let job_id = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if job_id.is_empty() {
            return Err(fail("qsub printed no job identifier".to_string()));
        }
        Ok(job_id)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DispatchReceipt {
    pub config_file: PathBuf,
    pub job_ids: Vec<String>,
}

/// Hands per-sample jobs to a [`BatchScheduler`] without waiting for them.
///
/// The run configuration is written once to `<temp>/compass_config.json`; every job
/// re-invokes `program` with that file and its own sample index.
pub struct QueueDispatcher {
    scheduler: Box<dyn BatchScheduler>,
    program: PathBuf,
}

impl QueueDispatcher {
    pub fn new(scheduler: Box<dyn BatchScheduler>, program: impl Into<PathBuf>) -> Self {
        Self {
            scheduler,
            program: program.into(),
        }
    }

    #[instrument(skip_all, name = "queue_dispatch")]
    pub fn dispatch(
        &self,
        tasks: &[SampleTask],
        config: &RunConfig,
    ) -> Result<DispatchReceipt, EngineError> {
        let config_file = config.temp_root().join(CONFIG_FILE_NAME);
        let serialization = |e| EngineError::Serialization {
            what: "run configuration",
            source: e,
        };
        let mut remote = serde_json::to_value(remote_config(config)).map_err(serialization)?;
        // A `null` entry would clear the job's own `--single-sample`.
        if let Value::Object(entries) = &mut remote {
            entries.retain(|_, value| !value.is_null());
        }
        let content = serde_json::to_vec_pretty(&remote).map_err(serialization)?;
        write_atomic(&config_file, &content).map_err(|e| EngineError::io(&config_file, e))?;
        debug!(path = %config_file.display(), "Wrote configuration for remote jobs.");

        let mut job_ids = Vec::with_capacity(tasks.len());
        for task in tasks {
            // The queue changes into the sample directory and writes its output there.
            fs::create_dir_all(&task.directory)
                .map_err(|e| EngineError::io(&task.directory, e))?;
            let job = self.describe(task, &config_file);
            let job_id = self.scheduler.submit(&job)?;
            info!(sample = task.index, job = %job_id, "Submitted sample job.");
            job_ids.push(job_id);
        }
        info!(jobs = job_ids.len(), "All sample jobs submitted.");
        Ok(DispatchReceipt {
            config_file,
            job_ids,
        })
    }

    pub fn describe(&self, task: &SampleTask, config_file: &Path) -> JobDescription {
        JobDescription {
            name: format!("compass-sample{}", task.index),
            sample: task.index,
            command: vec![
                self.program.to_string_lossy().into_owned(),
                "--config-file".to_string(),
                config_file.to_string_lossy().into_owned(),
                "--single-sample".to_string(),
                task.index.to_string(),
            ],
            working_dir: task.directory.clone(),
            stdout: task.directory.join("queue.out"),
            stderr: task.directory.join("queue.err"),
        }
    }
}

/// The configuration a remote job starts from: the same run, minus everything that
/// selects the orchestrating run's mode.
fn remote_config(config: &RunConfig) -> RunConfig {
    RunConfig {
        torque_queue: None,
        single_sample: None,
        collect: false,
        precache: false,
        generate_cache: false,
        list_genes: None,
        penalties_file: Some(config.penalties_path()),
        ..config.clone()
    }
}
