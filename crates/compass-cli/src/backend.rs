//! Adapter that reaches the linear-program solver as an external executable.
//!
//! Each request runs `<solver> <operation>` with one JSON document on stdin and
//! expects one JSON document on stdout. A non-zero exit status is reported as a
//! solver failure carrying the last line the solver wrote to stderr.

use compass::core::io::table::Table;
use compass::core::model::MetabolicModel;
use compass::engine::config::RunConfig;
use compass::engine::precache::FluxRange;
use compass::engine::runner::SampleTask;
use compass::engine::solver::{Optimizer, PenaltyModel, SampleScores, SolverError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::io::Write;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use tracing::{debug, warn};

#[derive(Serialize)]
struct RangeRequest {
    model: Value,
    start: usize,
    stop: usize,
    num_threads: usize,
}

#[derive(Serialize)]
struct ScoreRequest<'a> {
    model: Value,
    sample_index: usize,
    sample_name: &'a str,
    data: &'a [PathBuf],
    penalties_file: &'a Path,
    cache_file: &'a Path,
    species: &'a str,
    media: Option<&'a str>,
    lambda: f64,
    num_threads: usize,
    no_reactions: bool,
    calc_metabolites: bool,
    generate_cache: bool,
}

#[derive(Deserialize)]
struct ScoreResponse {
    #[serde(default)]
    reactions: Option<Table>,
    #[serde(default)]
    secretions: Option<Table>,
    #[serde(default)]
    uptake: Option<Table>,
}

#[derive(Serialize)]
struct PenaltyRequest<'a> {
    model: Value,
    data: &'a [PathBuf],
    samples: &'a [String],
    species: &'a str,
    media: Option<&'a str>,
    lambda: f64,
    num_threads: usize,
}

#[derive(Debug, Clone)]
pub struct SolverProcess {
    program: PathBuf,
    num_threads: usize,
}

impl SolverProcess {
    pub fn new(program: impl Into<PathBuf>, num_threads: usize) -> Self {
        Self {
            program: program.into(),
            num_threads,
        }
    }

    fn call<Req: Serialize, Resp: DeserializeOwned>(
        &self,
        operation: &str,
        request: &Req,
    ) -> Result<Resp, SolverError> {
        let payload = serde_json::to_vec(request)
            .map_err(|e| SolverError::Input(format!("cannot encode {operation} request: {e}")))?;
        debug!(operation, program = %self.program.display(), "Invoking solver.");

        let mut child = Command::new(&self.program)
            .arg(operation)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| SolverError::Input("solver stdin is not available".to_string()))?;

        // The solver may start answering before it has read the whole request.
        let (output, written) = thread::scope(|scope| {
            let writer = scope.spawn(move || {
                let written = stdin.write_all(&payload);
                drop(stdin);
                written
            });
            let output = child.wait_with_output();
            let written = writer
                .join()
                .unwrap_or_else(|_| Err(std::io::Error::other("request writer panicked")));
            (output, written)
        });
        let output = output?;
        if let Err(e) = written {
            debug!(operation, error = %e, "Solver did not read the whole request.");
        }

        // Solver diagnostics belong in the error stream of whatever log is active,
        // which is the sample's err.log while a sample is being scored.
        let stderr = String::from_utf8_lossy(&output.stderr);
        for line in stderr.lines().filter(|line| !line.trim().is_empty()) {
            warn!(operation, "solver: {}", line.trim_end());
        }
        if !output.status.success() {
            let reason = stderr
                .lines()
                .rev()
                .find(|line| !line.trim().is_empty())
                .unwrap_or("no diagnostic output")
                .trim()
                .to_string();
            return Err(SolverError::solver(format!(
                "{operation} failed ({}): {reason}",
                output.status
            )));
        }

        serde_json::from_slice(&output.stdout).map_err(|e| SolverError::Solver {
            message: format!("{operation} returned an invalid response"),
            source: Some(Box::new(e)),
        })
    }

    fn ranges(
        &self,
        operation: &str,
        model: &dyn MetabolicModel,
        range: Range<usize>,
    ) -> Result<BTreeMap<String, FluxRange>, SolverError> {
        let request = RangeRequest {
            model: model_json(model)?,
            start: range.start,
            stop: range.end,
            num_threads: self.num_threads,
        };
        self.call(operation, &request)
    }
}

fn model_json(model: &dyn MetabolicModel) -> Result<Value, SolverError> {
    model
        .to_json()
        .map_err(|e| SolverError::Input(format!("cannot encode model '{}': {e}", model.name())))
}

impl Optimizer for SolverProcess {
    fn reaction_ranges(
        &self,
        model: &dyn MetabolicModel,
        range: Range<usize>,
    ) -> Result<BTreeMap<String, FluxRange>, SolverError> {
        self.ranges("reaction-ranges", model, range)
    }

    fn metabolite_ranges(
        &self,
        model: &dyn MetabolicModel,
        range: Range<usize>,
    ) -> Result<BTreeMap<String, FluxRange>, SolverError> {
        self.ranges("metabolite-ranges", model, range)
    }

    fn score_sample(
        &self,
        model: &dyn MetabolicModel,
        task: &SampleTask,
    ) -> Result<SampleScores, SolverError> {
        let config = &task.config;
        let request = ScoreRequest {
            model: model_json(model)?,
            sample_index: task.index,
            sample_name: &task.name,
            data: &config.data,
            penalties_file: &task.penalties_file,
            cache_file: &task.cache_file,
            species: &config.species,
            media: config.media.as_deref(),
            lambda: config.lambda,
            num_threads: self.num_threads,
            no_reactions: config.no_reactions,
            calc_metabolites: config.calc_metabolites,
            generate_cache: config.generate_cache,
        };
        let response: ScoreResponse = self.call("score-sample", &request)?;
        Ok(SampleScores {
            reactions: response.reactions,
            secretions: response.secretions,
            uptake: response.uptake,
        })
    }
}

impl PenaltyModel for SolverProcess {
    fn evaluate(
        &self,
        model: &dyn MetabolicModel,
        config: &RunConfig,
        samples: &[String],
    ) -> Result<Table, SolverError> {
        let request = PenaltyRequest {
            model: model_json(model)?,
            data: &config.data,
            samples,
            species: &config.species,
            media: config.media.as_deref(),
            lambda: config.lambda,
            num_threads: self.num_threads,
        };
        self.call("penalties", &request)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use compass::core::model::ModelDocument;
    use compass::engine::runner::SampleRunner;
    use serial_test::serial;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::sync::Arc;
    use tempfile::tempdir;

    const MODEL_JSON: &str = r#"{
        "name": "TOY",
        "reactions": [{"id": "R1", "genes": ["G1"]}, {"id": "R2"}],
        "metabolites": [{"id": "M1"}]
    }"#;

    fn fake_solver(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("solver");
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn model() -> ModelDocument {
        serde_json::from_str(MODEL_JSON).unwrap()
    }

    #[test]
    #[serial]
    fn reaction_ranges_are_read_from_stdout() {
        let dir = tempdir().unwrap();
        let request = dir.path().join("request.json");
        let solver = fake_solver(
            dir.path(),
            &format!(
                "[ \"$1\" = reaction-ranges ] || exit 3\ncat > '{}'\necho '{{\"R1\": 12.5, \"R2\": 0}}'",
                request.display()
            ),
        );

        let ranges = SolverProcess::new(&solver, 2)
            .reaction_ranges(&model(), 0..2)
            .unwrap();

        assert_eq!(ranges["R1"], FluxRange::Max(12.5));
        assert_eq!(ranges.len(), 2);
        let sent: Value = serde_json::from_slice(&fs::read(&request).unwrap()).unwrap();
        assert_eq!(sent["stop"], 2);
        assert_eq!(sent["num_threads"], 2);
        assert_eq!(sent["model"]["name"], "TOY");
    }

    #[test]
    #[serial]
    fn non_zero_exit_is_a_tagged_solver_error() {
        let dir = tempdir().unwrap();
        let solver = fake_solver(
            dir.path(),
            "cat > /dev/null\necho 'loading model' >&2\necho 'CPLEX Error 1217: No solution exists.' >&2\nexit 1",
        );

        let error = SolverProcess::new(&solver, 1)
            .metabolite_ranges(&model(), 0..1)
            .unwrap_err();

        assert!(matches!(error, SolverError::Solver { .. }));
        assert!(error.to_string().contains("No solution exists."));
    }

    #[test]
    #[serial]
    fn score_sample_returns_requested_tables() {
        let dir = tempdir().unwrap();
        let solver = fake_solver(
            dir.path(),
            "cat > /dev/null\necho '{\"reactions\": {\"columns\": [\"cell0\"], \"rows\": [{\"id\": \"R1\", \"values\": [0.75]}]}}'",
        );
        let config = Arc::new(RunConfig {
            output_dir: dir.path().to_path_buf(),
            ..RunConfig::default()
        });
        let task = SampleTask::new(0, "cell0", config);

        let scores = SolverProcess::new(&solver, 1)
            .score_sample(&model(), &task)
            .unwrap();

        let reactions = scores.reactions.unwrap();
        assert_eq!(reactions.get("R1", "cell0"), Some(0.75));
        assert!(scores.secretions.is_none());
    }

    #[test]
    #[serial]
    fn solver_diagnostics_land_in_the_sample_logs() {
        let dir = tempdir().unwrap();
        let solver = fake_solver(
            dir.path(),
            "cat > /dev/null\necho 'CPLEX warning: numeric trouble' >&2\necho '{}'",
        );
        let config = Arc::new(RunConfig {
            output_dir: dir.path().to_path_buf(),
            ..RunConfig::default()
        });
        let task = SampleTask::new(3, "cell3", config);
        let model = model();
        let backend = SolverProcess::new(&solver, 1);

        let result = SampleRunner::new(&model, &backend).run(&task).unwrap();

        assert!(result.artifacts.is_empty());
        let out = fs::read_to_string(task.directory.join("out.log")).unwrap();
        let err = fs::read_to_string(task.directory.join("err.log")).unwrap();
        assert!(out.contains("CPLEX warning: numeric trouble"));
        assert!(err.contains("CPLEX warning: numeric trouble"));
    }

    #[test]
    fn missing_executable_is_an_io_error() {
        let error = SolverProcess::new("/nonexistent/compass-solver", 1)
            .reaction_ranges(&model(), 0..1)
            .unwrap_err();

        assert!(matches!(error, SolverError::Io(_)));
    }
}
