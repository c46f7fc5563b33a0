use super::artifact::ArtifactKind;
use super::config::RunConfig;
use super::error::EngineError;
use super::phase::{PhaseRecord, PhaseState};
use super::precache::PrecacheStore;
use super::sink::SampleLogSink;
use super::solver::{Optimizer, SampleScores, SolverError};
use crate::core::model::{MetabolicModel, ModelKey};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

/// `<temp_root>/sample<index>`
pub fn sample_directory(temp_root: &Path, index: usize) -> PathBuf {
    temp_root.join(format!("sample{index}"))
}

/// Everything needed to score one sample. Immutable once created.
#[derive(Debug, Clone)]
pub struct SampleTask {
    pub index: usize,
    pub name: String,
    pub model: ModelKey,
    pub directory: PathBuf,
    pub penalties_file: PathBuf,
    /// Stored flux ranges of `model`, for solvers that read them directly.
    pub cache_file: PathBuf,
    pub config: Arc<RunConfig>,
}

impl SampleTask {
    pub fn new(index: usize, name: impl Into<String>, config: Arc<RunConfig>) -> Self {
        let model = config.model_key();
        Self {
            index,
            name: name.into(),
            directory: sample_directory(&config.temp_root(), index),
            penalties_file: config.penalties_path(),
            cache_file: PrecacheStore::new(config.cache_root()).entry_path(&model),
            model,
            config,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SampleResult {
    pub index: usize,
    pub name: String,
    pub directory: PathBuf,
    pub artifacts: BTreeMap<ArtifactKind, PathBuf>,
}

/// Scores single samples in isolation.
///
/// Each run gets its own directory, its own log files and its own phase record.
/// Solver failures leave the runner as message-only [`EngineError::CrossBoundary`]
/// errors; all other failures keep their source.
pub struct SampleRunner<'a> {
    model: &'a dyn MetabolicModel,
    optimizer: &'a dyn Optimizer,
}

impl<'a> SampleRunner<'a> {
    pub fn new(model: &'a dyn MetabolicModel, optimizer: &'a dyn Optimizer) -> Self {
        Self { model, optimizer }
    }

    pub fn run(&self, task: &SampleTask) -> Result<SampleResult, EngineError> {
        fs::create_dir_all(&task.directory).map_err(|e| EngineError::io(&task.directory, e))?;
        let record = PhaseRecord::sample(&task.directory);
        let sink = SampleLogSink::create(&task.directory)?;
        record.mark(PhaseState::InProgress)?;

        let outcome = sink.scope(|| {
            self.score(task).inspect_err(|e| {
                error!(sample = task.index, error = %e, "Sample failed.");
            })
        });
        drop(sink);

        let artifacts = outcome.map_err(|e| translate(task.index, e))?;
        record.mark(PhaseState::Complete)?;
        debug!(sample = task.index, name = %task.name, "Sample finished.");
        Ok(SampleResult {
            index: task.index,
            name: task.name.clone(),
            directory: task.directory.clone(),
            artifacts,
        })
    }

    fn score(&self, task: &SampleTask) -> Result<BTreeMap<ArtifactKind, PathBuf>, SolverError> {
        let started = Instant::now();
        info!(
            version = env!("CARGO_PKG_VERSION"),
            sample = task.index,
            name = %task.name,
            model = %task.model,
            "Scoring sample."
        );
        debug!(config = ?task.config, "Sample configuration.");

        let SampleScores {
            reactions,
            secretions,
            uptake,
        } = self.optimizer.score_sample(self.model, task)?;

        let mut artifacts = BTreeMap::new();
        for (kind, table) in [
            (ArtifactKind::Reactions, reactions),
            (ArtifactKind::Secretions, secretions),
            (ArtifactKind::Uptake, uptake),
        ] {
            if let Some(table) = table {
                let path = task.directory.join(kind.sample_file_name());
                table.write_tsv(&path)?;
                debug!(artifact = %kind, rows = table.len(), "Wrote sample scores.");
                artifacts.insert(kind, path);
            }
        }

        info!(elapsed = ?started.elapsed(), "Sample scored.");
        Ok(artifacts)
    }
}

fn translate(sample: usize, error: SolverError) -> EngineError {
    match error {
        SolverError::Solver { message, .. } => EngineError::CrossBoundary { sample, message },
        source => EngineError::Sample { sample, source },
    }
}
