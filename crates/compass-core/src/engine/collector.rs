use super::artifact::ArtifactKind;
use super::config::RunConfig;
use super::error::EngineError;
use super::phase::PhaseRecord;
use super::runner::sample_directory;
use crate::core::io::table::Table;
use crate::core::model::MetabolicModel;
use flate2::Compression;
use flate2::write::GzEncoder;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};

const MODEL_FILE_NAME: &str = "model.json.gz";

#[derive(Debug, Clone, PartialEq)]
pub enum AggregatedArtifact {
    Table {
        kind: ArtifactKind,
        path: PathBuf,
        table: Table,
    },
    Model {
        path: PathBuf,
    },
}

impl AggregatedArtifact {
    pub fn path(&self) -> &Path {
        match self {
            Self::Table { path, .. } | Self::Model { path } => path,
        }
    }
}

/// Merges per-sample score tables from `<source>/sample<i>` into one table per
/// artifact kind under `destination`.
///
/// A sample whose file is missing or unreadable contributes an empty column under
/// its name, so the output always has one column per sample.
#[derive(Debug, Clone)]
pub struct ResultCollector {
    source: PathBuf,
    destination: PathBuf,
}

impl ResultCollector {
    pub fn new(source: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
        }
    }

    #[instrument(skip_all, name = "collect_results")]
    pub fn collect(
        &self,
        samples: &[String],
        model: &dyn MetabolicModel,
        config: &RunConfig,
    ) -> Result<Vec<AggregatedArtifact>, EngineError> {
        fs::create_dir_all(&self.destination)
            .map_err(|e| EngineError::io(&self.destination, e))?;
        self.report_completion(samples.len());

        let mut artifacts = Vec::new();
        for kind in ArtifactKind::enabled(config) {
            let tables: Vec<Table> = samples
                .iter()
                .enumerate()
                .map(|(index, name)| self.read_sample(index, name, kind))
                .collect();
            let table = Table::concat_columns(&tables);
            let path = self.destination.join(kind.output_file_name());
            table.write_tsv(&path)?;
            info!(
                artifact = %kind,
                rows = table.len(),
                columns = table.columns().len(),
                "Wrote aggregated table."
            );
            artifacts.push(AggregatedArtifact::Table { kind, path, table });
        }

        let model_path = self.destination.join(MODEL_FILE_NAME);
        write_model(model, &model_path)?;
        artifacts.push(AggregatedArtifact::Model { path: model_path });
        Ok(artifacts)
    }

    fn read_sample(&self, index: usize, name: &str, kind: ArtifactKind) -> Table {
        let path = sample_directory(&self.source, index).join(kind.sample_file_name());
        match Table::read_tsv(&path) {
            Ok(table) => table,
            Err(e) => {
                warn!(
                    sample = index,
                    artifact = %kind,
                    error = %e,
                    "Missing sample output, substituting an empty column."
                );
                Table::placeholder(name)
            }
        }
    }

    fn report_completion(&self, total: usize) {
        let complete = (0..total)
            .filter(|&index| {
                PhaseRecord::sample(&sample_directory(&self.source, index))
                    .is_complete()
                    .unwrap_or(false)
            })
            .count();
        if complete < total {
            warn!(complete, total, "Not every sample has completed.");
        } else {
            info!(complete, total, "Collecting results of all samples.");
        }
    }
}

fn write_model(model: &dyn MetabolicModel, path: &Path) -> Result<(), EngineError> {
    let description = model.to_json().map_err(|e| EngineError::Serialization {
        what: "model description",
        source: e,
    })?;
    let file = File::create(path).map_err(|e| EngineError::io(path, e))?;
    let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
    serde_json::to_writer(&mut encoder, &description).map_err(|e| {
        EngineError::Serialization {
            what: "model description",
            source: e,
        }
    })?;
    encoder
        .finish()
        .and_then(|mut writer| writer.flush())
        .map_err(|e| EngineError::io(path, e))?;
    info!(model = model.name(), path = %path.display(), "Wrote model description.");
    Ok(())
}
