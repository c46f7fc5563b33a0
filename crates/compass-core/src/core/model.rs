use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use thiserror::Error;

const DEFAULT_MEDIA_LABEL: &str = "default-media";

/// Identity of a metabolic model instance: the model name, the species used to match
/// genes, and the simulated media.
///
/// Within one run the same key always yields the same reaction and metabolite index
/// spaces, which is what makes cached flux ranges reusable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModelKey {
    pub model: String,
    pub species: String,
    pub media: Option<String>,
}

impl ModelKey {
    pub fn new(model: impl Into<String>, species: impl Into<String>, media: Option<String>) -> Self {
        Self {
            model: model.into(),
            species: species.into(),
            media,
        }
    }

    pub fn media_label(&self) -> &str {
        self.media.as_deref().unwrap_or(DEFAULT_MEDIA_LABEL)
    }
}

impl fmt::Display for ModelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.model, self.species, self.media_label())
    }
}

/// The view of a metabolic network that the orchestration layer needs.
///
/// Index spaces are positional: chunk `[start, stop)` of the reaction domain refers to
/// `reaction_ids()[start..stop]`.
pub trait MetabolicModel: Send + Sync {
    fn name(&self) -> &str;

    fn reaction_ids(&self) -> Vec<String>;

    fn metabolite_ids(&self) -> Vec<String>;

    /// Every gene referenced by at least one reaction.
    fn genes(&self) -> BTreeSet<String>;

    /// Canonical serialized description written next to the aggregated results.
    fn to_json(&self) -> Result<Value, serde_json::Error>;
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("File I/O error for '{path}': {source}", path = path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("JSON parsing error for '{path}': {source}", path = path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("No model named '{name}' in '{dir}'", dir = dir.display())]
    NotFound { name: String, dir: PathBuf },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReactionRecord {
    pub id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub genes: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaboliteRecord {
    pub id: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A metabolic model read from a JSON document.
///
/// Only identifiers and gene associations are interpreted; every other field is kept
/// verbatim so the model can be written back out unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDocument {
    pub name: String,
    #[serde(default)]
    pub reactions: Vec<ReactionRecord>,
    #[serde(default)]
    pub metabolites: Vec<MetaboliteRecord>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ModelDocument {
    /// Finds `<name>.json` or `<name>.json.gz` inside `dir`.
    pub fn locate(dir: &Path, name: &str) -> Result<PathBuf, ModelError> {
        [format!("{name}.json"), format!("{name}.json.gz")]
            .into_iter()
            .map(|file| dir.join(file))
            .find(|path| path.is_file())
            .ok_or_else(|| ModelError::NotFound {
                name: name.to_string(),
                dir: dir.to_path_buf(),
            })
    }

    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let file = File::open(path).map_err(|e| ModelError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let reader: Box<dyn Read> = if path.extension().is_some_and(|ext| ext == "gz") {
            Box::new(GzDecoder::new(BufReader::new(file)))
        } else {
            Box::new(BufReader::new(file))
        };
        serde_json::from_reader(reader).map_err(|e| ModelError::Json {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

impl MetabolicModel for ModelDocument {
    fn name(&self) -> &str {
        &self.name
    }

    fn reaction_ids(&self) -> Vec<String> {
        self.reactions.iter().map(|r| r.id.clone()).collect()
    }

    fn metabolite_ids(&self) -> Vec<String> {
        self.metabolites.iter().map(|m| m.id.clone()).collect()
    }

    fn genes(&self) -> BTreeSet<String> {
        self.reactions
            .iter()
            .flat_map(|r| r.genes.iter().cloned())
            .collect()
    }

    fn to_json(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}
