use super::error::EngineError;
use crate::core::io::atomic::write_atomic;
use crate::core::model::ModelKey;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use tracing::{debug, info};

/// The feasible flux of one reaction or metabolite exchange.
///
/// Reactions carry only their maximum; metabolite exchanges carry both bounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FluxRange {
    Max(f64),
    Bounds { min: f64, max: f64 },
}

/// Cached flux ranges for one model key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RangeCache {
    #[serde(default)]
    pub reactions: BTreeMap<String, FluxRange>,
    #[serde(default)]
    pub metabolites: BTreeMap<String, FluxRange>,
}

impl RangeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.reactions.is_empty() && self.metabolites.is_empty()
    }

    pub fn len(&self) -> usize {
        self.reactions.len() + self.metabolites.len()
    }
}

/// Folds one chunk of computed ranges into `existing`.
///
/// An identifier present on both sides must map to the same range; a differing
/// range is a [`EngineError::CacheConflict`] and leaves `existing` unchanged.
pub(crate) fn merge_section(
    section: &'static str,
    existing: &mut BTreeMap<String, FluxRange>,
    incoming: BTreeMap<String, FluxRange>,
) -> Result<(), EngineError> {
    check_conflicts(section, existing, &incoming)?;
    for (id, range) in incoming {
        existing.entry(id).or_insert(range);
    }
    Ok(())
}

fn check_conflicts(
    section: &'static str,
    existing: &BTreeMap<String, FluxRange>,
    incoming: &BTreeMap<String, FluxRange>,
) -> Result<(), EngineError> {
    match incoming
        .iter()
        .find(|(id, range)| existing.get(*id).is_some_and(|current| current != *range))
    {
        Some((id, _)) => Err(EngineError::CacheConflict {
            section,
            id: id.clone(),
        }),
        None => Ok(()),
    }
}

/// Persistent store of [`RangeCache`] entries, one JSON file per model key.
#[derive(Debug, Clone)]
pub struct PrecacheStore {
    root: PathBuf,
}

impl PrecacheStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `<root>/<model>/<species>/<media>.json`
    pub fn entry_path(&self, key: &ModelKey) -> PathBuf {
        self.root
            .join(sanitize(&key.model))
            .join(sanitize(&key.species))
            .join(format!("{}.json", sanitize(key.media_label())))
    }

    /// Returns the stored entry, or an empty cache when nothing has been stored yet.
    pub fn load(&self, key: &ModelKey) -> Result<RangeCache, EngineError> {
        let path = self.entry_path(key);
        let content = match fs::read(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(key = %key, "No flux range cache stored yet.");
                return Ok(RangeCache::new());
            }
            Err(e) => {
                return Err(EngineError::Cache {
                    action: "load",
                    path,
                    message: e.to_string(),
                });
            }
        };
        let cache: RangeCache =
            serde_json::from_slice(&content).map_err(|e| EngineError::Cache {
                action: "load",
                path: path.clone(),
                message: e.to_string(),
            })?;
        debug!(key = %key, entries = cache.len(), "Loaded flux range cache.");
        Ok(cache)
    }

    /// Replaces the stored entry in one atomic rename.
    pub fn save(&self, key: &ModelKey, cache: &RangeCache) -> Result<(), EngineError> {
        let path = self.entry_path(key);
        let content = serde_json::to_vec_pretty(cache).map_err(|e| EngineError::Serialization {
            what: "flux range cache",
            source: e,
        })?;
        write_atomic(&path, &content).map_err(|e| EngineError::Cache {
            action: "save",
            path: path.clone(),
            message: e.to_string(),
        })?;
        info!(key = %key, entries = cache.len(), path = %path.display(), "Saved flux range cache.");
        Ok(())
    }
}

fn sanitize(component: &str) -> String {
    let cleaned: String = component
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '\0' => '_',
            c => c,
        })
        .collect();
    match cleaned.as_str() {
        "" | "." | ".." => format!("_{cleaned}"),
        _ => cleaned,
    }
}
