use super::error::EngineError;
use crate::core::io::atomic::write_atomic;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

const PENALTIES_RECORD: &str = "success_token_penalties";
const SAMPLE_RECORD: &str = "phase_state.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseState {
    NotStarted,
    InProgress,
    Complete,
}

#[derive(Debug, Serialize, Deserialize)]
struct RecordFile {
    phase: String,
    state: PhaseState,
}

/// Persistent completion marker of a whole phase.
///
/// A phase is either redone entirely or skipped entirely, so the record only has to
/// distinguish "finished" from everything else. A record file that exists but does
/// not parse is an older presence-only token and counts as complete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseRecord {
    phase: &'static str,
    path: PathBuf,
}

impl PhaseRecord {
    pub fn new(phase: &'static str, path: impl Into<PathBuf>) -> Self {
        Self {
            phase,
            path: path.into(),
        }
    }

    pub fn penalties(temp_root: &Path) -> Self {
        Self::new("penalties", temp_root.join(PENALTIES_RECORD))
    }

    pub fn sample(sample_dir: &Path) -> Self {
        Self::new("sample", sample_dir.join(SAMPLE_RECORD))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> Result<PhaseState, EngineError> {
        let content = match fs::read(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(PhaseState::NotStarted),
            Err(e) => return Err(EngineError::io(&self.path, e)),
        };
        match serde_json::from_slice::<RecordFile>(&content) {
            Ok(record) => Ok(record.state),
            Err(_) => {
                debug!(path = %self.path.display(), "Treating legacy phase token as complete.");
                Ok(PhaseState::Complete)
            }
        }
    }

    pub fn is_complete(&self) -> Result<bool, EngineError> {
        Ok(self.state()? == PhaseState::Complete)
    }

    pub fn mark(&self, state: PhaseState) -> Result<(), EngineError> {
        let record = RecordFile {
            phase: self.phase.to_string(),
            state,
        };
        let content = serde_json::to_vec(&record).map_err(|e| EngineError::Serialization {
            what: "phase record",
            source: e,
        })?;
        write_atomic(&self.path, &content).map_err(|e| EngineError::io(&self.path, e))?;
        debug!(phase = self.phase, ?state, "Updated phase record.");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn absent_record_is_not_started() {
        let dir = tempdir().unwrap();
        let record = PhaseRecord::penalties(dir.path());

        assert_eq!(record.state().unwrap(), PhaseState::NotStarted);
        assert!(!record.is_complete().unwrap());
    }

    #[test]
    fn mark_transitions_are_persisted() {
        let dir = tempdir().unwrap();
        let record = PhaseRecord::sample(dir.path());

        record.mark(PhaseState::InProgress).unwrap();
        assert_eq!(record.state().unwrap(), PhaseState::InProgress);
        assert!(!record.is_complete().unwrap());

        record.mark(PhaseState::Complete).unwrap();
        assert!(record.is_complete().unwrap());
        assert!(dir.path().join("phase_state.json").is_file());
    }

    #[test]
    fn legacy_presence_token_counts_as_complete() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("success_token_penalties"), "Success!").unwrap();

        let record = PhaseRecord::penalties(dir.path());

        assert!(record.is_complete().unwrap());
    }
}
