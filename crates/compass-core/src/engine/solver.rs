//! Interfaces to the numerical collaborators of a run.
//!
//! The orchestration layer never formulates or solves a linear program itself. It
//! asks an [`Optimizer`] for flux ranges and per-sample scores, and a
//! [`PenaltyModel`] for the expression-derived reaction penalties.

use super::config::RunConfig;
use super::precache::FluxRange;
use super::runner::SampleTask;
use crate::core::io::table::{Table, TableError};
use crate::core::model::MetabolicModel;
use std::collections::BTreeMap;
use std::error::Error as StdError;
use std::ops::Range;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SolverError {
    /// A failure raised inside the solver itself.
    #[error("{message}")]
    Solver {
        message: String,
        #[source]
        source: Option<Box<dyn StdError + Send + Sync>>,
    },

    #[error("Invalid solver input: {0}")]
    Input(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Table(#[from] TableError),
}

impl SolverError {
    pub fn solver(message: impl Into<String>) -> Self {
        Self::Solver {
            message: message.into(),
            source: None,
        }
    }
}

/// Score tables of one sample. A `None` table was not requested.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampleScores {
    pub reactions: Option<Table>,
    pub secretions: Option<Table>,
    pub uptake: Option<Table>,
}

pub trait Optimizer: Send + Sync {
    /// Maximum feasible flux of the reactions at `range` of the model's reaction index.
    fn reaction_ranges(
        &self,
        model: &dyn MetabolicModel,
        range: Range<usize>,
    ) -> Result<BTreeMap<String, FluxRange>, SolverError>;

    /// Feasible exchange bounds of the metabolites at `range` of the metabolite index.
    fn metabolite_ranges(
        &self,
        model: &dyn MetabolicModel,
        range: Range<usize>,
    ) -> Result<BTreeMap<String, FluxRange>, SolverError>;

    fn score_sample(
        &self,
        model: &dyn MetabolicModel,
        task: &SampleTask,
    ) -> Result<SampleScores, SolverError>;
}

pub trait PenaltyModel: Send + Sync {
    /// Reaction penalties with one column per sample.
    fn evaluate(
        &self,
        model: &dyn MetabolicModel,
        config: &RunConfig,
        samples: &[String],
    ) -> Result<Table, SolverError>;
}
