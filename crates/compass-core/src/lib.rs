//! # Compass Core Library
//!
//! Orchestration layer for single-cell metabolic flux scoring. A single-sample
//! linear-program solver is turned into a parallel, resumable batch computation
//! over thousands of independent units of work.
//!
//! ## Architectural Philosophy
//!
//! The library follows a three-layer layout:
//!
//! - **[`core`]: The Foundation.** Stateless data: model identity and the metabolic
//!   model interface, tab-separated tables, expression data headers.
//!
//! - **[`engine`]: The Orchestration Core.** Work partitioning, the worker pool, the
//!   flux range cache, phase records, per-sample isolation, result collection and
//!   batch queue submission. The solver and penalty model are reached only through
//!   the traits in [`engine::solver`].
//!
//! - **[`workflows`]: The Public API.** Complete runs: the precache phase and the
//!   run-mode dispatch that ties everything together.

pub mod core;
pub mod engine;
pub mod workflows;
