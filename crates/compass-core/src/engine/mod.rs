//! # Engine Module
//!
//! The orchestration machinery behind a Compass run: everything that decides how work
//! is split, where it runs, what is persisted between runs, and how per-sample
//! outputs are merged.
//!
//! ## Architecture
//!
//! - **Configuration** ([`config`]) - The run configuration, file overlays and validation
//! - **Error Handling** ([`error`]) - Engine-wide error type
//! - **Progress Monitoring** ([`progress`]) - Phase and task progress events
//! - **Work Partitioning** ([`partition`]) - Balanced contiguous chunks over an index domain
//! - **Worker Pool** ([`executor`]) - Bounded parallel execution with unordered completion
//! - **Flux Range Cache** ([`precache`]) - Persistent per-model flux ranges
//! - **Phase Records** ([`phase`]) - Atomic markers for completed whole-run phases
//! - **Sample Isolation** ([`sink`], [`runner`]) - Scoped logging and error translation per sample
//! - **Aggregation** ([`collector`]) - Consolidated output tables
//! - **Remote Execution** ([`dispatch`]) - Submission of per-sample jobs to a batch queue
//! - **Collaborators** ([`solver`]) - The optimizer and penalty model interfaces

pub mod artifact;
pub mod collector;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod executor;
pub mod partition;
pub mod phase;
pub mod precache;
pub mod progress;
pub mod runner;
pub mod sink;
pub mod solver;
