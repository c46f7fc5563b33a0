//! # Core Module
//!
//! Stateless building blocks shared by the engine and the workflows.
//!
//! - **Model identity** ([`model`]) - `ModelKey`, the `MetabolicModel` interface and the
//!   JSON model document used by the command-line tool
//! - **File I/O** ([`io`]) - tab-separated tables (optionally gzip-compressed), expression
//!   data headers and atomic file replacement

pub mod io;
pub mod model;
