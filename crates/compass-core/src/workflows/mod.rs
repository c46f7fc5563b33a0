//! # Workflows Module
//!
//! Top-level entry points of the library. A workflow validates its inputs, drives
//! the engine components in the right order and reports progress as it goes.
//!
//! - **Compass Workflow** ([`compass`]) - One complete invocation: gene listing,
//!   cache check, single-sample and collect modes, the penalties phase and local
//!   or queued scoring.
//! - **Precache Workflow** ([`precache`]) - Computes the flux ranges of a model in
//!   parallel and stores them for later runs.

pub mod compass;
pub mod precache;
