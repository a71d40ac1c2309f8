//! nixpkgs-broken - Hydra build health tracking for nixpkgs
//!
//! Mirrors a Hydra jobset's build results into a local SQLite database,
//! classifies packages whose latest build fails, and writes `meta.broken`
//! declarations into a nixpkgs checkout, verified through the evaluator.

pub mod cli;
pub mod config;
pub mod detect;
pub mod error;
pub mod fetch;
pub mod patch;
pub mod platform;
pub mod store;
pub mod ui;

pub use error::{NbError, NbResult};
