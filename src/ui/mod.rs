//! Terminal output
//!
//! Uses `cliclack` and `indicatif` in interactive terminals, with a plain
//! line-per-step fallback in CI and when output is piped.

mod context;
mod output;
mod progress;

pub use context::UiContext;
pub use output::{banner, conclude, heading, remark, step, step_detail, tally, Tone};
pub use progress::{IngestProgress, TaskSpinner};
