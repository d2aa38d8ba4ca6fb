//! CLI handlers: resolve settings, drive the pipeline, print the outcome.

pub mod plot;
pub mod run;
