//! Failure taxonomy for the experiment pipeline.

use std::{fmt, io, path::PathBuf, time::Duration};

use thiserror::Error;

/// Pipeline stage that consumed an oracle response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Planning,
    Structuring,
    Rendering,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Planning => f.write_str("planning"),
            Stage::Structuring => f.write_str("structuring"),
            Stage::Rendering => f.write_str("rendering"),
        }
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("blocked command: {command}")]
    Blocked { command: String },

    #[error("timed out after {}s: {command}", timeout.as_secs_f32())]
    Timeout { command: String, timeout: Duration, stdout: String, stderr: String },

    #[error("`{command}` exited with status {}: {stderr}", code.map(|c| c.to_string()).unwrap_or_else(|| "unknown".into()))]
    NonZeroExit { command: String, code: Option<i32>, stderr: String },

    #[error("oracle response could not be used for {stage}")]
    OracleUnparseable { stage: Stage, raw: String },

    #[error("no artifact produced at {}", path.display())]
    ArtifactMissing { path: PathBuf, stdout: String, stderr: String },

    #[error("cannot read training script {}: {source}", path.display())]
    ScriptUnavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("oracle request failed during {stage}: {source:#}")]
    Oracle {
        stage: Stage,
        #[source]
        source: anyhow::Error,
    },

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl PipelineError {
    /// Raw oracle text attached to the failure, if any.
    pub fn raw_oracle_text(&self) -> Option<&str> {
        match self {
            PipelineError::OracleUnparseable { raw, .. } => Some(raw),
            _ => None,
        }
    }
}
