//! Running a generated source file through an interpreter.
//!
//! Generated code never goes through [`CommandPolicy`](crate::policy::CommandPolicy);
//! its containment is the rewriting done before it is written to disk.

use std::{path::Path, time::Duration};

use super::{classify, ExecutionResult};
use crate::process;

pub async fn run_file(
    interpreter: &str,
    script: &Path,
    limit: Duration,
    cwd: &Path,
) -> ExecutionResult {
    let script_arg = script.to_string_lossy().into_owned();
    let command = format!("{} {}", interpreter, script_arg);
    tracing::debug!(%command, "running generated code");

    // -u keeps partial output intact if the run is killed
    let args = if is_python(interpreter) {
        vec!["-u".to_string(), script_arg]
    } else {
        vec![script_arg]
    };
    let captured = process::run_captured(interpreter, &args, limit, Some(cwd)).await;

    let (exit_status, exit_code) = classify(&captured.outcome);
    ExecutionResult {
        command,
        stdout: captured.stdout,
        stderr: captured.stderr,
        exit_status,
        exit_code,
    }
}

fn is_python(interpreter: &str) -> bool {
    Path::new(interpreter)
        .file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with("python"))
        .unwrap_or(false)
}
