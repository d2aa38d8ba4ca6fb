//! Utilities (reading the training script and log files, fenced-block scanning).

use std::{
    fs,
    io::{self, Read},
    path::Path,
    sync::OnceLock,
};

use anyhow::{bail, Context, Result};
use regex::Regex;

use crate::error::PipelineError;

/// Literal source of the training script, for the planner prompt.
pub fn read_script(path: &Path) -> Result<String, PipelineError> {
    fs::read_to_string(path).map_err(|source| PipelineError::ScriptUnavailable {
        path: path.to_path_buf(),
        source,
    })
}

/// Read a log file, or stdin when `file_path` is `-`.
pub fn read_logs(file_path: &str) -> Result<String> {
    if file_path == "-" {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf).context("reading logs from stdin")?;
        return Ok(buf);
    }

    let path = Path::new(file_path);
    if !path.exists() {
        bail!("Log file '{}' does not exist", file_path);
    }
    if !path.is_file() {
        bail!("'{}' is not a file", file_path);
    }
    fs::read_to_string(path).with_context(|| format!("Failed to read file '{}'", file_path))
}

/// Bodies of all ``` fenced blocks, in order of appearance. The info string
/// after the opening fence (`python`, `json`, ...) is ignored.
pub fn fenced_blocks(text: &str) -> Vec<String> {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    let re = FENCE.get_or_init(|| {
        Regex::new(r"(?s)```[^\n`]*\n(.*?)```").expect("fence pattern is valid")
    });
    re.captures_iter(text)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .collect()
}
