//! Admissibility gate for generated commands.
//!
//! The only commands allowed to run are invocations of one fixed training
//! script through one fixed interpreter. The check is a literal prefix match;
//! nothing in the command is interpreted by a shell.

use std::path::{Path, PathBuf};

use crate::config::Config;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandPolicy {
    interpreter: String,
    script_path: PathBuf,
    prefix: String,
}

impl CommandPolicy {
    pub fn new(interpreter: impl Into<String>, script_path: impl Into<PathBuf>) -> Self {
        let interpreter = interpreter.into();
        let script_path = script_path.into();
        let prefix = format!("{} {}", interpreter, script_path.display());
        Self { interpreter, script_path, prefix }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::new(
            cfg.get("TRAIN_INTERPRETER").unwrap_or_else(|| "python".into()),
            cfg.get_path("TRAIN_SCRIPT_PATH").unwrap_or_else(|| PathBuf::from("train.py")),
        )
    }

    pub fn interpreter(&self) -> &str {
        &self.interpreter
    }

    pub fn script_path(&self) -> &Path {
        &self.script_path
    }

    /// The literal text every admissible command starts with.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// A command is admissible iff it is exactly the prefix, or the prefix
    /// followed by a space, tab or newline. `python train.py.bak` does not pass,
    /// nor does a separator the argument splitter would not split on.
    pub fn is_admissible(&self, command: &str) -> bool {
        match command.strip_prefix(self.prefix.as_str()) {
            Some("") => true,
            Some(rest) => rest.starts_with([' ', '\t', '\n']),
            None => false,
        }
    }
}
