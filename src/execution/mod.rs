//! Sandboxed execution of admissible training commands.

use std::{
    fmt,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::{
    policy::CommandPolicy,
    process::{self, Outcome},
};

pub mod python;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitStatus {
    Ok,
    Nonzero,
    TimedOut,
    Blocked,
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExitStatus::Ok => "ok",
            ExitStatus::Nonzero => "nonzero",
            ExitStatus::TimedOut => "timed_out",
            ExitStatus::Blocked => "blocked",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub command: String,
    pub stdout: String,
    pub stderr: String,
    pub exit_status: ExitStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

impl ExecutionResult {
    pub fn blocked(command: &str) -> Self {
        Self {
            command: command.to_string(),
            stdout: String::new(),
            stderr: format!("Blocked unsafe command: {}", command),
            exit_status: ExitStatus::Blocked,
            exit_code: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.exit_status == ExitStatus::Ok
    }
}

/// Runs commands that pass the [`CommandPolicy`]. Clones share one spawn counter.
#[derive(Debug, Clone)]
pub struct Executor {
    policy: CommandPolicy,
    spawned: Arc<AtomicUsize>,
}

impl Executor {
    pub fn new(policy: CommandPolicy) -> Self {
        Self { policy, spawned: Arc::new(AtomicUsize::new(0)) }
    }

    pub fn policy(&self) -> &CommandPolicy {
        &self.policy
    }

    /// Number of child processes this executor has attempted to start.
    pub fn spawned(&self) -> usize {
        self.spawned.load(Ordering::SeqCst)
    }

    /// Execute one command. The admissibility check is repeated here, whatever
    /// the caller already did. Child failures are reported in the result, never
    /// as an error.
    pub async fn execute(&self, command: &str, timeout: Duration) -> ExecutionResult {
        if !self.policy.is_admissible(command) {
            tracing::warn!(command, "blocked inadmissible command");
            return ExecutionResult::blocked(command);
        }

        let argv = match shlex::split(command) {
            Some(argv) if !argv.is_empty() => argv,
            _ => {
                // Unbalanced quotes: treat like any other inadmissible text.
                tracing::warn!(command, "blocked command that does not split into arguments");
                return ExecutionResult::blocked(command);
            }
        };
        // What actually runs must be the interpreter and script the prefix named.
        let script = self.policy.script_path().to_string_lossy();
        if argv.len() < 2 || argv[0] != self.policy.interpreter() || argv[1] != script {
            tracing::warn!(command, ?argv, "blocked command whose arguments do not start with the script");
            return ExecutionResult::blocked(command);
        }

        tracing::info!(command, "running");
        self.spawned.fetch_add(1, Ordering::SeqCst);
        let captured = process::run_captured(&argv[0], &argv[1..], timeout, None).await;

        let (exit_status, exit_code) = classify(&captured.outcome);
        tracing::debug!(command, %exit_status, ?exit_code, "finished");

        ExecutionResult {
            command: command.to_string(),
            stdout: captured.stdout,
            stderr: captured.stderr,
            exit_status,
            exit_code,
        }
    }
}

/// `ok` iff the child exited 0 in time; a child that never started counts as `nonzero`.
pub(crate) fn classify(outcome: &Outcome) -> (ExitStatus, Option<i32>) {
    match outcome {
        Outcome::Exited(Some(0)) => (ExitStatus::Ok, Some(0)),
        Outcome::Exited(code) => (ExitStatus::Nonzero, *code),
        Outcome::TimedOut => (ExitStatus::TimedOut, None),
        Outcome::SpawnFailed(_) => (ExitStatus::Nonzero, None),
    }
}
