#![allow(dead_code)]

use std::{
    collections::VecDeque,
    fs,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use exprun::llm::{Completion, FunctionCall, Oracle, OracleRequest};

/// Oracle stand-in: replays canned replies in order and records every request.
pub struct ScriptedOracle {
    replies: Mutex<VecDeque<Result<Completion, String>>>,
    requests: Mutex<Vec<OracleRequest>>,
}

impl ScriptedOracle {
    pub fn new(replies: Vec<Completion>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into_iter().map(Ok).collect()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(VecDeque::from([Err(message.to_string())])),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<OracleRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Oracle for ScriptedOracle {
    async fn complete(&self, request: OracleRequest) -> Result<Completion> {
        self.requests.lock().unwrap().push(request);
        match self.replies.lock().unwrap().pop_front() {
            Some(Ok(c)) => Ok(c),
            Some(Err(m)) => Err(anyhow!(m)),
            None => Err(anyhow!("no scripted reply left")),
        }
    }
}

pub fn action(command: &str) -> FunctionCall {
    FunctionCall {
        name: "run_safe_command".into(),
        arguments: serde_json::json!({ "command": command }).to_string(),
    }
}

pub fn actions(commands: &[&str]) -> Completion {
    Completion::with_actions(commands.iter().map(|c| action(c)).collect())
}

pub fn document(commands: &[&str]) -> Completion {
    Completion::text(serde_json::json!({ "commands": commands }).to_string())
}

/// Write a POSIX shell "training script" into `dir`.
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, body).unwrap();
    path
}

pub fn python3_available() -> bool {
    std::process::Command::new("python3")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}
