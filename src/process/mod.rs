//! Child process management: spawn without a shell, drain both pipes, bound by a timeout.

use std::{
    path::Path,
    process::Stdio,
    sync::{Arc, Mutex},
    time::Duration,
};

use tokio::{
    io::{AsyncRead, AsyncReadExt},
    process::{Child, Command},
    task::JoinHandle,
    time::timeout,
};

/// How long readers may keep draining once the child is gone.
const DRAIN_AFTER_EXIT: Duration = Duration::from_secs(2);
const DRAIN_AFTER_KILL: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Exited(Option<i32>),
    TimedOut,
    SpawnFailed(String),
}

#[derive(Debug, Clone)]
pub struct Captured {
    pub stdout: String,
    pub stderr: String,
    pub outcome: Outcome,
}

/// Run `program` with `args` and capture its output. Never fails: every way the
/// child can go wrong is reported through [`Outcome`]. On timeout the child and
/// every process in its group are killed and whatever was written so far is returned.
pub async fn run_captured(
    program: &str,
    args: &[String],
    limit: Duration,
    cwd: Option<&Path>,
) -> Captured {
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }
    // Own group, so a timeout can take down everything the child started.
    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!(program, "spawn failed: {}", e);
            return Captured {
                stdout: String::new(),
                stderr: format!("failed to spawn {}: {}", program, e),
                outcome: Outcome::SpawnFailed(e.to_string()),
            };
        }
    };

    let out_buf = Arc::new(Mutex::new(Vec::new()));
    let err_buf = Arc::new(Mutex::new(Vec::new()));
    let readers: Vec<JoinHandle<()>> = [
        child.stdout.take().map(|s| tokio::spawn(drain(s, out_buf.clone()))),
        child.stderr.take().map(|s| tokio::spawn(drain(s, err_buf.clone()))),
    ]
    .into_iter()
    .flatten()
    .collect();

    let mut wait_error = None;
    let (outcome, grace) = match timeout(limit, child.wait()).await {
        Ok(Ok(status)) => (Outcome::Exited(status.code()), DRAIN_AFTER_EXIT),
        Ok(Err(e)) => {
            wait_error = Some(e.to_string());
            kill_tree(program, &mut child).await;
            (Outcome::Exited(None), DRAIN_AFTER_KILL)
        }
        Err(_) => {
            tracing::warn!(program, "timed out after {:?}, killing", limit);
            kill_tree(program, &mut child).await;
            (Outcome::TimedOut, DRAIN_AFTER_KILL)
        }
    };

    // A grandchild can keep a pipe open after the child is gone.
    for mut reader in readers {
        if timeout(grace, &mut reader).await.is_err() {
            reader.abort();
        }
    }

    let mut stderr = take_text(&err_buf);
    if let Some(e) = wait_error {
        if !stderr.is_empty() && !stderr.ends_with('\n') {
            stderr.push('\n');
        }
        stderr.push_str(&format!("failed to wait for {}: {}", program, e));
    }
    Captured { stdout: take_text(&out_buf), stderr, outcome }
}

/// SIGKILL the child's whole process group, then reap the child itself.
async fn kill_tree(program: &str, child: &mut Child) {
    #[cfg(unix)]
    {
        if let Some(pid) = child.id() {
            // SAFETY: killpg only sends a signal; the group id is the child's pid
            // because it was spawned with process_group(0).
            if unsafe { libc::killpg(pid as libc::pid_t, libc::SIGKILL) } != 0 {
                tracing::warn!(program, pid, "killpg failed: {}", std::io::Error::last_os_error());
            }
        }
    }
    if let Err(e) = child.kill().await {
        tracing::debug!(program, "kill: {}", e);
    }
}

async fn drain<R: AsyncRead + Unpin>(mut reader: R, sink: Arc<Mutex<Vec<u8>>>) {
    let mut chunk = [0u8; 8192];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                if let Ok(mut buf) = sink.lock() {
                    buf.extend_from_slice(&chunk[..n]);
                }
            }
        }
    }
}

fn take_text(buf: &Arc<Mutex<Vec<u8>>>) -> String {
    buf.lock()
        .map(|mut b| String::from_utf8_lossy(&std::mem::take(&mut *b)).into_owned())
        .unwrap_or_default()
}
