use crate::matcher::{self, IncompleteAggregate, Match, MatchError};
use crate::rule::Rule;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const KILL_GRACE_PERIOD: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum AdaptorError {
    #[error("failed to spawn source process: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("failed to capture child stdout")]
    NoStdout,

    #[error("failed to capture child stderr")]
    NoStderr,
}

/// Spawns this rule's source subprocess, feeds its stdout lines through the
/// rule's matcher, and returns the channel of successful Matches.
///
/// The channel has capacity 1: a slow worker backpressures the reader, which
/// in turn backpressures the subprocess via its stdout pipe buffer. The
/// channel closes when the subprocess's stdout reaches EOF, which happens
/// either because the process exited on its own or because `cancel` fired
/// and the grace-period shutdown below ran its course.
pub fn spawn(rule: Arc<Rule>, cancel: CancellationToken) -> Result<mpsc::Receiver<Match>, AdaptorError> {
    let (command, args) = rule.source.command();

    let mut child = Command::new(&command)
        .args(&args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    info!(rule = %rule.name, command = %command, args = ?args, "scanning source process output");

    let stdout = child.stdout.take().ok_or(AdaptorError::NoStdout)?;
    let stderr = child.stderr.take().ok_or(AdaptorError::NoStderr)?;
    let pid = child.id();

    let (tx, rx) = mpsc::channel(1);
    let stopped = CancellationToken::new();

    {
        let cancel = cancel.clone();
        let stopped = stopped.clone();
        let rule_name = rule.name.clone();
        tokio::spawn(async move {
            cancel.cancelled().await;
            if stopped.is_cancelled() {
                return;
            }
            if let Some(pid) = pid {
                let pid = Pid::from_raw(pid as i32);
                if let Err(e) = kill(pid, Signal::SIGINT) {
                    warn!(rule = %rule_name, error = %e, "failed to send SIGINT to source process");
                }
                tokio::select! {
                    _ = stopped.cancelled() => {}
                    _ = tokio::time::sleep(KILL_GRACE_PERIOD) => {
                        if !stopped.is_cancelled() {
                            if let Err(e) = kill(pid, Signal::SIGKILL) {
                                warn!(rule = %rule_name, error = %e, "failed to send SIGKILL to source process");
                            }
                        }
                    }
                }
            }
        });
    }

    {
        let rule = Arc::clone(&rule);
        let stopped = stopped.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        match apply_matcher(&rule, &line).await {
                            Ok(Some(m)) => {
                                if tx.send(m).await.is_err() {
                                    break;
                                }
                            }
                            Ok(None) => {}
                            Err(e) => debug!(rule = %rule.name, error = %e, "failed to create match"),
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        error!(rule = %rule.name, error = %e, "error while scanning source process stdout");
                        break;
                    }
                }
            }
            stopped.cancel();

            match child.wait().await {
                Ok(status) if status.success() || status.code().is_none() => {
                    // None means terminated by signal, which is the expected shape
                    // of a graceful shutdown; nothing to log.
                }
                Ok(status) => {
                    warn!(rule = %rule.name, status = %status, "source process exited with an error");
                }
                Err(e) => {
                    error!(rule = %rule.name, error = %e, "failed to reap source process");
                }
            }
        });
    }

    {
        let rule_name = rule.name.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(rule = %rule_name, "source process stderr: {}", line);
            }
        });
    }

    Ok(rx)
}

async fn apply_matcher(rule: &Rule, line: &str) -> Result<Option<Match>, MatchError> {
    match &rule.aggregate {
        None => matcher::match_simple(&rule.patterns, line).map(Some),
        Some(spec) => {
            match matcher::match_aggregate(&rule.patterns, &spec.patterns, &spec.registry, line).await? {
                Ok(m) => Ok(Some(m)),
                Err(IncompleteAggregate) => Ok(None),
            }
        }
    }
}
