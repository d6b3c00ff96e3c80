use anyhow::Context;
use compat_matrix_core::prelude::MatrixResult;
use regex::Regex;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Child;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::runtime::ContainerRuntime;

const LOG_BUFFER_LINES: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReadinessFailure {
    TimedOut,
    /// The log stream ended, which means the container exited.
    StreamClosed,
}

/// The combined stdout and stderr of a container, line by line.
#[derive(Debug)]
pub(crate) struct LogStream {
    /// Kept so that `docker logs` is killed along with the stream.
    _follower: Child,
    pub(crate) lines: mpsc::Receiver<String>,
}

impl LogStream {
    /// Follow the logs of `container_name` from the start.
    pub(crate) fn follow(runtime: &ContainerRuntime, container_name: &str) -> MatrixResult<Self> {
        let mut follower = runtime
            .command()
            .args(["logs", "--follow", container_name])
            .spawn()
            .with_context(|| format!("Failed to follow logs of container '{container_name}'"))?;

        let (sender, lines) = mpsc::channel(LOG_BUFFER_LINES);
        forward_lines(
            follower
                .stdout
                .take()
                .context("Failed to get stdout for the log follower")?,
            sender.clone(),
        );
        forward_lines(
            follower
                .stderr
                .take()
                .context("Failed to get stderr for the log follower")?,
            sender,
        );

        Ok(Self {
            _follower: follower,
            lines,
        })
    }

    /// Keep logging whatever the container writes until it goes away.
    pub(crate) fn forward_to_log(self, log_target: String) {
        let LogStream {
            _follower: follower,
            mut lines,
        } = self;
        tokio::spawn(async move {
            let _follower = follower;
            while let Some(line) = lines.recv().await {
                if log::log_enabled!(target: &log_target, log::Level::Info) {
                    log::info!(target: &log_target, "{line}");
                }
            }
        });
    }
}

fn forward_lines<R>(reader: R, sender: mpsc::Sender<String>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if sender.send(line).await.is_err() {
                break;
            }
        }
    });
}

/// Consume log lines until one matches `pattern`.
///
/// Returns before `deadline` either way: ready, or failed because the deadline passed or the
/// stream ended first.
pub(crate) async fn wait_for_readiness(
    lines: &mut mpsc::Receiver<String>,
    pattern: &Regex,
    deadline: Instant,
    log_target: &str,
) -> Result<(), ReadinessFailure> {
    let matched = tokio::time::timeout_at(deadline, async {
        while let Some(line) = lines.recv().await {
            log::info!(target: log_target, "{line}");
            if pattern.is_match(&line) {
                return true;
            }
        }
        false
    })
    .await;

    match matched {
        Ok(true) => Ok(()),
        Ok(false) => Err(ReadinessFailure::StreamClosed),
        Err(_) => Err(ReadinessFailure::TimedOut),
    }
}
