//! Transition event sources.
//!
//! Events arrive as JSON Lines, one [`TransitionEvent`] per line, either on
//! stdin or from a bridge program that holds the gateway connection.

use std::process::Stdio;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStdout, Command};
use vl_core::TransitionEvent;

/// Environment variable the bridge reads its gateway token from.
pub const TOKEN_ENV: &str = "DISCORD_TOKEN";

/// A stream of transition events in delivery order.
#[async_trait]
pub trait EventSource: Send {
    /// Returns the next event, or `None` once the source is exhausted.
    async fn next_event(&mut self) -> Result<Option<TransitionEvent>>;
}

/// Events decoded from JSON Lines.
///
/// Blank lines are skipped. Lines that fail to decode are logged and
/// skipped so one malformed event does not stop processing.
pub struct JsonLines<R> {
    lines: Lines<R>,
    line_no: usize,
}

impl<R: AsyncBufRead + Unpin> JsonLines<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line_no: 0,
        }
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> EventSource for JsonLines<R> {
    async fn next_event(&mut self) -> Result<Option<TransitionEvent>> {
        while let Some(line) = self
            .lines
            .next_line()
            .await
            .context("failed to read event stream")?
        {
            self.line_no += 1;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<TransitionEvent>(line) {
                Ok(event) => return Ok(Some(event)),
                Err(e) => {
                    tracing::warn!(line = self.line_no, error = %e, "skipping malformed event");
                }
            }
        }
        Ok(None)
    }
}

/// Reads events from this process's stdin.
pub fn stdin() -> JsonLines<BufReader<tokio::io::Stdin>> {
    JsonLines::new(BufReader::new(tokio::io::stdin()))
}

/// A child process that prints transition events on stdout.
///
/// The child is killed when the source is dropped.
pub struct BridgeProcess {
    child: Child,
    events: JsonLines<BufReader<ChildStdout>>,
}

impl BridgeProcess {
    /// Spawns `command` with the gateway token in its environment.
    pub fn spawn(command: &[String], token: &str) -> Result<Self> {
        let Some((program, args)) = command.split_first() else {
            bail!("bridge command is empty");
        };

        let mut child = Command::new(program)
            .args(args)
            .env(TOKEN_ENV, token)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to start bridge command `{program}`"))?;

        let stdout = child
            .stdout
            .take()
            .context("bridge stdout was not captured")?;
        tracing::info!(program = %program, pid = ?child.id(), "bridge started");

        Ok(Self {
            child,
            events: JsonLines::new(BufReader::new(stdout)),
        })
    }
}

#[async_trait]
impl EventSource for BridgeProcess {
    async fn next_event(&mut self) -> Result<Option<TransitionEvent>> {
        if let Some(event) = self.events.next_event().await? {
            return Ok(Some(event));
        }
        let status = self
            .child
            .wait()
            .await
            .context("failed to wait for bridge command")?;
        if !status.success() {
            bail!("bridge command exited with {status}");
        }
        tracing::info!("bridge finished");
        Ok(None)
    }
}
