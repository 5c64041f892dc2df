//! Pipe-based exchange strategy.
//!
//! Each exchange spawns a fresh agent with piped stdin/stdout/stderr, writes
//! the prompt as a single line, and polls both output streams until the agent
//! exits or the time budget runs out. The agent is always torn down before
//! the call returns.

use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, trace, warn};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};

use super::Dispatcher;
use super::response::{Exchange, RawResponse, Strategy};
use crate::config::SessionConfig;
use crate::error::{DispatchError, Result};

/// Primary exchange strategy over plain pipes.
#[derive(Debug, Clone)]
pub struct ProcessSession {
    config: Arc<SessionConfig>,
}

impl ProcessSession {
    /// Create a new pipe strategy.
    pub fn new(config: Arc<SessionConfig>) -> Self {
        Self { config }
    }

    /// Get the configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Run one exchange and return everything the agent printed.
    ///
    /// Running out of time is not an error; only spawn and write failures
    /// are.
    pub async fn run(&self, prompt: &str) -> Result<RawResponse> {
        let config = &self.config;
        let start = Instant::now();

        debug!("pipe: spawning {} {:?}", config.program, config.agent_args());
        let mut child = Command::new(&config.program)
            .args(config.agent_args())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| DispatchError::Spawn {
                program: config.program.clone(),
                source,
            })?;

        let (Some(mut stdin), Some(stdout), Some(stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            shutdown(&mut child, None, config).await;
            return Err(DispatchError::Io {
                stream: "stdio",
                source: std::io::Error::other("agent streams were not captured"),
            }
            .into());
        };

        if let Err(source) = write_line(&mut stdin, prompt).await {
            shutdown(&mut child, None, config).await;
            return Err(DispatchError::Io {
                stream: "stdin",
                source,
            }
            .into());
        }

        let mut out = LineReader::new(stdout, "stdout");
        let mut err = LineReader::new(stderr, "stderr");
        let mut response = RawResponse::default();

        let deadline = tokio::time::Instant::now() + config.response_timeout;
        loop {
            let now = tokio::time::Instant::now();
            if now >= deadline {
                response.timed_out = true;
                debug!("pipe: time budget of {:?} used up", config.response_timeout);
                break;
            }

            match child.try_wait() {
                Ok(Some(status)) => {
                    debug!("pipe: agent exited with {}", status);
                    response.exit_status = Some(status);
                    break;
                }
                Ok(None) => {}
                Err(e) => {
                    warn!("pipe: failed to poll agent: {}", e);
                    break;
                }
            }

            let remaining = deadline - now;
            if let Some(line) = out.read_line_within(config.stdout_poll.min(remaining)).await {
                response.stdout.push(line);
            }
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if let Some(line) = err.read_line_within(config.stderr_poll.min(remaining)).await {
                response.stderr.push(line);
            }

            // Both streams closed but the agent has not been reaped yet.
            if !out.is_open() && !err.is_open() {
                let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
                tokio::time::sleep(config.stdout_poll.min(remaining)).await;
            }
        }

        drain(&mut out, &mut response.stdout, config.drain_window).await;
        drain(&mut err, &mut response.stderr, config.drain_window).await;

        shutdown(&mut child, Some(stdin), config).await;

        response.elapsed = start.elapsed();
        debug!(
            "pipe: {} stdout / {} stderr lines in {:?} (exit: {:?})",
            response.stdout.len(),
            response.stderr.len(),
            response.elapsed,
            response.exit_status
        );
        Ok(response)
    }
}

impl Dispatcher for ProcessSession {
    async fn dispatch(&mut self, prompt: &str) -> Result<Exchange> {
        let response = self.run(prompt).await?;
        Ok(Exchange::new(
            prompt,
            response.to_string(),
            Strategy::Pipe,
            response.elapsed,
        ))
    }
}

/// Line reader that keeps partial lines across timed-out waits.
struct LineReader<R> {
    reader: BufReader<R>,
    pending: Vec<u8>,
    open: bool,
    name: &'static str,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    fn new(inner: R, name: &'static str) -> Self {
        Self {
            reader: BufReader::new(inner),
            pending: Vec::new(),
            open: true,
            name,
        }
    }

    fn is_open(&self) -> bool {
        self.open
    }

    /// Read one line, waiting at most `wait`. Bytes of an unfinished line
    /// stay in `pending` for the next call.
    async fn read_line_within(&mut self, wait: Duration) -> Option<String> {
        if !self.open {
            return None;
        }

        match tokio::time::timeout(wait, self.reader.read_until(b'\n', &mut self.pending)).await {
            Err(_) => None,
            Ok(Ok(0)) => {
                self.open = false;
                self.take_pending()
            }
            Ok(Ok(_)) => {
                if self.pending.last() == Some(&b'\n') {
                    self.take_pending()
                } else {
                    // EOF in the middle of a line
                    self.open = false;
                    self.take_pending()
                }
            }
            Ok(Err(e)) => {
                warn!("pipe: error reading agent {}: {}", self.name, e);
                self.open = false;
                self.take_pending()
            }
        }
    }

    fn take_pending(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let raw = std::mem::take(&mut self.pending);
        let line = String::from_utf8_lossy(&raw)
            .trim_end_matches(['\r', '\n'])
            .to_string();
        trace!("pipe {}: {:?}", self.name, line);
        Some(line)
    }
}

/// Collect lines that are already buffered, for at most `window`.
async fn drain<R: AsyncRead + Unpin>(reader: &mut LineReader<R>, sink: &mut Vec<String>, window: Duration) {
    let deadline = tokio::time::Instant::now() + window;
    while reader.is_open() {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            break;
        }
        match reader.read_line_within(remaining).await {
            Some(line) => sink.push(line),
            None => break,
        }
    }
}

async fn write_line(stdin: &mut ChildStdin, line: &str) -> std::io::Result<()> {
    stdin.write_all(line.as_bytes()).await?;
    stdin.write_all(b"\n").await?;
    stdin.flush().await
}

/// Ask the agent to quit, then terminate it, then kill it.
async fn shutdown(child: &mut Child, stdin: Option<ChildStdin>, config: &SessionConfig) {
    if let Ok(Some(_)) = child.try_wait() {
        return;
    }

    if let Some(mut stdin) = stdin {
        if let Err(e) = write_line(&mut stdin, &config.terminator).await {
            trace!("pipe: terminator not delivered: {}", e);
        }
        drop(stdin);
        tokio::time::sleep(config.quit_grace).await;
    }

    if let Ok(Some(_)) = child.try_wait() {
        return;
    }

    request_termination(child);
    match tokio::time::timeout(config.terminate_grace, child.wait()).await {
        Ok(Ok(status)) => debug!("pipe: agent terminated with {}", status),
        Ok(Err(e)) => warn!("pipe: failed to wait for agent: {}", e),
        Err(_) => {
            warn!("pipe: agent ignored SIGTERM, killing");
            if let Err(e) = child.kill().await {
                warn!("pipe: failed to kill agent: {}", e);
            }
        }
    }
}

/// Send SIGTERM to a child that is still running.
#[cfg(unix)]
pub(crate) fn request_termination(child: &mut Child) {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let Some(pid) = child.id() else {
        return;
    };
    let Ok(pid) = i32::try_from(pid) else {
        return;
    };
    if let Err(e) = kill(Pid::from_raw(pid), Signal::SIGTERM) {
        trace!("SIGTERM to {} failed: {}", pid, e);
    }
}

#[cfg(not(unix))]
pub(crate) fn request_termination(child: &mut Child) {
    if let Err(e) = child.start_kill() {
        trace!("terminate failed: {}", e);
    }
}
