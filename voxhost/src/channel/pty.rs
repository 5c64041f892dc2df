//! PTY channel for driving an agent through a pseudo-terminal.

use std::io::{Read, Write};
use std::time::Duration;

use log::{debug, trace, warn};
use portable_pty::{Child, CommandBuilder, MasterPty, PtySize, native_pty_system};
use tokio::sync::mpsc;

use super::buffer::PatternBuffer;
use super::patterns::{MatcherList, PatternHit};
use crate::error::ChannelError;

/// Configuration for PTY channel behavior.
#[derive(Debug, Clone)]
pub struct PtyConfig {
    /// Terminal width.
    pub terminal_width: u16,

    /// Terminal height.
    pub terminal_height: u16,

    /// `TERM` value for the child. `dumb` keeps escape sequences down.
    pub term: String,
}

impl Default for PtyConfig {
    fn default() -> Self {
        Self {
            terminal_width: 511,
            terminal_height: 24,
            term: "dumb".to_string(),
        }
    }
}

/// Outcome of waiting for one of a list of cues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expect<T> {
    /// A cue matched; `before` is the output preceding it.
    Matched { hit: PatternHit<T>, before: String },

    /// No cue within the wait; `before` is everything unconsumed.
    Timeout { before: String },

    /// The terminal closed; `before` is everything unconsumed.
    Eof { before: String },
}

impl<T> Expect<T> {
    /// Output captured before the terminating event.
    pub fn before(&self) -> &str {
        match self {
            Expect::Matched { before, .. }
            | Expect::Timeout { before }
            | Expect::Eof { before } => before,
        }
    }
}

/// A child process attached to a pseudo-terminal.
///
/// Output is pumped by a reader thread into a channel so that waits can be
/// bounded with tokio timers. The child is killed when the channel is closed
/// or dropped.
pub struct PtyChannel {
    /// Accumulated, ANSI-stripped output.
    buffer: PatternBuffer,

    /// Chunks from the reader thread.
    output: mpsc::UnboundedReceiver<Vec<u8>>,

    /// Terminal input.
    writer: Box<dyn Write + Send>,

    /// The attached child.
    child: Box<dyn Child + Send + Sync>,

    /// Master side; dropping it hangs up the terminal.
    master: Option<Box<dyn MasterPty + Send>>,

    /// Whether the reader thread has finished.
    eof: bool,

    /// Whether the channel is open.
    is_open: bool,
}

impl PtyChannel {
    /// Spawn `program` with `args` on a new pseudo-terminal.
    pub fn spawn(program: &str, args: &[String], config: &PtyConfig) -> Result<Self, ChannelError> {
        let pair = native_pty_system()
            .openpty(PtySize {
                rows: config.terminal_height,
                cols: config.terminal_width,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| ChannelError::PtyOpenFailed(e.to_string()))?;

        let mut cmd = CommandBuilder::new(program);
        cmd.args(args);
        cmd.env("TERM", &config.term);
        if let Ok(cwd) = std::env::current_dir() {
            cmd.cwd(cwd);
        }

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| ChannelError::Spawn {
                program: program.to_string(),
                message: e.to_string(),
            })?;
        drop(pair.slave);

        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| ChannelError::PtyOpenFailed(e.to_string()))?;
        let writer = pair
            .master
            .take_writer()
            .map_err(|e| ChannelError::PtyOpenFailed(e.to_string()))?;

        let (tx, rx) = mpsc::unbounded_channel();
        std::thread::Builder::new()
            .name("voxhost-pty-reader".to_string())
            .spawn(move || pump_output(reader, tx))?;

        debug!("pty: spawned {} {:?}", program, args);

        Ok(Self {
            buffer: PatternBuffer::new(),
            output: rx,
            writer,
            child,
            master: Some(pair.master),
            eof: false,
            is_open: true,
        })
    }

    /// Wait until one of `matchers` appears, the wait expires, or the
    /// terminal closes.
    pub async fn expect<T: Copy>(&mut self, matchers: &MatcherList<T>, timeout: Duration) -> Expect<T> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(hit) = self.buffer.find(matchers) {
                let before = self.buffer.consume_through(&hit);
                trace!("pty: cue #{} matched after {} bytes", hit.index, before.len());
                return Expect::Matched { hit, before };
            }

            if self.eof {
                return Expect::Eof {
                    before: self.buffer.take_string(),
                };
            }

            match tokio::time::timeout_at(deadline, self.output.recv()).await {
                Ok(Some(chunk)) => {
                    trace!("pty: read {} bytes", chunk.len());
                    self.buffer.extend(&chunk);
                }
                Ok(None) => self.eof = true,
                Err(_) => {
                    return Expect::Timeout {
                        before: self.buffer.take_string(),
                    };
                }
            }
        }
    }

    /// Write `line` followed by a line terminator.
    pub fn send_line(&mut self, line: &str) -> Result<(), ChannelError> {
        if !self.is_open {
            return Err(ChannelError::Closed);
        }
        self.writer.write_all(line.as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }

    /// Check if the channel is open.
    pub fn is_open(&self) -> bool {
        self.is_open
    }

    /// Kill the child, reap it, and hang up the terminal.
    pub async fn close(&mut self) {
        if !self.is_open {
            return;
        }
        self.is_open = false;

        if let Ok(None) = self.child.try_wait() {
            if let Err(e) = self.child.kill() {
                warn!("pty: failed to kill agent: {}", e);
            }
        }

        for _ in 0..20 {
            match self.child.try_wait() {
                Ok(Some(status)) => {
                    debug!("pty: agent exited: {:?}", status);
                    break;
                }
                Ok(None) => tokio::time::sleep(Duration::from_millis(50)).await,
                Err(e) => {
                    warn!("pty: failed to reap agent: {}", e);
                    break;
                }
            }
        }

        self.master.take();
        self.output.close();
    }
}

impl Drop for PtyChannel {
    fn drop(&mut self) {
        if self.is_open {
            warn!("PtyChannel dropped while open, killing agent");
            let _ = self.child.kill();
            let _ = self.child.try_wait();
        }
    }
}

/// Forward terminal output to the channel until EOF or hang-up.
fn pump_output(mut reader: Box<dyn Read + Send>, tx: mpsc::UnboundedSender<Vec<u8>>) {
    let mut buf = [0u8; 4096];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                if tx.send(buf[..n].to_vec()).is_err() {
                    break;
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            // EIO once the child side is gone
            Err(e) => {
                trace!("pty: reader stopped: {}", e);
                break;
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Cue {
        Ready,
        Echo,
    }

    fn sh(script: &str) -> PtyChannel {
        let args = vec!["-c".to_string(), script.to_string()];
        PtyChannel::spawn("sh", &args, &PtyConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_expect_and_send_line() {
        let mut channel = sh(r#"printf 'ready> '; read line; echo "got:$line"; sleep 5"#);
        let ready = MatcherList::new().with(Cue::Ready, r"ready>").unwrap();
        let echo = MatcherList::new().with(Cue::Echo, r"got:\S+").unwrap();

        let outcome = channel.expect(&ready, Duration::from_secs(5)).await;
        assert!(matches!(outcome, Expect::Matched { hit, .. } if hit.tag == Cue::Ready));

        channel.send_line("ping").unwrap();
        match channel.expect(&echo, Duration::from_secs(5)).await {
            Expect::Matched { before, .. } => assert!(before.contains("ping")),
            other => panic!("unexpected {other:?}"),
        }

        channel.close().await;
        assert!(!channel.is_open());
        assert!(matches!(channel.send_line("late"), Err(ChannelError::Closed)));
    }

    #[tokio::test]
    async fn test_timeout_returns_buffered_output() {
        let mut channel = sh("printf 'partial'; sleep 5");
        let ready = MatcherList::new().with(Cue::Ready, r"never").unwrap();

        match channel.expect(&ready, Duration::from_millis(500)).await {
            Expect::Timeout { before } => assert_eq!(before, "partial"),
            other => panic!("unexpected {other:?}"),
        }
        channel.close().await;
    }

    #[tokio::test]
    async fn test_eof_when_child_exits() {
        let mut channel = sh("echo done");
        let ready = MatcherList::new().with(Cue::Ready, r"never").unwrap();

        let outcome = channel.expect(&ready, Duration::from_secs(5)).await;
        assert!(matches!(outcome, Expect::Eof { .. }));
        assert!(outcome.before().contains("done"));
        channel.close().await;
    }

    #[test]
    fn test_spawn_failure() {
        let result = PtyChannel::spawn("/nonexistent/voxhost-agent", &[], &PtyConfig::default());
        assert!(matches!(result, Err(ChannelError::Spawn { .. })));
    }
}
