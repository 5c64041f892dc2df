//! Response types for exchanges with the agent.

use std::fmt;
use std::process::ExitStatus;
use std::time::Duration;

/// Output captured by the pipe strategy.
///
/// stdout and stderr are kept apart, each in arrival order.
#[derive(Debug, Clone, Default)]
pub struct RawResponse {
    /// Lines read from stdout.
    pub stdout: Vec<String>,

    /// Lines read from stderr.
    pub stderr: Vec<String>,

    /// Time from spawn to teardown.
    pub elapsed: Duration,

    /// Exit status if the agent exited on its own before the deadline.
    pub exit_status: Option<ExitStatus>,

    /// Whether polling stopped because the time budget ran out.
    pub timed_out: bool,
}

impl RawResponse {
    /// Accumulated stdout text.
    pub fn stdout_text(&self) -> String {
        self.stdout.join("\n")
    }

    /// Accumulated stderr text.
    pub fn stderr_text(&self) -> String {
        self.stderr.join("\n")
    }

    /// Whether nothing at all was captured.
    pub fn is_empty(&self) -> bool {
        self.stdout.is_empty() && self.stderr.is_empty()
    }
}

impl fmt::Display for RawResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "STDOUT:\n{}\n\nSTDERR:\n{}",
            self.stdout_text(),
            self.stderr_text()
        )
    }
}

/// Which strategy produced an exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Line-oriented pipes.
    Pipe,

    /// Pattern matching over a pseudo-terminal.
    Pty,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Pipe => write!(f, "pipe"),
            Strategy::Pty => write!(f, "pty"),
        }
    }
}

/// Result of one request/response cycle, before sanitizing.
#[derive(Debug, Clone)]
pub struct Exchange {
    /// The prompt that was sent.
    pub prompt: String,

    /// Raw reply text.
    pub text: String,

    /// Strategy that produced the reply.
    pub strategy: Strategy,

    /// Time taken by the exchange.
    pub elapsed: Duration,
}

impl Exchange {
    /// Create a new exchange.
    pub fn new(
        prompt: impl Into<String>,
        text: impl Into<String>,
        strategy: Strategy,
        elapsed: Duration,
    ) -> Self {
        Self {
            prompt: prompt.into(),
            text: text.into(),
            strategy,
            elapsed,
        }
    }
}

impl fmt::Display for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_response_labels_streams_separately() {
        let response = RawResponse {
            stdout: vec!["hello".into(), "world".into()],
            stderr: vec!["warn".into()],
            ..Default::default()
        };
        assert_eq!(response.to_string(), "STDOUT:\nhello\nworld\n\nSTDERR:\nwarn");
    }

    #[test]
    fn test_empty_raw_response() {
        let response = RawResponse::default();
        assert!(response.is_empty());
        assert_eq!(response.to_string(), "STDOUT:\n\n\nSTDERR:\n");
    }
}
