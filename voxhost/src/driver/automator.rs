//! Pseudo-terminal fallback strategy.
//!
//! The agent has no protocol, so the automator walks a fixed state machine
//! and infers where it is from textual cues:
//!
//! ```text
//! Init -> AwaitReady -> Send -> AwaitResponseStart -> Accumulate -> Done
//! ```
//!
//! Timeouts are handled inline at each waiting state. A missing ready prompt
//! is tolerated (the prompt is sent anyway), and a missing reply cue turns
//! whatever was buffered into a best-effort reply.

use std::sync::Arc;
use std::time::Instant;

use log::{debug, info, warn};

use super::Dispatcher;
use super::response::{Exchange, Strategy};
use crate::channel::{Expect, MatcherList, PtyChannel, PtyConfig};
use crate::config::SessionConfig;
use crate::error::{ChannelError, Result};

/// Reply used when the terminal produced nothing usable.
pub const NO_RESPONSE_TEXT: &str = "No response text captured";

/// Cues that the agent is waiting for input, most specific first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyCue {
    EnterPrompt,
    PromptWord,
    YouTag,
    UserTag,
    DoubleChevron,
    Chevron,
}

/// Cues that the agent's reply has begun.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyCue {
    Assistant,
    Response,
    Ai,
}

/// Where the automator is in one exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutomatorState {
    Init,
    AwaitReady,
    Send,
    AwaitResponseStart,
    Accumulate,
    Done,
}

/// Fallback exchange strategy driving the agent over a pseudo-terminal.
///
/// A fresh agent is spawned for every prompt, so no matcher state is carried
/// from one exchange into the next.
pub struct PtyAutomator {
    config: Arc<SessionConfig>,
    pty: PtyConfig,
    ready: MatcherList<ReadyCue>,
    reply: MatcherList<ReplyCue>,
    next_prompt: MatcherList<ReadyCue>,
    state: AutomatorState,
}

impl PtyAutomator {
    /// Create the automator and compile its cue lists.
    pub fn new(config: Arc<SessionConfig>) -> Result<Self> {
        let (ready, reply, next_prompt) = cue_lists().map_err(ChannelError::InvalidPattern)?;

        let pty = PtyConfig {
            terminal_width: config.terminal_width,
            terminal_height: config.terminal_height,
            ..PtyConfig::default()
        };

        Ok(Self {
            config,
            pty,
            ready,
            reply,
            next_prompt,
            state: AutomatorState::Init,
        })
    }

    /// State reached by the most recent exchange.
    pub fn state(&self) -> AutomatorState {
        self.state
    }

    /// Run one exchange and return the reply text.
    pub async fn run(&mut self, prompt: &str) -> Result<String> {
        self.state = AutomatorState::Init;
        let mut channel = PtyChannel::spawn(&self.config.program, &self.config.agent_args(), &self.pty)?;

        let result = self.drive(&mut channel, prompt).await;
        channel.close().await;
        self.state = AutomatorState::Done;

        let text = result?;
        let text = text.trim();
        if text.is_empty() {
            Ok(NO_RESPONSE_TEXT.to_string())
        } else {
            Ok(text.to_string())
        }
    }

    async fn drive(&mut self, channel: &mut PtyChannel, prompt: &str) -> Result<String> {
        let config = Arc::clone(&self.config);
        let mut reply = String::new();

        self.state = AutomatorState::AwaitReady;
        loop {
            debug!("pty: state {:?}", self.state);
            match self.state {
                AutomatorState::Init | AutomatorState::AwaitReady => {
                    match channel.expect(&self.ready, config.ready_timeout).await {
                        Expect::Matched { hit, .. } => {
                            debug!("pty: ready cue {:?} (#{})", hit.tag, hit.index);
                        }
                        Expect::Timeout { .. } => {
                            warn!("Timeout waiting for initial prompt, trying to send anyway");
                        }
                        Expect::Eof { .. } => {
                            warn!("Agent closed the terminal before prompting, trying to send anyway");
                        }
                    }
                    self.state = AutomatorState::Send;
                }
                AutomatorState::Send => {
                    info!("Sending to agent (pty): {}", prompt);
                    channel.send_line(prompt)?;
                    self.state = AutomatorState::AwaitResponseStart;
                }
                AutomatorState::AwaitResponseStart => {
                    match channel.expect(&self.reply, config.response_timeout).await {
                        Expect::Matched { hit, .. } => {
                            debug!("pty: reply cue {:?} (#{})", hit.tag, hit.index);
                            self.state = AutomatorState::Accumulate;
                        }
                        Expect::Timeout { before } => {
                            warn!("No assistant response cue found, using buffered output");
                            reply = before;
                            self.state = AutomatorState::Done;
                        }
                        Expect::Eof { before } => {
                            warn!("Agent closed the terminal before replying");
                            reply = before;
                            self.state = AutomatorState::Done;
                        }
                    }
                }
                AutomatorState::Accumulate => {
                    let outcome = channel.expect(&self.next_prompt, config.accumulate_timeout).await;
                    match &outcome {
                        Expect::Matched { hit, .. } => {
                            debug!("pty: reply ended at next prompt {:?}", hit.tag)
                        }
                        Expect::Timeout { .. } => debug!("pty: reply ended on quiet period"),
                        Expect::Eof { .. } => debug!("pty: reply ended at EOF"),
                    }
                    reply = outcome.before().to_string();
                    self.state = AutomatorState::Done;
                }
                AutomatorState::Done => return Ok(reply),
            }
        }
    }
}

type CueLists = (
    MatcherList<ReadyCue>,
    MatcherList<ReplyCue>,
    MatcherList<ReadyCue>,
);

fn cue_lists() -> std::result::Result<CueLists, regex::Error> {
    let ready = MatcherList::new()
        .with(ReadyCue::EnterPrompt, r"Enter your prompt.*")?
        .with(ReadyCue::PromptWord, r"prompt.*")?
        .with(ReadyCue::YouTag, r"You:.*")?
        .with(ReadyCue::UserTag, r"User:.*")?
        .with(ReadyCue::DoubleChevron, r">>.*")?
        .with(ReadyCue::Chevron, r">.*")?;

    let reply = MatcherList::new()
        .with(ReplyCue::Assistant, r"Assistant:")?
        .with(ReplyCue::Response, r"Response:")?
        .with(ReplyCue::Ai, r"AI:")?;

    // A bare '>' is too common inside replies to end one.
    let next_prompt = MatcherList::new()
        .with(ReadyCue::EnterPrompt, r"Enter your prompt.*")?
        .with(ReadyCue::PromptWord, r"prompt.*")?
        .with(ReadyCue::YouTag, r"You:.*")?
        .with(ReadyCue::DoubleChevron, r">>.*")?;

    Ok((ready, reply, next_prompt))
}

impl Dispatcher for PtyAutomator {
    async fn dispatch(&mut self, prompt: &str) -> Result<Exchange> {
        let start = Instant::now();
        let text = self.run(prompt).await?;
        Ok(Exchange::new(prompt, text, Strategy::Pty, start.elapsed()))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::time::Duration;
    use tokio_test::{assert_err, assert_ok};

    fn automator(body: &str) -> PtyAutomator {
        let config = SessionConfig::new("test-model", "test.json")
            .with_program("sh")
            .with_leading_args(["-c", body, "agent"])
            .with_ready_timeout(Duration::from_secs(3))
            .with_response_timeout(Duration::from_secs(3))
            .with_accumulate_timeout(Duration::from_secs(1));
        PtyAutomator::new(Arc::new(config)).unwrap()
    }

    #[test]
    fn test_cue_priorities() {
        let automator = automator("true");

        let hit = automator.ready.find(b"> \nYou: ").unwrap();
        assert_eq!(hit.tag, ReadyCue::YouTag);

        let hit = automator.reply.find(b"AI: x\nAssistant: y").unwrap();
        assert_eq!(hit.tag, ReplyCue::Assistant);

        assert!(automator.next_prompt.find(b"a > b").is_none());
    }

    #[tokio::test]
    async fn test_full_exchange() {
        let mut automator = automator(
            r#"printf 'Enter your prompt: '; read line; echo "Assistant: you said $line"; printf '>> '; sleep 5"#,
        );

        let reply = assert_ok!(automator.run("hello").await);

        assert_eq!(reply, "you said hello");
        assert_eq!(automator.state(), AutomatorState::Done);
    }

    #[tokio::test]
    async fn test_sends_without_ready_prompt() {
        let mut automator = automator(r#"read line; echo "Response: got $line"; printf '>> '; sleep 5"#);
        automator.config = Arc::new(
            (*automator.config)
                .clone()
                .with_ready_timeout(Duration::from_millis(300)),
        );

        let start = Instant::now();
        let exchange = assert_ok!(automator.dispatch("ping").await);

        assert_eq!(exchange.text, "got ping");
        assert_eq!(exchange.strategy, Strategy::Pty);
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_best_effort_without_reply_cue() {
        let mut automator = automator(r#"printf '>> '; read line; echo "plain $line"; sleep 5"#);
        automator.config = Arc::new(
            (*automator.config)
                .clone()
                .with_response_timeout(Duration::from_secs(1)),
        );

        let reply = assert_ok!(automator.run("words").await);

        assert!(reply.contains("plain words"));
    }

    #[tokio::test]
    async fn test_reply_ends_at_eof() {
        let mut automator = automator(r#"printf 'You: '; read line; echo "AI: bye $line"; sleep 0.2"#);

        let reply = assert_ok!(automator.run("now").await);

        assert_eq!(reply, "bye now");
    }

    #[tokio::test]
    async fn test_silent_agent_yields_placeholder() {
        let mut automator = automator("exit 0");
        automator.config = Arc::new(
            (*automator.config)
                .clone()
                .with_ready_timeout(Duration::from_millis(200))
                .with_response_timeout(Duration::from_millis(500)),
        );

        match automator.run("anyone?").await {
            Ok(reply) => assert!(reply == NO_RESPONSE_TEXT || reply.contains("anyone?")),
            // Writing to a hung-up terminal may fail instead.
            Err(Error::Channel(ChannelError::Io(_))) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    #[tokio::test]
    async fn test_spawn_failure() {
        let mut automator = automator("true");
        automator.config = Arc::new(
            (*automator.config)
                .clone()
                .with_program("/nonexistent/voxhost-agent"),
        );

        let err = assert_err!(automator.run("hello").await);
        assert!(matches!(err, Error::Channel(ChannelError::Spawn { .. })));
    }
}
