//! # Voxhost
//!
//! Voice front-end for interactive command-line agents.
//!
//! Voxhost records an utterance, transcribes it, hands the transcript to an
//! agent process that speaks no protocol, and reads the cleaned-up reply
//! aloud while it is already listening for the next question.
//!
//! ## Features
//!
//! - Pipe-based exchanges with a hard, teardown-inclusive time budget
//! - Pseudo-terminal fallback driven by priority-ordered cue patterns
//! - Reply sanitizing and speech shaping
//! - Ordered, non-blocking speech playback on a dedicated worker
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use voxhost::{Dispatcher, ProcessSession, SessionConfig, sanitize_response};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), voxhost::Error> {
//!     let config = Arc::new(SessionConfig::new("ollama:qwen3:8b", "config.json"));
//!     let mut session = ProcessSession::new(config);
//!
//!     let exchange = session.dispatch("What time is it in Tokyo?").await?;
//!     println!("{}", sanitize_response(&exchange.text));
//!     Ok(())
//! }
//! ```

pub mod channel;
pub mod cli;
pub mod config;
pub mod driver;
pub mod error;
pub mod sanitize;
pub mod session;
pub mod speech;
pub mod voice;

// Re-export main types for convenience
pub use config::{SessionConfig, VoiceConfig};
pub use driver::{Dispatcher, Exchange, FallbackDispatcher, ProcessSession, PtyAutomator, RawResponse};
pub use error::{Error, Result};
pub use sanitize::{sanitize_response, shape_for_speech};
pub use session::{InteractionLoop, SessionEnd, SessionState};
pub use speech::{CommandSynthesizer, SpeechQueue, Synthesizer};
pub use voice::{CommandRecorder, KeyboardLines, Recorder, Transcriber, Transcript, WhisperCli};
