//! The interaction loop: record, transcribe, dispatch, speak.
//!
//! Capture, transcription and dispatch run strictly one after another on the
//! caller's task; only playback runs elsewhere, on the [`SpeechQueue`]
//! worker. No single failure ends the loop. Failed steps are reported and
//! the loop goes back to recording, and a failed exchange is turned into
//! text and spoken like any other reply.

mod state;

pub use state::{SessionEnd, SessionState};

use std::future::Future;
use std::path::Path;

use log::{debug, warn};

use crate::config::VoiceConfig;
use crate::driver::Dispatcher;
use crate::error::VoiceError;
use crate::sanitize::{sanitize_response, shape_for_speech};
use crate::speech::SpeechQueue;
use crate::voice::{Recorder, Transcriber};

/// Transcripts that end the session, compared whole and case-insensitively.
pub const EXIT_PHRASES: [&str; 5] = ["exit", "quit", "goodbye", "stop", "bye"];

pub const WELCOME_MESSAGE: &str =
    "Voice MCPHost with Whisper is ready. Press enter to start recording.";

pub const FAREWELL_MESSAGE: &str = "Goodbye! Thanks for using Voice MCPHost!";

pub const INTERRUPT_MESSAGE: &str = "Goodbye!";

/// Spoken when the agent's reply contained nothing speakable.
pub const EMPTY_REPLY_MESSAGE: &str = "The agent returned no speakable text.";

/// Whether `transcript` asks to end the session.
///
/// Only surrounding whitespace is ignored. "please stop" and "Stop." do not
/// qualify.
pub fn is_exit_phrase(transcript: &str) -> bool {
    let phrase = transcript.trim().to_lowercase();
    EXIT_PHRASES.contains(&phrase.as_str())
}

/// Top-level session state machine.
pub struct InteractionLoop<R, T, D> {
    recorder: R,
    transcriber: T,
    dispatcher: D,
    speech: SpeechQueue,
    config: VoiceConfig,
    state: SessionState,
}

impl<R, T, D> InteractionLoop<R, T, D>
where
    R: Recorder,
    T: Transcriber,
    D: Dispatcher,
{
    pub fn new(recorder: R, transcriber: T, dispatcher: D, speech: SpeechQueue, config: VoiceConfig) -> Self {
        Self {
            recorder,
            transcriber,
            dispatcher,
            speech,
            config,
            state: SessionState::Idle,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Run until an exit phrase, closed input, or Ctrl-C.
    pub async fn run(self) -> SessionEnd {
        let interrupt = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("cannot listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        };
        self.run_until(interrupt).await
    }

    /// Run until the session ends on its own or `interrupt` resolves.
    ///
    /// The capture file is removed and the speech worker stopped on every
    /// path.
    pub async fn run_until<F: Future>(mut self, interrupt: F) -> SessionEnd {
        println!("Voice MCPHost is ready!");
        println!("Press ENTER to stop each recording. Press Ctrl+C to quit.");
        self.speech.enqueue(WELCOME_MESSAGE);

        let end = tokio::select! {
            end = self.drive() => end,
            _ = interrupt => {
                self.transition(SessionState::Exit);
                println!("\nInterrupted by user. Goodbye!");
                self.speech.enqueue(INTERRUPT_MESSAGE);
                tokio::time::sleep(self.config.interrupt_grace).await;
                SessionEnd::Interrupted
            }
        };

        remove_audio(&self.config.audio_file).await;
        self.speech.shutdown(self.config.speech_shutdown_grace).await;
        debug!("session ended: {:?}", end);
        end
    }

    async fn drive(&mut self) -> SessionEnd {
        let audio = self.config.audio_file.clone();

        loop {
            self.transition(SessionState::Recording);
            println!("Recording... Press ENTER to stop.");
            let bytes = match self.recorder.record(&audio).await {
                Ok(bytes) => bytes,
                Err(VoiceError::InputClosed) => {
                    self.transition(SessionState::Exit);
                    return SessionEnd::InputClosed;
                }
                Err(e @ VoiceError::CaptureSpawn { .. }) => {
                    println!("Audio capture unavailable: {e}");
                    self.transition(SessionState::Exit);
                    return SessionEnd::CaptureUnavailable;
                }
                Err(e) => {
                    println!("Recording failed: {e}");
                    remove_audio(&audio).await;
                    continue;
                }
            };

            if bytes == 0 {
                println!("No audio recorded or file is empty");
                remove_audio(&audio).await;
                continue;
            }

            self.transition(SessionState::Transcribing);
            println!("Transcribing...");
            let transcript = self.transcriber.transcribe(&audio).await;
            remove_audio(&audio).await;

            let prompt = match transcript {
                Ok(transcript) if !transcript.is_empty() => transcript.text.trim().to_string(),
                Ok(_) => {
                    println!("No speech detected, try again...");
                    continue;
                }
                Err(e) => {
                    println!("Transcription error: {e}");
                    continue;
                }
            };
            println!("You said: {prompt}");

            if is_exit_phrase(&prompt) {
                self.transition(SessionState::Exit);
                println!("{FAREWELL_MESSAGE}");
                self.speech.enqueue(FAREWELL_MESSAGE);
                tokio::time::sleep(self.config.exit_grace).await;
                return SessionEnd::Farewell;
            }

            self.transition(SessionState::Dispatching);
            let reply = self.respond(&prompt).await;

            self.transition(SessionState::Speaking);
            println!("Agent response:\n{reply}");
            if !self.speech.enqueue(shape_for_speech(&reply)) {
                warn!("speech worker is gone, reply not spoken");
            }

            self.transition(SessionState::Idle);
            println!("\n{}", "=".repeat(50));
        }
    }

    /// One exchange, reduced to speakable text. Never fails.
    async fn respond(&mut self, prompt: &str) -> String {
        let raw = match self.dispatcher.dispatch(prompt).await {
            Ok(exchange) => {
                debug!(
                    "reply via {} in {:?} ({} chars)",
                    exchange.strategy,
                    exchange.elapsed,
                    exchange.text.len()
                );
                exchange.text
            }
            Err(e) => {
                warn!("exchange failed: {}", e);
                e.to_string()
            }
        };

        let clean = sanitize_response(&raw);
        if clean.is_empty() {
            EMPTY_REPLY_MESSAGE.to_string()
        } else {
            clean
        }
    }

    fn transition(&mut self, next: SessionState) {
        debug!("session: {} -> {}", self.state, next);
        self.state = next;
    }
}

async fn remove_audio(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("failed to remove {}: {}", path.display(), e),
    }
}
