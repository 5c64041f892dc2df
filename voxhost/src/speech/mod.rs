//! Speech output.

mod queue;

pub use queue::{SpeechCommand, SpeechQueue, SpeechTask};

use std::path::PathBuf;
use std::process::{Command, Stdio};

use log::trace;

use crate::error::VoiceError;

/// Blocking text-to-speech engine, driven from the speech worker thread.
pub trait Synthesizer: Send + 'static {
    /// Play `text` to completion.
    fn speak(&mut self, text: &str) -> Result<(), VoiceError>;
}

/// Synthesizer backed by an external command such as `espeak`.
///
/// The command is run once per utterance as `<program> <args...> -- <text>`
/// and waited on, so playback of one utterance ends before the next starts.
#[derive(Debug, Clone)]
pub struct CommandSynthesizer {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandSynthesizer {
    /// Locate `program` on PATH, with espeak's rate and amplitude settings.
    pub fn espeak(program: &str) -> Result<Self, VoiceError> {
        Self::new(program, ["-s", "150", "-a", "180"])
    }

    /// Locate `program` on PATH.
    pub fn new<I, S>(program: &str, args: I) -> Result<Self, VoiceError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let program = which::which(program).map_err(|_| VoiceError::EngineNotFound {
            program: program.to_string(),
        })?;
        Ok(Self {
            program,
            args: args.into_iter().map(Into::into).collect(),
        })
    }
}

impl Synthesizer for CommandSynthesizer {
    fn speak(&mut self, text: &str) -> Result<(), VoiceError> {
        trace!("tts: {} {:?}", self.program.display(), text);
        let status = Command::new(&self.program)
            .args(&self.args)
            .arg("--")
            .arg(text)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .status()
            .map_err(|e| VoiceError::Speech(format!("{}: {}", self.program.display(), e)))?;

        if status.success() {
            Ok(())
        } else {
            Err(VoiceError::Speech(format!(
                "{} exited with {}",
                self.program.display(),
                status
            )))
        }
    }
}
