//! Capture and transcription collaborators.
//!
//! Both wrap external executables. The interaction loop only sees the
//! [`Recorder`] and [`Transcriber`] traits.

mod capture;
mod transcribe;

pub use capture::{CommandRecorder, KeyboardLines, LineSource, Recorder};
pub use transcribe::{Transcriber, Transcript, WhisperCli, parse_whisper_json};
