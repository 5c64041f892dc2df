//! Error types for voxhost.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Main error type for voxhost operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Exchange errors (spawning or talking to the agent)
    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    /// Pseudo-terminal channel errors
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    /// Capture, transcription and speech errors
    #[error("Voice error: {0}")]
    Voice(#[from] VoiceError),

    /// Invalid configuration
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Errors raised by an exchange strategy.
///
/// Running out of time is not an error: a timed-out exchange returns
/// whatever was captured.
#[derive(Error, Debug)]
pub enum DispatchError {
    /// The agent process could not be launched
    #[error("Failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    /// Reading or writing one of the agent's streams failed
    #[error("I/O error on agent {stream}: {source}")]
    Io {
        stream: &'static str,
        #[source]
        source: io::Error,
    },

    /// Neither the pipe nor the pseudo-terminal strategy produced a reply
    #[error("Both approaches failed. Pipe: {primary}, PTY: {fallback}")]
    BothStrategiesFailed {
        primary: Box<Error>,
        fallback: Box<Error>,
    },
}

/// Pseudo-terminal channel errors.
#[derive(Error, Debug)]
pub enum ChannelError {
    /// Failed to allocate the pseudo-terminal pair
    #[error("Failed to open PTY: {0}")]
    PtyOpenFailed(String),

    /// Failed to start the agent on the terminal
    #[error("Failed to spawn '{program}' on PTY: {message}")]
    Spawn { program: String, message: String },

    /// Channel closed before the operation could run
    #[error("Channel closed")]
    Closed,

    /// Writing to the terminal failed
    #[error("PTY I/O error: {0}")]
    Io(#[from] io::Error),

    /// Invalid regex pattern
    #[error("Invalid regex pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
}

/// Errors from the capture, transcription and speech collaborators.
#[derive(Error, Debug)]
pub enum VoiceError {
    /// The capture utility could not be launched
    #[error("Failed to run {program}: {source}")]
    CaptureSpawn {
        program: String,
        #[source]
        source: io::Error,
    },

    /// Capture ran but failed
    #[error("Capture failed: {0}")]
    Capture(String),

    /// The user's input stream closed, so no further stop signal can arrive
    #[error("Input stream closed")]
    InputClosed,

    /// Transcription engine failed on a recording
    #[error("Transcription error: {0}")]
    Transcription(String),

    /// Executable for an engine is not on PATH
    #[error("Engine '{program}' not found on PATH")]
    EngineNotFound { program: String },

    /// Transcription model file is missing
    #[error("Model file not found: {}", path.display())]
    ModelNotFound { path: PathBuf },

    /// Playing one utterance failed
    #[error("TTS error: {0}")]
    Speech(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Timeout was not a positive whole number of seconds
    #[error("Invalid timeout value '{value}'")]
    InvalidTimeout { value: String },
}

/// Result type alias using voxhost's Error.
pub type Result<T> = std::result::Result<T, Error>;
