//! Session and voice configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Default agent executable.
pub const DEFAULT_PROGRAM: &str = "mcphost";

/// Default model identifier handed to the agent.
pub const DEFAULT_MODEL: &str = "ollama:qwen3:8b";

/// Default agent config file.
pub const DEFAULT_CONFIG_PATH: &str = "config.json";

/// Default time budget for one exchange.
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration for exchanges with the agent process.
///
/// Built once at startup and shared (behind an `Arc`) by both exchange
/// strategies. Every exchange spawns `program` with
/// `leading_args ++ ["-m", model, "--config", config_path]`.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Agent executable.
    pub program: String,

    /// Arguments placed before the model and config flags.
    pub leading_args: Vec<String>,

    /// Model identifier (`-m`).
    pub model: String,

    /// Agent config file (`--config`).
    pub config_path: PathBuf,

    /// Time budget for one exchange.
    pub response_timeout: Duration,

    /// How long the PTY fallback waits for a ready prompt.
    pub ready_timeout: Duration,

    /// Per-iteration wait while the PTY fallback accumulates a reply.
    pub accumulate_timeout: Duration,

    /// Wait for one stdout line per poll iteration.
    pub stdout_poll: Duration,

    /// Wait for one stderr line per poll iteration.
    pub stderr_poll: Duration,

    /// Window for draining already-buffered output after polling ends.
    pub drain_window: Duration,

    /// Command written to the agent before tearing it down.
    pub terminator: String,

    /// Pause after the terminator command.
    pub quit_grace: Duration,

    /// How long to wait after SIGTERM before force-killing.
    pub terminate_grace: Duration,

    /// Terminal width for the PTY fallback.
    pub terminal_width: u16,

    /// Terminal height for the PTY fallback.
    pub terminal_height: u16,
}

impl SessionConfig {
    /// Create a configuration for the given model and agent config file.
    pub fn new(model: impl Into<String>, config_path: impl Into<PathBuf>) -> Self {
        Self {
            program: DEFAULT_PROGRAM.to_string(),
            leading_args: Vec::new(),
            model: model.into(),
            config_path: config_path.into(),
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            ready_timeout: Duration::from_secs(15),
            accumulate_timeout: Duration::from_secs(5),
            stdout_poll: Duration::from_secs(1),
            stderr_poll: Duration::from_millis(100),
            drain_window: Duration::from_millis(500),
            terminator: "quit".to_string(),
            quit_grace: Duration::from_millis(500),
            terminate_grace: Duration::from_secs(2),
            terminal_width: 511,
            terminal_height: 24,
        }
    }

    /// Set the agent executable.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Set arguments placed before the model and config flags.
    pub fn with_leading_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.leading_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Set the time budget for one exchange.
    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    /// Set the PTY fallback's ready-prompt wait.
    pub fn with_ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = timeout;
        self
    }

    /// Set the PTY fallback's per-iteration accumulate wait.
    pub fn with_accumulate_timeout(mut self, timeout: Duration) -> Self {
        self.accumulate_timeout = timeout;
        self
    }

    /// Set the teardown timings.
    pub fn with_teardown(mut self, quit_grace: Duration, terminate_grace: Duration) -> Self {
        self.quit_grace = quit_grace;
        self.terminate_grace = terminate_grace;
        self
    }

    /// Full argument vector for the agent.
    pub fn agent_args(&self) -> Vec<String> {
        let mut args = self.leading_args.clone();
        args.extend([
            "-m".to_string(),
            self.model.clone(),
            "--config".to_string(),
            self.config_path.to_string_lossy().into_owned(),
        ]);
        args
    }

    /// Worst-case wall-clock time for the pipe strategy.
    pub fn dispatch_bound(&self) -> Duration {
        self.response_timeout
            + self.stdout_poll
            + self.stderr_poll
            + self.drain_window
            + self.quit_grace
            + self.terminate_grace
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new(DEFAULT_MODEL, DEFAULT_CONFIG_PATH)
    }
}

/// Configuration for the capture, transcription and speech side.
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    /// Capture file shared by the recorder and the transcriber.
    pub audio_file: PathBuf,

    /// Capture utility.
    pub recorder_program: String,

    /// Transcription executable.
    pub whisper_program: String,

    /// Transcription model name (`tiny`, `base`, `small`, ...).
    pub whisper_model: String,

    /// Directory holding `ggml-<name>.bin` model files.
    pub whisper_model_dir: PathBuf,

    /// Speech synthesis executable.
    pub tts_program: String,

    /// Pause after the farewell on a spoken exit.
    pub exit_grace: Duration,

    /// Pause after the farewell on interruption.
    pub interrupt_grace: Duration,

    /// Upper bound on waiting for the speech worker to stop.
    pub speech_shutdown_grace: Duration,
}

impl VoiceConfig {
    /// Set the capture file.
    pub fn with_audio_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.audio_file = path.into();
        self
    }

    /// Set the farewell pauses.
    pub fn with_graces(mut self, exit: Duration, interrupt: Duration) -> Self {
        self.exit_grace = exit;
        self.interrupt_grace = interrupt;
        self
    }

    /// Set the transcription model name.
    pub fn with_whisper_model(mut self, name: impl Into<String>) -> Self {
        self.whisper_model = name.into();
        self
    }

    /// Path of the selected transcription model file.
    pub fn whisper_model_path(&self) -> PathBuf {
        self.whisper_model_dir
            .join(format!("ggml-{}.bin", self.whisper_model))
    }
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            audio_file: PathBuf::from("voice.wav"),
            recorder_program: "arecord".to_string(),
            whisper_program: "whisper-cli".to_string(),
            whisper_model: "small".to_string(),
            whisper_model_dir: default_model_dir(),
            tts_program: "espeak".to_string(),
            exit_grace: Duration::from_secs(3),
            interrupt_grace: Duration::from_secs(2),
            speech_shutdown_grace: Duration::from_secs(1),
        }
    }
}

/// `WHISPER_MODEL_DIR`, else `~/.cache/whisper`.
fn default_model_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os("WHISPER_MODEL_DIR") {
        return PathBuf::from(dir);
    }
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".cache")
        .join("whisper")
}
