//! Command-line surface.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use log::{info, warn};

use crate::config::{
    DEFAULT_CONFIG_PATH, DEFAULT_MODEL, DEFAULT_PROGRAM, DEFAULT_RESPONSE_TIMEOUT, SessionConfig,
    VoiceConfig,
};
use crate::error::ConfigError;

/// Voxhost - talk to an interactive CLI agent with your voice
#[derive(Parser, Debug)]
#[command(
    name = "voxhost",
    version,
    about,
    after_help = "Whisper models: tiny, base, small, medium, large\n\
                  Example: voxhost 'ollama:qwen3:8b' ~/config.json --whisper-model base --timeout 45"
)]
pub struct Cli {
    /// Model identifier handed to the agent
    #[arg(default_value = DEFAULT_MODEL)]
    pub model: String,

    /// Agent config file
    #[arg(default_value = DEFAULT_CONFIG_PATH)]
    pub config_path: PathBuf,

    /// Whisper model used for speech recognition
    #[arg(long, value_name = "NAME", default_value = "small")]
    pub whisper_model: String,

    /// Seconds to wait for each agent reply
    #[arg(long, value_name = "SECONDS", allow_hyphen_values = true)]
    pub timeout: Option<String>,

    /// Agent executable
    #[arg(long, env = "VOXHOST_AGENT_BIN", default_value = DEFAULT_PROGRAM)]
    pub agent_bin: String,

    /// Text-to-speech executable
    #[arg(long, env = "VOXHOST_TTS_BIN", default_value = "espeak")]
    pub tts_bin: String,

    /// whisper.cpp executable
    #[arg(long, env = "VOXHOST_WHISPER_BIN", default_value = "whisper-cli")]
    pub whisper_bin: String,

    /// Scratch file for each recording
    #[arg(long, default_value = "voice.wav")]
    pub audio_file: PathBuf,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// Log filter for the requested verbosity.
    pub fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 => "info",
            1 => "info,voxhost=debug",
            _ => "trace",
        }
    }

    /// Response timeout, falling back to the default on bad input.
    pub fn response_timeout(&self) -> Duration {
        match self.timeout.as_deref().map(parse_timeout) {
            None => DEFAULT_RESPONSE_TIMEOUT,
            Some(Ok(timeout)) => {
                info!("Using timeout: {} seconds", timeout.as_secs());
                timeout
            }
            Some(Err(e)) => {
                warn!(
                    "{}, using default {} seconds",
                    e,
                    DEFAULT_RESPONSE_TIMEOUT.as_secs()
                );
                DEFAULT_RESPONSE_TIMEOUT
            }
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig::new(self.model.clone(), self.config_path.clone())
            .with_program(self.agent_bin.clone())
            .with_response_timeout(self.response_timeout())
    }

    pub fn voice_config(&self) -> VoiceConfig {
        let mut voice = VoiceConfig::default()
            .with_audio_file(self.audio_file.clone())
            .with_whisper_model(self.whisper_model.clone());
        voice.whisper_program = self.whisper_bin.clone();
        voice.tts_program = self.tts_bin.clone();
        voice
    }
}

/// Parse a positive whole number of seconds.
pub fn parse_timeout(value: &str) -> Result<Duration, ConfigError> {
    match value.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => Err(ConfigError::InvalidTimeout {
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["voxhost"]).unwrap();
        assert_eq!(cli.model, DEFAULT_MODEL);
        assert_eq!(cli.config_path, PathBuf::from(DEFAULT_CONFIG_PATH));
        assert_eq!(cli.whisper_model, "small");
        assert_eq!(cli.response_timeout(), DEFAULT_RESPONSE_TIMEOUT);
    }

    #[test]
    fn test_positionals_and_flags() {
        let cli = Cli::try_parse_from([
            "voxhost",
            "ollama:llama3",
            "/etc/agent.json",
            "--whisper-model",
            "base",
            "--timeout",
            "45",
        ])
        .unwrap();

        let session = cli.session_config();
        assert_eq!(session.model, "ollama:llama3");
        assert_eq!(session.config_path, PathBuf::from("/etc/agent.json"));
        assert_eq!(session.response_timeout, Duration::from_secs(45));
        assert_eq!(cli.voice_config().whisper_model, "base");
    }

    #[test]
    fn test_invalid_timeout_falls_back() {
        for bad in ["soon", "0", "-5", "1.5"] {
            let cli = Cli::try_parse_from(["voxhost", "--timeout", bad]).unwrap();
            assert_eq!(cli.response_timeout(), DEFAULT_RESPONSE_TIMEOUT, "value {bad}");
        }
    }

    #[test]
    fn test_parse_timeout() {
        assert_eq!(parse_timeout("12").unwrap(), Duration::from_secs(12));
        assert!(matches!(
            parse_timeout("abc"),
            Err(ConfigError::InvalidTimeout { .. })
        ));
    }

    #[test]
    fn test_help_exits_cleanly() {
        for flag in ["--help", "-h"] {
            let err = Cli::try_parse_from(["voxhost", flag]).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::DisplayHelp);
            assert_eq!(err.exit_code(), 0);
        }
    }
}
