//! Speech-to-text through the whisper.cpp command-line tool.

use std::ffi::OsString;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use log::{debug, trace, warn};
use serde::Deserialize;
use tokio::process::Command;

use crate::error::VoiceError;

/// Text recognized in one recording.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Transcript {
    pub text: String,
}

impl Transcript {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// Whether no speech was detected.
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Turns a recording into text.
pub trait Transcriber: Send {
    fn transcribe(&mut self, audio: &Path) -> impl Future<Output = Result<Transcript, VoiceError>> + Send;
}

/// whisper.cpp JSON output (`-oj`), reduced to what we read.
#[derive(Debug, Deserialize)]
struct WhisperOutput {
    #[serde(default)]
    transcription: Vec<WhisperSegment>,
}

#[derive(Debug, Deserialize)]
struct WhisperSegment {
    text: String,
}

/// Transcriber running `whisper-cli` with a ggml model file.
#[derive(Debug, Clone)]
pub struct WhisperCli {
    program: PathBuf,
    model: PathBuf,
}

impl WhisperCli {
    /// Check that both the executable and the model exist.
    ///
    /// This is the one-time engine initialization; a failure here is fatal
    /// for the session.
    pub fn load(program: &str, model: impl Into<PathBuf>) -> Result<Self, VoiceError> {
        let program = which::which(program).map_err(|_| VoiceError::EngineNotFound {
            program: program.to_string(),
        })?;
        let model = model.into();
        if !model.is_file() {
            return Err(VoiceError::ModelNotFound { path: model });
        }
        debug!("whisper: {} with {}", program.display(), model.display());
        Ok(Self { program, model })
    }

    pub fn model(&self) -> &Path {
        &self.model
    }
}

impl Transcriber for WhisperCli {
    async fn transcribe(&mut self, audio: &Path) -> Result<Transcript, VoiceError> {
        let stem = audio.with_extension("");
        let mut json_path = OsString::from(stem.as_os_str());
        json_path.push(".json");
        let json_path = PathBuf::from(json_path);

        let output = Command::new(&self.program)
            .arg("-m")
            .arg(&self.model)
            .arg("-f")
            .arg(audio)
            .arg("-oj")
            .arg("-of")
            .arg(&stem)
            .arg("-np")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| VoiceError::Transcription(format!("{}: {}", self.program.display(), e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let reason = stderr.lines().last().unwrap_or("").trim().to_string();
            return Err(VoiceError::Transcription(format!(
                "{} exited with {}: {}",
                self.program.display(),
                output.status,
                reason
            )));
        }

        let json = tokio::fs::read_to_string(&json_path)
            .await
            .map_err(|e| VoiceError::Transcription(format!("{}: {}", json_path.display(), e)))?;
        if let Err(e) = tokio::fs::remove_file(&json_path).await {
            warn!("failed to remove {}: {}", json_path.display(), e);
        }

        let transcript = parse_whisper_json(&json)?;
        trace!("whisper: {:?}", transcript.text);
        Ok(transcript)
    }
}

/// Join the segments of a whisper.cpp JSON result into one transcript.
///
/// Non-speech annotations such as `[BLANK_AUDIO]` or `(music)` are dropped.
pub fn parse_whisper_json(json: &str) -> Result<Transcript, VoiceError> {
    let output: WhisperOutput = serde_json::from_str(json)
        .map_err(|e| VoiceError::Transcription(format!("malformed whisper output: {e}")))?;

    let text: Vec<&str> = output
        .transcription
        .iter()
        .map(|segment| segment.text.trim())
        .filter(|text| !text.is_empty() && !is_annotation(text))
        .collect();

    Ok(Transcript::new(text.join(" ")))
}

fn is_annotation(text: &str) -> bool {
    (text.starts_with('[') && text.ends_with(']')) || (text.starts_with('(') && text.ends_with(')'))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "systeminfo": "AVX = 1",
        "model": {"type": "small"},
        "result": {"language": "en"},
        "transcription": [
            {"timestamps": {"from": "00:00:00,000", "to": "00:00:02,000"}, "text": " What is the"},
            {"timestamps": {"from": "00:00:02,000", "to": "00:00:03,500"}, "text": " weather today?"}
        ]
    }"#;

    #[test]
    fn test_joins_segments() {
        let transcript = parse_whisper_json(SAMPLE).unwrap();
        assert_eq!(transcript.text, "What is the weather today?");
        assert!(!transcript.is_empty());
    }

    #[test]
    fn test_blank_audio_is_empty() {
        let json = r#"{"transcription": [{"text": " [BLANK_AUDIO]"}, {"text": "  "}]}"#;
        assert!(parse_whisper_json(json).unwrap().is_empty());
    }

    #[test]
    fn test_missing_transcription_is_empty() {
        assert!(parse_whisper_json("{}").unwrap().is_empty());
    }

    #[test]
    fn test_malformed_output() {
        let err = parse_whisper_json("not json").unwrap_err();
        assert!(matches!(err, VoiceError::Transcription(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_load_requires_model_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = WhisperCli::load("sh", dir.path().join("ggml-small.bin")).unwrap_err();
        assert!(matches!(err, VoiceError::ModelNotFound { .. }));

        std::fs::write(dir.path().join("ggml-small.bin"), b"model").unwrap();
        let whisper = WhisperCli::load("sh", dir.path().join("ggml-small.bin")).unwrap();
        assert!(whisper.model().ends_with("ggml-small.bin"));
    }

    #[test]
    fn test_load_requires_engine() {
        let err = WhisperCli::load("voxhost-no-such-whisper", "ggml-small.bin").unwrap_err();
        assert!(matches!(err, VoiceError::EngineNotFound { .. }));
    }
}
