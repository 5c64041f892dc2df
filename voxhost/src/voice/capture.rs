//! Audio capture through an external recording utility.

use std::future::Future;
use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use log::{debug, warn};
use tokio::io::{AsyncBufRead, Lines};
use tokio::process::Command;
use tokio::sync::mpsc;

use crate::driver::request_termination;
use crate::error::VoiceError;

/// How long the recorder gets to finalize its file after SIGTERM.
const STOP_GRACE: Duration = Duration::from_secs(2);

/// Records one utterance into a file.
pub trait Recorder: Send {
    /// Record into `path` until the user's stop signal, returning the
    /// number of bytes written.
    fn record(&mut self, path: &Path) -> impl Future<Output = Result<u64, VoiceError>> + Send;
}

/// Source of the lines that stop a recording.
///
/// `Ok(None)` means the input is closed and no further stop can arrive.
/// Waiting must be cancel-safe: the loop drops it on interruption.
pub trait LineSource: Send {
    fn next_line(&mut self) -> impl Future<Output = io::Result<Option<String>>> + Send;
}

impl<I: AsyncBufRead + Unpin + Send> LineSource for Lines<I> {
    async fn next_line(&mut self) -> io::Result<Option<String>> {
        Lines::next_line(self).await
    }
}

/// Lines read from a blocking reader on a dedicated thread.
///
/// A blocking read cannot be cancelled, and `tokio::io::stdin` parks one on
/// the runtime's blocking pool, where it holds up runtime shutdown until
/// the next ENTER. The reader thread here is detached instead.
pub struct KeyboardLines {
    rx: mpsc::UnboundedReceiver<io::Result<String>>,
}

impl KeyboardLines {
    /// Lines typed on the process's stdin.
    pub fn stdin() -> io::Result<Self> {
        Self::spawn(|| io::stdin().lock())
    }

    /// Lines read from `reader`.
    pub fn from_reader<R: BufRead + Send + 'static>(reader: R) -> io::Result<Self> {
        Self::spawn(move || reader)
    }

    fn spawn<R, F>(open: F) -> io::Result<Self>
    where
        R: BufRead,
        F: FnOnce() -> R + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        std::thread::Builder::new()
            .name("voxhost-keyboard".to_string())
            .spawn(move || {
                for line in open().lines() {
                    let failed = line.is_err();
                    if tx.send(line).is_err() || failed {
                        break;
                    }
                }
                debug!("keyboard input closed");
            })?;
        Ok(Self { rx })
    }
}

impl LineSource for KeyboardLines {
    async fn next_line(&mut self) -> io::Result<Option<String>> {
        self.rx.recv().await.transpose()
    }
}

/// Recorder that runs a capture command and stops it when a line arrives on
/// its input (ENTER on the terminal).
pub struct CommandRecorder<I> {
    program: PathBuf,
    args: Vec<String>,
    input: I,
}

impl CommandRecorder<KeyboardLines> {
    /// `arecord -f cd -t wav -r 16000 <file>`, stopped by ENTER on stdin.
    pub fn arecord(program: &str) -> Result<Self, VoiceError> {
        let program = which::which(program).map_err(|_| VoiceError::EngineNotFound {
            program: program.to_string(),
        })?;
        Ok(Self::new(
            program,
            ["-f", "cd", "-t", "wav", "-r", "16000"],
            KeyboardLines::stdin()?,
        ))
    }
}

impl<I: LineSource> CommandRecorder<I> {
    /// Run `program args... <file>` and stop it on each line from `input`.
    pub fn new<A, S>(program: impl Into<PathBuf>, args: A, input: I) -> Self
    where
        A: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            input,
        }
    }
}

impl<I: LineSource> Recorder for CommandRecorder<I> {
    async fn record(&mut self, path: &Path) -> Result<u64, VoiceError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| VoiceError::CaptureSpawn {
                program: self.program.display().to_string(),
                source,
            })?;

        let stop = tokio::select! {
            line = self.input.next_line() => line,
            status = child.wait() => {
                let status = status?;
                return Err(VoiceError::Capture(format!(
                    "{} exited before recording was stopped ({})",
                    self.program.display(),
                    status
                )));
            }
        };

        request_termination(&mut child);
        match tokio::time::timeout(STOP_GRACE, child.wait()).await {
            Ok(Ok(status)) => debug!("capture stopped: {}", status),
            Ok(Err(e)) => warn!("failed to wait for capture: {}", e),
            Err(_) => {
                warn!("capture ignored SIGTERM, killing");
                child.kill().await?;
            }
        }

        match stop {
            Ok(Some(_)) => {}
            Ok(None) => return Err(VoiceError::InputClosed),
            Err(e) => return Err(VoiceError::Io(e)),
        }

        match tokio::fs::metadata(path).await {
            Ok(meta) => Ok(meta.len()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(VoiceError::Io(e)),
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::io::Read;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};

    type DuplexRecorder = CommandRecorder<Lines<BufReader<DuplexStream>>>;

    fn recorder(script: &str) -> (DuplexRecorder, DuplexStream) {
        let (keyboard, input) = tokio::io::duplex(64);
        let recorder = CommandRecorder::new("sh", ["-c", script], BufReader::new(input).lines());
        (recorder, keyboard)
    }

    /// Reader that blocks forever, like a terminal nobody types into.
    struct Stalled;

    impl Read for Stalled {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            loop {
                std::thread::park();
            }
        }
    }

    #[tokio::test]
    async fn test_records_until_enter() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("voice.wav");
        let (mut recorder, mut keyboard) = recorder(r#"printf 'RIFFdata' > "$0"; exec sleep 30"#);

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            keyboard.write_all(b"\n").await.unwrap();
            // keep the stream open
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let bytes = recorder.record(&path).await.unwrap();
        assert_eq!(bytes, 8);
    }

    #[tokio::test]
    async fn test_no_file_is_zero_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("voice.wav");
        let (mut recorder, mut keyboard) = recorder("exec sleep 30");

        keyboard.write_all(b"\n").await.unwrap();

        assert_eq!(recorder.record(&path).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_closed_input() {
        let dir = tempfile::tempdir().unwrap();
        let (mut recorder, keyboard) = recorder("exec sleep 30");
        drop(keyboard);

        let err = recorder.record(&dir.path().join("voice.wav")).await.unwrap_err();
        assert!(matches!(err, VoiceError::InputClosed));
    }

    #[tokio::test]
    async fn test_recorder_exiting_early() {
        let dir = tempfile::tempdir().unwrap();
        let (mut recorder, _keyboard) = recorder("exit 3");

        let err = recorder.record(&dir.path().join("voice.wav")).await.unwrap_err();
        assert!(matches!(err, VoiceError::Capture(_)));
    }

    #[tokio::test]
    async fn test_keyboard_lines_from_reader() {
        let mut lines = KeyboardLines::from_reader(io::Cursor::new("first\n\nlast")).unwrap();

        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("first"));
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some(""));
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("last"));
        assert_eq!(lines.next_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_keyboard_stops_recording() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("voice.wav");
        let input = KeyboardLines::from_reader(io::Cursor::new("\n")).unwrap();
        let mut recorder = CommandRecorder::new(
            "sh",
            ["-c", r#"printf 'RIFF' > "$0"; exec sleep 30"#],
            input,
        );

        let bytes = recorder.record(&path).await.unwrap();
        assert!(bytes <= 4);
    }

    #[test]
    fn test_interrupt_while_waiting_for_enter() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("voice.wav");

        let start = std::time::Instant::now();
        runtime.block_on(async {
            let input = KeyboardLines::from_reader(io::BufReader::new(Stalled)).unwrap();
            let mut recorder = CommandRecorder::new("sh", ["-c", "exec sleep 30"], input);

            let interrupted = tokio::time::timeout(Duration::from_millis(300), recorder.record(&path)).await;
            assert!(interrupted.is_err());
        });
        drop(runtime);

        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_spawn_failure() {
        let (_keyboard, input) = tokio::io::duplex(8);
        let mut recorder = CommandRecorder::new(
            "/nonexistent/voxhost-recorder",
            Vec::<String>::new(),
            BufReader::new(input).lines(),
        );

        let err = recorder.record(Path::new("voice.wav")).await.unwrap_err();
        assert!(matches!(err, VoiceError::CaptureSpawn { .. }));
    }
}
