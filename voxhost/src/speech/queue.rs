//! Ordered utterance playback on a dedicated worker thread.

use std::thread::JoinHandle;
use std::time::Duration;

use log::{debug, warn};
use tokio::sync::mpsc;

use super::Synthesizer;
use crate::error::{Result, VoiceError};

/// Text submitted for playback. Immutable once queued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechTask {
    text: String,
}

impl SpeechTask {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

/// Messages understood by the speech worker.
#[derive(Debug)]
pub enum SpeechCommand {
    /// Play one utterance to completion.
    Speak(SpeechTask),

    /// Stop the worker once everything queued before it has played.
    Shutdown,
}

/// FIFO of utterances played one at a time.
///
/// `enqueue` never blocks. The worker plays tasks strictly in submission
/// order, so at most one utterance is audible at any instant. A playback
/// failure is logged and the worker moves on to the next task.
pub struct SpeechQueue {
    tx: mpsc::UnboundedSender<SpeechCommand>,
    worker: Option<JoinHandle<()>>,
}

impl SpeechQueue {
    /// Start the worker thread with the given synthesizer.
    pub fn start<S: Synthesizer>(synth: S) -> Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = std::thread::Builder::new()
            .name("voxhost-speech".to_string())
            .spawn(move || run_worker(synth, rx))
            .map_err(VoiceError::Io)?;

        Ok(Self {
            tx,
            worker: Some(worker),
        })
    }

    /// Queue `text` for playback. Returns false if the worker has stopped.
    pub fn enqueue(&self, text: impl Into<String>) -> bool {
        self.tx
            .send(SpeechCommand::Speak(SpeechTask::new(text)))
            .is_ok()
    }

    /// Send the shutdown sentinel and wait at most `grace` for the worker.
    ///
    /// Utterances queued before the call still play if they fit in `grace`.
    pub async fn shutdown(mut self, grace: Duration) {
        let _ = self.tx.send(SpeechCommand::Shutdown);
        let Some(worker) = self.worker.take() else {
            return;
        };

        let join = tokio::task::spawn_blocking(move || worker.join());
        match tokio::time::timeout(grace, join).await {
            Ok(Ok(Ok(()))) => debug!("speech worker stopped"),
            Ok(Ok(Err(_))) => warn!("speech worker panicked"),
            Ok(Err(e)) => warn!("failed to join speech worker: {}", e),
            Err(_) => debug!("speech worker still playing after {:?}, detaching", grace),
        }
    }
}

impl Drop for SpeechQueue {
    fn drop(&mut self) {
        if self.worker.is_some() {
            let _ = self.tx.send(SpeechCommand::Shutdown);
        }
    }
}

fn run_worker<S: Synthesizer>(mut synth: S, mut rx: mpsc::UnboundedReceiver<SpeechCommand>) {
    while let Some(command) = rx.blocking_recv() {
        match command {
            SpeechCommand::Speak(task) => {
                debug!("speaking {} chars", task.text().len());
                if let Err(e) = synth.speak(task.text()) {
                    warn!("TTS error: {}", e);
                }
            }
            SpeechCommand::Shutdown => break,
        }
    }
    debug!("speech worker exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Records start/end events so overlap would be visible.
    #[derive(Clone, Default)]
    struct Recording {
        events: Arc<Mutex<Vec<String>>>,
        fail_on: Option<&'static str>,
    }

    impl Synthesizer for Recording {
        fn speak(&mut self, text: &str) -> std::result::Result<(), VoiceError> {
            self.events.lock().unwrap().push(format!("start {text}"));
            std::thread::sleep(Duration::from_millis(20));
            self.events.lock().unwrap().push(format!("end {text}"));
            if self.fail_on == Some(text) {
                return Err(VoiceError::Speech(format!("cannot say {text}")));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_plays_in_order_without_overlap() {
        let synth = Recording::default();
        let events = Arc::clone(&synth.events);
        let queue = SpeechQueue::start(synth).unwrap();

        assert!(queue.enqueue("A"));
        assert!(queue.enqueue("B"));
        queue.shutdown(Duration::from_secs(2)).await;

        assert_eq!(
            *events.lock().unwrap(),
            vec!["start A", "end A", "start B", "end B"]
        );
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_worker() {
        let synth = Recording {
            fail_on: Some("bad"),
            ..Default::default()
        };
        let events = Arc::clone(&synth.events);
        let queue = SpeechQueue::start(synth).unwrap();

        queue.enqueue("bad");
        queue.enqueue("good");
        queue.shutdown(Duration::from_secs(2)).await;

        let events = events.lock().unwrap();
        assert!(events.contains(&"end good".to_string()));
    }

    #[tokio::test]
    async fn test_shutdown_grace_bounds_wait() {
        struct Slow;
        impl Synthesizer for Slow {
            fn speak(&mut self, _text: &str) -> std::result::Result<(), VoiceError> {
                std::thread::sleep(Duration::from_millis(500));
                Ok(())
            }
        }

        let queue = SpeechQueue::start(Slow).unwrap();
        for _ in 0..3 {
            queue.enqueue("long");
        }

        let start = std::time::Instant::now();
        queue.shutdown(Duration::from_millis(100)).await;
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_task_text() {
        assert_eq!(SpeechTask::new("hi").text(), "hi");
    }
}
