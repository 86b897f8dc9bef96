// Speech synthesis seam
//
// The synthesizer is a trait over an external TTS binary; the engine on
// top of it owns the cancel-and-replace rule (starting a new utterance
// stops the old one) and serializes speak-and-resume tails per session.

pub mod command;

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

#[cfg(test)]
use mockall::automock;

use crate::config::SpeechConfig;
use crate::error::Result;

/// How an utterance ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeechOutcome {
    /// Playback ran to the end; the resume action may follow.
    Completed,
    /// A newer utterance replaced this one before it finished.
    Superseded,
}

/// Main trait for speech synthesis
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Speak the text. Resolves when playback completes or the token is
    /// cancelled, whichever comes first.
    async fn speak(&self, text: &str, cancel: CancellationToken) -> Result<SpeechOutcome>;
}

/// Serialized speech front-end shared by all workflow runs of a session.
pub struct SpeechEngine {
    synthesizer: Box<dyn SpeechSynthesizer>,
    current: Mutex<CancellationToken>,
    serial: Arc<tokio::sync::Mutex<()>>,
}

impl SpeechEngine {
    pub fn new(synthesizer: Box<dyn SpeechSynthesizer>) -> Self {
        Self {
            synthesizer,
            current: Mutex::new(CancellationToken::new()),
            serial: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    /// Speak one utterance. Any in-flight utterance is cancelled first;
    /// this call then waits its turn behind the prior tail (which exits
    /// promptly once cancelled) before starting playback.
    pub async fn speak(&self, text: &str) -> Result<SpeechOutcome> {
        let token = {
            let mut current = self
                .current
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            current.cancel();
            *current = CancellationToken::new();
            current.clone()
        };

        let _turn = self.serial.lock().await;
        if token.is_cancelled() {
            // Replaced while waiting for the prior tail to wind down.
            return Ok(SpeechOutcome::Superseded);
        }

        self.synthesizer.speak(text, token).await
    }

    /// Stop any in-flight utterance without starting a new one.
    pub fn stop(&self) {
        self.current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .cancel();
    }
}

/// Factory for the concrete speech stack.
pub struct SpeechFactory;

impl SpeechFactory {
    pub fn create_engine(config: SpeechConfig) -> SpeechEngine {
        SpeechEngine::new(Box::new(command::CommandSynthesizer::new(config)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSynthesizer {
        completed: AtomicUsize,
        superseded: AtomicUsize,
        hold_ms: u64,
    }

    #[async_trait]
    impl SpeechSynthesizer for CountingSynthesizer {
        async fn speak(&self, _text: &str, cancel: CancellationToken) -> Result<SpeechOutcome> {
            tokio::select! {
                _ = tokio::time::sleep(std::time::Duration::from_millis(self.hold_ms)) => {
                    self.completed.fetch_add(1, Ordering::SeqCst);
                    Ok(SpeechOutcome::Completed)
                }
                _ = cancel.cancelled() => {
                    self.superseded.fetch_add(1, Ordering::SeqCst);
                    Ok(SpeechOutcome::Superseded)
                }
            }
        }
    }

    #[tokio::test]
    async fn test_speak_runs_to_completion() {
        let engine = SpeechEngine::new(Box::new(CountingSynthesizer {
            completed: AtomicUsize::new(0),
            superseded: AtomicUsize::new(0),
            hold_ms: 1,
        }));

        assert_eq!(engine.speak("line").await.unwrap(), SpeechOutcome::Completed);
    }

    #[tokio::test]
    async fn test_new_utterance_supersedes_in_flight_one() {
        let engine = Arc::new(SpeechEngine::new(Box::new(CountingSynthesizer {
            completed: AtomicUsize::new(0),
            superseded: AtomicUsize::new(0),
            hold_ms: 10_000,
        })));

        let first = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.speak("first").await })
        };
        // Let the first utterance actually start
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let second = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.speak("second").await })
        };

        assert_eq!(first.await.unwrap().unwrap(), SpeechOutcome::Superseded);

        engine.stop();
        assert_eq!(second.await.unwrap().unwrap(), SpeechOutcome::Superseded);
    }
}
