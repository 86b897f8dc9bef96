use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use image::DynamicImage;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::capture::{ControlKey, PointerController, PointerPosition, ScreenCapture};
use crate::config::{CaptureConfig, SpeechConfig};
use crate::error::Result;
use crate::frames::FrameStore;
use crate::recognize::TimestampRecognizer;
use crate::speech::{SpeechEngine, SpeechOutcome};
use crate::subtitle::SubtitleTrack;
use crate::timing::Timestamp;

/// What one workflow run produced. Returned to the caller as soon as the
/// capture/recognize/lookup part is done; the speak-and-resume tail runs
/// on its own task and never delays this.
#[derive(Debug, Clone)]
pub struct WorkflowOutcome {
    pub timing: Option<Timestamp>,
    pub subtitle_text: Option<String>,
    pub anchor: PointerPosition,
    pub saved_path: Option<PathBuf>,
}

/// The capture-recognize-synchronize-speak state machine. One instance per
/// controlled machine; runs execute per trigger.
pub struct CaptureWorkflow {
    capture_config: CaptureConfig,
    speech_config: SpeechConfig,
    pointer: Arc<dyn PointerController>,
    capture: Box<dyn ScreenCapture>,
    recognizer: Box<dyn TimestampRecognizer>,
    track: Arc<RwLock<SubtitleTrack>>,
    speech: Arc<SpeechEngine>,
    frames: FrameStore,
    last_subtitle: Mutex<Option<String>>,
}

impl CaptureWorkflow {
    pub fn new(
        capture_config: CaptureConfig,
        speech_config: SpeechConfig,
        pointer: Arc<dyn PointerController>,
        capture: Box<dyn ScreenCapture>,
        recognizer: Box<dyn TimestampRecognizer>,
        track: Arc<RwLock<SubtitleTrack>>,
        speech: Arc<SpeechEngine>,
    ) -> Result<Self> {
        let frames = FrameStore::new(&capture_config.output_dir)?;

        Ok(Self {
            capture_config,
            speech_config,
            pointer,
            capture,
            recognizer,
            track,
            speech,
            frames,
            last_subtitle: Mutex::new(None),
        })
    }

    /// One full trigger run: pause-click at the pointer, capture the
    /// region near it, recognize the elapsed-time label, look it up in the
    /// track, and hand any new line to the speech tail.
    pub async fn run_trigger(&self) -> Result<WorkflowOutcome> {
        let (anchor, image, timing) = self.capture_and_recognize().await?;
        let saved_path = self.persist_frame(&image);

        let Some(timing) = timing else {
            debug!("No timestamp recognized in captured region");
            return Ok(WorkflowOutcome {
                timing: None,
                subtitle_text: None,
                anchor,
                saved_path,
            });
        };

        info!("Recognized timing {}", timing);

        let lookup = self.track.read().await.lookup(&timing.to_string());
        let Some((_, text)) = lookup else {
            return Ok(WorkflowOutcome {
                timing: Some(timing),
                subtitle_text: None,
                anchor,
                saved_path,
            });
        };

        if self.is_repeat(&text) {
            // Same line as the previous poll: no new utterance, and
            // therefore no resume click either.
            debug!("Subtitle line unchanged, skipping speech");
            return Ok(WorkflowOutcome {
                timing: Some(timing),
                subtitle_text: Some(text),
                anchor,
                saved_path,
            });
        }

        self.remember(&text);
        self.spawn_speech_tail(text.clone(), anchor);

        Ok(WorkflowOutcome {
            timing: Some(timing),
            subtitle_text: Some(text),
            anchor,
            saved_path,
        })
    }

    /// Advance to the line after the current one and speak it. An explicit
    /// advance request is never treated as a repeat.
    pub async fn run_next_subtitle(&self) -> Result<WorkflowOutcome> {
        let (anchor, image, timing) = self.capture_and_recognize().await?;
        let saved_path = self.persist_frame(&image);

        let track = self.track.read().await;
        let next = match &timing {
            Some(timing) => track.cue_after(&timing.to_string()),
            None => {
                let last = self
                    .last_subtitle
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .clone();
                last.and_then(|text| track.cue_following_text(&text))
            }
        };

        let Some(cue) = next else {
            debug!("No next subtitle line to advance to");
            return Ok(WorkflowOutcome {
                timing,
                subtitle_text: None,
                anchor,
                saved_path,
            });
        };
        let text = cue.text.clone();
        drop(track);

        self.remember(&text);
        self.spawn_speech_tail(text.clone(), anchor);

        Ok(WorkflowOutcome {
            timing,
            subtitle_text: Some(text),
            anchor,
            saved_path,
        })
    }

    /// Press a playback control key on behalf of the coordinator.
    pub async fn press_key(&self, key: ControlKey) -> Result<PointerPosition> {
        self.pointer.press_key(key).await
    }

    async fn capture_and_recognize(
        &self,
    ) -> Result<(PointerPosition, DynamicImage, Option<Timestamp>)> {
        let anchor = self.pointer.position().await?;
        self.pointer.click_at(anchor).await?;

        tokio::time::sleep(Duration::from_millis(self.capture_config.settle_delay_ms)).await;

        let x = (anchor.x - self.capture_config.anchor_offset).max(0);
        let y = (anchor.y - self.capture_config.anchor_offset).max(0);
        let image = self
            .capture
            .capture_region(
                x,
                y,
                self.capture_config.region_width,
                self.capture_config.region_height,
            )
            .await?;

        let timing = self.recognizer.recognize(&image).await?;
        Ok((anchor, image, timing))
    }

    fn persist_frame(&self, image: &DynamicImage) -> Option<PathBuf> {
        self.frames.save(image).ok()
    }

    fn is_repeat(&self, text: &str) -> bool {
        self.last_subtitle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .as_deref()
            == Some(text)
    }

    fn remember(&self, text: &str) {
        *self
            .last_subtitle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(text.to_string());
    }

    /// Speak the line on its own task, then replay the anchor click once
    /// the completion signal fires. Failures here are logged only; the
    /// workflow result has already been returned.
    fn spawn_speech_tail(&self, text: String, anchor: PointerPosition) {
        let speech = self.speech.clone();
        let pointer = self.pointer.clone();
        let resume_delay = Duration::from_millis(self.speech_config.resume_delay_ms);
        let completion_timeout = Duration::from_secs(self.speech_config.completion_timeout_secs);

        tokio::spawn(async move {
            let outcome = match tokio::time::timeout(completion_timeout, speech.speak(&text)).await
            {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(e)) => {
                    warn!("Speech failed: {}", e);
                    return;
                }
                Err(_) => {
                    warn!(
                        "Speech completion signal did not arrive within {:?}; skipping resume click",
                        completion_timeout
                    );
                    return;
                }
            };

            if outcome == SpeechOutcome::Superseded {
                debug!("Utterance superseded, no resume click");
                return;
            }

            tokio::time::sleep(resume_delay).await;

            // Resume at the position captured when this run started, not
            // wherever the pointer is now.
            if let Err(e) = pointer.click_at(anchor).await {
                warn!("Resume click failed: {}", e);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{MockPointerController, MockScreenCapture};
    use crate::recognize::MockTimestampRecognizer;
    use crate::speech::{MockSpeechSynthesizer, SpeechEngine, SpeechOutcome};
    use std::sync::atomic::{AtomicUsize, Ordering};

    const CUE_DOC: &str = "00:00:01.000 --> 00:00:05.000\nA\n\n00:00:10.000 --> 00:00:12.000\nB\n";

    struct Fixture {
        pointer: MockPointerController,
        capture: MockScreenCapture,
        recognizer: MockTimestampRecognizer,
        speak_count: Arc<AtomicUsize>,
        engine: SpeechEngine,
        track: SubtitleTrack,
        frames_dir: tempfile::TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            let speak_count = Arc::new(AtomicUsize::new(0));
            let mut synthesizer = MockSpeechSynthesizer::new();
            let count = speak_count.clone();
            synthesizer.expect_speak().returning(move |_, _| {
                count.fetch_add(1, Ordering::SeqCst);
                Ok(SpeechOutcome::Completed)
            });

            Self {
                pointer: MockPointerController::new(),
                capture: MockScreenCapture::new(),
                recognizer: MockTimestampRecognizer::new(),
                speak_count,
                engine: SpeechEngine::new(Box::new(synthesizer)),
                track: SubtitleTrack::parse(CUE_DOC),
                frames_dir: tempfile::tempdir().unwrap(),
            }
        }

        fn workflow(self) -> (CaptureWorkflow, Arc<AtomicUsize>, tempfile::TempDir) {
            let mut capture_config = crate::config::Config::default().capture;
            capture_config.output_dir = self.frames_dir.path().to_string_lossy().to_string();
            capture_config.settle_delay_ms = 0;
            let mut speech_config = crate::config::Config::default().speech;
            speech_config.resume_delay_ms = 0;

            let workflow = CaptureWorkflow::new(
                capture_config,
                speech_config,
                Arc::new(self.pointer),
                Box::new(self.capture),
                Box::new(self.recognizer),
                Arc::new(RwLock::new(self.track)),
                Arc::new(self.engine),
            )
            .unwrap();

            (workflow, self.speak_count, self.frames_dir)
        }
    }

    fn anchor() -> PointerPosition {
        PointerPosition { x: 150, y: 150 }
    }

    fn stub_capture(capture: &mut MockScreenCapture) {
        capture
            .expect_capture_region()
            .returning(|_, _, _, _| Ok(DynamicImage::new_rgb8(100, 40)));
    }

    #[tokio::test]
    async fn test_matched_line_is_spoken_and_resumed_at_anchor() {
        let mut fixture = Fixture::new();

        fixture.pointer.expect_position().returning(|| Ok(anchor()));
        // Initial pause click plus the resume click, both at the anchor
        fixture
            .pointer
            .expect_click_at()
            .withf(|position| *position == anchor())
            .times(2)
            .returning(|_| Ok(()));
        stub_capture(&mut fixture.capture);
        fixture
            .recognizer
            .expect_recognize()
            .returning(|_| Ok(Timestamp::parse("0:00:03")));

        let (workflow, speak_count, _frames_dir) = fixture.workflow();
        let outcome = workflow.run_trigger().await.unwrap();

        assert_eq!(outcome.subtitle_text.as_deref(), Some("A"));
        assert_eq!(outcome.timing.unwrap().to_string(), "0:00:03");
        assert!(outcome.saved_path.is_some());

        // The tail runs asynchronously
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(speak_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_repeated_line_speaks_once_and_skips_resume() {
        let mut fixture = Fixture::new();

        fixture.pointer.expect_position().returning(|| Ok(anchor()));
        // Two runs: two pause clicks, but only the first run resumes
        fixture
            .pointer
            .expect_click_at()
            .times(3)
            .returning(|_| Ok(()));
        stub_capture(&mut fixture.capture);
        fixture
            .recognizer
            .expect_recognize()
            .returning(|_| Ok(Timestamp::parse("0:00:03")));

        let (workflow, speak_count, _frames_dir) = fixture.workflow();
        let first = workflow.run_trigger().await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        let second = workflow.run_trigger().await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(first.subtitle_text.as_deref(), Some("A"));
        // The repeat still reports the (unchanged) text
        assert_eq!(second.subtitle_text.as_deref(), Some("A"));
        assert_eq!(speak_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unrecognized_frame_reports_nothing_found() {
        let mut fixture = Fixture::new();

        fixture.pointer.expect_position().returning(|| Ok(anchor()));
        // Only the pause click; no speech means no resume click
        fixture
            .pointer
            .expect_click_at()
            .times(1)
            .returning(|_| Ok(()));
        stub_capture(&mut fixture.capture);
        fixture.recognizer.expect_recognize().returning(|_| Ok(None));

        let (workflow, speak_count, _frames_dir) = fixture.workflow();
        let outcome = workflow.run_trigger().await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(outcome.timing.is_none());
        assert!(outcome.subtitle_text.is_none());
        assert!(outcome.saved_path.is_some());
        assert_eq!(speak_count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_timestamp_outside_track_reports_timing_only() {
        let mut fixture = Fixture::new();

        fixture.pointer.expect_position().returning(|| Ok(anchor()));
        fixture
            .pointer
            .expect_click_at()
            .times(1)
            .returning(|_| Ok(()));
        stub_capture(&mut fixture.capture);
        // Far away from every cue
        fixture
            .recognizer
            .expect_recognize()
            .returning(|_| Ok(Timestamp::parse("1:00:00")));

        let (workflow, speak_count, _frames_dir) = fixture.workflow();
        let outcome = workflow.run_trigger().await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(outcome.timing.unwrap().to_string(), "1:00:00");
        assert!(outcome.subtitle_text.is_none());
        assert_eq!(speak_count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_next_subtitle_advances_past_current_line() {
        let mut fixture = Fixture::new();

        fixture.pointer.expect_position().returning(|| Ok(anchor()));
        fixture.pointer.expect_click_at().returning(|_| Ok(()));
        stub_capture(&mut fixture.capture);
        fixture
            .recognizer
            .expect_recognize()
            .returning(|_| Ok(Timestamp::parse("0:00:03")));

        let (workflow, speak_count, _frames_dir) = fixture.workflow();
        let outcome = workflow.run_next_subtitle().await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(outcome.subtitle_text.as_deref(), Some("B"));
        assert_eq!(speak_count.load(Ordering::SeqCst), 1);
    }
}
