use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::SpeechConfig;
use crate::error::{Result, SerifuError};
use crate::tool::ToolCommand;
use super::{SpeechOutcome, SpeechSynthesizer};

/// Speech synthesis through an external TTS binary (`say` convention:
/// voice and rate flags followed by the utterance). Process exit is the
/// completion signal; killing the process is the cancellation path.
pub struct CommandSynthesizer {
    config: SpeechConfig,
}

impl CommandSynthesizer {
    pub fn new(config: SpeechConfig) -> Self {
        Self { config }
    }

    fn speak_command(&self, text: &str) -> ToolCommand {
        let mut cmd = ToolCommand::new(&self.config.binary_path, "Speech synthesis")
            .arg("-v")
            .arg(&self.config.voice);

        if let Some(rate) = self.config.rate_wpm {
            cmd = cmd.arg("-r").arg(rate.to_string());
        }

        cmd.arg(text)
    }
}

#[async_trait]
impl SpeechSynthesizer for CommandSynthesizer {
    async fn speak(&self, text: &str, cancel: CancellationToken) -> Result<SpeechOutcome> {
        let cleaned = clean_speech_text(text);
        if cleaned.is_empty() {
            return Ok(SpeechOutcome::Completed);
        }

        info!("Speaking: {}", cleaned);
        let mut child = self.speak_command(&cleaned).spawn()?;

        tokio::select! {
            status = child.wait() => {
                let status = status
                    .map_err(|e| SerifuError::Speech(format!("Speech process failed: {}", e)))?;
                if !status.success() {
                    return Err(SerifuError::Speech(format!(
                        "Speech binary exited with {}",
                        status
                    )));
                }
                Ok(SpeechOutcome::Completed)
            }
            _ = cancel.cancelled() => {
                debug!("Utterance superseded, stopping playback");
                let _ = child.kill().await;
                Ok(SpeechOutcome::Superseded)
            }
        }
    }
}

/// Strip characters the synthesizer chokes on and collapse whitespace runs.
pub fn clean_speech_text(text: &str) -> String {
    let filtered: String = text
        .chars()
        .filter(|c| {
            c.is_alphanumeric()
                || *c == '_'
                || c.is_whitespace()
                || "-.,!?():;".contains(*c)
        })
        .collect();

    filtered.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_collapses_whitespace() {
        assert_eq!(clean_speech_text("a  b\nc"), "a b c");
        assert_eq!(clean_speech_text("  trimmed  "), "trimmed");
    }

    #[test]
    fn test_clean_strips_markup() {
        assert_eq!(clean_speech_text("<i>hello</i>"), "ihelloi");
        assert_eq!(clean_speech_text("wait... what?!"), "wait... what?!");
        assert_eq!(clean_speech_text("Привет, мир"), "Привет, мир");
    }

    #[test]
    fn test_clean_empty_input() {
        assert_eq!(clean_speech_text(""), "");
        assert_eq!(clean_speech_text("   "), "");
        assert_eq!(clean_speech_text("<<>>"), "");
    }

    #[test]
    fn test_speak_command_shape() {
        let mut config = crate::config::Config::default().speech;
        config.rate_wpm = Some(210);
        let synth = CommandSynthesizer::new(config);
        let cmd = synth.speak_command("hello");
        assert_eq!(cmd.binary_path, "say");
        assert_eq!(cmd.args, vec!["-v", "Milena", "-r", "210", "hello"]);
    }
}
