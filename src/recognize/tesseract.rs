use async_trait::async_trait;
use image::DynamicImage;
use tracing::debug;

use crate::config::RecognizerConfig;
use crate::error::{Result, SerifuError};
use crate::timing::Timestamp;
use crate::tool::ToolCommand;
use super::{TimestampRecognizer, preprocess};

/// Charset restriction handed to the recognizer binary: digits and colon.
const TIMESTAMP_CHARSET: &str = "tessedit_char_whitelist=0123456789:";

/// Primary recognizer: preprocesses the captured region and runs the
/// external text-recognition binary restricted to the timestamp alphabet.
pub struct TesseractRecognizer {
    config: RecognizerConfig,
}

impl TesseractRecognizer {
    pub fn new(config: RecognizerConfig) -> Self {
        Self { config }
    }

    /// Build the recognition command for one prepared image file.
    fn recognition_command(&self, input: &std::path::Path) -> ToolCommand {
        ToolCommand::new(&self.config.binary_path, "Timestamp recognition")
            .path_arg(input)
            .arg("stdout")
            .args(["--oem", "3", "--psm", "6", "-c", TIMESTAMP_CHARSET])
    }

    /// Probe command used by the factory to decide availability.
    pub fn version_check(config: &RecognizerConfig) -> ToolCommand {
        ToolCommand::new(&config.binary_path, "Recognizer version check").arg("--version")
    }

    async fn run_recognition(&self, image: &DynamicImage) -> Result<String> {
        let prepared = preprocess::prepare(image, self.config.scale_factor, self.config.threshold);

        let input = tempfile::Builder::new()
            .prefix("serifu-ocr-")
            .suffix(".png")
            .tempfile()
            .map_err(|e| SerifuError::Recognizer(format!("Failed to create temp image: {}", e)))?;

        prepared
            .save(input.path())
            .map_err(|e| SerifuError::Recognizer(format!("Failed to write temp image: {}", e)))?;

        let raw = self
            .recognition_command(input.path())
            .execute_capturing_stdout()
            .await
            .map_err(|e| SerifuError::Recognizer(e.to_string()))?;

        Ok(raw.chars().filter(|c| !c.is_whitespace()).collect())
    }
}

#[async_trait]
impl TimestampRecognizer for TesseractRecognizer {
    async fn recognize(&self, image: &DynamicImage) -> Result<Option<Timestamp>> {
        let text = self.run_recognition(image).await?;
        debug!("Recognizer output: {:?}", text);

        if let Some(timing) = Timestamp::find_in(&text) {
            return Ok(Some(timing));
        }

        Ok(repair_timing_text(&text))
    }
}

/// Repair pass over noisy recognizer output. First strips everything
/// outside the digit/colon alphabet and rescans; failing that, rebuilds
/// the reading from colon-delimited digit groups, padding minutes and
/// seconds to two digits.
pub fn repair_timing_text(text: &str) -> Option<Timestamp> {
    let cleaned: String = text.chars().filter(|c| c.is_ascii_digit() || *c == ':').collect();

    if let Some(timing) = Timestamp::find_in(&cleaned) {
        return Some(timing);
    }

    let parts: Vec<&str> = cleaned.split(':').collect();
    if parts.len() >= 3 {
        let hours = if parts[0].is_empty() { "0" } else { parts[0] };
        let candidate = format!("{}:{:0>2}:{:0>2}", hours, parts[1], parts[2]);
        return Timestamp::parse(&candidate);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repair_strips_noise_characters() {
        assert_eq!(repair_timing_text("a0:02:30b").unwrap().to_string(), "0:02:30");
        assert_eq!(repair_timing_text("~12:34:56~").unwrap().to_string(), "12:34:56");
    }

    #[test]
    fn test_repair_reconstructs_short_groups() {
        assert_eq!(repair_timing_text("0:2:30").unwrap().to_string(), "0:02:30");
        assert_eq!(repair_timing_text("1:2:3").unwrap().to_string(), "1:02:03");
        assert_eq!(repair_timing_text(":02:30").unwrap().to_string(), "0:02:30");
    }

    #[test]
    fn test_repair_rejects_hopeless_input() {
        assert!(repair_timing_text("").is_none());
        assert!(repair_timing_text("1234").is_none());
        assert!(repair_timing_text("12:34").is_none());
        // Out of range after reconstruction
        assert!(repair_timing_text("99:99:99").is_none());
    }
}
