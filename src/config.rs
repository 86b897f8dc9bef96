use serde::{Deserialize, Serialize};
use std::path::Path;
use crate::error::{Result, SerifuError};

// Defaults for fields added after the first config layout shipped
fn default_completion_timeout_secs() -> u64 {
    120
}

fn default_settle_delay_ms() -> u64 {
    300
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub client: ClientConfig,
    pub coordinator: CoordinatorConfig,
    pub capture: CaptureConfig,
    pub recognizer: RecognizerConfig,
    pub speech: SpeechConfig,
    pub subtitles: SubtitlesConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Coordinator host to connect to
    pub coordinator_host: String,
    /// Coordinator port
    pub coordinator_port: u16,
    /// Liveness message interval (seconds)
    pub heartbeat_interval_secs: u64,
    /// Reconnect backoff floor (seconds)
    pub reconnect_floor_secs: u64,
    /// Reconnect backoff ceiling (seconds)
    pub reconnect_ceiling_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Address to bind the websocket listener on
    pub bind_host: String,
    /// Listener port
    pub port: u16,
    /// Periodic trigger interval (seconds); 0 disables the scheduler
    pub trigger_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Path to the region-capture binary (e.g. screencapture, grim)
    pub binary_path: String,
    /// Directory where captured regions are persisted
    pub output_dir: String,
    /// Captured region width (pixels)
    pub region_width: u32,
    /// Captured region height (pixels)
    pub region_height: u32,
    /// Offset of the region origin left/up from the anchor pointer
    pub anchor_offset: i32,
    /// Delay between the anchor click and the capture (milliseconds)
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognizerConfig {
    /// Path to the text-recognition binary
    pub binary_path: String,
    /// Integer upscale factor applied before recognition
    pub scale_factor: u32,
    /// Global binarization threshold (0-255)
    pub threshold: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechConfig {
    /// Path to the speech synthesis binary
    pub binary_path: String,
    /// Voice identifier passed to the binary
    pub voice: String,
    /// Speaking rate in words per minute; None uses the binary's default
    pub rate_wpm: Option<u32>,
    /// Delay between the speech completion signal and the resume click
    /// (milliseconds)
    pub resume_delay_ms: u64,
    /// Upper bound on waiting for the completion signal (seconds)
    #[serde(default = "default_completion_timeout_secs")]
    pub completion_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubtitlesConfig {
    /// Subtitle document to load: a URL or a local file path
    pub source: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            client: ClientConfig {
                coordinator_host: "localhost".to_string(),
                coordinator_port: 8765,
                heartbeat_interval_secs: 30,
                reconnect_floor_secs: 5,
                reconnect_ceiling_secs: 60,
            },
            coordinator: CoordinatorConfig {
                bind_host: "0.0.0.0".to_string(),
                port: 8765,
                trigger_interval_secs: 15,
            },
            capture: CaptureConfig {
                binary_path: "screencapture".to_string(),
                output_dir: "screenshots".to_string(),
                region_width: 100,
                region_height: 40,
                anchor_offset: 100,
                settle_delay_ms: 300,
            },
            recognizer: RecognizerConfig {
                binary_path: "tesseract".to_string(),
                scale_factor: 3,
                threshold: 200,
            },
            speech: SpeechConfig {
                binary_path: "say".to_string(),
                voice: "Milena".to_string(),
                rate_wpm: None,
                resume_delay_ms: 500,
                completion_timeout_secs: 120,
            },
            subtitles: SubtitlesConfig { source: None },
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| SerifuError::Config(format!("Failed to read config file: {}", e)))?;

        toml::from_str(&content)
            .map_err(|e| SerifuError::Config(format!("Failed to parse config file: {}", e)))
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| SerifuError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| SerifuError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_round_trips_through_toml() {
        let config = Config::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.client.reconnect_floor_secs, 5);
        assert_eq!(parsed.client.reconnect_ceiling_secs, 60);
        assert_eq!(parsed.capture.region_width, 100);
        assert_eq!(parsed.capture.region_height, 40);
        assert_eq!(parsed.recognizer.threshold, 200);
    }

    #[test]
    fn test_missing_late_fields_fall_back() {
        let mut config = Config::default();
        config.speech.completion_timeout_secs = 0;
        let mut text = toml::to_string_pretty(&config).unwrap();
        text = text
            .lines()
            .filter(|line| {
                !line.starts_with("completion_timeout_secs") && !line.starts_with("settle_delay_ms")
            })
            .collect::<Vec<_>>()
            .join("\n");
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.speech.completion_timeout_secs, 120);
        assert_eq!(parsed.capture.settle_delay_ms, 300);
    }
}
