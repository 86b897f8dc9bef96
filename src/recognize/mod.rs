// Modular timestamp recognition
//
// This module provides recognizer implementations through a factory pattern:
// - Tesseract: external text-recognition binary restricted to digits/colon
// - Geometric: degraded connected-component heuristic, no real OCR
//
// The factory probes the external binary once and only falls back to the
// geometric path when the binary is unavailable. "Nothing recognized" is
// Ok(None); Err means the recognition subsystem itself failed.

pub mod preprocess;
pub mod tesseract;
pub mod geometric;

use async_trait::async_trait;
use image::DynamicImage;
use tracing::{info, warn};

#[cfg(test)]
use mockall::automock;

use crate::config::RecognizerConfig;
use crate::error::Result;
use crate::timing::Timestamp;

/// Main trait for timestamp recognition
#[cfg_attr(test, automock)]
#[async_trait]
pub trait TimestampRecognizer: Send + Sync {
    /// Extract a validated timestamp from a captured region, or None when
    /// no timestamp is present.
    async fn recognize(&self, image: &DynamicImage) -> Result<Option<Timestamp>>;
}

/// Recognizer implementation type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecognizerImplementation {
    Tesseract,
    Geometric,
}

/// Factory for creating recognizer instances
pub struct RecognizerFactory;

impl RecognizerFactory {
    /// Create a recognizer of a specific implementation type
    pub fn create_recognizer(
        implementation: RecognizerImplementation,
        config: RecognizerConfig,
    ) -> Box<dyn TimestampRecognizer> {
        match implementation {
            RecognizerImplementation::Tesseract => {
                Box::new(tesseract::TesseractRecognizer::new(config))
            }
            RecognizerImplementation::Geometric => {
                Box::new(geometric::GeometricRecognizer::new(config))
            }
        }
    }

    /// Probe the external binary and create the best available recognizer.
    pub async fn create_available(config: RecognizerConfig) -> Box<dyn TimestampRecognizer> {
        if tesseract::TesseractRecognizer::version_check(&config).probe().await {
            info!("Text recognition binary is available: {}", config.binary_path);
            Self::create_recognizer(RecognizerImplementation::Tesseract, config)
        } else {
            warn!(
                "Text recognition binary {} unavailable; using degraded geometric fallback",
                config.binary_path
            );
            Self::create_recognizer(RecognizerImplementation::Geometric, config)
        }
    }
}
