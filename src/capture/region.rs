use async_trait::async_trait;
use image::DynamicImage;
use tracing::debug;

use crate::config::CaptureConfig;
use crate::error::{Result, SerifuError};
use crate::tool::ToolCommand;
use super::ScreenCapture;

/// Region capture through an external capture binary (`screencapture -R`
/// convention). The captured file is written to a temp path and decoded
/// into an image buffer.
pub struct RegionCapture {
    config: CaptureConfig,
}

impl RegionCapture {
    pub fn new(config: CaptureConfig) -> Self {
        Self { config }
    }

    fn capture_command(&self, x: i32, y: i32, width: u32, height: u32, output: &std::path::Path) -> ToolCommand {
        ToolCommand::new(&self.config.binary_path, "Region capture")
            .arg("-x")
            .arg("-R")
            .arg(format!("{},{},{},{}", x, y, width, height))
            .path_arg(output)
    }
}

#[async_trait]
impl ScreenCapture for RegionCapture {
    async fn capture_region(
        &self,
        x: i32,
        y: i32,
        width: u32,
        height: u32,
    ) -> Result<DynamicImage> {
        debug!("Capturing region {}x{} at ({}, {})", width, height, x, y);

        let output = tempfile::Builder::new()
            .prefix("serifu-capture-")
            .suffix(".png")
            .tempfile()
            .map_err(|e| SerifuError::Capture(format!("Failed to create temp file: {}", e)))?;

        self.capture_command(x, y, width, height, output.path())
            .execute()
            .await
            .map_err(|e| SerifuError::Capture(e.to_string()))?;

        let image = image::open(output.path())
            .map_err(|e| SerifuError::Capture(format!("Failed to decode capture: {}", e)))?;

        Ok(image)
    }
}
