use std::path::{Path, PathBuf};
use image::DynamicImage;
use tracing::warn;

use crate::error::{Result, SerifuError};

/// Persists captured regions as timestamped PNG files so unrecognized
/// frames can be inspected later.
pub struct FrameStore {
    output_dir: PathBuf,
}

impl FrameStore {
    pub fn new<P: AsRef<Path>>(output_dir: P) -> Result<Self> {
        let output_dir = output_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&output_dir)
            .map_err(|e| SerifuError::Config(format!("Failed to create frame directory: {}", e)))?;

        Ok(Self { output_dir })
    }

    /// Save a frame, returning the path it was written to. Failures are
    /// logged and reported but never abort a workflow run at the call site.
    pub fn save(&self, image: &DynamicImage) -> Result<PathBuf> {
        let filename = format!(
            "screenshot_{}.png",
            chrono::Local::now().format("%Y%m%d_%H%M%S_%3f")
        );
        let path = self.output_dir.join(filename);

        if let Err(e) = image.save(&path) {
            warn!("Failed to persist frame to {}: {}", path.display(), e);
            return Err(SerifuError::Io(std::io::Error::other(e.to_string())));
        }

        Ok(path)
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}
