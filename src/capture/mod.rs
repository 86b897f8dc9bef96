// Pointer control and screen capture seams
//
// Both collaborators are traits so the workflow can be exercised without a
// display: the pointer side is backed by enigo, the capture side by an
// external region-capture binary.

pub mod pointer;
pub mod region;

use async_trait::async_trait;
use image::DynamicImage;

#[cfg(test)]
use mockall::automock;

use crate::config::CaptureConfig;
use crate::error::Result;

/// On-screen pointer coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointerPosition {
    pub x: i32,
    pub y: i32,
}

/// Keys the coordinator can ask a machine to press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlKey {
    Left,
    Space,
}

/// Pointer and key injection on the controlled machine.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PointerController: Send + Sync {
    /// Current pointer position.
    async fn position(&self) -> Result<PointerPosition>;

    /// Click at an absolute position.
    async fn click_at(&self, position: PointerPosition) -> Result<()>;

    /// Press a key; returns the pointer position afterwards.
    async fn press_key(&self, key: ControlKey) -> Result<PointerPosition>;
}

/// Region capture on the controlled machine.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ScreenCapture: Send + Sync {
    /// Capture a rectangle of the screen.
    async fn capture_region(&self, x: i32, y: i32, width: u32, height: u32)
    -> Result<DynamicImage>;
}

/// Factory for the concrete pointer/capture implementations.
pub struct CaptureFactory;

impl CaptureFactory {
    pub fn create_pointer() -> Box<dyn PointerController> {
        Box::new(pointer::EnigoPointer::new())
    }

    pub fn create_capture(config: CaptureConfig) -> Box<dyn ScreenCapture> {
        Box::new(region::RegionCapture::new(config))
    }
}
