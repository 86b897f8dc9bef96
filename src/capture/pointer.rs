use async_trait::async_trait;
use enigo::{Button, Coordinate, Direction, Enigo, Key, Keyboard, Mouse, Settings};
use tracing::debug;

use crate::error::{Result, SerifuError};
use super::{ControlKey, PointerController, PointerPosition};

/// Pointer controller backed by enigo.
///
/// A new `Enigo` instance is created inside each `spawn_blocking` call:
/// the handle is not `Send` and is cheap to construct.
pub struct EnigoPointer;

impl EnigoPointer {
    pub fn new() -> Self {
        Self
    }
}

impl Default for EnigoPointer {
    fn default() -> Self {
        Self::new()
    }
}

fn new_enigo() -> Result<Enigo> {
    Enigo::new(&Settings::default())
        .map_err(|e| SerifuError::Pointer(format!("Failed to initialize input backend: {}", e)))
}

fn current_position(enigo: &Enigo) -> Result<PointerPosition> {
    let (x, y) = enigo
        .location()
        .map_err(|e| SerifuError::Pointer(format!("Failed to read pointer position: {}", e)))?;
    Ok(PointerPosition { x, y })
}

#[async_trait]
impl PointerController for EnigoPointer {
    async fn position(&self) -> Result<PointerPosition> {
        tokio::task::spawn_blocking(|| {
            let enigo = new_enigo()?;
            current_position(&enigo)
        })
        .await
        .map_err(|e| SerifuError::Pointer(format!("Pointer task panicked: {}", e)))?
    }

    async fn click_at(&self, position: PointerPosition) -> Result<()> {
        debug!("Clicking at ({}, {})", position.x, position.y);

        tokio::task::spawn_blocking(move || {
            let mut enigo = new_enigo()?;
            enigo
                .move_mouse(position.x, position.y, Coordinate::Abs)
                .map_err(|e| SerifuError::Pointer(format!("Failed to move pointer: {}", e)))?;
            enigo
                .button(Button::Left, Direction::Click)
                .map_err(|e| SerifuError::Pointer(format!("Failed to click: {}", e)))?;
            Ok(())
        })
        .await
        .map_err(|e| SerifuError::Pointer(format!("Pointer task panicked: {}", e)))?
    }

    async fn press_key(&self, key: ControlKey) -> Result<PointerPosition> {
        debug!("Pressing key {:?}", key);

        tokio::task::spawn_blocking(move || {
            let mut enigo = new_enigo()?;
            let key = match key {
                ControlKey::Left => Key::LeftArrow,
                ControlKey::Space => Key::Space,
            };
            enigo
                .key(key, Direction::Click)
                .map_err(|e| SerifuError::Pointer(format!("Failed to press key: {}", e)))?;
            current_position(&enigo)
        })
        .await
        .map_err(|e| SerifuError::Pointer(format!("Pointer task panicked: {}", e)))?
    }
}
