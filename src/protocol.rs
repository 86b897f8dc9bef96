use serde::{Deserialize, Serialize};

/// Wire messages exchanged between the coordinator and controlled machines.
///
/// One closed enum, one variant per `type` value. Anything that does not
/// deserialize into this enum is malformed and gets skipped by the read
/// loops; there is no open-ended "unknown type" representation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    // Coordinator to machine
    ConnectionEstablished {
        interval: u64,
        timestamp: String,
    },
    ExecuteScreenshot {
        command_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        telegram_user_id: Option<i64>,
    },
    ExecuteLeftKey {
        command_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        telegram_user_id: Option<i64>,
    },
    ExecuteSpaceKey {
        command_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        telegram_user_id: Option<i64>,
    },
    ExecuteNextSubtitle {
        command_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        telegram_user_id: Option<i64>,
    },
    HeartbeatAck {
        timestamp: String,
    },

    // Machine to coordinator
    Heartbeat {
        client_id: String,
        timestamp: String,
    },
    ScreenshotCompleted {
        client_id: String,
        command_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        telegram_user_id: Option<i64>,
        timestamp: String,
        result: ScreenshotResult,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        subtitle_text: Option<String>,
    },
    ScreenshotError {
        client_id: String,
        command_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        telegram_user_id: Option<i64>,
        timestamp: String,
        error: String,
    },
    LeftKeyCompleted {
        client_id: String,
        command_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        telegram_user_id: Option<i64>,
        timestamp: String,
        result: KeyResult,
    },
    SpaceKeyCompleted {
        client_id: String,
        command_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        telegram_user_id: Option<i64>,
        timestamp: String,
        result: KeyResult,
    },
    NextSubtitleCompleted {
        client_id: String,
        command_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        telegram_user_id: Option<i64>,
        timestamp: String,
        result: ScreenshotResult,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        subtitle_text: Option<String>,
    },
}

impl Message {
    /// The echoed command id for result messages, None for the rest.
    pub fn command_id(&self) -> Option<&str> {
        match self {
            Message::ScreenshotCompleted { command_id, .. }
            | Message::ScreenshotError { command_id, .. }
            | Message::LeftKeyCompleted { command_id, .. }
            | Message::SpaceKeyCompleted { command_id, .. }
            | Message::NextSubtitleCompleted { command_id, .. }
            | Message::ExecuteScreenshot { command_id, .. }
            | Message::ExecuteLeftKey { command_id, .. }
            | Message::ExecuteSpaceKey { command_id, .. }
            | Message::ExecuteNextSubtitle { command_id, .. } => Some(command_id.as_str()),
            _ => None,
        }
    }
}

/// Payload of a completed capture run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScreenshotResult {
    pub timing: Option<String>,
    pub mouse_position: MousePosition,
    pub saved_filepath: Option<String>,
    pub crop_size: u32,
}

/// Payload of a completed key press.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KeyResult {
    pub mouse_position: MousePosition,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct MousePosition {
    pub x: i32,
    pub y: i32,
}

/// ISO-8601 timestamp for outbound messages.
pub fn now_timestamp() -> String {
    chrono::Local::now().to_rfc3339()
}

/// Fresh command identifier for a broadcast.
pub fn new_command_id() -> String {
    format!("cmd_{}", uuid::Uuid::new_v4().simple())
}
