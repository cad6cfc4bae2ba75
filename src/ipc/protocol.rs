//! IPC message protocol definitions
//!
//! All messages are JSON-encoded, prefixed with a 4-byte little-endian length.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};

use crate::capability::{AccessibilityCapture, ScreenCapture};
use crate::context::{now_epoch_millis, MediaState, NotificationPayload, Snapshot};
use crate::mode::Mode;
use crate::settings::Settings;

/// Largest accepted message body; screen frames dominate
pub const MAX_MESSAGE_LEN: usize = 8 * 1024 * 1024;

/// Requests from clients (signal listeners, capture pipelines, UI) to daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Ping to check connectivity
    Ping,

    /// Request current daemon status
    GetStatus,

    /// Request the current context snapshot
    GetSnapshot,

    /// Subscribe to utterances and mode changes
    Subscribe,

    PostNotification { notification: NotificationPayload },

    RemoveNotification { key: String },

    /// Full resync of the active notification set
    ReplaceNotifications { notifications: Vec<NotificationPayload> },

    UpdateMedia { media: MediaState },

    ClearMedia,

    /// Replace the settings wholesale; persisted to disk
    UpdateSettings { settings: Settings },

    SetScreenCaptureAvailable { available: bool },

    PushScreenFrame { frame: ScreenFrame },

    SetAccessibilityAvailable { available: bool },

    PushAccessibilitySnapshot { snapshot: AccessibilityCapture },
}

/// Responses from daemon to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Pong response to ping
    Pong,

    /// Current daemon status
    Status(DaemonStatus),

    Snapshot { snapshot: Snapshot },

    /// Request applied
    Ok,

    /// Subscription confirmed
    Subscribed,

    /// Error response
    Error { code: String, message: String },
}

impl Response {
    pub fn error(code: &str, message: impl Into<String>) -> Self {
        Response::Error {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

/// Push notification from daemon to subscribed clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// The mascot should say this
    Utterance { text: String },
    /// Commentary mode has changed
    ModeChanged { mode: Mode, previous: Mode },
}

/// A screen sample on the wire; the JPEG travels as base64
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenFrame {
    #[serde(default)]
    pub image_jpeg_base64: String,
    #[serde(default)]
    pub ocr_text: String,
    #[serde(default)]
    pub captured_at_epoch_millis: Option<i64>,
}

impl ScreenFrame {
    pub fn into_capture(self) -> Result<ScreenCapture, base64::DecodeError> {
        Ok(ScreenCapture {
            image_jpeg: BASE64.decode(self.image_jpeg_base64.trim())?,
            ocr_text: self.ocr_text,
            captured_at_epoch_millis: self
                .captured_at_epoch_millis
                .unwrap_or_else(now_epoch_millis),
        })
    }
}

/// Full daemon status snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonStatus {
    /// Daemon version
    pub version: String,

    /// Current commentary mode
    pub mode: Mode,

    pub settings: Settings,

    pub screen_capture_available: bool,

    pub accessibility_available: bool,

    pub notification_count: usize,

    /// Uptime in seconds
    pub uptime_secs: u64,
}
