//! Ambient context values: notifications, media playback, and the
//! aggregated `Snapshot` handed to the generator.

use serde::{Deserialize, Serialize};

use super::events::ContextEvent;

/// Maximum number of notifications kept in `Snapshot::recent_notifications`
pub const RECENT_NOTIFICATION_LIMIT: usize = 8;

/// Current wall clock in epoch milliseconds
pub fn now_epoch_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlaybackStatus {
    #[default]
    None,
    Playing,
    Paused,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MediaKind {
    #[default]
    Unknown,
    Music,
    Video,
}

/// A notification as delivered by the notification listener.
///
/// `key` is the listener's stable identity for the notification; posting the
/// same key again replaces the earlier record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPayload {
    pub key: String,
    pub app_name: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default = "now_epoch_millis")]
    pub posted_at_epoch_millis: i64,
}

impl NotificationPayload {
    pub fn new(key: impl Into<String>, app_name: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            app_name: app_name.into(),
            category: None,
            title: None,
            body: None,
            posted_at_epoch_millis: now_epoch_millis(),
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn posted_at(mut self, epoch_millis: i64) -> Self {
        self.posted_at_epoch_millis = epoch_millis;
        self
    }

    pub(crate) fn into_record(self) -> (String, NotificationRecord) {
        (
            self.key,
            NotificationRecord {
                app_name: self.app_name,
                category: self.category,
                title: self.title,
                body: self.body,
                posted_at_epoch_millis: self.posted_at_epoch_millis,
            },
        )
    }
}

/// A notification as held by the store and exposed in snapshots
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRecord {
    pub app_name: String,
    pub category: Option<String>,
    pub title: Option<String>,
    /// Kept for the store, never serialized into prompts
    #[serde(skip_serializing)]
    #[serde(default)]
    pub body: Option<String>,
    pub posted_at_epoch_millis: i64,
}

/// Media session update from the media listener
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaState {
    pub package_name: String,
    pub app_name: String,
    pub status: PlaybackStatus,
    pub kind: MediaKind,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub artist: Option<String>,
}

/// Single consistent view of the ambient context.
///
/// Replaced as a whole on every mutation; `version` increases by one with
/// each replacement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub version: u64,
    pub notification_count: usize,
    /// Newest first, at most `RECENT_NOTIFICATION_LIMIT` entries
    pub recent_notifications: Vec<NotificationRecord>,
    pub media_playback: Option<MediaState>,
    pub updated_at_epoch_millis: i64,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            version: 0,
            notification_count: 0,
            recent_notifications: Vec::new(),
            media_playback: None,
            updated_at_epoch_millis: now_epoch_millis(),
        }
    }
}

impl Snapshot {
    /// Narrow the notification list to the one that triggered `event`.
    pub fn with_event_focus(mut self, event: &ContextEvent) -> Self {
        if let ContextEvent::Notification {
            latest: Some(latest),
            ..
        } = event
        {
            self.recent_notifications = vec![latest.clone()];
        }
        self
    }

    /// Context payload embedded in generator prompts
    pub fn to_prompt_json(&self) -> String {
        serde_json::json!({
            "notificationCount": self.notification_count,
            "recentNotifications": self.recent_notifications,
            "mediaPlayback": self.media_playback,
            "updatedAtEpochMillis": self.updated_at_epoch_millis,
        })
        .to_string()
    }
}
