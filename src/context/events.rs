//! Change notifications published by the `ContextStore`
//!
//! Consumed by the event-driven commentary mode.

use serde::{Deserialize, Serialize};

use super::model::{MediaKind, NotificationRecord, PlaybackStatus};

/// Events emitted whenever the ambient context changes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContextEvent {
    /// The set of active notifications changed
    Notification {
        /// Number of active notifications after the change
        total_count: usize,
        /// The notification that was just posted, if the change was a post
        #[serde(default)]
        latest: Option<NotificationRecord>,
        timestamp_ms: i64,
    },

    /// Media playback was updated or cleared
    Media {
        status: PlaybackStatus,
        kind: MediaKind,
        timestamp_ms: i64,
    },
}

impl ContextEvent {
    pub fn timestamp_ms(&self) -> i64 {
        match self {
            ContextEvent::Notification { timestamp_ms, .. } => *timestamp_ms,
            ContextEvent::Media { timestamp_ms, .. } => *timestamp_ms,
        }
    }
}

impl std::fmt::Display for ContextEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContextEvent::Notification { total_count, .. } => {
                write!(f, "NOTIFICATION ({} active)", total_count)
            }
            ContextEvent::Media { status, kind, .. } => {
                write!(f, "MEDIA ({:?}/{:?})", status, kind)
            }
        }
    }
}
