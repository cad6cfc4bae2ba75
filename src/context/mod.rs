//! Ambient context aggregation
//!
//! Notification and media listeners push into the `ContextStore`, which keeps
//! one consistent `Snapshot` and publishes a `ContextEvent` per change.

mod events;
mod model;
mod store;

pub use events::ContextEvent;
pub use model::{
    now_epoch_millis, MediaKind, MediaState, NotificationPayload, NotificationRecord,
    PlaybackStatus, Snapshot, RECENT_NOTIFICATION_LIMIT,
};
pub use store::{ContextStore, EVENT_CAPACITY};
