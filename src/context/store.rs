//! Thread-safe aggregation of ambient signals.
//!
//! Signal producers (notification and media listeners) call the mutation
//! methods from any thread. Each mutation is applied under one mutex, the
//! resulting `Snapshot` is swapped into a `watch` channel in a single step,
//! and a `ContextEvent` is pushed into a bounded broadcast channel.
//!
//! The broadcast channel never blocks a producer: when a slow receiver falls
//! more than `EVENT_CAPACITY` events behind, the oldest buffered events are
//! overwritten and the receiver sees `RecvError::Lagged` before resuming at
//! the oldest retained event.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::{broadcast, watch};
use tracing::{debug, trace};

use super::events::ContextEvent;
use super::model::{
    now_epoch_millis, MediaKind, MediaState, NotificationPayload, NotificationRecord,
    PlaybackStatus, Snapshot, RECENT_NOTIFICATION_LIMIT,
};

/// Pending events buffered per receiver before the oldest are dropped
pub const EVENT_CAPACITY: usize = 32;

struct Entry {
    /// Insertion order, breaks ties between equal `posted_at` timestamps
    seq: u64,
    record: NotificationRecord,
}

#[derive(Default)]
struct StoreState {
    notifications: HashMap<String, Entry>,
    next_seq: u64,
    media: Option<MediaState>,
}

/// Aggregates notifications and media playback into one `Snapshot`
pub struct ContextStore {
    state: Mutex<StoreState>,
    snapshot_tx: watch::Sender<Snapshot>,
    event_tx: broadcast::Sender<ContextEvent>,
}

impl Default for ContextStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextStore {
    pub fn new() -> Self {
        let (snapshot_tx, _) = watch::channel(Snapshot::default());
        let (event_tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            state: Mutex::new(StoreState::default()),
            snapshot_tx,
            event_tx,
        }
    }

    /// Latest snapshot
    pub fn snapshot(&self) -> Snapshot {
        self.snapshot_tx.borrow().clone()
    }

    /// Watch every snapshot replacement
    pub fn watch_snapshot(&self) -> watch::Receiver<Snapshot> {
        self.snapshot_tx.subscribe()
    }

    /// Subscribe to context events published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<ContextEvent> {
        self.event_tx.subscribe()
    }

    /// Insert or replace a notification by key
    pub fn on_notification_posted(&self, payload: NotificationPayload) {
        let mut state = self.lock();
        let (key, record) = payload.into_record();
        debug!(%key, app = %record.app_name, "notification posted");

        let seq = state.next_seq;
        state.next_seq += 1;
        state.notifications.insert(
            key,
            Entry {
                seq,
                record: record.clone(),
            },
        );
        self.publish_notifications(&state, Some(record));
    }

    /// Remove a notification; publishes only when the key was present
    pub fn on_notification_removed(&self, key: &str) {
        let mut state = self.lock();
        if state.notifications.remove(key).is_none() {
            trace!(%key, "removal of unknown notification ignored");
            return;
        }
        debug!(%key, "notification removed");
        self.publish_notifications(&state, None);
    }

    /// Replace every active notification, used for the initial sync
    pub fn replace_active_notifications(&self, payloads: Vec<NotificationPayload>) {
        let mut state = self.lock();
        state.notifications.clear();
        for payload in payloads {
            let (key, record) = payload.into_record();
            let seq = state.next_seq;
            state.next_seq += 1;
            state.notifications.insert(key, Entry { seq, record });
        }
        debug!(count = state.notifications.len(), "notifications replaced");
        self.publish_notifications(&state, None);
    }

    /// Overwrite the media slot
    pub fn on_media_updated(&self, media: MediaState) {
        let mut state = self.lock();
        let event = ContextEvent::Media {
            status: media.status,
            kind: media.kind,
            timestamp_ms: now_epoch_millis(),
        };
        debug!(app = %media.app_name, status = ?media.status, "media updated");
        state.media = Some(media);
        self.publish(&state, event);
    }

    /// Empty the media slot
    pub fn clear_media(&self) {
        let mut state = self.lock();
        state.media = None;
        debug!("media cleared");
        let event = ContextEvent::Media {
            status: PlaybackStatus::None,
            kind: MediaKind::Unknown,
            timestamp_ms: now_epoch_millis(),
        };
        self.publish(&state, event);
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish_notifications(&self, state: &StoreState, latest: Option<NotificationRecord>) {
        let event = ContextEvent::Notification {
            total_count: state.notifications.len(),
            latest,
            timestamp_ms: now_epoch_millis(),
        };
        self.publish(state, event);
    }

    /// Swap in a snapshot derived from `state`, then emit `event`.
    ///
    /// Called with the state lock held so snapshots and events keep the order
    /// in which mutations were applied.
    fn publish(&self, state: &StoreState, event: ContextEvent) {
        let mut entries: Vec<&Entry> = state.notifications.values().collect();
        entries.sort_by(|a, b| {
            b.record
                .posted_at_epoch_millis
                .cmp(&a.record.posted_at_epoch_millis)
                .then(b.seq.cmp(&a.seq))
        });
        let recent: Vec<NotificationRecord> = entries
            .into_iter()
            .take(RECENT_NOTIFICATION_LIMIT)
            .map(|entry| entry.record.clone())
            .collect();

        self.snapshot_tx.send_modify(|snapshot| {
            snapshot.version += 1;
            snapshot.notification_count = state.notifications.len();
            snapshot.recent_notifications = recent;
            snapshot.media_playback = state.media.clone();
            snapshot.updated_at_epoch_millis = now_epoch_millis();
        });

        if self.event_tx.send(event).is_err() {
            trace!("context event published with no subscribers");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::sync::broadcast::error::{RecvError, TryRecvError};

    fn media(status: PlaybackStatus) -> MediaState {
        MediaState {
            package_name: "com.test.music".to_string(),
            app_name: "Music".to_string(),
            status,
            kind: MediaKind::Music,
            title: Some("Song".to_string()),
            artist: Some("Artist".to_string()),
        }
    }

    #[test]
    fn test_aggregates_notifications() {
        let store = ContextStore::new();
        store.on_notification_posted(
            NotificationPayload::new("a", "YouTube").with_category("social").posted_at(100),
        );
        store.on_notification_posted(
            NotificationPayload::new("b", "YouTube").with_category("social").posted_at(200),
        );
        store.on_notification_posted(
            NotificationPayload::new("c", "Gmail").with_category("email").posted_at(300),
        );

        let snapshot = store.snapshot();
        assert_eq!(snapshot.notification_count, 3);
        let apps: Vec<&str> = snapshot
            .recent_notifications
            .iter()
            .map(|n| n.app_name.as_str())
            .collect();
        assert_eq!(apps, vec!["Gmail", "YouTube", "YouTube"]);
        assert_eq!(snapshot.recent_notifications[1].posted_at_epoch_millis, 200);
    }

    #[test]
    fn test_recent_notifications_capped_newest_first() {
        let store = ContextStore::new();
        for i in 0..12 {
            store.on_notification_posted(
                NotificationPayload::new(format!("k{i}"), "App").posted_at(1_000 + i),
            );
        }

        let snapshot = store.snapshot();
        assert_eq!(snapshot.notification_count, 12);
        assert_eq!(snapshot.recent_notifications.len(), RECENT_NOTIFICATION_LIMIT);
        let times: Vec<i64> = snapshot
            .recent_notifications
            .iter()
            .map(|n| n.posted_at_epoch_millis)
            .collect();
        assert_eq!(times, (1_004..1_012).rev().collect::<Vec<_>>());
    }

    #[test]
    fn test_same_key_replaces_record() {
        let store = ContextStore::new();
        store.on_notification_posted(NotificationPayload::new("a", "Chat").posted_at(1));
        store.on_notification_posted(NotificationPayload::new("a", "Chat v2").posted_at(2));

        let snapshot = store.snapshot();
        assert_eq!(snapshot.notification_count, 1);
        assert_eq!(snapshot.recent_notifications[0].app_name, "Chat v2");
    }

    #[test]
    fn test_equal_timestamps_order_by_insertion() {
        let store = ContextStore::new();
        store.on_notification_posted(NotificationPayload::new("first", "A").posted_at(5));
        store.on_notification_posted(NotificationPayload::new("second", "B").posted_at(5));

        let snapshot = store.snapshot();
        assert_eq!(snapshot.recent_notifications[0].app_name, "B");
        assert_eq!(snapshot.recent_notifications[1].app_name, "A");
    }

    #[test]
    fn test_remove_unknown_key_does_not_publish() {
        let store = ContextStore::new();
        store.on_notification_posted(NotificationPayload::new("a", "Chat"));
        let mut events = store.subscribe();
        let version = store.snapshot().version;

        store.on_notification_removed("missing");
        assert_eq!(store.snapshot().version, version);
        assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));

        store.on_notification_removed("a");
        let snapshot = store.snapshot();
        assert_eq!(snapshot.version, version + 1);
        assert_eq!(snapshot.notification_count, 0);
        assert!(matches!(
            events.try_recv(),
            Ok(ContextEvent::Notification { total_count: 0, latest: None, .. })
        ));
    }

    #[test]
    fn test_replace_active_notifications() {
        let store = ContextStore::new();
        store.on_notification_posted(NotificationPayload::new("old", "Old"));
        let mut events = store.subscribe();

        store.replace_active_notifications(vec![
            NotificationPayload::new("x", "X").posted_at(10),
            NotificationPayload::new("y", "Y").posted_at(20),
        ]);

        let snapshot = store.snapshot();
        assert_eq!(snapshot.notification_count, 2);
        assert_eq!(snapshot.recent_notifications[0].app_name, "Y");
        assert!(matches!(
            events.try_recv(),
            Ok(ContextEvent::Notification { total_count: 2, .. })
        ));

        store.replace_active_notifications(Vec::new());
        assert_eq!(store.snapshot().notification_count, 0);
        assert!(events.try_recv().is_ok());
    }

    #[test]
    fn test_posted_event_carries_latest_record() {
        let store = ContextStore::new();
        let mut events = store.subscribe();
        store.on_notification_posted(NotificationPayload::new("n1", "Sample").with_category("msg"));

        match events.try_recv() {
            Ok(ContextEvent::Notification {
                total_count,
                latest: Some(latest),
                ..
            }) => {
                assert_eq!(total_count, 1);
                assert_eq!(latest.app_name, "Sample");
                assert_eq!(latest.category.as_deref(), Some("msg"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_media_update_and_clear() {
        let store = ContextStore::new();
        let mut events = store.subscribe();

        store.on_media_updated(media(PlaybackStatus::Playing));
        assert_eq!(
            store.snapshot().media_playback.map(|m| m.status),
            Some(PlaybackStatus::Playing)
        );
        assert!(matches!(
            events.try_recv(),
            Ok(ContextEvent::Media {
                status: PlaybackStatus::Playing,
                kind: MediaKind::Music,
                ..
            })
        ));

        store.clear_media();
        assert!(store.snapshot().media_playback.is_none());
        assert!(matches!(
            events.try_recv(),
            Ok(ContextEvent::Media {
                status: PlaybackStatus::None,
                kind: MediaKind::Unknown,
                ..
            })
        ));
    }

    #[test]
    fn test_media_does_not_touch_notifications() {
        let store = ContextStore::new();
        store.on_notification_posted(NotificationPayload::new("a", "Chat"));
        store.on_media_updated(media(PlaybackStatus::Paused));

        let snapshot = store.snapshot();
        assert_eq!(snapshot.notification_count, 1);
        assert_eq!(snapshot.version, 2);
    }

    #[tokio::test]
    async fn test_overflow_drops_oldest_events() {
        let store = ContextStore::new();
        let mut events = store.subscribe();

        for i in 0..(EVENT_CAPACITY + 8) {
            store.on_notification_posted(NotificationPayload::new(format!("k{i}"), "App"));
        }

        assert!(matches!(events.recv().await, Err(RecvError::Lagged(8))));
        match events.recv().await {
            Ok(ContextEvent::Notification { total_count, .. }) => assert_eq!(total_count, 9),
            other => panic!("unexpected event: {other:?}"),
        }

        let mut last = 0;
        while let Ok(ContextEvent::Notification { total_count, .. }) = events.try_recv() {
            last = total_count;
        }
        assert_eq!(last, EVENT_CAPACITY + 8);
        // snapshot is unaffected by event loss
        assert_eq!(store.snapshot().notification_count, EVENT_CAPACITY + 8);
    }

    #[test]
    fn test_concurrent_producers() {
        let store = Arc::new(ContextStore::new());
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for i in 0..50 {
                        store.on_notification_posted(NotificationPayload::new(
                            format!("t{t}-{i}"),
                            format!("App{t}"),
                        ));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = store.snapshot();
        assert_eq!(snapshot.notification_count, 200);
        assert_eq!(snapshot.version, 200);
        assert_eq!(snapshot.recent_notifications.len(), RECENT_NOTIFICATION_LIMIT);
    }
}
