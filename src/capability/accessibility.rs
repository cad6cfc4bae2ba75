//! Accessibility capability
//!
//! The accessibility tree walker pushes text snapshots of the foreground
//! window into an `AccessibilityBridge`. The bridge keeps the latest one and
//! derives activity-change signals from the package/activity identity.

use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};
use tracing::{debug, trace};

use crate::context::now_epoch_millis;

/// Buffered activity changes per receiver before the oldest are dropped
pub const ACTIVITY_CHANGE_CAPACITY: usize = 16;

/// Text extracted from the foreground window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessibilityCapture {
    pub text: String,
    #[serde(default)]
    pub app_name: Option<String>,
    #[serde(default)]
    pub package_name: Option<String>,
    #[serde(default)]
    pub activity_name: Option<String>,
    #[serde(default = "now_epoch_millis")]
    pub captured_at_epoch_millis: i64,
}

impl AccessibilityCapture {
    /// `package|activity`, or `None` when both parts are missing
    fn activity_key(&self) -> Option<String> {
        let key = format!(
            "{}|{}",
            self.package_name.as_deref().unwrap_or_default(),
            self.activity_name.as_deref().unwrap_or_default()
        );
        (key != "|").then_some(key)
    }
}

/// The foreground app/activity identity changed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityChange {
    pub package_name: Option<String>,
    pub activity_name: Option<String>,
    pub occurred_at_epoch_millis: i64,
}

/// Read side of the accessibility capability
#[async_trait]
pub trait AccessibilitySource: Send + Sync {
    /// Live availability flag
    fn availability(&self) -> watch::Receiver<bool>;

    /// Activity changes observed from now on
    fn activity_changes(&self) -> broadcast::Receiver<ActivityChange>;

    /// Latest text snapshot, if any
    async fn capture_once(&self) -> Option<AccessibilityCapture>;
}

#[derive(Default)]
struct BridgeState {
    latest: Option<AccessibilityCapture>,
    last_activity_key: Option<String>,
}

pub struct AccessibilityBridge {
    available: watch::Sender<bool>,
    activity_tx: broadcast::Sender<ActivityChange>,
    state: Mutex<BridgeState>,
}

impl Default for AccessibilityBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl AccessibilityBridge {
    pub fn new() -> Self {
        let (available, _) = watch::channel(false);
        let (activity_tx, _) = broadcast::channel(ACTIVITY_CHANGE_CAPACITY);
        Self {
            available,
            activity_tx,
            state: Mutex::new(BridgeState::default()),
        }
    }

    /// Attach or detach the accessibility service. Detaching clears the
    /// snapshot and forgets the last activity.
    pub fn set_available(&self, available: bool) {
        if !available {
            self.clear_snapshot();
        }
        let changed = self.available.send_if_modified(|current| {
            let changed = *current != available;
            *current = available;
            changed
        });
        if changed {
            debug!(available, "accessibility availability changed");
        }
    }

    /// Store the latest capture, signalling an activity change when the
    /// foreground identity differs from the previous capture
    pub fn update_snapshot(&self, capture: AccessibilityCapture) {
        let mut state = self.lock();
        let key = capture.activity_key();
        let change = ActivityChange {
            package_name: capture.package_name.clone(),
            activity_name: capture.activity_name.clone(),
            occurred_at_epoch_millis: capture.captured_at_epoch_millis,
        };
        state.latest = Some(capture);

        let Some(key) = key else {
            return;
        };
        if state.last_activity_key.as_deref() == Some(key.as_str()) {
            return;
        }
        debug!(activity = %key, "foreground activity changed");
        state.last_activity_key = Some(key);
        if self.activity_tx.send(change).is_err() {
            trace!("activity change published with no subscribers");
        }
    }

    pub fn is_available(&self) -> bool {
        *self.available.borrow()
    }

    pub fn clear_snapshot(&self) {
        let mut state = self.lock();
        state.latest = None;
        state.last_activity_key = None;
    }

    fn lock(&self) -> MutexGuard<'_, BridgeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl AccessibilitySource for AccessibilityBridge {
    fn availability(&self) -> watch::Receiver<bool> {
        self.available.subscribe()
    }

    fn activity_changes(&self) -> broadcast::Receiver<ActivityChange> {
        self.activity_tx.subscribe()
    }

    async fn capture_once(&self) -> Option<AccessibilityCapture> {
        self.lock().latest.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast::error::TryRecvError;

    fn capture(package: Option<&str>, activity: Option<&str>) -> AccessibilityCapture {
        AccessibilityCapture {
            text: "screen text".to_string(),
            app_name: Some("App".to_string()),
            package_name: package.map(str::to_string),
            activity_name: activity.map(str::to_string),
            captured_at_epoch_millis: 42,
        }
    }

    #[tokio::test]
    async fn test_activity_change_only_on_new_identity() {
        let bridge = AccessibilityBridge::new();
        let mut changes = bridge.activity_changes();

        bridge.update_snapshot(capture(Some("com.a"), Some("Main")));
        bridge.update_snapshot(capture(Some("com.a"), Some("Main")));
        bridge.update_snapshot(capture(Some("com.b"), Some("Main")));

        let first = changes.try_recv().unwrap();
        assert_eq!(first.package_name.as_deref(), Some("com.a"));
        assert_eq!(first.occurred_at_epoch_millis, 42);
        assert_eq!(
            changes.try_recv().unwrap().package_name.as_deref(),
            Some("com.b")
        );
        assert!(matches!(changes.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn test_change_without_subscribers_still_tracks_identity() {
        let bridge = AccessibilityBridge::new();
        bridge.update_snapshot(capture(Some("com.a"), Some("Main")));

        let mut changes = bridge.activity_changes();
        bridge.update_snapshot(capture(Some("com.a"), Some("Main")));
        assert!(matches!(changes.try_recv(), Err(TryRecvError::Empty)));

        bridge.update_snapshot(capture(Some("com.a"), Some("Detail")));
        assert_eq!(
            changes.try_recv().unwrap().activity_name.as_deref(),
            Some("Detail")
        );
    }

    #[tokio::test]
    async fn test_anonymous_capture_updates_text_without_change() {
        let bridge = AccessibilityBridge::new();
        let mut changes = bridge.activity_changes();

        bridge.update_snapshot(capture(None, None));
        assert!(matches!(changes.try_recv(), Err(TryRecvError::Empty)));
        assert_eq!(bridge.capture_once().await.unwrap().text, "screen text");
    }

    #[tokio::test]
    async fn test_detach_forgets_activity() {
        let bridge = AccessibilityBridge::new();
        bridge.set_available(true);
        let mut changes = bridge.activity_changes();

        bridge.update_snapshot(capture(Some("com.a"), Some("Main")));
        bridge.set_available(false);
        assert!(bridge.capture_once().await.is_none());

        bridge.set_available(true);
        bridge.update_snapshot(capture(Some("com.a"), Some("Main")));
        assert!(changes.try_recv().is_ok());
        assert!(changes.try_recv().is_ok());
    }

    #[test]
    fn test_capture_deserializes_with_defaults() {
        let json = r#"{"text": "hi", "packageName": "com.x"}"#;
        let capture: AccessibilityCapture = serde_json::from_str(json).unwrap();
        assert_eq!(capture.activity_key().as_deref(), Some("com.x|"));
        assert!(capture.captured_at_epoch_millis > 0);
    }
}
