//! Screen capture capability
//!
//! The capture pipeline (projection + OCR) runs outside the daemon and pushes
//! frames into a `ScreenCaptureBridge`. The orchestrator only sees the
//! `ScreenCaptureSource` side.

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::debug;

/// One sampled screen: the encoded image plus its recognized text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScreenCapture {
    pub image_jpeg: Vec<u8>,
    pub ocr_text: String,
    pub captured_at_epoch_millis: i64,
}

/// Read side of the screen capture capability
#[async_trait]
pub trait ScreenCaptureSource: Send + Sync {
    /// Live availability flag
    fn availability(&self) -> watch::Receiver<bool>;

    /// Sample the screen once; `None` when nothing can be captured
    async fn capture_once(&self) -> Option<ScreenCapture>;
}

/// Holds the most recent frame pushed by the capture pipeline until a
/// capture consumes it
pub struct ScreenCaptureBridge {
    available: watch::Sender<bool>,
    latest: Mutex<Option<ScreenCapture>>,
}

impl Default for ScreenCaptureBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl ScreenCaptureBridge {
    pub fn new() -> Self {
        let (available, _) = watch::channel(false);
        Self {
            available,
            latest: Mutex::new(None),
        }
    }

    /// Attach or detach the capture pipeline. Detaching drops the held frame.
    pub fn set_available(&self, available: bool) {
        if !available {
            *self.latest.lock().unwrap_or_else(PoisonError::into_inner) = None;
        }
        let changed = self.available.send_if_modified(|current| {
            let changed = *current != available;
            *current = available;
            changed
        });
        if changed {
            debug!(available, "screen capture availability changed");
        }
    }

    /// Store a fresh frame for the next `capture_once`
    pub fn update_frame(&self, frame: ScreenCapture) {
        *self.latest.lock().unwrap_or_else(PoisonError::into_inner) = Some(frame);
    }

    pub fn is_available(&self) -> bool {
        *self.available.borrow()
    }
}

#[async_trait]
impl ScreenCaptureSource for ScreenCaptureBridge {
    fn availability(&self) -> watch::Receiver<bool> {
        self.available.subscribe()
    }

    async fn capture_once(&self) -> Option<ScreenCapture> {
        if !self.is_available() {
            return None;
        }
        // Each frame is commented on once; a stalled pipeline yields `None`
        self.latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}
