//! Capability signals
//!
//! Two independent capabilities, each exposing a live availability flag:
//! - screen capture (image + OCR text)
//! - accessibility (window text + activity changes)

mod accessibility;
mod screen;

pub use accessibility::{
    AccessibilityBridge, AccessibilityCapture, AccessibilitySource, ActivityChange,
    ACTIVITY_CHANGE_CAPACITY,
};
pub use screen::{ScreenCapture, ScreenCaptureBridge, ScreenCaptureSource};
