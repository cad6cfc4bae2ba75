//! Commentary mode selection
//!
//! Four modes, derived from settings and capability availability:
//! - Disabled: no commentary
//! - EventOnly: react to notification/media events
//! - ScreenCapture: periodic image/OCR commentary
//! - Accessibility: periodic and activity-driven accessibility commentary

mod selector;

pub use selector::{select, CaptureKind, Mode};
