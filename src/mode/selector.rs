//! Mode definitions and selection
//!
//! Pure logic: the active mode is recomputed from the latest settings and
//! capability flags on every change and never stored.

use serde::{Deserialize, Serialize};

use crate::settings::{AnalysisMode, Settings};

/// Which screen payload the capture mode sends first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureKind {
    /// Image first, OCR text as fallback
    Multimodal,
    /// OCR text only
    Ocr,
}

/// The four commentary modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(tag = "mode", content = "capture", rename_all = "snake_case")]
pub enum Mode {
    /// Commentary switched off
    #[default]
    Disabled,
    /// React to notification and media events
    EventOnly,
    /// Periodically comment on screen captures
    ScreenCapture(CaptureKind),
    /// Comment on accessibility text, periodically and on activity changes
    Accessibility,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Disabled => write!(f, "Disabled"),
            Mode::EventOnly => write!(f, "EventOnly"),
            Mode::ScreenCapture(CaptureKind::Multimodal) => write!(f, "ScreenCapture(Multimodal)"),
            Mode::ScreenCapture(CaptureKind::Ocr) => write!(f, "ScreenCapture(OCR)"),
            Mode::Accessibility => write!(f, "Accessibility"),
        }
    }
}

/// Select the mode for the given settings and capability flags.
///
/// Priority:
/// 1. Disabled (commentary off)
/// 2. EventOnly (screen analysis off)
/// 3. ScreenCapture for MULTIMODAL/OCR when capture is available
/// 4. Accessibility for ACCESSIBILITY when the service is available
/// 5. EventOnly otherwise, including unknown analysis modes
pub fn select(
    settings: &Settings,
    screen_capture_available: bool,
    accessibility_available: bool,
) -> Mode {
    if !settings.enabled {
        return Mode::Disabled;
    }
    if !settings.screen_analysis_enabled {
        return Mode::EventOnly;
    }

    match settings.analysis_mode {
        AnalysisMode::Multimodal if screen_capture_available => {
            Mode::ScreenCapture(CaptureKind::Multimodal)
        }
        AnalysisMode::Ocr if screen_capture_available => Mode::ScreenCapture(CaptureKind::Ocr),
        AnalysisMode::Accessibility if accessibility_available => Mode::Accessibility,
        _ => Mode::EventOnly,
    }
}
