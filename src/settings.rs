//! Commentary settings
//!
//! `Settings` is an immutable value: every change replaces it wholesale and
//! the orchestrator observes the live sequence through a `watch` channel.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Bounds for `screen_capture_interval_sec`
pub const MIN_CAPTURE_INTERVAL_SEC: u32 = 5;
pub const MAX_CAPTURE_INTERVAL_SEC: u32 = 600;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:1234/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Live, replace-on-change sequence of settings.
pub type SettingsSource = watch::Receiver<Settings>;

/// How the screen is turned into generator input when screen analysis is on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", from = "String")]
pub enum AnalysisMode {
    /// Send the captured image, fall back to OCR text
    Multimodal,
    /// Send OCR text only
    Ocr,
    /// Send the accessibility tree text
    Accessibility,
    /// A mode this build does not know about
    Unknown,
}

impl From<String> for AnalysisMode {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_uppercase().as_str() {
            "MULTIMODAL" | "MULTIMODAL_ONLY" => Self::Multimodal,
            "OCR" | "OCR_ONLY" => Self::Ocr,
            "ACCESSIBILITY" | "ACCESSIBILITY_ONLY" => Self::Accessibility,
            _ => Self::Unknown,
        }
    }
}

impl std::fmt::Display for AnalysisMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnalysisMode::Multimodal => write!(f, "MULTIMODAL"),
            AnalysisMode::Ocr => write!(f, "OCR"),
            AnalysisMode::Accessibility => write!(f, "ACCESSIBILITY"),
            AnalysisMode::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// User-facing commentary settings.
///
/// The connection fields (`base_url`, `model`, `max_tokens`, `temperature`,
/// `persona_style`) are only read by the generator backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub enabled: bool,
    pub cooldown_sec: u32,
    pub screen_analysis_enabled: bool,
    pub analysis_mode: AnalysisMode,
    pub screen_capture_interval_sec: u32,
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub persona_style: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            enabled: true,
            cooldown_sec: 20,
            screen_analysis_enabled: false,
            analysis_mode: AnalysisMode::Multimodal,
            screen_capture_interval_sec: 30,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: 1024,
            temperature: 0.9,
            persona_style: "friendly".to_string(),
        }
    }
}

impl Settings {
    /// Clamp every field into its valid range.
    pub fn normalized(mut self) -> Self {
        self.cooldown_sec = self.cooldown_sec.max(1);
        self.screen_capture_interval_sec = self
            .screen_capture_interval_sec
            .clamp(MIN_CAPTURE_INTERVAL_SEC, MAX_CAPTURE_INTERVAL_SEC);
        self.max_tokens = self.max_tokens.clamp(16, 1024);
        self.temperature = if self.temperature.is_finite() {
            self.temperature.clamp(0.0, 2.0)
        } else {
            Settings::default().temperature
        };
        if self.base_url.trim().is_empty() {
            self.base_url = DEFAULT_BASE_URL.to_string();
        }
        if self.model.trim().is_empty() {
            self.model = DEFAULT_MODEL.to_string();
        }
        if self.persona_style.trim().is_empty() {
            self.persona_style = Settings::default().persona_style;
        }
        self
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(u64::from(self.cooldown_sec))
    }

    pub fn capture_interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.screen_capture_interval_sec))
    }

    /// Load settings from a JSON file, using defaults when it does not exist
    pub fn load_or_default(path: &Path) -> Result<Self, SettingsError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read(path)?;
        let settings: Settings = serde_json::from_slice(&raw)?;
        Ok(settings.normalized())
    }

    /// Persist settings as pretty JSON
    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_vec_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

/// Errors from reading or writing the settings file
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("settings file i/o failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("settings file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalized_clamps_ranges() {
        let settings = Settings {
            cooldown_sec: 0,
            screen_capture_interval_sec: 1,
            max_tokens: 5000,
            temperature: 7.5,
            base_url: "  ".to_string(),
            model: String::new(),
            ..Settings::default()
        }
        .normalized();

        assert_eq!(settings.cooldown_sec, 1);
        assert_eq!(settings.screen_capture_interval_sec, MIN_CAPTURE_INTERVAL_SEC);
        assert_eq!(settings.max_tokens, 1024);
        assert_eq!(settings.temperature, 2.0);
        assert_eq!(settings.base_url, DEFAULT_BASE_URL);
        assert_eq!(settings.model, DEFAULT_MODEL);

        let settings = Settings {
            screen_capture_interval_sec: 10_000,
            ..Settings::default()
        }
        .normalized();
        assert_eq!(settings.screen_capture_interval_sec, MAX_CAPTURE_INTERVAL_SEC);
    }

    #[test]
    fn test_unknown_analysis_mode_deserializes() {
        let json = r#"{"enabled": true, "analysisMode": "HOLOGRAM"}"#;
        let settings: Settings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.analysis_mode, AnalysisMode::Unknown);
        assert_eq!(settings.cooldown_sec, 20);
    }

    #[test]
    fn test_legacy_analysis_mode_names() {
        let json = r#"{"analysisMode": "OCR_ONLY", "screenAnalysisEnabled": true}"#;
        let settings: Settings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.analysis_mode, AnalysisMode::Ocr);
        assert!(settings.screen_analysis_enabled);
    }

    #[test]
    fn test_serialization_uses_camel_case() {
        let json = serde_json::to_string(&Settings::default()).unwrap();
        assert!(json.contains("cooldownSec"));
        assert!(json.contains("\"analysisMode\":\"MULTIMODAL\""));
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let path = std::env::temp_dir().join("mascot-daemon-missing-settings.json");
        let _ = std::fs::remove_file(&path);
        let settings = Settings::load_or_default(&path).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_save_then_load() {
        let path = std::env::temp_dir()
            .join(format!("mascot-daemon-settings-{}", std::process::id()))
            .join("settings.json");
        let settings = Settings {
            cooldown_sec: 3,
            analysis_mode: AnalysisMode::Accessibility,
            ..Settings::default()
        };
        settings.save(&path).unwrap();

        let loaded = Settings::load_or_default(&path).unwrap();
        assert_eq!(loaded.cooldown_sec, 3);
        assert_eq!(loaded.analysis_mode, AnalysisMode::Accessibility);

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }
}
