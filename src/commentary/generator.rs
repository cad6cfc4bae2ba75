//! Contract with the text-generation backend

use async_trait::async_trait;

use crate::capability::AccessibilityCapture;
use crate::context::Snapshot;
use crate::settings::Settings;

/// Screen-derived payload for a single generation call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScreenPromptInput {
    /// Encoded JPEG of the screen
    Image(Vec<u8>),
    /// Text recognized on the screen
    OcrText(String),
    /// Text read from the accessibility tree, with window identity hints
    AccessibilityText {
        text: String,
        app_name: Option<String>,
        package_name: Option<String>,
        activity_name: Option<String>,
    },
}

impl ScreenPromptInput {
    /// Short label for logs
    pub fn kind(&self) -> &'static str {
        match self {
            ScreenPromptInput::Image(_) => "image",
            ScreenPromptInput::OcrText(_) => "ocr_text",
            ScreenPromptInput::AccessibilityText { .. } => "accessibility_text",
        }
    }
}

impl From<AccessibilityCapture> for ScreenPromptInput {
    fn from(capture: AccessibilityCapture) -> Self {
        ScreenPromptInput::AccessibilityText {
            text: capture.text,
            app_name: capture.app_name,
            package_name: capture.package_name,
            activity_name: capture.activity_name,
        }
    }
}

/// Errors a generator may report. The orchestrator treats all of them as a
/// blank result.
#[derive(Debug, thiserror::Error)]
pub enum GenerateError {
    #[error("generation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("backend request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("backend returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("backend response had no choices")]
    EmptyResponse,

    #[error("{0}")]
    Other(String),
}

/// Text generation backend. Implementations enforce their own timeout.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Comment on the aggregated ambient context
    async fn generate(&self, snapshot: &Snapshot, settings: &Settings)
        -> Result<String, GenerateError>;

    /// Comment on a screen-derived payload
    async fn generate_screen(
        &self,
        input: &ScreenPromptInput,
        settings: &Settings,
    ) -> Result<String, GenerateError>;
}
