//! Ordered generation attempts for screen-derived commentary
//!
//! Every chain ends in `FALLBACK_TEXT`, so the returned text is never blank.

use tracing::{debug, warn};

use super::generator::{GenerateError, Generator, ScreenPromptInput};
use crate::capability::{AccessibilityCapture, ScreenCapture};
use crate::mode::CaptureKind;
use crate::settings::Settings;

/// Said whenever no readable screen text survives the chain
pub const FALLBACK_TEXT: &str = "I couldn't read the screen, so I'll take another look next time.";

pub struct FallbackChain<'a> {
    generator: &'a dyn Generator,
    settings: &'a Settings,
}

impl<'a> FallbackChain<'a> {
    pub fn new(generator: &'a dyn Generator, settings: &'a Settings) -> Self {
        Self {
            generator,
            settings,
        }
    }

    /// Image first (multimodal only), then OCR text, then the literal
    pub async fn screen(&self, kind: CaptureKind, capture: Option<ScreenCapture>) -> String {
        let Some(capture) = capture else {
            debug!("no screen capture available");
            return FALLBACK_TEXT.to_string();
        };

        if kind == CaptureKind::Multimodal && !capture.image_jpeg.is_empty() {
            let text = self
                .attempt(ScreenPromptInput::Image(capture.image_jpeg))
                .await;
            if !text.is_empty() {
                return text;
            }
            debug!("image commentary blank, falling back to OCR text");
        }

        let ocr = capture.ocr_text.trim();
        if ocr.is_empty() {
            return FALLBACK_TEXT.to_string();
        }
        self.or_fallback(self.attempt(ScreenPromptInput::OcrText(ocr.to_string())).await)
    }

    /// Accessibility text, then the literal
    pub async fn accessibility(&self, capture: Option<AccessibilityCapture>) -> String {
        let Some(mut capture) = capture else {
            debug!("no accessibility snapshot available");
            return FALLBACK_TEXT.to_string();
        };

        let text = capture.text.trim();
        if text.is_empty() {
            return FALLBACK_TEXT.to_string();
        }
        capture.text = text.to_string();
        self.or_fallback(self.attempt(ScreenPromptInput::from(capture)).await)
    }

    /// One generator call; failures count as blank
    async fn attempt(&self, input: ScreenPromptInput) -> String {
        let kind = input.kind();
        match self.generator.generate_screen(&input, self.settings).await {
            Ok(text) => text.trim().to_string(),
            Err(e) => {
                log_failure(kind, &e);
                String::new()
            }
        }
    }

    fn or_fallback(&self, text: String) -> String {
        if text.is_empty() {
            FALLBACK_TEXT.to_string()
        } else {
            text
        }
    }
}

fn log_failure(kind: &str, error: &GenerateError) {
    warn!(input = kind, error = %error, "screen commentary failed");
}
