//! OpenAI-compatible chat completions backend
//!
//! Works against LM Studio, llama.cpp server, or OpenAI itself. Every reply
//! is clipped to its first sentence.

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::commentary::{GenerateError, Generator, ScreenPromptInput};
use crate::context::Snapshot;
use crate::settings::{Settings, DEFAULT_BASE_URL};

/// Upper bound on one completion request, connect to last byte
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Environment variable holding the optional API key
pub const API_KEY_ENV: &str = "MASCOT_API_KEY";

/// Sent when no key is configured; local servers ignore it
const PLACEHOLDER_API_KEY: &str = "lm-studio";

/// Characters that end the first sentence of a reply
const SENTENCE_TERMINATORS: &[char] = &['。', '！', '!', '？', '?'];

pub struct LlmClient {
    http: Client,
    api_key: Option<String>,
    timeout: Duration,
}

impl LlmClient {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            http: Client::new(),
            api_key: api_key
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty()),
            timeout: REQUEST_TIMEOUT,
        }
    }

    /// Read the API key from `MASCOT_API_KEY`
    pub fn from_env() -> Self {
        Self::new(std::env::var(API_KEY_ENV).ok())
    }

    async fn complete(&self, settings: &Settings, messages: Value) -> Result<String, GenerateError> {
        let url = format!("{}/chat/completions", normalize_base_url(&settings.base_url));
        let body = request_body(settings, messages);

        let request = async {
            let response = self
                .http
                .post(&url)
                .bearer_auth(self.api_key.as_deref().unwrap_or(PLACEHOLDER_API_KEY))
                .json(&body)
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(GenerateError::Status {
                    status: status.as_u16(),
                    body,
                });
            }

            let reply: ChatResponse = response.json().await?;
            reply_text(reply)
        };

        let text = tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| GenerateError::Timeout(self.timeout))??;

        debug!(model = %settings.model, chars = text.len(), "completion received");
        Ok(first_sentence(&text))
    }
}

#[async_trait]
impl Generator for LlmClient {
    async fn generate(
        &self,
        snapshot: &Snapshot,
        settings: &Settings,
    ) -> Result<String, GenerateError> {
        self.complete(settings, context_messages(snapshot, settings))
            .await
    }

    async fn generate_screen(
        &self,
        input: &ScreenPromptInput,
        settings: &Settings,
    ) -> Result<String, GenerateError> {
        self.complete(settings, screen_messages(input, settings))
            .await
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

fn reply_text(reply: ChatResponse) -> Result<String, GenerateError> {
    let mut choices = reply.choices.into_iter();
    let first = choices.next().ok_or(GenerateError::EmptyResponse)?;
    Ok(first.message.content.unwrap_or_default().trim().to_string())
}

/// Trim, drop a trailing slash, and make sure the URL ends in `/v1`
pub fn normalize_base_url(base_url: &str) -> String {
    let trimmed = base_url.trim();
    let trimmed = if trimmed.is_empty() {
        DEFAULT_BASE_URL
    } else {
        trimmed
    };
    let trimmed = trimmed.trim_end_matches('/');
    if trimmed.ends_with("/v1") {
        trimmed.to_string()
    } else {
        format!("{trimmed}/v1")
    }
}

/// Collapse newlines and cut after the first sentence terminator.
///
/// A `.` only ends a sentence when followed by whitespace or the end of the
/// text, so decimals and host names survive.
pub fn first_sentence(text: &str) -> String {
    let normalized = text.replace('\n', " ");
    let normalized = normalized.trim();
    let mut chars = normalized.char_indices().peekable();
    while let Some((idx, c)) = chars.next() {
        let ends = match c {
            '.' => chars.peek().map_or(true, |&(_, next)| next.is_whitespace()),
            c => SENTENCE_TERMINATORS.contains(&c),
        };
        if ends {
            return normalized[..idx + c.len_utf8()].trim().to_string();
        }
    }
    normalized.to_string()
}

fn system_prompt(settings: &Settings) -> String {
    format!(
        "You are a small mascot character living on the user's screen.\n\
         - Reply with exactly one short sentence.\n\
         - Tone: {}.\n\
         - No quotation marks.\n\
         - Never insult, threaten, discriminate, or guess personal information.",
        settings.persona_style
    )
}

fn request_body(settings: &Settings, messages: Value) -> Value {
    json!({
        "model": settings.model,
        "messages": messages,
        "max_tokens": settings.max_tokens,
        "temperature": settings.temperature,
        "stream": false,
    })
}

fn context_messages(snapshot: &Snapshot, settings: &Settings) -> Value {
    json!([
        { "role": "system", "content": system_prompt(settings) },
        {
            "role": "user",
            "content": format!(
                "Current context as JSON:\n{}\nSay one sentence about what is going on.",
                snapshot.to_prompt_json()
            ),
        },
    ])
}

fn screen_messages(input: &ScreenPromptInput, settings: &Settings) -> Value {
    let user = match input {
        ScreenPromptInput::Image(jpeg) => json!([
            { "type": "text", "text": "This is the current screen. Say one sentence about it." },
            {
                "type": "image_url",
                "image_url": { "url": format!("data:image/jpeg;base64,{}", BASE64.encode(jpeg)) },
            },
        ]),
        ScreenPromptInput::OcrText(text) => json!(format!(
            "Text recognized on the current screen:\n{text}\nSay one sentence about it."
        )),
        ScreenPromptInput::AccessibilityText {
            text,
            app_name,
            package_name,
            activity_name,
        } => {
            let mut hints = Vec::new();
            if let Some(app) = app_name {
                hints.push(format!("app: {app}"));
            }
            if let Some(package) = package_name {
                hints.push(format!("package: {package}"));
            }
            if let Some(activity) = activity_name {
                hints.push(format!("activity: {activity}"));
            }
            json!(format!(
                "Foreground window ({})\nVisible text:\n{text}\nSay one sentence about it.",
                if hints.is_empty() {
                    "unknown".to_string()
                } else {
                    hints.join(", ")
                }
            ))
        }
    };

    json!([
        { "role": "system", "content": system_prompt(settings) },
        { "role": "user", "content": user },
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_sentence() {
        assert_eq!(first_sentence("Hello there! How are you?"), "Hello there!");
        assert_eq!(first_sentence("  one line\nno stop  "), "one line no stop");
        assert_eq!(first_sentence("今日は晴れ。散歩しよう。"), "今日は晴れ。");
        assert_eq!(first_sentence("本当？うん"), "本当？");
        assert_eq!(first_sentence("   "), "");
        assert_eq!(first_sentence("Nice song. Enjoy it!"), "Nice song.");
        assert_eq!(first_sentence("Version 3.5 is out. Yay"), "Version 3.5 is out.");
        assert_eq!(first_sentence("Reading example.com now"), "Reading example.com now");
        assert_eq!(first_sentence("Done."), "Done.");
    }

    #[test]
    fn test_normalize_base_url() {
        assert_eq!(normalize_base_url("http://host:1234"), "http://host:1234/v1");
        assert_eq!(normalize_base_url("http://host:1234/v1/"), "http://host:1234/v1");
        assert_eq!(normalize_base_url("  "), DEFAULT_BASE_URL);
    }

    #[test]
    fn test_reply_text() {
        let reply: ChatResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"role":"assistant","content":"  Nice song.  "}}]}"#,
        )
        .unwrap();
        assert_eq!(reply_text(reply).unwrap(), "Nice song.");

        let empty: ChatResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert!(matches!(reply_text(empty), Err(GenerateError::EmptyResponse)));
    }

    #[test]
    fn test_image_prompt_uses_data_url() {
        let messages = screen_messages(&ScreenPromptInput::Image(vec![1, 2, 3]), &Settings::default());
        let url = messages[1]["content"][1]["image_url"]["url"].as_str().unwrap();
        assert_eq!(url, "data:image/jpeg;base64,AQID");
    }

    #[test]
    fn test_accessibility_prompt_includes_hints() {
        let input = ScreenPromptInput::AccessibilityText {
            text: "Inbox".to_string(),
            app_name: Some("Mail".to_string()),
            package_name: None,
            activity_name: Some("Main".to_string()),
        };
        let messages = screen_messages(&input, &Settings::default());
        let content = messages[1]["content"].as_str().unwrap();
        assert!(content.contains("app: Mail, activity: Main"));
        assert!(content.contains("Inbox"));
    }

    #[test]
    fn test_request_body_carries_settings() {
        let settings = Settings {
            model: "local-model".to_string(),
            max_tokens: 64,
            ..Settings::default()
        };
        let body = request_body(&settings, json!([]));
        assert_eq!(body["model"], "local-model");
        assert_eq!(body["max_tokens"], 64);
        assert_eq!(body["stream"], false);
    }

    #[test]
    fn test_blank_api_key_is_ignored() {
        assert!(LlmClient::new(Some("  ".to_string())).api_key.is_none());
        assert_eq!(
            LlmClient::new(Some(" sk-1 ".to_string())).api_key.as_deref(),
            Some("sk-1")
        );
    }
}
