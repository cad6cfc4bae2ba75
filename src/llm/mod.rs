//! Text generation backend

mod client;

pub use client::{first_sentence, normalize_base_url, LlmClient, API_KEY_ENV, REQUEST_TIMEOUT};
