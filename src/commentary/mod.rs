//! Commentary engine
//!
//! Decides when to ask the generator for a comment and what to feed it,
//! then hands finalized utterances to the output sink.

mod cooldown;
mod fallback;
mod generator;
mod orchestrator;
mod trigger;

pub use cooldown::CooldownGate;
pub use fallback::{FallbackChain, FALLBACK_TEXT};
pub use generator::{GenerateError, Generator, ScreenPromptInput};
pub use orchestrator::Orchestrator;
pub use trigger::{AccessibilityTriggers, CaptureSchedule, EventTriggers, Trigger};
