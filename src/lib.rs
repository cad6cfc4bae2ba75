//! mascot-daemon: ambient commentary engine for an on-screen mascot
//!
//! Aggregates notification and media signals into a context snapshot,
//! picks a commentary mode from settings and capability availability, and
//! turns triggers into short utterances via a text-generation backend.

pub mod capability;
pub mod commentary;
pub mod config;
pub mod context;
pub mod ipc;
pub mod lifecycle;
pub mod llm;
pub mod mode;
pub mod settings;
