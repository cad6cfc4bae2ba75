//! Debounce between generations gated by the same timer

use std::time::Duration;

use tokio::time::Instant;

/// Minimum spacing between two gated generations.
///
/// Each mode task owns its own gate, so a mode switch always starts from an
/// open gate.
#[derive(Debug, Clone)]
pub struct CooldownGate {
    window: Duration,
    last_generated_at: Option<Instant>,
}

impl CooldownGate {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_generated_at: None,
        }
    }

    /// True when at least `window` has elapsed since the last recorded generation
    pub fn is_open(&self, now: Instant) -> bool {
        match self.last_generated_at {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.window,
        }
    }

    /// Time left before the gate opens again
    pub fn remaining(&self, now: Instant) -> Duration {
        self.last_generated_at
            .map(|last| self.window.saturating_sub(now.saturating_duration_since(last)))
            .unwrap_or_default()
    }

    pub fn record(&mut self, at: Instant) {
        self.last_generated_at = Some(at);
    }
}
