//! Trigger sources: when a mode task should attempt a generation
//!
//! - EventOnly waits on context events
//! - ScreenCapture sleeps a fixed interval after every attempt
//! - Accessibility merges a periodic ticker with activity changes

use std::time::Duration;

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, warn};

use crate::capability::ActivityChange;
use crate::context::ContextEvent;

/// Shortest period accepted by the timers
const MIN_PERIOD: Duration = Duration::from_secs(1);

/// Why an accessibility generation attempt fired
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// The periodic ticker fired; never subject to the cooldown gate
    Periodic,
    /// The foreground activity changed; gated by the cooldown
    ActivityChange,
}

/// Context events as triggers for event-driven commentary
pub struct EventTriggers {
    events: broadcast::Receiver<ContextEvent>,
}

impl EventTriggers {
    pub fn new(events: broadcast::Receiver<ContextEvent>) -> Self {
        Self { events }
    }

    /// Next event, or `None` once the store is gone. Cancel safe.
    pub async fn next(&mut self) -> Option<ContextEvent> {
        loop {
            match self.events.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "context event receiver lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

/// Fixed pause between screen capture attempts
pub struct CaptureSchedule {
    interval: Duration,
}

impl CaptureSchedule {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval: interval.max(MIN_PERIOD),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub async fn wait(&self) {
        tokio::time::sleep(self.interval).await;
    }
}

/// Periodic ticks (first one immediately) merged with activity changes
pub struct AccessibilityTriggers {
    ticker: Interval,
    activity: broadcast::Receiver<ActivityChange>,
    activity_open: bool,
}

impl AccessibilityTriggers {
    pub fn new(period: Duration, activity: broadcast::Receiver<ActivityChange>) -> Self {
        let mut ticker = tokio::time::interval(period.max(MIN_PERIOD));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            ticker,
            activity,
            activity_open: true,
        }
    }

    /// Next trigger. Cancel safe.
    pub async fn next(&mut self) -> Trigger {
        loop {
            tokio::select! {
                _ = self.ticker.tick() => return Trigger::Periodic,
                change = self.activity.recv(), if self.activity_open => match change {
                    Ok(_) => return Trigger::ActivityChange,
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(skipped, "activity changes coalesced");
                        return Trigger::ActivityChange;
                    }
                    Err(RecvError::Closed) => {
                        debug!("activity change stream closed, periodic only");
                        self.activity_open = false;
                    }
                },
            }
        }
    }
}
