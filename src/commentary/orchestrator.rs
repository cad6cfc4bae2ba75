//! Commentary supervisor
//!
//! Watches (settings, screen capture flag, accessibility flag). Whenever that
//! triple changes by value, the running mode task is cancelled and awaited,
//! the mode is reselected, and a fresh task starts with fresh local state.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::cooldown::CooldownGate;
use super::fallback::FallbackChain;
use super::generator::Generator;
use super::trigger::{AccessibilityTriggers, CaptureSchedule, EventTriggers, Trigger};
use crate::capability::{AccessibilitySource, ScreenCaptureSource};
use crate::context::ContextStore;
use crate::mode::{self, CaptureKind, Mode};
use crate::settings::{Settings, SettingsSource};

/// Everything the mode selection depends on
#[derive(Debug, Clone, PartialEq)]
struct RuntimeState {
    settings: Settings,
    screen_capture_available: bool,
    accessibility_available: bool,
}

impl RuntimeState {
    fn mode(&self) -> Mode {
        mode::select(
            &self.settings,
            self.screen_capture_available,
            self.accessibility_available,
        )
    }
}

/// Composition root of the commentary engine
pub struct Orchestrator {
    store: Arc<ContextStore>,
    generator: Arc<dyn Generator>,
    screen: Arc<dyn ScreenCaptureSource>,
    accessibility: Arc<dyn AccessibilitySource>,
    settings: SettingsSource,
    mode_tx: watch::Sender<Mode>,
}

impl Orchestrator {
    pub fn new(
        store: Arc<ContextStore>,
        generator: Arc<dyn Generator>,
        screen: Arc<dyn ScreenCaptureSource>,
        accessibility: Arc<dyn AccessibilitySource>,
        settings: SettingsSource,
    ) -> Self {
        let (mode_tx, _) = watch::channel(Mode::default());
        Self {
            store,
            generator,
            screen,
            accessibility,
            settings,
            mode_tx,
        }
    }

    /// The currently active mode
    pub fn mode_watch(&self) -> watch::Receiver<Mode> {
        self.mode_tx.subscribe()
    }

    /// Run until `shutdown` fires, sending finalized utterances to `sink`
    pub async fn run(self, sink: mpsc::Sender<String>, shutdown: CancellationToken) {
        let mut settings_rx = self.settings.clone();
        let mut screen_rx = self.screen.availability();
        let mut accessibility_rx = self.accessibility.availability();
        let (mut settings_open, mut screen_open, mut accessibility_open) = (true, true, true);

        let mut current: Option<RuntimeState> = None;
        let mut running: Option<ModeTask> = None;

        info!("commentary orchestrator started");

        loop {
            let state = RuntimeState {
                settings: settings_rx.borrow_and_update().clone(),
                screen_capture_available: *screen_rx.borrow_and_update(),
                accessibility_available: *accessibility_rx.borrow_and_update(),
            };

            if current.as_ref() != Some(&state) {
                if let Some(task) = running.take() {
                    task.stop().await;
                }

                let mode = state.mode();
                let previous = *self.mode_tx.borrow();
                // Restarts within the same mode stay silent to watchers
                self.mode_tx.send_if_modified(|active| {
                    let changed = *active != mode;
                    *active = mode;
                    changed
                });
                info!(
                    mode = %mode,
                    previous = %previous,
                    screen_capture = state.screen_capture_available,
                    accessibility = state.accessibility_available,
                    "commentary mode selected"
                );

                running = Some(self.spawn_mode(
                    mode,
                    state.settings.clone(),
                    sink.clone(),
                    shutdown.child_token(),
                ));
                current = Some(state);
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                res = settings_rx.changed(), if settings_open => {
                    if res.is_err() {
                        debug!("settings source closed, keeping last settings");
                        settings_open = false;
                    }
                }
                res = screen_rx.changed(), if screen_open => {
                    if res.is_err() {
                        screen_open = false;
                    }
                }
                res = accessibility_rx.changed(), if accessibility_open => {
                    if res.is_err() {
                        accessibility_open = false;
                    }
                }
            }
        }

        if let Some(task) = running.take() {
            task.stop().await;
        }
        info!("commentary orchestrator stopped");
    }

    fn spawn_mode(
        &self,
        mode: Mode,
        settings: Settings,
        sink: mpsc::Sender<String>,
        token: CancellationToken,
    ) -> ModeTask {
        let ctx = ModeContext {
            store: self.store.clone(),
            generator: self.generator.clone(),
            screen: self.screen.clone(),
            accessibility: self.accessibility.clone(),
            settings,
            sink,
            token: token.clone(),
        };

        let handle = tokio::spawn(async move {
            match mode {
                Mode::Disabled => ctx.token.cancelled().await,
                Mode::EventOnly => ctx.run_event_only().await,
                Mode::ScreenCapture(kind) => ctx.run_screen_capture(kind).await,
                Mode::Accessibility => ctx.run_accessibility().await,
            }
            debug!(mode = %mode, "mode task finished");
        });

        ModeTask { token, handle }
    }
}

/// Handle to the single running mode task
struct ModeTask {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl ModeTask {
    /// Cancel and wait until the task is gone
    async fn stop(self) {
        self.token.cancel();
        if let Err(e) = self.handle.await {
            if e.is_panic() {
                warn!(error = %e, "mode task panicked");
            }
        }
    }
}

/// State owned by one mode task. Dropped with the task.
struct ModeContext {
    store: Arc<ContextStore>,
    generator: Arc<dyn Generator>,
    screen: Arc<dyn ScreenCaptureSource>,
    accessibility: Arc<dyn AccessibilitySource>,
    settings: Settings,
    sink: mpsc::Sender<String>,
    token: CancellationToken,
}

impl ModeContext {
    /// Drive `fut` unless the task is cancelled first
    async fn until_cancelled<F: Future>(&self, fut: F) -> Option<F::Output> {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => None,
            out = fut => Some(out),
        }
    }

    /// Forward non-blank text to the sink. Returns whether anything was sent.
    async fn emit(&self, text: &str) -> bool {
        let text = text.trim();
        if text.is_empty() || self.token.is_cancelled() {
            return false;
        }
        match self.until_cancelled(self.sink.send(text.to_string())).await {
            Some(Ok(())) => true,
            Some(Err(_)) => {
                debug!("utterance sink closed");
                false
            }
            None => false,
        }
    }

    async fn run_event_only(&self) {
        let mut triggers = EventTriggers::new(self.store.subscribe());
        let mut gate = CooldownGate::new(self.settings.cooldown());

        loop {
            let event = match self.until_cancelled(triggers.next()).await {
                Some(Some(event)) => event,
                Some(None) => {
                    debug!("context event stream closed");
                    self.token.cancelled().await;
                    return;
                }
                None => return,
            };

            let now = Instant::now();
            if !gate.is_open(now) {
                debug!(
                    event = %event,
                    remaining_ms = gate.remaining(now).as_millis() as u64,
                    "event dropped by cooldown"
                );
                continue;
            }

            let snapshot = self.store.snapshot().with_event_focus(&event);
            let Some(result) = self
                .until_cancelled(self.generator.generate(&snapshot, &self.settings))
                .await
            else {
                return;
            };

            let text = match result {
                Ok(text) => text,
                Err(e) => {
                    warn!(error = %e, event = %event, "event commentary failed");
                    continue;
                }
            };

            if self.emit(&text).await {
                gate.record(now);
            }
        }
    }

    async fn run_screen_capture(&self, kind: CaptureKind) {
        let schedule = CaptureSchedule::new(self.settings.capture_interval());
        let chain = FallbackChain::new(self.generator.as_ref(), &self.settings);

        loop {
            let Some(capture) = self.until_cancelled(self.screen.capture_once()).await else {
                return;
            };
            let Some(text) = self.until_cancelled(chain.screen(kind, capture)).await else {
                return;
            };
            self.emit(&text).await;

            if self.until_cancelled(schedule.wait()).await.is_none() {
                return;
            }
        }
    }

    async fn run_accessibility(&self) {
        let mut triggers = AccessibilityTriggers::new(
            self.settings.capture_interval(),
            self.accessibility.activity_changes(),
        );
        let mut gate = CooldownGate::new(self.settings.cooldown());
        let chain = FallbackChain::new(self.generator.as_ref(), &self.settings);

        loop {
            let Some(trigger) = self.until_cancelled(triggers.next()).await else {
                return;
            };

            let now = Instant::now();
            if trigger == Trigger::ActivityChange && !gate.is_open(now) {
                debug!(
                    remaining_ms = gate.remaining(now).as_millis() as u64,
                    "activity change dropped by cooldown"
                );
                continue;
            }

            let Some(capture) = self
                .until_cancelled(self.accessibility.capture_once())
                .await
            else {
                return;
            };
            let Some(text) = self.until_cancelled(chain.accessibility(capture)).await else {
                return;
            };

            if self.emit(&text).await && trigger == Trigger::ActivityChange {
                gate.record(now);
            }
        }
    }
}
