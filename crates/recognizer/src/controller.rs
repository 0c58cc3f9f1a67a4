//! Timing state machine around [`RecognitionSession`].
//!
//! The controller is driven by one event at a time: screen-on, catalog load
//! completion, and key transitions. Timeouts are evaluated when the next key
//! event arrives; there is no background timer, so a stalled session simply
//! waits to be replaced by the next screen-on.

use std::{sync::Arc, time::Duration};

use shared::domain::{KeyAction, KeyCode, KeyEvent};
use tracing::{debug, info, warn};

use crate::{
    catalog::{CatalogError, GestureCatalog},
    session::RecognitionSession,
    HapticPulse, Haptics, MessageDispatcher,
};

/// Maximum delay between screen-on and the first key-down of an attempt.
pub const START_TIMEOUT: Duration = Duration::from_millis(3000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerConfig {
    pub start_timeout: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            start_timeout: START_TIMEOUT,
        }
    }
}

/// Identifies one screen-on. Catalog results tagged with an older id are discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttemptId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Loading,
    AwaitingFirstKey,
    Tracking,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyOutcome {
    /// No attempt is armed, the catalog is still loading, or the event was noise.
    Ignored,
    /// The first key-down came after the start timeout.
    Abandoned,
    /// First qualifying key-down; a session now exists.
    Started,
    /// Key-down recorded on an existing session.
    Pressed,
    /// A press was captured and candidates remain.
    Captured { remaining: usize },
    Matched { gesture: String, message: String },
    Exhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingKeyDown {
    key: KeyCode,
    at_ms: u64,
}

enum State {
    Idle,
    Loading {
        attempt: AttemptId,
        screen_on_at: u64,
    },
    AwaitingFirstKey {
        attempt: AttemptId,
        screen_on_at: u64,
        catalog: Arc<GestureCatalog>,
    },
    Tracking {
        attempt: AttemptId,
        session: RecognitionSession,
        pending: Option<PendingKeyDown>,
    },
}

pub struct RecognitionController {
    config: ControllerConfig,
    state: State,
    last_attempt: u64,
    dispatcher: Arc<dyn MessageDispatcher>,
    haptics: Arc<dyn Haptics>,
}

impl RecognitionController {
    pub fn new(
        config: ControllerConfig,
        dispatcher: Arc<dyn MessageDispatcher>,
        haptics: Arc<dyn Haptics>,
    ) -> Self {
        Self {
            config,
            state: State::Idle,
            last_attempt: 0,
            dispatcher,
            haptics,
        }
    }

    pub fn phase(&self) -> Phase {
        match self.state {
            State::Idle => Phase::Idle,
            State::Loading { .. } => Phase::Loading,
            State::AwaitingFirstKey { .. } => Phase::AwaitingFirstKey,
            State::Tracking { .. } => Phase::Tracking,
        }
    }

    pub fn current_attempt(&self) -> Option<AttemptId> {
        match &self.state {
            State::Idle => None,
            State::Loading { attempt, .. }
            | State::AwaitingFirstKey { attempt, .. }
            | State::Tracking { attempt, .. } => Some(*attempt),
        }
    }

    pub fn session(&self) -> Option<&RecognitionSession> {
        match &self.state {
            State::Tracking { session, .. } => Some(session),
            _ => None,
        }
    }

    /// Starts a new attempt, discarding whatever was in progress.
    /// The caller loads the catalog and reports back through [`Self::on_catalog_loaded`].
    pub fn on_screen_on(&mut self, at_ms: u64) -> AttemptId {
        if let State::Tracking { session, .. } = &self.state {
            info!(
                inputs = session.inputs().len(),
                candidates = session.candidate_count(),
                "screen on; discarding unfinished gesture"
            );
        }

        self.last_attempt += 1;
        let attempt = AttemptId(self.last_attempt);
        self.state = State::Loading {
            attempt,
            screen_on_at: at_ms,
        };
        self.haptics.pulse(HapticPulse::ARMED);
        info!(attempt = attempt.0, at_ms, "screen on; gesture tracking armed");
        attempt
    }

    pub fn on_catalog_loaded(
        &mut self,
        attempt: AttemptId,
        result: Result<Arc<GestureCatalog>, CatalogError>,
    ) {
        let screen_on_at = match self.state {
            State::Loading {
                attempt: current,
                screen_on_at,
            } if current == attempt => screen_on_at,
            _ => {
                debug!(attempt = attempt.0, "dropping catalog for superseded attempt");
                return;
            }
        };

        match result {
            Ok(catalog) => {
                info!(
                    attempt = attempt.0,
                    gestures = catalog.len(),
                    "gesture catalog loaded"
                );
                self.state = State::AwaitingFirstKey {
                    attempt,
                    screen_on_at,
                    catalog,
                };
            }
            Err(err) => {
                warn!(attempt = attempt.0, error = %err, "gesture catalog unavailable; attempt inert");
                self.state = State::Idle;
            }
        }
    }

    /// Synchronous screen-on for hosts that load the catalog inline.
    pub fn on_screen_on_with(
        &mut self,
        at_ms: u64,
        result: Result<Arc<GestureCatalog>, CatalogError>,
    ) -> AttemptId {
        let attempt = self.on_screen_on(at_ms);
        self.on_catalog_loaded(attempt, result);
        attempt
    }

    pub fn on_key_event(&mut self, event: KeyEvent) -> KeyOutcome {
        match event.action {
            KeyAction::Down => self.on_key_down(event.key, event.at_ms),
            KeyAction::Up => self.on_key_up(event.key, event.at_ms),
        }
    }

    fn on_key_down(&mut self, key: KeyCode, at_ms: u64) -> KeyOutcome {
        let start_timeout_ms = self.config.start_timeout.as_millis() as u64;
        match &mut self.state {
            State::Idle => KeyOutcome::Ignored,
            State::Loading { .. } => {
                debug!(%key, "catalog not loaded yet; dropping key-down");
                KeyOutcome::Ignored
            }
            State::AwaitingFirstKey {
                attempt,
                screen_on_at,
                catalog,
            } => {
                let elapsed = at_ms.saturating_sub(*screen_on_at);
                if elapsed > start_timeout_ms {
                    info!(%key, elapsed_ms = elapsed, "first key too late; abandoning attempt");
                    self.state = State::Idle;
                    return KeyOutcome::Abandoned;
                }

                debug!(%key, elapsed_ms = elapsed, "first key-down; tracking gesture");
                self.state = State::Tracking {
                    attempt: *attempt,
                    session: RecognitionSession::new(catalog.clone()),
                    pending: Some(PendingKeyDown { key, at_ms }),
                };
                KeyOutcome::Started
            }
            State::Tracking { pending, .. } => {
                *pending = Some(PendingKeyDown { key, at_ms });
                KeyOutcome::Pressed
            }
        }
    }

    fn on_key_up(&mut self, key: KeyCode, at_ms: u64) -> KeyOutcome {
        let outcome = match &mut self.state {
            State::Tracking {
                session, pending, ..
            } => {
                let Some(down) = pending.filter(|down| down.key == key) else {
                    debug!(%key, "key-up without matching key-down; ignoring");
                    return KeyOutcome::Ignored;
                };
                *pending = None;

                let duration_ms = at_ms.saturating_sub(down.at_ms);
                session.add_input(key, duration_ms);
                debug!(
                    %key,
                    duration_ms,
                    inputs = session.inputs().len(),
                    candidates = session.candidate_count(),
                    "captured key press"
                );

                if let Some(gesture) = session.matched_gesture() {
                    KeyOutcome::Matched {
                        gesture: gesture.name.clone(),
                        message: gesture.message.clone(),
                    }
                } else if !session.can_still_match() {
                    KeyOutcome::Exhausted
                } else {
                    KeyOutcome::Captured {
                        remaining: session.candidate_count(),
                    }
                }
            }
            State::Loading { .. } => {
                debug!(%key, "catalog not loaded yet; dropping key-up");
                return KeyOutcome::Ignored;
            }
            State::Idle | State::AwaitingFirstKey { .. } => return KeyOutcome::Ignored,
        };

        match &outcome {
            KeyOutcome::Matched { gesture, message } => {
                info!(gesture = %gesture, "gesture matched; dispatching message");
                self.dispatcher.dispatch(message);
                self.haptics.pulse(HapticPulse::CONFIRMED);
                self.state = State::Idle;
            }
            KeyOutcome::Exhausted => {
                info!("no gesture matches the captured presses; attempt finished");
                self.state = State::Idle;
            }
            _ => {}
        }
        outcome
    }
}

#[cfg(test)]
#[path = "tests/controller_tests.rs"]
mod tests;
