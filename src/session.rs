//! Session run state and control keys.
//!
//! Control keys arrive from other threads (stdin reader, Ctrl+C handler) but
//! never touch the session directly: they land in a [`ControlInbox`] that the
//! loop drains at the top of each cycle.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::safety::StopReason;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    #[default]
    Running,
    Paused,
    /// Terminal
    Stopped,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Running => write!(f, "running"),
            SessionState::Paused => write!(f, "paused"),
            SessionState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Why the session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopCause {
    /// Stop key or Ctrl+C
    User,
    Safety(StopReason),
    /// Detection replay ran out or the cycle limit was hit
    Exhausted,
}

impl fmt::Display for StopCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopCause::User => write!(f, "stopped by user"),
            StopCause::Safety(reason) => write!(f, "{}", reason),
            StopCause::Exhausted => write!(f, "input exhausted"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlSignal {
    TogglePause,
    Stop,
}

/// Owns [`SessionState`]. Only the loop mutates it.
#[derive(Debug, Default)]
pub struct SessionController {
    state: SessionState,
    stop_cause: Option<StopCause>,
}

impl SessionController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_state(&self) -> SessionState {
        self.state
    }

    pub fn should_act(&self) -> bool {
        self.state == SessionState::Running
    }

    pub fn is_stopped(&self) -> bool {
        self.state == SessionState::Stopped
    }

    pub fn stop_cause(&self) -> Option<StopCause> {
        self.stop_cause
    }

    /// Running <-> Paused. No effect once stopped.
    pub fn toggle_pause(&mut self) -> SessionState {
        self.state = match self.state {
            SessionState::Running => SessionState::Paused,
            SessionState::Paused => SessionState::Running,
            SessionState::Stopped => SessionState::Stopped,
        };
        if self.state != SessionState::Stopped {
            info!(state = %self.state, "Session toggled");
        }
        self.state
    }

    /// Idempotent: the first cause sticks.
    pub fn stop(&mut self, cause: StopCause) {
        if self.state == SessionState::Stopped {
            return;
        }
        self.state = SessionState::Stopped;
        self.stop_cause = Some(cause);
        info!(cause = %cause, "Session stopped");
    }

    /// Apply a control signal.
    pub fn apply(&mut self, signal: ControlSignal) {
        match signal {
            ControlSignal::TogglePause => {
                self.toggle_pause();
            }
            ControlSignal::Stop => self.stop(StopCause::User),
        }
    }
}

/// Single-slot mailbox for control keys.
///
/// At most one toggle is pending at a time (repeated presses before the loop
/// looks collapse into one); a stop is sticky and wins.
#[derive(Debug, Clone, Default)]
pub struct ControlInbox {
    toggle: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
}

impl ControlInbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn send(&self, signal: ControlSignal) {
        match signal {
            ControlSignal::TogglePause => {
                self.toggle.store(true, Ordering::SeqCst);
            }
            ControlSignal::Stop => self.stop.store(true, Ordering::SeqCst),
        }
    }

    pub fn request_pause_toggle(&self) {
        self.send(ControlSignal::TogglePause);
    }

    pub fn request_stop(&self) {
        self.send(ControlSignal::Stop);
    }

    /// Drain the pending signal, if any.
    pub fn take(&self) -> Option<ControlSignal> {
        let toggle = self.toggle.swap(false, Ordering::SeqCst);
        if self.stop.load(Ordering::SeqCst) {
            return Some(ControlSignal::Stop);
        }
        toggle.then_some(ControlSignal::TogglePause)
    }
}
