//! # mobhunt
//!
//! Perceive, decide, act: a detection-driven controller for side-scrolling
//! games.
//!
//! Each cycle takes the detections of one frame, picks the most wanted
//! target (or wanders to find one), and emits at most one input action,
//! under runtime and pointer-failsafe limits.
//!
//! ## Safety
//!
//! Real input needs the `input` feature. Without it every action goes to a
//! recording mock, and the pointer failsafe (move the mouse into the
//! configured corner) stops a live session at once.

pub mod capture;
pub mod cli;
pub mod config;
pub mod detection;
pub mod dispatcher;
pub mod error;
pub mod hunt;
pub mod input;
pub mod logging;
pub mod prioritizer;
pub mod safety;
pub mod search;
pub mod session;
pub mod stats;

pub use config::{ConfigManager, HuntConfig};
pub use detection::{DetectedObject, Detector, ObjectClass};
pub use error::{Error, Result};
pub use hunt::{CycleInput, CycleReport, HuntLoop, RunLimits};
pub use input::{InputSimulator, Key};
pub use session::{ControlInbox, ControlSignal, SessionState};
