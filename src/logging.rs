//! Logging for mobhunt.
//!
//! Everything goes through `tracing`. [`init`] installs the subscriber
//! (stderr, optionally JSON, optionally teed to a file) and [`HuntEvent`]
//! gives lifecycle events stable numeric IDs so they can be filtered:
//!
//! ```text
//! MOBHUNT_LOG=info mobhunt run --replay hunt.jsonl 2>&1 | grep 'MOBHUNT\[13'
//! ```

use std::fmt;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt as tracing_fmt, EnvFilter, Layer, Registry};

use crate::config::LoggingConfig;
use crate::error::{Error, Result};

/// Environment variable checked before `RUST_LOG`.
pub const LOG_ENV: &str = "MOBHUNT_LOG";

// ============================================================================
// Subscriber
// ============================================================================

/// Subscriber options, from config plus command-line overrides.
#[derive(Debug, Clone, Default)]
pub struct LogOptions {
    pub level: String,
    pub json: bool,
    pub file: Option<PathBuf>,
}

impl LogOptions {
    pub fn from_config(config: &LoggingConfig) -> Self {
        Self {
            level: config.level.clone(),
            json: config.json,
            file: config.file.clone(),
        }
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        if debug {
            self.level = "debug".into();
        }
        self
    }

    pub fn with_json(mut self, json: bool) -> Self {
        self.json |= json;
        self
    }
}

/// Install the global subscriber. Call once.
pub fn init(options: &LogOptions) -> Result<()> {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .or_else(|_| EnvFilter::try_new(&options.level))
        .map_err(|e| Error::Logging(format!("bad log filter '{}': {}", options.level, e)))?;

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();
    if options.json {
        layers.push(tracing_fmt::layer().json().with_writer(std::io::stderr).boxed());
    } else {
        layers.push(
            tracing_fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr)
                .boxed(),
        );
    }

    if let Some(path) = &options.file {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        layers.push(
            tracing_fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .boxed(),
        );
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .map_err(|e| Error::Logging(e.to_string()))
}

// ============================================================================
// Lifecycle events
// ============================================================================

/// Event IDs for filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u32)]
pub enum EventId {
    // Informational (1000-1099)
    SessionStart = 1000,
    SessionPaused = 1001,
    SessionResumed = 1002,
    SessionStop = 1003,
    SearchStarted = 1010,
    SearchEnded = 1011,
    StatsEmitted = 1020,

    // Warnings (1100-1199)
    CaptureFault = 1100,
    InputFault = 1101,
    StatsWriteFailed = 1110,

    // Critical (1300-1399)
    SafetyTrip = 1300,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LogLevel {
    Info,
    Warning,
    Critical,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warning => write!(f, "WARNING"),
            LogLevel::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Structured lifecycle event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HuntEvent {
    pub timestamp: DateTime<Utc>,
    pub event_id: EventId,
    pub level: LogLevel,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed_secs: Option<f64>,
}

impl HuntEvent {
    pub fn new(event_id: EventId, level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            event_id,
            level,
            message: message.into(),
            session_id: None,
            reason: None,
            elapsed_secs: None,
        }
    }

    pub fn info(event_id: EventId, message: impl Into<String>) -> Self {
        Self::new(event_id, LogLevel::Info, message)
    }

    pub fn warning(event_id: EventId, message: impl Into<String>) -> Self {
        Self::new(event_id, LogLevel::Warning, message)
    }

    pub fn critical(event_id: EventId, message: impl Into<String>) -> Self {
        Self::new(event_id, LogLevel::Critical, message)
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_elapsed(mut self, secs: f64) -> Self {
        self.elapsed_secs = Some(secs);
        self
    }

    /// `MOBHUNT[<id>] level=.. key=value .. msg=..`
    pub fn to_line(&self) -> String {
        let mut parts = vec![
            format!("MOBHUNT[{}]", self.event_id as u32),
            format!("level={}", self.level),
        ];

        if let Some(ref session) = self.session_id {
            parts.push(format!("session={}", &session[..8.min(session.len())]));
        }
        if let Some(ref reason) = self.reason {
            let escaped = reason.replace('"', "\\\"").replace('\n', " ");
            parts.push(format!("reason=\"{}\"", escaped));
        }
        if let Some(secs) = self.elapsed_secs {
            parts.push(format!("elapsed={:.1}s", secs));
        }

        parts.push(format!("msg={}", self.message));
        parts.join(" ")
    }

    /// Send to the tracing subscriber at the matching level.
    pub fn emit(&self) {
        let id = self.event_id as u32;
        let line = self.to_line();
        match self.level {
            LogLevel::Info => info!(event_id = id, "{}", line),
            LogLevel::Warning => warn!(event_id = id, "{}", line),
            LogLevel::Critical => error!(event_id = id, "{}", line),
        }
    }
}
