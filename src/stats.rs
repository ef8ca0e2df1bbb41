//! Session counters and the monitoring artifact.
//!
//! The aggregator is written by the loop only. Monitoring gets immutable
//! [`StatsSnapshot`]s, either through the log or as JSON lines on disk.

use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::detection::ObjectClass;
use crate::dispatcher::{ActionOutcome, ActionRecord, ActionSubject};
use crate::error::Result;
use crate::search::{SearchState, SearchTransition};
use crate::session::SessionState;

/// Cycles kept for FPS and average cycle time.
const WINDOW: usize = 100;

/// Point-in-time copy of every counter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub session_id: Uuid,
    pub elapsed_secs: f64,
    pub session_state: SessionState,
    pub search_state: SearchState,
    pub cycles: u64,
    pub detections_seen: u64,
    /// Successful dispatches per class, plus "search"
    pub dispatched: BTreeMap<String, u64>,
    pub suppressed_by_cooldown: u64,
    pub suppressed_by_safety: u64,
    pub suppressed_by_fault: u64,
    pub capture_faults: u64,
    pub searches_started: u64,
    pub searches_completed: u64,
    pub search_secs_total: f64,
    pub fps: f64,
    pub avg_cycle_ms: f64,
}

impl StatsSnapshot {
    pub fn dispatched_for(&self, class: ObjectClass) -> u64 {
        self.dispatched.get(class.as_str()).copied().unwrap_or(0)
    }

    pub fn search_bursts(&self) -> u64 {
        self.dispatched.get("search").copied().unwrap_or(0)
    }

    pub fn total_dispatched(&self) -> u64 {
        self.dispatched.values().sum()
    }
}

#[derive(Debug)]
pub struct StatsAggregator {
    session_id: Uuid,
    cycles: u64,
    detections_seen: u64,
    dispatched: BTreeMap<String, u64>,
    suppressed_by_cooldown: u64,
    suppressed_by_safety: u64,
    suppressed_by_fault: u64,
    capture_faults: u64,
    searches_started: u64,
    searches_completed: u64,
    search_time: Duration,
    /// Processing time per cycle
    processing: VecDeque<Duration>,
    /// Start-to-start time per cycle
    periods: VecDeque<Duration>,
}

impl StatsAggregator {
    pub fn new(session_id: Uuid) -> Self {
        Self {
            session_id,
            cycles: 0,
            detections_seen: 0,
            dispatched: BTreeMap::new(),
            suppressed_by_cooldown: 0,
            suppressed_by_safety: 0,
            suppressed_by_fault: 0,
            capture_faults: 0,
            searches_started: 0,
            searches_completed: 0,
            search_time: Duration::ZERO,
            processing: VecDeque::with_capacity(WINDOW),
            periods: VecDeque::with_capacity(WINDOW),
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn record_action(&mut self, record: &ActionRecord) {
        match record.outcome {
            ActionOutcome::Dispatched => {
                let key = match record.subject {
                    ActionSubject::Class(class) => class.as_str(),
                    ActionSubject::Search => "search",
                };
                *self.dispatched.entry(key.to_string()).or_insert(0) += 1;
            }
            ActionOutcome::SuppressedByCooldown => self.suppressed_by_cooldown += 1,
            ActionOutcome::SuppressedBySafety => self.suppressed_by_safety += 1,
            ActionOutcome::SuppressedByFault => self.suppressed_by_fault += 1,
        }
    }

    pub fn record_search(&mut self, transition: &SearchTransition) {
        match transition {
            SearchTransition::Started => self.searches_started += 1,
            SearchTransition::ReturnStarted => {}
            SearchTransition::Ended { duration, .. } => {
                self.searches_completed += 1;
                self.search_time += *duration;
            }
        }
    }

    pub fn record_capture_fault(&mut self) {
        self.capture_faults += 1;
    }

    /// One finished cycle: how many detections it saw and how long it took.
    pub fn record_cycle(&mut self, detections: usize, processing: Duration) {
        self.cycles += 1;
        self.detections_seen += detections as u64;
        push_window(&mut self.processing, processing);
    }

    /// Time between the starts of two consecutive cycles.
    pub fn record_period(&mut self, period: Duration) {
        push_window(&mut self.periods, period);
    }

    pub fn fps(&self) -> f64 {
        let total: Duration = self.periods.iter().sum();
        if total.is_zero() {
            return 0.0;
        }
        self.periods.len() as f64 / total.as_secs_f64()
    }

    pub fn avg_cycle_ms(&self) -> f64 {
        if self.processing.is_empty() {
            return 0.0;
        }
        let total: Duration = self.processing.iter().sum();
        total.as_secs_f64() * 1000.0 / self.processing.len() as f64
    }

    pub fn snapshot(&self, elapsed: Duration, session: SessionState, search: SearchState) -> StatsSnapshot {
        StatsSnapshot {
            timestamp: Utc::now(),
            session_id: self.session_id,
            elapsed_secs: elapsed.as_secs_f64(),
            session_state: session,
            search_state: search,
            cycles: self.cycles,
            detections_seen: self.detections_seen,
            dispatched: self.dispatched.clone(),
            suppressed_by_cooldown: self.suppressed_by_cooldown,
            suppressed_by_safety: self.suppressed_by_safety,
            suppressed_by_fault: self.suppressed_by_fault,
            capture_faults: self.capture_faults,
            searches_started: self.searches_started,
            searches_completed: self.searches_completed,
            search_secs_total: self.search_time.as_secs_f64(),
            fps: self.fps(),
            avg_cycle_ms: self.avg_cycle_ms(),
        }
    }
}

fn push_window(window: &mut VecDeque<Duration>, value: Duration) {
    if window.len() >= WINDOW {
        window.pop_front();
    }
    window.push_back(value);
}

/// Appends snapshots to a JSON-lines file.
pub struct StatsWriter {
    path: PathBuf,
}

impl StatsWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append(&self, snapshot: &StatsSnapshot) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;

        let mut line = serde_json::to_string(snapshot)?;
        line.push('\n');
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}
