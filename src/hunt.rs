//! The hunt loop: perceive, decide, act.
//!
//! One cooperative loop owns every piece of mutable state. Each cycle:
//!
//! 1. drain the control inbox, advance the active clock
//! 2. capture a frame and run the detector (skipped while paused)
//! 3. safety check (also while paused)
//! 4. pick a target, or let the search machine move
//! 5. dispatch at most one action, record stats
//! 6. sleep out the rest of `scan_interval`
//!
//! [`HuntLoop::cycle`] runs steps 1 and 3-5 on a prepared [`CycleInput`];
//! [`HuntLoop::run`] is the driver that does the I/O and pacing around it.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::capture::{Frame, FrameSource};
use crate::config::HuntConfig;
use crate::detection::{DetectedObject, DetectionAdapter, Detector, ObjectClass};
use crate::dispatcher::{ActionDispatcher, ActionOutcome, ActionRecord, Directive};
use crate::error::Result;
use crate::input::InputSimulator;
use crate::logging::{EventId, HuntEvent};
use crate::prioritizer::{Target, TargetPrioritizer};
use crate::safety::{SafetyGovernor, SafetyVerdict};
use crate::search::{SearchMachine, SearchState, SearchTransition};
use crate::session::{ControlInbox, ControlSignal, SessionController, SessionState, StopCause};
use crate::stats::{StatsAggregator, StatsSnapshot, StatsWriter};

// ============================================================================
// Cycle types
// ============================================================================

/// Everything a cycle needs from the outside world.
#[derive(Debug, Clone)]
pub struct CycleInput {
    /// Session wall time
    pub now: Duration,
    /// Pointer position, `None` if unknown
    pub pointer: Option<(i32, i32)>,
    /// Frame and its detections; `None` when nothing was captured
    pub perception: Option<(Frame, Vec<DetectedObject>)>,
}

/// What a cycle did.
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub session_state: SessionState,
    pub search_state: SearchState,
    pub target: Option<Target>,
    pub record: Option<ActionRecord>,
    pub transition: Option<SearchTransition>,
    pub detections: usize,
}

impl CycleReport {
    pub fn acted(&self) -> bool {
        self.record
            .as_ref()
            .map_or(false, |r| r.outcome.is_dispatched())
    }
}

/// Bounds for [`HuntLoop::run`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RunLimits {
    /// Stop after this many cycles
    pub max_cycles: Option<u64>,
}

// ============================================================================
// Loop
// ============================================================================

pub struct HuntLoop {
    config: HuntConfig,
    session_id: Uuid,
    adapter: DetectionAdapter,
    prioritizer: TargetPrioritizer,
    search: SearchMachine,
    safety: SafetyGovernor,
    session: SessionController,
    dispatcher: ActionDispatcher,
    stats: StatsAggregator,
    stats_writer: Option<StatsWriter>,
    inbox: ControlInbox,
    input: Arc<dyn InputSimulator>,
    /// Time spent Running, drives the search windows
    active: Duration,
    last_tick: Option<Duration>,
}

impl HuntLoop {
    /// Validate the configuration and wire up the components.
    pub fn new(config: HuntConfig, input: Arc<dyn InputSimulator>) -> Result<Self> {
        config.validate()?;
        let session_id = Uuid::new_v4();
        Ok(Self {
            adapter: DetectionAdapter::new(config.automation.confidence_threshold),
            prioritizer: TargetPrioritizer::new(&config),
            search: SearchMachine::new(config.mob_hunting.clone()),
            safety: SafetyGovernor::new(&config.safety),
            session: SessionController::new(),
            dispatcher: ActionDispatcher::new(&config, input.clone()),
            stats: StatsAggregator::new(session_id),
            stats_writer: config.stats.path.clone().map(StatsWriter::new),
            inbox: ControlInbox::new(),
            input,
            active: Duration::ZERO,
            last_tick: None,
            session_id,
            config,
        })
    }

    /// Seed the random search pattern.
    pub fn with_search_seed(mut self, seed: u64) -> Self {
        self.search = SearchMachine::with_seed(self.config.mob_hunting.clone(), seed);
        self
    }

    /// Handle for control keys; clone it into other threads.
    pub fn inbox(&self) -> ControlInbox {
        self.inbox.clone()
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn session_state(&self) -> SessionState {
        self.session.current_state()
    }

    pub fn stop_cause(&self) -> Option<StopCause> {
        self.session.stop_cause()
    }

    pub fn search_state(&self) -> SearchState {
        self.search.state()
    }

    pub fn active_time(&self) -> Duration {
        self.active
    }

    pub fn snapshot(&self, now: Duration) -> StatsSnapshot {
        self.stats
            .snapshot(now, self.session.current_state(), self.search.state())
    }

    /// One decision cycle on prepared input.
    pub async fn cycle(&mut self, input: CycleInput) -> CycleReport {
        self.begin_cycle(input.now);
        let report = self.decide(input).await;
        self.stats.record_cycle(report.detections, Duration::ZERO);
        report
    }

    /// Drain control signals and advance the active clock.
    fn begin_cycle(&mut self, now: Duration) {
        // The interval since the last cycle counts if it was spent Running.
        if let Some(prev) = self.last_tick {
            if self.session.should_act() {
                self.active += now.saturating_sub(prev);
            }
        }
        self.last_tick = Some(now);

        if let Some(signal) = self.inbox.take() {
            let before = self.session.current_state();
            self.session.apply(signal);
            let after = self.session.current_state();
            if before != after {
                let event = match (signal, after) {
                    (ControlSignal::Stop, _) => {
                        HuntEvent::info(EventId::SessionStop, "Stop requested").with_reason("user")
                    }
                    (_, SessionState::Paused) => HuntEvent::info(EventId::SessionPaused, "Paused"),
                    _ => HuntEvent::info(EventId::SessionResumed, "Resumed"),
                };
                event
                    .with_session(self.session_id.to_string())
                    .with_elapsed(now.as_secs_f64())
                    .emit();
            }
        }
    }

    async fn decide(&mut self, input: CycleInput) -> CycleReport {
        let detections = input.perception.as_ref().map_or(0, |(_, d)| d.len());
        let mut report = CycleReport {
            detections,
            ..CycleReport::default()
        };

        if self.session.is_stopped() {
            return self.finish_report(report);
        }

        let verdict = self.safety.evaluate(input.now, input.pointer);
        if let SafetyVerdict::HardStop(reason) = verdict {
            if self.session.should_act() {
                if let Some((frame, objects)) = &input.perception {
                    if let Some(target) = self.prioritizer.select(objects, frame.center()) {
                        let directive = Directive::Target(target);
                        let record = self.dispatcher.suppress_by_safety(&directive, input.now);
                        self.stats.record_action(&record);
                        report.record = Some(record);
                    }
                }
            }
            self.session.stop(StopCause::Safety(reason));
            HuntEvent::critical(EventId::SafetyTrip, "Safety stop")
                .with_session(self.session_id.to_string())
                .with_reason(reason.to_string())
                .with_elapsed(input.now.as_secs_f64())
                .emit();
            return self.finish_report(report);
        }

        if !self.session.should_act() {
            return self.finish_report(report);
        }
        let (frame, objects) = match input.perception {
            Some(perception) => perception,
            None => return self.finish_report(report),
        };

        let target = self.prioritizer.select(&objects, frame.center());
        let mob_targeted = target
            .as_ref()
            .map_or(false, |t| t.class() == ObjectClass::Mob);
        let step = self
            .search
            .update(mob_targeted, target.is_none(), self.active);

        if let Some(transition) = step.transition {
            self.stats.record_search(&transition);
            self.log_transition(&transition, input.now);
            report.transition = Some(transition);
        }

        let directive = match (&target, step.burst) {
            (Some(t), _) => Some(Directive::Target(t.clone())),
            (None, Some(burst)) => Some(Directive::Search(burst)),
            (None, None) => None,
        };

        if let Some(directive) = directive {
            let record = self.dispatcher.dispatch(&directive, &frame, input.now).await;
            if let (Directive::Search(burst), false) = (&directive, record.outcome.is_dispatched()) {
                self.search.burst_failed(burst);
            }
            if record.outcome == ActionOutcome::SuppressedByFault {
                HuntEvent::warning(EventId::InputFault, "Input injection failed")
                    .with_session(self.session_id.to_string())
                    .emit();
            }
            self.stats.record_action(&record);
            report.record = Some(record);
        }
        report.target = target;
        self.finish_report(report)
    }

    fn finish_report(&self, mut report: CycleReport) -> CycleReport {
        report.session_state = self.session.current_state();
        report.search_state = self.search.state();
        report
    }

    fn log_transition(&self, transition: &SearchTransition, now: Duration) {
        let event = match transition {
            SearchTransition::Started => HuntEvent::info(EventId::SearchStarted, "Search started"),
            SearchTransition::ReturnStarted => {
                debug!("Returning to search origin");
                return;
            }
            SearchTransition::Ended { duration, reason } => {
                HuntEvent::info(EventId::SearchEnded, "Search ended").with_reason(format!(
                    "{:?} after {:.1}s",
                    reason,
                    duration.as_secs_f64()
                ))
            }
        };
        event
            .with_session(self.session_id.to_string())
            .with_elapsed(now.as_secs_f64())
            .emit();
    }

    // ========================================================================
    // Driver
    // ========================================================================

    /// Run until stopped. Returns the final stats snapshot.
    pub async fn run(
        &mut self,
        frames: &dyn FrameSource,
        detector: &mut dyn Detector,
        limits: RunLimits,
    ) -> Result<StatsSnapshot> {
        let scan_interval = self.config.automation.scan_interval();
        let flush_interval = self.config.stats.flush_interval();

        HuntEvent::info(EventId::SessionStart, "Hunt started")
            .with_session(self.session_id.to_string())
            .emit();
        info!(
            scan_interval_ms = scan_interval.as_millis() as u64,
            priorities = ?self.config.automation.priority_targets,
            hunting = self.config.mob_hunting.enable,
            "Hunt loop running"
        );

        if !self.input.is_available() {
            warn!("Input simulation unavailable, every action will be suppressed");
        }

        let start = Instant::now();
        let mut last_cycle_start: Option<Instant> = None;
        let mut last_flush = Duration::ZERO;
        let mut cycles = 0u64;

        loop {
            let cycle_start = Instant::now();
            if let Some(prev) = last_cycle_start {
                self.stats.record_period(cycle_start - prev);
            }
            last_cycle_start = Some(cycle_start);
            let now = cycle_start - start;

            self.begin_cycle(now);
            if self.session.is_stopped() {
                break;
            }

            let perception = if self.session.should_act() {
                self.perceive(frames, detector).await
            } else {
                None
            };
            let pointer = self.read_pointer().await;

            let report = self
                .decide(CycleInput {
                    now,
                    pointer,
                    perception,
                })
                .await;
            self.stats.record_cycle(report.detections, cycle_start.elapsed());
            cycles += 1;

            if now.saturating_sub(last_flush) >= flush_interval {
                self.emit_stats(now).await;
                last_flush = now;
            }

            if self.session.is_stopped() {
                break;
            }
            if detector.is_exhausted() || limits.max_cycles.map_or(false, |max| cycles >= max) {
                self.session.stop(StopCause::Exhausted);
                break;
            }

            // Overruns proceed immediately; nothing is skipped or queued.
            let elapsed = cycle_start.elapsed();
            if elapsed < scan_interval {
                tokio::time::sleep(scan_interval - elapsed).await;
            }
        }

        let now = start.elapsed();
        self.emit_stats(now).await;

        let cause = self
            .session
            .stop_cause()
            .map(|c| c.to_string())
            .unwrap_or_else(|| "stopped".into());
        HuntEvent::info(EventId::SessionStop, "Hunt finished")
            .with_session(self.session_id.to_string())
            .with_reason(cause)
            .with_elapsed(now.as_secs_f64())
            .emit();

        Ok(self.snapshot(now))
    }

    /// Capture and detect. Capture failures are counted and skip the cycle.
    async fn perceive(
        &mut self,
        frames: &dyn FrameSource,
        detector: &mut dyn Detector,
    ) -> Option<(Frame, Vec<DetectedObject>)> {
        match frames.capture().await {
            Ok(frame) => {
                let raw = detector.detect(&frame);
                let objects = self.adapter.normalize(raw);
                Some((frame, objects))
            }
            Err(e) => {
                warn!(error = %e, "Frame capture failed");
                HuntEvent::warning(EventId::CaptureFault, "Frame capture failed")
                    .with_session(self.session_id.to_string())
                    .with_reason(e.to_string())
                    .emit();
                self.stats.record_capture_fault();
                None
            }
        }
    }

    async fn read_pointer(&self) -> Option<(i32, i32)> {
        if !self.safety.failsafe_enabled() {
            return None;
        }
        match self.input.pointer_position().await {
            Ok(position) => Some(position),
            Err(e) => {
                warn!(error = %e, "Pointer position unavailable, skipping failsafe check");
                None
            }
        }
    }

    async fn emit_stats(&self, now: Duration) {
        let snapshot = self.snapshot(now);
        debug!(
            detections = snapshot.detections_seen,
            fps = format!("{:.1}", snapshot.fps),
            avg_cycle_ms = format!("{:.1}", snapshot.avg_cycle_ms),
            state = %snapshot.session_state,
            "Stats detail"
        );
        stats_event(&snapshot).emit();
        if let Some(writer) = &self.stats_writer {
            if let Err(e) = writer.append(&snapshot).await {
                HuntEvent::warning(EventId::StatsWriteFailed, "Could not write stats")
                    .with_reason(e.to_string())
                    .emit();
            }
        }
    }

    /// Inject a control signal as if a key had been pressed.
    pub fn signal(&self, signal: ControlSignal) {
        self.inbox.send(signal);
    }
}

/// Periodic stats line for the log.
fn stats_event(snapshot: &StatsSnapshot) -> HuntEvent {
    HuntEvent::info(EventId::StatsEmitted, "Stats")
        .with_session(snapshot.session_id.to_string())
        .with_reason(format!(
            "cycles={} dispatched={} searches={}",
            snapshot.cycles,
            snapshot.total_dispatched(),
            snapshot.searches_started
        ))
        .with_elapsed(snapshot.elapsed_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::RegionFrameSource;
    use crate::config::CaptureRegion;
    use crate::detection::{BBox, Point, RawDetection, ReplayDetector};
    use crate::input::mock::MockSimulator;

    fn region() -> CaptureRegion {
        CaptureRegion {
            x: 0,
            y: 0,
            width: 200,
            height: 200,
        }
    }

    fn config() -> HuntConfig {
        let mut config = HuntConfig::default();
        config.capture_region = region();
        config.safety.enable_failsafe = false;
        config.mob_hunting.move_duration_ms = 1;
        config
    }

    fn object(class: ObjectClass, dx: f32) -> DetectedObject {
        DetectedObject::new(class, BBox::around(Point::new(100.0 + dx, 100.0), 10.0), 0.9)
    }

    fn input(now_ms: u64, objects: Vec<DetectedObject>) -> CycleInput {
        CycleInput {
            now: Duration::from_millis(now_ms),
            pointer: Some((500, 500)),
            perception: Some((Frame::blank(region(), 0), objects)),
        }
    }

    fn setup(config: HuntConfig) -> (HuntLoop, Arc<MockSimulator>) {
        let sim = Arc::new(MockSimulator::new());
        (HuntLoop::new(config, sim.clone()).unwrap(), sim)
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = config();
        config.automation.priority_targets.clear();
        let sim = Arc::new(MockSimulator::new());
        assert!(HuntLoop::new(config, sim).is_err());
    }

    #[test]
    fn test_unrepresentable_durations_rejected_at_startup() {
        let mut runtime = config();
        runtime.safety.max_runtime_hours = 1e16;
        let sim = Arc::new(MockSimulator::new());
        assert!(HuntLoop::new(runtime, sim.clone()).is_err());

        let mut delay = config();
        delay.mob_hunting.enable = true;
        delay.mob_hunting.search_delay_seconds = 1e30;
        assert!(HuntLoop::new(delay, sim).is_err());
    }

    #[tokio::test]
    async fn test_one_action_per_cycle() {
        let (mut hunt, sim) = setup(config());
        let report = hunt
            .cycle(input(
                0,
                vec![object(ObjectClass::Mob, 5.0), object(ObjectClass::Item, 40.0)],
            ))
            .await;
        assert!(report.acted());
        assert_eq!(report.target.map(|t| t.class()), Some(ObjectClass::Item));
        assert_eq!(sim.actions().await, vec!["key_press(z)"]);
    }

    #[tokio::test]
    async fn test_paused_cycle_does_nothing() {
        let (mut hunt, sim) = setup(config());
        hunt.signal(ControlSignal::TogglePause);
        let report = hunt.cycle(input(0, vec![object(ObjectClass::Item, 0.0)])).await;
        assert_eq!(report.session_state, SessionState::Paused);
        assert!(report.record.is_none());
        assert!(sim.actions().await.is_empty());

        hunt.signal(ControlSignal::TogglePause);
        let report = hunt.cycle(input(500, vec![object(ObjectClass::Item, 0.0)])).await;
        assert!(report.acted());
    }

    #[tokio::test]
    async fn test_active_clock_frozen_while_paused() {
        let (mut hunt, _sim) = setup(config());
        hunt.cycle(input(0, vec![])).await;
        hunt.cycle(input(1000, vec![])).await;
        assert_eq!(hunt.active_time(), Duration::from_secs(1));

        hunt.signal(ControlSignal::TogglePause);
        hunt.cycle(input(2000, vec![])).await; // interval ran while Running
        hunt.cycle(input(60_000, vec![])).await;
        assert_eq!(hunt.active_time(), Duration::from_secs(2));

        hunt.signal(ControlSignal::TogglePause);
        hunt.cycle(input(61_000, vec![])).await;
        hunt.cycle(input(62_000, vec![])).await;
        assert_eq!(hunt.active_time(), Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_failsafe_stops_with_safety_record() {
        let mut config = config();
        config.safety.enable_failsafe = true;
        let (mut hunt, sim) = setup(config);

        let mut cycle = input(0, vec![object(ObjectClass::Mob, 0.0)]);
        cycle.pointer = Some((0, 0));
        let report = hunt.cycle(cycle).await;

        assert_eq!(report.session_state, SessionState::Stopped);
        assert_eq!(
            report.record.map(|r| r.outcome),
            Some(ActionOutcome::SuppressedBySafety)
        );
        assert!(sim.actions().await.is_empty());

        let report = hunt.cycle(input(500, vec![object(ObjectClass::Mob, 0.0)])).await;
        assert!(report.record.is_none());
    }

    #[tokio::test]
    async fn test_capture_gap_makes_no_decision() {
        let (mut hunt, sim) = setup(config());
        let report = hunt
            .cycle(CycleInput {
                now: Duration::ZERO,
                pointer: None,
                perception: None,
            })
            .await;
        assert_eq!(report.session_state, SessionState::Running);
        assert!(report.record.is_none());
        assert!(sim.actions().await.is_empty());
    }

    #[tokio::test]
    async fn test_failed_search_burst_keeps_displacement() {
        let mut config = config();
        config.mob_hunting.enable = true;
        config.mob_hunting.search_delay_seconds = 0.0;
        let (mut hunt, sim) = setup(config);
        sim.set_failing(true);

        let report = hunt.cycle(input(0, vec![])).await;
        assert_eq!(report.transition, Some(SearchTransition::Started));
        assert_eq!(
            report.record.map(|r| r.outcome),
            Some(ActionOutcome::SuppressedByFault)
        );
        assert_eq!(hunt.search.displacement(), 0);
        assert_eq!(hunt.session_state(), SessionState::Running);
    }

    #[tokio::test]
    async fn test_stats_event_summarizes_snapshot() {
        let (mut hunt, _sim) = setup(config());
        hunt.cycle(input(0, vec![object(ObjectClass::Item, 0.0)])).await;
        let snapshot = hunt.snapshot(Duration::from_secs(30));

        let event = stats_event(&snapshot);
        assert_eq!(event.event_id, EventId::StatsEmitted);
        let line = event.to_line();
        assert!(line.starts_with("MOBHUNT[1020] level=INFO"));
        assert!(line.contains("reason=\"cycles=1 dispatched=1 searches=0\""));
        assert!(line.contains("elapsed=30.0s"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_replay_to_exhaustion() {
        let (mut hunt, sim) = setup(config());
        let frames = RegionFrameSource::new(region());
        let mut detector = ReplayDetector::new(vec![
            vec![RawDetection::new("item", [95.0, 95.0, 105.0, 105.0], 0.9)],
            vec![],
            vec![RawDetection::new("mob", [120.0, 95.0, 130.0, 105.0], 0.8)],
        ]);

        let snapshot = hunt
            .run(&frames, &mut detector, RunLimits::default())
            .await
            .unwrap();

        assert_eq!(hunt.stop_cause(), Some(StopCause::Exhausted));
        assert_eq!(snapshot.cycles, 3);
        assert_eq!(snapshot.detections_seen, 2);
        assert_eq!(snapshot.dispatched_for(ObjectClass::Item), 1);
        assert_eq!(snapshot.dispatched_for(ObjectClass::Mob), 1);
        assert_eq!(sim.actions().await, vec!["key_press(z)", "click(125, 100)"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_on_inbox_stop() {
        let (mut hunt, _sim) = setup(config());
        let frames = RegionFrameSource::new(region());
        let mut detector = ReplayDetector::new(vec![vec![]]).looping(true);
        hunt.inbox().request_stop();

        let snapshot = hunt
            .run(&frames, &mut detector, RunLimits::default())
            .await
            .unwrap();
        assert_eq!(hunt.stop_cause(), Some(StopCause::User));
        assert_eq!(snapshot.cycles, 0);
        assert_eq!(snapshot.session_state, SessionState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_respects_cycle_limit() {
        let (mut hunt, _sim) = setup(config());
        let frames = RegionFrameSource::new(region());
        let mut detector = ReplayDetector::new(vec![vec![]]).looping(true);

        let snapshot = hunt
            .run(&frames, &mut detector, RunLimits { max_cycles: Some(4) })
            .await
            .unwrap();
        assert_eq!(snapshot.cycles, 4);
        // Paced at scan_interval
        assert!(snapshot.elapsed_secs >= 1.5);
    }
}
