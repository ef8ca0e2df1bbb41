//! Action dispatch.
//!
//! Turns the cycle's directive (a target or a search burst) into input
//! primitives, honouring per-class cooldowns, and keeps the action log.
//! This is the only place that calls the [`InputSimulator`].

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::capture::Frame;
use crate::config::{AttackMethod, ControlsConfig, HuntConfig};
use crate::detection::{ClassAction, ObjectClass};
use crate::input::{InputResult, InputSimulator, Key};
use crate::prioritizer::Target;
use crate::search::{Movement, MovementBurst};

/// Most recent records kept in memory.
const MAX_RECORDS: usize = 1000;

// ============================================================================
// Types
// ============================================================================

/// What the loop decided to do this cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    Target(Target),
    Search(MovementBurst),
}

impl Directive {
    pub fn subject(&self) -> ActionSubject {
        match self {
            Directive::Target(t) => ActionSubject::Class(t.class()),
            Directive::Search(_) => ActionSubject::Search,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionSubject {
    Class(ObjectClass),
    Search,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    AttackClick,
    AttackKey,
    Pickup,
    Interact,
    Move(Movement),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionOutcome {
    Dispatched,
    SuppressedByCooldown,
    SuppressedBySafety,
    /// Injection failed; nothing is retried
    SuppressedByFault,
}

impl ActionOutcome {
    pub fn is_dispatched(&self) -> bool {
        matches!(self, ActionOutcome::Dispatched)
    }
}

/// One entry of the action log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionRecord {
    pub timestamp: DateTime<Utc>,
    /// Session time of the decision
    pub elapsed_ms: u64,
    pub subject: ActionSubject,
    pub kind: ActionKind,
    pub outcome: ActionOutcome,
}

// ============================================================================
// Cooldowns
// ============================================================================

/// Earliest session time each class may be acted on again.
#[derive(Debug, Clone, Default)]
pub struct CooldownTable {
    next_allowed: HashMap<ObjectClass, Duration>,
}

impl CooldownTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_ready(&self, class: ObjectClass, now: Duration) -> bool {
        self.next_allowed
            .get(&class)
            .map_or(true, |next| now >= *next)
    }

    pub fn next_allowed(&self, class: ObjectClass) -> Option<Duration> {
        self.next_allowed.get(&class).copied()
    }

    fn arm(&mut self, class: ObjectClass, now: Duration, delay: Duration) {
        self.next_allowed.insert(class, now + delay);
    }
}

// ============================================================================
// Dispatcher
// ============================================================================

pub struct ActionDispatcher {
    input: Arc<dyn InputSimulator>,
    controls: ControlsConfig,
    action_delay: Duration,
    attack_delay: Duration,
    cooldowns: CooldownTable,
    records: VecDeque<ActionRecord>,
}

impl ActionDispatcher {
    pub fn new(config: &HuntConfig, input: Arc<dyn InputSimulator>) -> Self {
        let action_delay = config.automation.action_delay();
        let attack_delay = config
            .detection_behavior
            .mob
            .attack_delay_ms
            .map(Duration::from_millis)
            .unwrap_or(action_delay);
        Self {
            input,
            controls: config.controls.clone(),
            action_delay,
            attack_delay,
            cooldowns: CooldownTable::new(),
            records: VecDeque::new(),
        }
    }

    pub fn cooldowns(&self) -> &CooldownTable {
        &self.cooldowns
    }

    /// Cooldown armed after a successful action on `class`.
    pub fn delay_for(&self, class: ObjectClass) -> Duration {
        match class.action() {
            Some(ClassAction::Attack) => self.attack_delay,
            Some(ClassAction::Interact) => self.controls.interact_delay(),
            Some(ClassAction::Pickup) | None => self.action_delay,
        }
    }

    /// Most recent records, oldest first.
    pub fn records(&self) -> impl Iterator<Item = &ActionRecord> {
        self.records.iter()
    }

    pub fn last_record(&self) -> Option<&ActionRecord> {
        self.records.back()
    }

    /// Act on the directive, or record why not.
    pub async fn dispatch(&mut self, directive: &Directive, frame: &Frame, now: Duration) -> ActionRecord {
        let kind = self.kind_of(directive);
        let outcome = match directive {
            Directive::Target(target) => {
                let class = target.class();
                if !self.cooldowns.is_ready(class, now) {
                    debug!(%class, "On cooldown");
                    ActionOutcome::SuppressedByCooldown
                } else {
                    match self.act_on(target, kind, frame).await {
                        Ok(()) => {
                            self.cooldowns.arm(class, now, self.delay_for(class));
                            info!(%class, ?kind, distance = target.distance, "Action dispatched");
                            ActionOutcome::Dispatched
                        }
                        Err(e) => {
                            warn!(%class, ?kind, error = %e, "Input injection failed");
                            ActionOutcome::SuppressedByFault
                        }
                    }
                }
            }
            Directive::Search(burst) => match self.perform_burst(burst).await {
                Ok(()) => {
                    debug!(movement = ?burst.movement, "Search burst");
                    ActionOutcome::Dispatched
                }
                Err(e) => {
                    warn!(movement = ?burst.movement, error = %e, "Input injection failed");
                    ActionOutcome::SuppressedByFault
                }
            },
        };
        self.push(directive.subject(), kind, outcome, now)
    }

    /// Record a directive the safety governor blocked.
    pub fn suppress_by_safety(&mut self, directive: &Directive, now: Duration) -> ActionRecord {
        let kind = self.kind_of(directive);
        self.push(directive.subject(), kind, ActionOutcome::SuppressedBySafety, now)
    }

    fn kind_of(&self, directive: &Directive) -> ActionKind {
        match directive {
            Directive::Target(target) => match target.action() {
                Some(ClassAction::Attack) => match self.controls.attack_method {
                    AttackMethod::Click => ActionKind::AttackClick,
                    AttackMethod::Key => ActionKind::AttackKey,
                },
                Some(ClassAction::Interact) => ActionKind::Interact,
                // Targets are action-bearing; pickup covers the remaining arm
                Some(ClassAction::Pickup) | None => ActionKind::Pickup,
            },
            Directive::Search(burst) => ActionKind::Move(burst.movement),
        }
    }

    async fn act_on(&self, target: &Target, kind: ActionKind, frame: &Frame) -> InputResult<()> {
        match kind {
            ActionKind::AttackClick => {
                let point = frame.to_screen(target.object.center());
                self.input
                    .click(point.x.round() as i32, point.y.round() as i32)
                    .await
            }
            ActionKind::AttackKey => self.input.key_press(self.controls.attack_key).await,
            ActionKind::Pickup => self.input.key_press(self.controls.pickup_key).await,
            ActionKind::Interact => self.input.key_press(self.controls.interact_key).await,
            ActionKind::Move(_) => Ok(()),
        }
    }

    async fn perform_burst(&self, burst: &MovementBurst) -> InputResult<()> {
        let keys = self.controls.movement_keys;
        match burst.movement {
            Movement::Left => self.hold(keys.left, burst.duration).await,
            Movement::Right => self.hold(keys.right, burst.duration).await,
            Movement::Jump => self.input.key_press(keys.jump).await,
            Movement::DropDown => {
                self.input.key_down(keys.down).await?;
                let jumped = self.input.key_press(keys.jump).await;
                let released = self.input.key_up(keys.down).await;
                jumped.and(released)
            }
        }
    }

    /// key_down, hold, key_up.
    async fn hold(&self, key: Key, duration: Duration) -> InputResult<()> {
        self.input.key_down(key).await?;
        tokio::time::sleep(duration).await;
        self.input.key_up(key).await
    }

    fn push(&mut self, subject: ActionSubject, kind: ActionKind, outcome: ActionOutcome, now: Duration) -> ActionRecord {
        let record = ActionRecord {
            timestamp: Utc::now(),
            elapsed_ms: now.as_millis() as u64,
            subject,
            kind,
            outcome,
        };
        if self.records.len() >= MAX_RECORDS {
            self.records.pop_front();
        }
        self.records.push_back(record.clone());
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CaptureRegion;
    use crate::detection::{BBox, DetectedObject};
    use crate::input::mock::MockSimulator;

    fn frame() -> Frame {
        Frame::blank(
            CaptureRegion {
                x: 100,
                y: 50,
                width: 800,
                height: 600,
            },
            0,
        )
    }

    fn target(class: ObjectClass) -> Directive {
        Directive::Target(Target {
            object: DetectedObject::new(class, BBox::new(10.0, 10.0, 30.0, 30.0), 0.9),
            distance: 5.0,
            priority_rank: 0,
        })
    }

    fn setup(config: HuntConfig) -> (ActionDispatcher, Arc<MockSimulator>) {
        let sim = Arc::new(MockSimulator::new());
        (ActionDispatcher::new(&config, sim.clone()), sim)
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[tokio::test]
    async fn test_mob_click_uses_screen_coordinates() {
        let (mut dispatcher, sim) = setup(HuntConfig::default());
        let record = dispatcher.dispatch(&target(ObjectClass::Mob), &frame(), ms(0)).await;

        assert_eq!(record.outcome, ActionOutcome::Dispatched);
        assert_eq!(record.kind, ActionKind::AttackClick);
        assert_eq!(sim.actions().await, vec!["click(120, 70)"]);
    }

    #[tokio::test]
    async fn test_key_bindings() {
        let mut config = HuntConfig::default();
        config.controls.attack_method = AttackMethod::Key;
        let (mut dispatcher, sim) = setup(config);

        dispatcher.dispatch(&target(ObjectClass::Mob), &frame(), ms(0)).await;
        dispatcher.dispatch(&target(ObjectClass::Item), &frame(), ms(0)).await;
        dispatcher.dispatch(&target(ObjectClass::Npc), &frame(), ms(0)).await;

        assert_eq!(
            sim.actions().await,
            vec!["key_press(ctrl)", "key_press(z)", "key_press(space)"]
        );
    }

    #[tokio::test]
    async fn test_cooldown_boundary() {
        let (mut dispatcher, sim) = setup(HuntConfig::default());
        let item = target(ObjectClass::Item);

        let first = dispatcher.dispatch(&item, &frame(), ms(1000)).await;
        assert!(first.outcome.is_dispatched());
        assert_eq!(dispatcher.cooldowns().next_allowed(ObjectClass::Item), Some(ms(1100)));

        let early = dispatcher.dispatch(&item, &frame(), ms(1099)).await;
        assert_eq!(early.outcome, ActionOutcome::SuppressedByCooldown);

        let on_time = dispatcher.dispatch(&item, &frame(), ms(1100)).await;
        assert!(on_time.outcome.is_dispatched());
        assert_eq!(sim.actions().await.len(), 2);
    }

    #[tokio::test]
    async fn test_cooldowns_are_per_class() {
        let mut config = HuntConfig::default();
        config.detection_behavior.mob.attack_delay_ms = Some(500);
        config.controls.interact_delay_ms = 800;
        let (mut dispatcher, _sim) = setup(config);

        assert_eq!(dispatcher.delay_for(ObjectClass::Mob), ms(500));
        assert_eq!(dispatcher.delay_for(ObjectClass::Item), ms(100));
        assert_eq!(dispatcher.delay_for(ObjectClass::Npc), ms(800));

        dispatcher.dispatch(&target(ObjectClass::Mob), &frame(), ms(0)).await;
        let item = dispatcher.dispatch(&target(ObjectClass::Item), &frame(), ms(10)).await;
        assert!(item.outcome.is_dispatched());
        let mob = dispatcher.dispatch(&target(ObjectClass::Mob), &frame(), ms(499)).await;
        assert_eq!(mob.outcome, ActionOutcome::SuppressedByCooldown);
    }

    #[tokio::test]
    async fn test_fault_leaves_cooldown_untouched() {
        let (mut dispatcher, sim) = setup(HuntConfig::default());
        sim.set_failing(true);

        let record = dispatcher.dispatch(&target(ObjectClass::Item), &frame(), ms(0)).await;
        assert_eq!(record.outcome, ActionOutcome::SuppressedByFault);
        assert_eq!(dispatcher.cooldowns().next_allowed(ObjectClass::Item), None);

        sim.set_failing(false);
        let record = dispatcher.dispatch(&target(ObjectClass::Item), &frame(), ms(1)).await;
        assert!(record.outcome.is_dispatched());
    }

    #[tokio::test]
    async fn test_search_bursts() {
        let mut config = HuntConfig::default();
        config.mob_hunting.move_duration_ms = 1;
        let (mut dispatcher, sim) = setup(config);
        let burst = |movement| {
            Directive::Search(MovementBurst {
                movement,
                duration: ms(1),
            })
        };

        dispatcher.dispatch(&burst(Movement::Left), &frame(), ms(0)).await;
        dispatcher.dispatch(&burst(Movement::Jump), &frame(), ms(0)).await;
        let record = dispatcher.dispatch(&burst(Movement::DropDown), &frame(), ms(0)).await;

        assert_eq!(record.subject, ActionSubject::Search);
        assert_eq!(record.kind, ActionKind::Move(Movement::DropDown));
        assert_eq!(
            sim.actions().await,
            vec![
                "key_down(left)",
                "key_up(left)",
                "key_press(alt)",
                "key_down(down)",
                "key_press(alt)",
                "key_up(down)"
            ]
        );
    }

    #[tokio::test]
    async fn test_safety_suppression_is_logged_without_input() {
        let (mut dispatcher, sim) = setup(HuntConfig::default());
        let record = dispatcher.suppress_by_safety(&target(ObjectClass::Mob), ms(5));
        assert_eq!(record.outcome, ActionOutcome::SuppressedBySafety);
        assert_eq!(dispatcher.last_record(), Some(&record));
        assert!(sim.actions().await.is_empty());
    }

    #[tokio::test]
    async fn test_record_log_is_bounded() {
        let (mut dispatcher, _sim) = setup(HuntConfig::default());
        for i in 0..(MAX_RECORDS as u64 + 5) {
            dispatcher.suppress_by_safety(&target(ObjectClass::Item), ms(i));
        }
        assert_eq!(dispatcher.records().count(), MAX_RECORDS);
        assert_eq!(dispatcher.records().next().map(|r| r.elapsed_ms), Some(5));
    }
}
