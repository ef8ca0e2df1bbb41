//! Idle search ("mob hunting").
//!
//! When no mob has been targeted for a while the character wanders to find
//! one. The machine is driven once per active cycle and hands back at most
//! one [`MovementBurst`]. It runs on the active clock, so pauses do not
//! count towards any of its windows.
//!
//! ```text
//!   Idle --(no mob for search_delay)--> Searching --(max_search_time)--> Returning
//!    ^                                     |                                |
//!    +------------(mob targeted)-----------+------(home / timeout / mob)----+
//! ```

use std::fmt;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::MobHuntingConfig;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchState {
    #[default]
    Idle,
    Searching,
    Returning,
}

impl fmt::Display for SearchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchState::Idle => write!(f, "idle"),
            SearchState::Searching => write!(f, "searching"),
            SearchState::Returning => write!(f, "returning"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchPattern {
    /// Sweep right then left, reversing every `sweep_moves` bursts
    #[default]
    Horizontal,
    /// Alternate a jump and a drop through the platform
    Vertical,
    /// Uniformly random left, right or jump
    Random,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Movement {
    Left,
    Right,
    Jump,
    /// Down held while jumping
    DropDown,
}

impl Movement {
    /// Net horizontal effect, in bursts.
    fn displacement(&self) -> i32 {
        match self {
            Movement::Left => -1,
            Movement::Right => 1,
            Movement::Jump | Movement::DropDown => 0,
        }
    }
}

/// One bounded movement directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MovementBurst {
    pub movement: Movement,
    pub duration: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchEndReason {
    MobFound,
    /// Search time ran out and no return was wanted
    Timeout,
    /// Walked back to where the search started
    Returned,
    ReturnTimeout,
}

/// State change reported to the caller for stats and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchTransition {
    Started,
    ReturnStarted,
    Ended {
        duration: Duration,
        reason: SearchEndReason,
    },
}

/// Result of one [`SearchMachine::update`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchStep {
    pub burst: Option<MovementBurst>,
    pub transition: Option<SearchTransition>,
}

// ============================================================================
// Machine
// ============================================================================

pub struct SearchMachine {
    config: MobHuntingConfig,
    state: SearchState,
    /// Active time of the last mob target (or of the last search end)
    last_mob_at: Duration,
    search_started_at: Duration,
    return_started_at: Duration,
    /// Net bursts right of the search start
    displacement: i32,
    sweep_direction: Movement,
    sweep_count: u32,
    drop_next: bool,
    rng: StdRng,
}

impl SearchMachine {
    pub fn new(config: MobHuntingConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    /// Deterministic random pattern.
    pub fn with_seed(config: MobHuntingConfig, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: MobHuntingConfig, rng: StdRng) -> Self {
        Self {
            config,
            state: SearchState::Idle,
            last_mob_at: Duration::ZERO,
            search_started_at: Duration::ZERO,
            return_started_at: Duration::ZERO,
            displacement: 0,
            sweep_direction: Movement::Right,
            sweep_count: 0,
            drop_next: false,
            rng,
        }
    }

    pub fn state(&self) -> SearchState {
        self.state
    }

    pub fn displacement(&self) -> i32 {
        self.displacement
    }

    /// Advance the machine.
    ///
    /// `mob_targeted` is whether this cycle's target is a mob,
    /// `movement_allowed` is false whenever the cycle already has a target,
    /// `active_now` is the active clock (frozen while paused).
    pub fn update(&mut self, mob_targeted: bool, movement_allowed: bool, active_now: Duration) -> SearchStep {
        match self.state {
            SearchState::Idle => {
                if mob_targeted {
                    self.last_mob_at = active_now;
                    return SearchStep::default();
                }
                let idle = active_now.saturating_sub(self.last_mob_at);
                if self.config.enable && idle >= self.config.search_delay() {
                    self.begin(active_now);
                    return SearchStep {
                        burst: self.next_burst(movement_allowed),
                        transition: Some(SearchTransition::Started),
                    };
                }
                SearchStep::default()
            }
            SearchState::Searching => {
                if mob_targeted {
                    return self.finish(active_now, SearchEndReason::MobFound);
                }
                let elapsed = active_now.saturating_sub(self.search_started_at);
                if elapsed >= self.config.max_search_time() {
                    if !self.config.return_to_center {
                        return self.finish(active_now, SearchEndReason::Timeout);
                    }
                    self.state = SearchState::Returning;
                    self.return_started_at = active_now;
                    info!(displacement = self.displacement, "Search time up, returning");
                    return SearchStep {
                        burst: self.return_burst(movement_allowed),
                        transition: Some(SearchTransition::ReturnStarted),
                    };
                }
                SearchStep {
                    burst: self.next_burst(movement_allowed),
                    transition: None,
                }
            }
            SearchState::Returning => {
                if mob_targeted {
                    return self.finish(active_now, SearchEndReason::MobFound);
                }
                if self.displacement == 0 {
                    return self.finish(active_now, SearchEndReason::Returned);
                }
                if active_now.saturating_sub(self.return_started_at) >= self.config.return_timeout() {
                    return self.finish(active_now, SearchEndReason::ReturnTimeout);
                }
                SearchStep {
                    burst: self.return_burst(movement_allowed),
                    transition: None,
                }
            }
        }
    }

    /// Roll back the bookkeeping of a burst that was never performed.
    pub fn burst_failed(&mut self, burst: &MovementBurst) {
        self.displacement -= burst.movement.displacement();
    }

    fn begin(&mut self, now: Duration) {
        self.state = SearchState::Searching;
        self.search_started_at = now;
        self.displacement = 0;
        self.sweep_direction = Movement::Right;
        self.sweep_count = 0;
        self.drop_next = false;
        info!(pattern = ?self.config.search_pattern, "No mob in sight, searching");
    }

    fn finish(&mut self, now: Duration, reason: SearchEndReason) -> SearchStep {
        let duration = now.saturating_sub(self.search_started_at);
        self.state = SearchState::Idle;
        self.last_mob_at = now;
        self.displacement = 0;
        info!(?reason, duration_ms = duration.as_millis() as u64, "Search finished");
        SearchStep {
            burst: None,
            transition: Some(SearchTransition::Ended { duration, reason }),
        }
    }

    fn next_burst(&mut self, allowed: bool) -> Option<MovementBurst> {
        if !allowed {
            return None;
        }
        let movement = match self.config.search_pattern {
            SearchPattern::Horizontal => {
                if self.sweep_count >= self.config.sweep_moves {
                    self.sweep_direction = match self.sweep_direction {
                        Movement::Right => Movement::Left,
                        _ => Movement::Right,
                    };
                    self.sweep_count = 0;
                    debug!(direction = ?self.sweep_direction, "Reversing sweep");
                }
                self.sweep_count += 1;
                self.sweep_direction
            }
            SearchPattern::Vertical => {
                let movement = if self.drop_next {
                    Movement::DropDown
                } else {
                    Movement::Jump
                };
                self.drop_next = !self.drop_next;
                movement
            }
            SearchPattern::Random => match self.rng.gen_range(0..3) {
                0 => Movement::Left,
                1 => Movement::Right,
                _ => Movement::Jump,
            },
        };
        Some(self.emit(movement))
    }

    fn return_burst(&mut self, allowed: bool) -> Option<MovementBurst> {
        if !allowed || self.displacement == 0 {
            return None;
        }
        let movement = if self.displacement > 0 {
            Movement::Left
        } else {
            Movement::Right
        };
        Some(self.emit(movement))
    }

    fn emit(&mut self, movement: Movement) -> MovementBurst {
        self.displacement += movement.displacement();
        MovementBurst {
            movement,
            duration: self.config.move_duration(),
        }
    }
}
