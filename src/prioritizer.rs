//! Target selection.
//!
//! Picks at most one target per frame: wanted class first (by its position in
//! `priority_targets`), nearest to the player second, input order last.

use tracing::trace;

use crate::config::HuntConfig;
use crate::detection::{ClassAction, DetectedObject, ObjectClass, Point};

/// The detection chosen for this cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct Target {
    pub object: DetectedObject,
    /// Pixels from the reference anchor to the object centre
    pub distance: f32,
    /// Index of the class in `priority_targets`
    pub priority_rank: usize,
}

impl Target {
    pub fn class(&self) -> ObjectClass {
        self.object.class
    }

    /// Always present: only action-bearing classes become targets.
    pub fn action(&self) -> Option<ClassAction> {
        self.object.class.action()
    }
}

pub struct TargetPrioritizer {
    priority_targets: Vec<ObjectClass>,
    confidence_threshold: f32,
    max_detection_distance: f32,
    class_limits: Vec<(ObjectClass, f32)>,
    player_anchor: Option<Point>,
}

impl TargetPrioritizer {
    pub fn new(config: &HuntConfig) -> Self {
        let class_limits = [ObjectClass::Mob, ObjectClass::Item, ObjectClass::Npc]
            .into_iter()
            .filter_map(|class| {
                config
                    .detection_behavior
                    .for_class(class)
                    .and_then(|b| b.max_distance)
                    .map(|limit| (class, limit))
            })
            .collect();

        Self {
            priority_targets: config.automation.priority_targets.clone(),
            confidence_threshold: config.automation.confidence_threshold,
            max_detection_distance: config.automation.max_detection_distance,
            class_limits,
            player_anchor: config.automation.player_anchor,
        }
    }

    /// Distance limit for a class.
    pub fn max_distance(&self, class: ObjectClass) -> f32 {
        self.class_limits
            .iter()
            .find(|(c, _)| *c == class)
            .map(|(_, limit)| *limit)
            .unwrap_or(self.max_detection_distance)
    }

    /// Best target in `detections`, or `None`.
    ///
    /// `frame_center` is the reference point unless a player anchor is set.
    pub fn select(&self, detections: &[DetectedObject], frame_center: Point) -> Option<Target> {
        let anchor = self.player_anchor.unwrap_or(frame_center);

        let mut candidates: Vec<Target> = detections
            .iter()
            .filter(|d| d.class.is_actionable() && d.confidence >= self.confidence_threshold)
            .filter_map(|d| {
                let rank = self.priority_targets.iter().position(|c| *c == d.class)?;
                let distance = anchor.distance_to(d.center());
                (distance.is_finite() && distance <= self.max_distance(d.class)).then(|| Target {
                    object: d.clone(),
                    distance,
                    priority_rank: rank,
                })
            })
            .collect();

        // Stable: equal rank and distance keep input order.
        candidates.sort_by(|a, b| {
            a.priority_rank
                .cmp(&b.priority_rank)
                .then(a.distance.total_cmp(&b.distance))
        });

        let target = candidates.into_iter().next();
        if let Some(t) = &target {
            trace!(class = %t.class(), distance = t.distance, rank = t.priority_rank, "Target selected");
        }
        target
    }
}
