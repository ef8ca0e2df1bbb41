//! Detections - the typed view of what the vision model saw in one frame.
//!
//! The model itself is external. It hands us [`RawDetection`]s (a class name,
//! a box and a score) through the [`Detector`] trait, and the
//! [`DetectionAdapter`] turns them into [`DetectedObject`]s: known class,
//! finite geometry, confidence at or above the configured threshold.
//! Anything else is dropped here and never reaches the decision loop.

use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::capture::Frame;
use crate::error::{Error, Result};

// ============================================================================
// Classes
// ============================================================================

/// Closed set of categories the model is trained on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectClass {
    Mob,
    Item,
    Npc,
    Character,
    Environment,
    Ui,
}

/// What the bot does when a class is chosen as the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassAction {
    Attack,
    Pickup,
    Interact,
}

impl ObjectClass {
    pub const ALL: [ObjectClass; 6] = [
        ObjectClass::Mob,
        ObjectClass::Item,
        ObjectClass::Npc,
        ObjectClass::Character,
        ObjectClass::Environment,
        ObjectClass::Ui,
    ];

    /// Action bound to this class, `None` for detection-only classes.
    pub fn action(&self) -> Option<ClassAction> {
        match self {
            ObjectClass::Mob => Some(ClassAction::Attack),
            ObjectClass::Item => Some(ClassAction::Pickup),
            ObjectClass::Npc => Some(ClassAction::Interact),
            ObjectClass::Character | ObjectClass::Environment | ObjectClass::Ui => None,
        }
    }

    pub fn is_actionable(&self) -> bool {
        self.action().is_some()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectClass::Mob => "mob",
            ObjectClass::Item => "item",
            ObjectClass::Npc => "npc",
            ObjectClass::Character => "character",
            ObjectClass::Environment => "environment",
            ObjectClass::Ui => "ui",
        }
    }
}

impl fmt::Display for ObjectClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ObjectClass {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.trim().to_lowercase();
        ObjectClass::ALL
            .into_iter()
            .find(|c| c.as_str() == lower)
            .ok_or_else(|| Error::config(format!("unknown object class '{}'", s)))
    }
}

// ============================================================================
// Geometry
// ============================================================================

/// A point in frame (or screen) pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: Point) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    /// Offset by an origin, e.g. frame coordinates to screen coordinates.
    pub fn offset(&self, dx: f32, dy: f32) -> Point {
        Point::new(self.x + dx, self.y + dy)
    }
}

/// Axis-aligned box, corners in frame pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Box of `size` centred on `center`.
    pub fn around(center: Point, size: f32) -> Self {
        let half = size / 2.0;
        Self::new(center.x - half, center.y - half, center.x + half, center.y + half)
    }

    pub fn center(&self) -> Point {
        Point::new((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }

    /// Finite corners, non-inverted.
    pub fn is_valid(&self) -> bool {
        [self.x1, self.y1, self.x2, self.y2].iter().all(|v| v.is_finite())
            && self.x2 >= self.x1
            && self.y2 >= self.y1
    }
}

// ============================================================================
// Detections
// ============================================================================

/// Detector output before normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
    #[serde(rename = "class")]
    pub class_name: String,
    /// `[x1, y1, x2, y2]`
    pub bbox: [f32; 4],
    pub confidence: f32,
}

impl RawDetection {
    pub fn new(class_name: impl Into<String>, bbox: [f32; 4], confidence: f32) -> Self {
        Self {
            class_name: class_name.into(),
            bbox,
            confidence,
        }
    }
}

/// One detection for the current frame. Built once per cycle, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectedObject {
    pub class: ObjectClass,
    pub bbox: BBox,
    pub confidence: f32,
}

impl DetectedObject {
    pub fn new(class: ObjectClass, bbox: BBox, confidence: f32) -> Self {
        Self {
            class,
            bbox,
            confidence,
        }
    }

    pub fn center(&self) -> Point {
        self.bbox.center()
    }
}

/// The external vision model.
///
/// Must never fail: an empty list means nothing was found.
pub trait Detector: Send {
    fn detect(&mut self, frame: &Frame) -> Vec<RawDetection>;

    /// Whether the source has run dry (only meaningful for replays).
    fn is_exhausted(&self) -> bool {
        false
    }
}

/// Normalizes raw detector output for one frame.
#[derive(Debug, Clone)]
pub struct DetectionAdapter {
    confidence_threshold: f32,
}

impl DetectionAdapter {
    pub fn new(confidence_threshold: f32) -> Self {
        Self {
            confidence_threshold,
        }
    }

    /// Keep the detections the loop may reason about, in input order.
    pub fn normalize(&self, raw: Vec<RawDetection>) -> Vec<DetectedObject> {
        raw.into_iter()
            .filter_map(|r| self.normalize_one(r))
            .collect()
    }

    fn normalize_one(&self, raw: RawDetection) -> Option<DetectedObject> {
        let class = match raw.class_name.parse::<ObjectClass>() {
            Ok(class) => class,
            Err(_) => {
                debug!(class = %raw.class_name, "Dropping detection of unknown class");
                return None;
            }
        };

        let [x1, y1, x2, y2] = raw.bbox;
        let bbox = BBox::new(x1, y1, x2, y2);
        if !bbox.is_valid() || !raw.confidence.is_finite() || !(0.0..=1.0).contains(&raw.confidence) {
            warn!(%class, bbox = ?raw.bbox, confidence = raw.confidence, "Discarding malformed detection");
            return None;
        }

        if raw.confidence < self.confidence_threshold {
            return None;
        }

        Some(DetectedObject::new(class, bbox, raw.confidence))
    }
}

// ============================================================================
// Replay detector
// ============================================================================

/// Plays back recorded detections, one frame per JSON line.
///
/// Each line is a JSON array of `{"class", "bbox", "confidence"}` objects.
/// Blank lines are frames with nothing in them.
#[derive(Debug, Clone)]
pub struct ReplayDetector {
    frames: Vec<Vec<RawDetection>>,
    cursor: usize,
    looping: bool,
}

impl ReplayDetector {
    pub fn new(frames: Vec<Vec<RawDetection>>) -> Self {
        Self {
            frames,
            cursor: 0,
            looping: false,
        }
    }

    /// Load a JSON-lines recording.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| Error::replay(format!("cannot read {}: {}", path.display(), e)))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let mut frames = Vec::new();
        for (idx, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                frames.push(Vec::new());
                continue;
            }
            let frame: Vec<RawDetection> = serde_json::from_str(line)
                .map_err(|e| Error::replay(format!("line {}: {}", idx + 1, e)))?;
            frames.push(frame);
        }
        Ok(Self::new(frames))
    }

    /// Start over from the first frame when the recording ends.
    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl Detector for ReplayDetector {
    fn detect(&mut self, _frame: &Frame) -> Vec<RawDetection> {
        if self.cursor >= self.frames.len() {
            if !self.looping || self.frames.is_empty() {
                return Vec::new();
            }
            self.cursor = 0;
        }
        let frame = self.frames[self.cursor].clone();
        self.cursor += 1;
        frame
    }

    fn is_exhausted(&self) -> bool {
        !self.looping && self.cursor >= self.frames.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CaptureRegion;

    fn frame() -> Frame {
        Frame::blank(CaptureRegion::default(), 0)
    }

    #[test]
    fn test_class_actions_are_exhaustive() {
        assert_eq!(ObjectClass::Mob.action(), Some(ClassAction::Attack));
        assert_eq!(ObjectClass::Item.action(), Some(ClassAction::Pickup));
        assert_eq!(ObjectClass::Npc.action(), Some(ClassAction::Interact));
        for class in [ObjectClass::Character, ObjectClass::Environment, ObjectClass::Ui] {
            assert!(!class.is_actionable(), "{} must be detection-only", class);
        }
    }

    #[test]
    fn test_class_parse() {
        assert_eq!("MOB".parse::<ObjectClass>().unwrap(), ObjectClass::Mob);
        assert_eq!(" npc ".parse::<ObjectClass>().unwrap(), ObjectClass::Npc);
        assert!("dragon".parse::<ObjectClass>().is_err());
    }

    #[test]
    fn test_bbox_center_and_validity() {
        let bbox = BBox::new(10.0, 20.0, 30.0, 60.0);
        assert_eq!(bbox.center(), Point::new(20.0, 40.0));
        assert!(bbox.is_valid());

        assert!(!BBox::new(30.0, 0.0, 10.0, 5.0).is_valid());
        assert!(!BBox::new(f32::NAN, 0.0, 10.0, 5.0).is_valid());
    }

    #[test]
    fn test_adapter_filters_threshold_and_garbage() {
        let adapter = DetectionAdapter::new(0.5);
        let raw = vec![
            RawDetection::new("mob", [0.0, 0.0, 10.0, 10.0], 0.9),
            RawDetection::new("item", [0.0, 0.0, 10.0, 10.0], 0.49),
            RawDetection::new("npc", [0.0, 0.0, 10.0, 10.0], 0.5),
            RawDetection::new("ghost", [0.0, 0.0, 10.0, 10.0], 0.9),
            RawDetection::new("mob", [f32::NAN, 0.0, 10.0, 10.0], 0.9),
            RawDetection::new("mob", [0.0, 0.0, 10.0, 10.0], f32::NAN),
            RawDetection::new("mob", [0.0, 0.0, 10.0, 10.0], 1.5),
        ];

        let objects = adapter.normalize(raw);
        let classes: Vec<_> = objects.iter().map(|o| o.class).collect();
        assert_eq!(classes, vec![ObjectClass::Mob, ObjectClass::Npc]);
    }

    #[test]
    fn test_replay_parse_and_exhaust() {
        let content = r#"[{"class":"mob","bbox":[0,0,10,10],"confidence":0.8}]

[{"class":"item","bbox":[5,5,15,15],"confidence":0.7},{"class":"ui","bbox":[0,0,1,1],"confidence":0.9}]"#;
        let mut replay = ReplayDetector::parse(content).unwrap();
        assert_eq!(replay.len(), 3);

        assert_eq!(replay.detect(&frame()).len(), 1);
        assert!(replay.detect(&frame()).is_empty());
        assert_eq!(replay.detect(&frame()).len(), 2);
        assert!(replay.is_exhausted());
        assert!(replay.detect(&frame()).is_empty());
    }

    #[test]
    fn test_replay_looping() {
        let mut replay = ReplayDetector::new(vec![vec![RawDetection::new(
            "mob",
            [0.0, 0.0, 1.0, 1.0],
            0.9,
        )]])
        .looping(true);
        for _ in 0..3 {
            assert_eq!(replay.detect(&frame()).len(), 1);
        }
        assert!(!replay.is_exhausted());
    }

    #[test]
    fn test_replay_bad_line_reports_position() {
        let err = ReplayDetector::parse("[]\n{not json").unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }
}
