//! Frame acquisition seam.
//!
//! Screen capture itself is an external collaborator. The loop only needs a
//! [`Frame`] carrying the capture geometry (so frame coordinates can be
//! turned into screen coordinates) and whatever pixels the detector wants.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::config::CaptureRegion;
use crate::detection::Point;
use crate::error::Result;

/// One captured frame.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Screen region the frame was grabbed from
    pub region: CaptureRegion,
    /// Monotonic frame number within the session
    pub sequence: u64,
    /// Raw RGB pixels, empty when the detector does not need them
    pub pixels: Vec<u8>,
    pub captured_at: DateTime<Utc>,
}

impl Frame {
    /// A frame with geometry but no pixel data.
    pub fn blank(region: CaptureRegion, sequence: u64) -> Self {
        Self {
            region,
            sequence,
            pixels: Vec::new(),
            captured_at: Utc::now(),
        }
    }

    pub fn center(&self) -> Point {
        Point::new(self.region.width as f32 / 2.0, self.region.height as f32 / 2.0)
    }

    /// Frame coordinates to absolute screen coordinates.
    pub fn to_screen(&self, point: Point) -> Point {
        point.offset(self.region.x as f32, self.region.y as f32)
    }
}

/// Source of frames. Failures are retryable at the loop driver.
#[async_trait]
pub trait FrameSource: Send + Sync {
    async fn capture(&self) -> Result<Frame>;
}

/// Produces pixel-less frames for the configured region.
///
/// Used when detections come from a replay rather than a live model.
pub struct RegionFrameSource {
    region: CaptureRegion,
    sequence: std::sync::atomic::AtomicU64,
}

impl RegionFrameSource {
    pub fn new(region: CaptureRegion) -> Self {
        Self {
            region,
            sequence: std::sync::atomic::AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl FrameSource for RegionFrameSource {
    async fn capture(&self) -> Result<Frame> {
        let sequence = self
            .sequence
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Ok(Frame::blank(self.region, sequence))
    }
}
