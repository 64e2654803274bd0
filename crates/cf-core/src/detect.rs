//! Detection data model: per-frame outcomes and time ranges

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle in frame coordinates
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// One detection a plugin produced for a frame.
///
/// `Flag` items are the multi-frame convention: an outcome whose items are
/// all flags is a retroactive inclusion column, one entry per accumulated
/// frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DetectionItem {
    Rect(Rect),
    RectTag { rect: Rect, tag: String },
    Scalar(f64),
    Flag(bool),
}

impl DetectionItem {
    pub fn as_flag(&self) -> Option<bool> {
        match self {
            Self::Flag(b) => Some(*b),
            _ => None,
        }
    }
}

/// Verdict of one plugin over one frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub detect: bool,
    pub items: Vec<DetectionItem>,
}

impl Outcome {
    /// The empty-cache default: passes through without detections.
    pub fn pass() -> Self {
        Self {
            detect: true,
            items: Vec::new(),
        }
    }

    pub fn new(detect: bool, items: Vec<DetectionItem>) -> Self {
        Self { detect, items }
    }
}

impl Default for Outcome {
    fn default() -> Self {
        Self::pass()
    }
}

/// Detections recorded per plugin uid for one frame
pub type DetectedData = BTreeMap<String, Vec<DetectionItem>>;

/// One accumulated per-frame verdict
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawData {
    pub frame_number: f64,
    pub include: bool,
    pub detected: DetectedData,
}

/// Contiguous span of frames
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start_frame: f64,
    pub duration: f64,
}

/// Detections of one plugin at one frame inside a range
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameDetections {
    pub frame_number: f64,
    pub items: Vec<DetectionItem>,
}

/// Per-plugin detection lists, ordered by uid then frame
pub type SortedCollection = BTreeMap<String, Vec<FrameDetections>>;

/// A time range together with the detections collected inside it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeRangeWithMetadata {
    pub range: TimeRange,
    pub collection: SortedCollection,
}
