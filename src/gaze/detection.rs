//! Object detections and the per-frame gaze heuristics.
//!
//! Coordinates are normalized to the frame (`0.0..=1.0`). The detector
//! reports a `view_marker` where the eye tracker places the driver's gaze;
//! every other object whose box touches the marker counts as seen.

use serde::{Deserialize, Serialize};

pub const VIEW_MARKER: &str = "view_marker";
pub const MIRROR: &str = "mirror";
pub const LEFT_MIRROR: &str = "left_mirror";
pub const RIGHT_MIRROR: &str = "right_mirror";
pub const REARVIEW_MIRROR: &str = "rearview_mirror";
pub const ROAD: &str = "road";
/// Lane markings are reported as `marker` and count as road.
const LANE_MARKER: &str = "marker";

/// Axis-aligned box in normalized frame coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f32; 4]", into = "[f32; 4]")]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn center(&self) -> (f32, f32) {
        ((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }

    /// Boxes that merely touch intersect.
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        !(self.x1 > other.x2 || other.x1 > self.x2 || self.y1 > other.y2 || other.y1 > self.y2)
    }
}

impl From<[f32; 4]> for BoundingBox {
    fn from(c: [f32; 4]) -> Self {
        Self::new(c[0], c[1], c[2], c[3])
    }
}

impl From<BoundingBox> for [f32; 4] {
    fn from(b: BoundingBox) -> Self {
        [b.x1, b.y1, b.x2, b.y2]
    }
}

/// One object found in a frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub label: String,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

impl Detection {
    pub fn new(label: impl Into<String>, confidence: f32, bbox: BoundingBox) -> Self {
        Self {
            label: label.into(),
            confidence,
            bbox,
        }
    }
}

/// Objects the driver looked at in one frame, in detection order.
pub fn seen_objects(detections: &[Detection], min_confidence: f32) -> Vec<String> {
    let mut labelled: Vec<Detection> = detections
        .iter()
        .filter(|d| d.confidence >= min_confidence)
        .cloned()
        .collect();

    name_mirrors(&mut labelled);

    let Some(marker_idx) = labelled.iter().position(|d| d.label == VIEW_MARKER) else {
        return Vec::new();
    };
    let marker = labelled[marker_idx].bbox;

    labelled
        .iter()
        .filter(|d| d.label != VIEW_MARKER)
        .filter(|d| d.bbox.intersects(&marker))
        .map(|d| {
            if d.label == LANE_MARKER {
                ROAD.to_string()
            } else {
                d.label.clone()
            }
        })
        .collect()
}

/// Rename generic mirrors by their horizontal position.
///
/// Leftmost becomes `left_mirror`, rightmost `right_mirror`, and the first
/// one strictly between them `rearview_mirror`. A lone mirror is both
/// leftmost and rightmost and ends up as `right_mirror`.
fn name_mirrors(detections: &mut [Detection]) {
    let mut mirrors: Vec<(usize, f32)> = detections
        .iter()
        .enumerate()
        .filter(|(_, d)| d.label == MIRROR)
        .map(|(i, d)| (i, d.bbox.center().0))
        .collect();

    match mirrors.len() {
        0 => {}
        1 => detections[mirrors[0].0].label = RIGHT_MIRROR.to_string(),
        _ => {
            mirrors.sort_by(|a, b| a.1.total_cmp(&b.1));
            let (left_idx, left_x) = mirrors[0];
            let (right_idx, right_x) = mirrors[mirrors.len() - 1];

            let rearview = mirrors[1..mirrors.len() - 1]
                .iter()
                .find(|(_, x)| left_x < *x && *x < right_x)
                .map(|(i, _)| *i);

            detections[left_idx].label = LEFT_MIRROR.to_string();
            detections[right_idx].label = RIGHT_MIRROR.to_string();
            if let Some(idx) = rearview {
                detections[idx].label = REARVIEW_MIRROR.to_string();
            }
        }
    }
}
