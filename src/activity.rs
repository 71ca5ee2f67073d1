//! Heuristic activity estimation for detected people.
//!
//! The label comes from how far the box moved since the previous person
//! observation, how low it sits in the frame and how tall it is. The
//! thresholds are calibrated for a 640x480 capture.

use serde::{Deserialize, Serialize};

use crate::detect::BoundingBox;

/// Coarse activity label for a person.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Activity {
    #[serde(rename = "walking")]
    Walking,
    #[serde(rename = "sitting")]
    Sitting,
    #[serde(rename = "close & talking")]
    CloseAndTalking,
    #[serde(rename = "standing")]
    Standing,
    #[serde(rename = "unknown")]
    Unknown,
}

impl Activity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Walking => "walking",
            Self::Sitting => "sitting",
            Self::CloseAndTalking => "close & talking",
            Self::Standing => "standing",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for Activity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Last person box seen by the pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PreviousObservation {
    pub bbox: BoundingBox,
}

impl PreviousObservation {
    pub fn new(bbox: BoundingBox) -> Self {
        Self { bbox }
    }
}

/// Pixel thresholds for the activity rules.
///
/// Values only make sense for the capture resolution they were tuned on.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActivityThresholds {
    /// Movement above this is walking.
    pub walking_movement: f32,
    /// Movement below this counts as still.
    pub still_movement: f32,
    /// Box top below this row counts as low in frame.
    pub low_y: f32,
    /// Box taller than this is close to the camera.
    pub close_height: f32,
}

impl ActivityThresholds {
    pub const CALIBRATION_WIDTH: u32 = 640;
    pub const CALIBRATION_HEIGHT: u32 = 480;

    pub const CALIBRATED_640X480: Self = Self {
        walking_movement: 20.0,
        still_movement: 5.0,
        low_y: 280.0,
        close_height: 300.0,
    };

    pub fn is_calibrated_for(width: u32, height: u32) -> bool {
        width == Self::CALIBRATION_WIDTH && height == Self::CALIBRATION_HEIGHT
    }
}

impl Default for ActivityThresholds {
    fn default() -> Self {
        Self::CALIBRATED_640X480
    }
}

/// Distance between the top-left corners of two boxes, 0 with no previous box.
pub fn movement(current: &BoundingBox, previous: Option<&PreviousObservation>) -> f32 {
    match previous {
        Some(prev) => {
            let dx = current.x - prev.bbox.x;
            let dy = current.y - prev.bbox.y;
            (dx * dx + dy * dy).sqrt()
        }
        None => 0.0,
    }
}

/// Classify a person box. Rules are checked in order and the first match wins.
///
/// A box containing NaN fails every comparison and lands on `Standing`.
pub fn estimate(
    bbox: Option<&BoundingBox>,
    previous: Option<&PreviousObservation>,
    thresholds: &ActivityThresholds,
) -> Activity {
    let Some(bbox) = bbox else {
        return Activity::Unknown;
    };

    let movement = movement(bbox, previous);
    let is_low = bbox.y > thresholds.low_y;
    let is_close = bbox.height > thresholds.close_height;

    if movement > thresholds.walking_movement {
        Activity::Walking
    } else if is_low && movement < thresholds.still_movement {
        Activity::Sitting
    } else if is_close {
        Activity::CloseAndTalking
    } else {
        Activity::Standing
    }
}
