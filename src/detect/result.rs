use serde::{Deserialize, Serialize};

use crate::activity::Activity;

/// Axis-aligned box in frame pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Inclusive on all four edges.
    pub fn contains(&self, px: f32, py: f32) -> bool {
        px >= self.x && px <= self.x + self.width && py >= self.y && py <= self.y + self.height
    }
}

/// Object class reported by the detector.
///
/// Every per-class lookup matches on this enum; `Other` is the default arm for
/// labels outside the allow-list.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ObjectClass {
    Person,
    CellPhone,
    Bottle,
    Cup,
    Keyboard,
    Other(String),
}

impl ObjectClass {
    pub fn from_label(label: &str) -> Self {
        match label {
            "person" => Self::Person,
            "cell phone" => Self::CellPhone,
            "bottle" => Self::Bottle,
            "cup" => Self::Cup,
            "keyboard" => Self::Keyboard,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Self::Person => "person",
            Self::CellPhone => "cell phone",
            Self::Bottle => "bottle",
            Self::Cup => "cup",
            Self::Keyboard => "keyboard",
            Self::Other(label) => label,
        }
    }

    /// Overlay glyph. Classes without one render no icon.
    pub fn icon(&self) -> &'static str {
        match self {
            Self::Person => "🧍",
            Self::CellPhone => "📱",
            Self::Bottle => "🍼",
            Self::Cup => "🥤",
            Self::Keyboard => "⌨️",
            Self::Other(_) => "",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Person => {
                "A person is detected. The system estimates their activity based on motion and position."
            }
            Self::CellPhone => {
                "Smart device detected, possibly used for communication or AR interaction."
            }
            Self::Bottle => {
                "Bottle detected. Could be part of a health, hydration or tracking scenario."
            }
            Self::Cup => {
                "Cup detected. Common everyday object used in many AR demos and UI overlays."
            }
            Self::Keyboard => {
                "Keyboard detected. Represents workstation or productivity environment."
            }
            Self::Other(_) => "No additional information available.",
        }
    }

    pub fn is_person(&self) -> bool {
        matches!(self, Self::Person)
    }
}

impl From<String> for ObjectClass {
    fn from(label: String) -> Self {
        Self::from_label(&label)
    }
}

impl From<ObjectClass> for String {
    fn from(class: ObjectClass) -> Self {
        class.label().to_string()
    }
}

impl std::fmt::Display for ObjectClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Unfiltered detector output.
#[derive(Clone, Debug, PartialEq)]
pub struct RawDetection {
    pub label: String,
    pub score: f32,
    pub bbox: BoundingBox,
}

impl RawDetection {
    pub fn new(label: impl Into<String>, score: f32, bbox: BoundingBox) -> Self {
        Self {
            label: label.into(),
            score,
            bbox,
        }
    }
}

/// Allow-listed detection, annotated with an activity when it is a person.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub class: ObjectClass,
    pub score: f32,
    pub bbox: BoundingBox,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity: Option<Activity>,
}

impl Detection {
    /// Score as a rounded percentage.
    pub fn confidence_percent(&self) -> u32 {
        confidence_percent(self.score)
    }
}

fn confidence_percent(score: f32) -> u32 {
    let pct = (score * 100.0).round();
    if pct.is_finite() && pct > 0.0 {
        pct as u32
    } else {
        0
    }
}
