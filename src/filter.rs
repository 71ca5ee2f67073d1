//! Allow-list filtering of raw detector output.

use crate::detect::{Detection, ObjectClass, RawDetection};

/// Fixed set of classes the pipeline processes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AllowList {
    classes: Vec<ObjectClass>,
}

impl AllowList {
    pub fn classes(&self) -> &[ObjectClass] {
        &self.classes
    }

    pub fn allows(&self, class: &ObjectClass) -> bool {
        self.classes.contains(class)
    }

    /// Keep allowed detections in detector order.
    pub fn filter(&self, raw: Vec<RawDetection>) -> Vec<Detection> {
        raw.into_iter()
            .filter_map(|det| {
                let class = ObjectClass::from_label(&det.label);
                self.allows(&class).then_some(Detection {
                    class,
                    score: det.score,
                    bbox: det.bbox,
                    activity: None,
                })
            })
            .collect()
    }
}

impl Default for AllowList {
    fn default() -> Self {
        Self {
            classes: vec![
                ObjectClass::Person,
                ObjectClass::CellPhone,
                ObjectClass::Bottle,
                ObjectClass::Cup,
                ObjectClass::Keyboard,
            ],
        }
    }
}
