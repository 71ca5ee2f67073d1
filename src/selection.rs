//! Point selection on the rendered overlay and info for the selected object.

use crate::activity::Activity;
use crate::detect::{Detection, ObjectClass};

/// First detection whose box contains the point, in render order.
pub fn hit_test(detections: &[Detection], x: f32, y: f32) -> Option<&Detection> {
    detections.iter().find(|det| det.bbox.contains(x, y))
}

/// What the info panel shows for a selected detection.
#[derive(Clone, Debug, PartialEq)]
pub struct ObjectInfo {
    pub title: String,
    pub description: String,
    pub activity: Option<Activity>,
    pub confidence_percent: u32,
    pub class: Option<ObjectClass>,
}

impl ObjectInfo {
    pub fn for_detection(det: &Detection) -> Self {
        Self {
            title: det.class.label().to_uppercase(),
            description: det.class.description().to_string(),
            activity: det.activity.filter(|_| det.class.is_person()),
            confidence_percent: det.confidence_percent(),
            class: Some(det.class.clone()),
        }
    }

    /// Shown while nothing is selected.
    pub fn placeholder() -> Self {
        Self {
            title: "Object Info".to_string(),
            description: "Select an object by clicking on its AR bounding box.".to_string(),
            activity: None,
            confidence_percent: 0,
            class: None,
        }
    }
}

impl std::fmt::Display for ObjectInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{}", self.title)?;
        writeln!(f, "{}", self.description)?;
        if self.class.is_none() {
            return Ok(());
        }
        if let Some(activity) = self.activity {
            writeln!(f, "Estimated Activity: {activity}")?;
        }
        write!(f, "Confidence: {}%", self.confidence_percent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::BoundingBox;

    fn det(class: ObjectClass, x: f32, activity: Option<Activity>) -> Detection {
        Detection {
            class,
            score: 0.915,
            bbox: BoundingBox::new(x, 10.0, 50.0, 50.0),
            activity,
        }
    }

    #[test]
    fn hit_test_returns_first_match() {
        let dets = vec![
            det(ObjectClass::Cup, 0.0, None),
            det(ObjectClass::Bottle, 25.0, None),
        ];
        assert_eq!(hit_test(&dets, 30.0, 20.0).unwrap().class, ObjectClass::Cup);
        assert_eq!(
            hit_test(&dets, 70.0, 20.0).unwrap().class,
            ObjectClass::Bottle
        );
        assert!(hit_test(&dets, 200.0, 20.0).is_none());
        assert!(hit_test(&[], 0.0, 0.0).is_none());
    }

    #[test]
    fn person_info_includes_activity() {
        let info =
            ObjectInfo::for_detection(&det(ObjectClass::Person, 0.0, Some(Activity::Sitting)));
        assert_eq!(info.title, "PERSON");
        assert_eq!(info.activity, Some(Activity::Sitting));
        assert_eq!(info.confidence_percent, 92);
        assert!(info.to_string().contains("Estimated Activity: sitting"));
    }

    #[test]
    fn unknown_class_gets_generic_description() {
        let info = ObjectInfo::for_detection(&det(
            ObjectClass::Other("laptop".to_string()),
            0.0,
            None,
        ));
        assert_eq!(info.title, "LAPTOP");
        assert_eq!(info.description, "No additional information available.");
        assert!(info.to_string().ends_with("Confidence: 92%"));
    }

    #[test]
    fn placeholder_has_no_confidence_line() {
        let text = ObjectInfo::placeholder().to_string();
        assert!(text.starts_with("Object Info"));
        assert!(!text.contains("Confidence"));
    }
}
