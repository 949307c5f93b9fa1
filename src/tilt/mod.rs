//! Head roll classification from the eye line

use crate::config::check_tilt_threshold;
use crate::error::{AlignError, AlignResult};
use crate::landmarks::LandmarkMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TiltStatus {
    Level,
    Tilted,
    /// An eye center is missing, distinct from a tilt rejection
    NoLandmarks,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TiltVerdict {
    pub status: TiltStatus,
    pub acceptable: bool,
    pub angle_degrees: Option<f64>,
    pub reason: String,
}

impl TiltVerdict {
    /// Error form of a rejected verdict, `None` when acceptable.
    pub fn to_error(&self, threshold_degrees: f64, image_id: &str) -> Option<AlignError> {
        match (self.status, self.angle_degrees) {
            (TiltStatus::Level, _) => None,
            (TiltStatus::Tilted, Some(angle_degrees)) => Some(AlignError::HeadTilted {
                angle_degrees,
                threshold_degrees,
            }),
            _ => Some(AlignError::NoFaceDetected(image_id.to_string())),
        }
    }
}

/// Angle of the left-to-right eye line in degrees. Only roll is measured.
pub fn eye_line_angle(landmarks: &LandmarkMap) -> Option<f64> {
    let (left, right) = landmarks.eyes()?;
    Some((right.y - left.y).atan2(right.x - left.x).to_degrees())
}

/// Accept when `|angle| <= threshold_degrees`; an angle exactly at the
/// threshold is accepted.
pub fn classify(landmarks: &LandmarkMap, threshold_degrees: f64) -> TiltVerdict {
    let Some(angle) = eye_line_angle(landmarks) else {
        return TiltVerdict {
            status: TiltStatus::NoLandmarks,
            acceptable: false,
            angle_degrees: None,
            reason: "no landmarks".to_string(),
        };
    };

    if angle.abs() > threshold_degrees {
        TiltVerdict {
            status: TiltStatus::Tilted,
            acceptable: false,
            angle_degrees: Some(angle),
            reason: format!("{:.1}° exceeds {}° threshold", angle, threshold_degrees),
        }
    } else {
        TiltVerdict {
            status: TiltStatus::Level,
            acceptable: true,
            angle_degrees: Some(angle),
            reason: format!("{:.1}° within {}° threshold", angle, threshold_degrees),
        }
    }
}

/// Holds the runtime-adjustable threshold.
#[derive(Debug, Clone)]
pub struct TiltClassifier {
    threshold_degrees: f64,
}

impl Default for TiltClassifier {
    fn default() -> Self {
        Self {
            threshold_degrees: 5.0,
        }
    }
}

impl TiltClassifier {
    pub fn new(threshold_degrees: f64) -> AlignResult<Self> {
        check_tilt_threshold(threshold_degrees).map_err(AlignError::ConfigurationError)?;
        Ok(Self { threshold_degrees })
    }

    pub fn threshold(&self) -> f64 {
        self.threshold_degrees
    }

    /// Takes effect on the next `classify` call.
    pub fn set_threshold(&mut self, threshold_degrees: f64) -> AlignResult<()> {
        check_tilt_threshold(threshold_degrees).map_err(AlignError::ConfigurationError)?;
        self.threshold_degrees = threshold_degrees;
        Ok(())
    }

    pub fn classify(&self, landmarks: &LandmarkMap) -> TiltVerdict {
        classify(landmarks, self.threshold_degrees)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::{LandmarkKey, Point};

    fn eyes_at(angle_degrees: f64) -> LandmarkMap {
        let rad = angle_degrees.to_radians();
        LandmarkMap::new()
            .with(LandmarkKey::LeftEye, Point::new(100.0, 100.0))
            .with(
                LandmarkKey::RightEye,
                Point::new(100.0 + 80.0 * rad.cos(), 100.0 + 80.0 * rad.sin()),
            )
    }

    #[test]
    fn test_level_and_tilted() {
        let level = classify(&eyes_at(0.0), 5.0);
        assert!(level.acceptable);
        assert_eq!(level.status, TiltStatus::Level);
        assert!(level.angle_degrees.unwrap().abs() < 1e-9);

        let tilted = classify(&eyes_at(10.0), 5.0);
        assert!(!tilted.acceptable);
        assert_eq!(tilted.status, TiltStatus::Tilted);
        assert!((tilted.angle_degrees.unwrap() - 10.0).abs() < 1e-9);

        let negative = classify(&eyes_at(-10.0), 5.0);
        assert!(!negative.acceptable);
    }

    #[test]
    fn test_boundary_is_consistent() {
        let map = eyes_at(5.0);
        let first = classify(&map, 5.0);
        let second = classify(&map, 5.0);
        assert_eq!(first, second);
    }

    #[test]
    fn test_missing_eye_is_not_a_tilt() {
        let map = LandmarkMap::new().with(LandmarkKey::LeftEye, Point::new(1.0, 1.0));
        let verdict = classify(&map, 5.0);
        assert_eq!(verdict.status, TiltStatus::NoLandmarks);
        assert_eq!(verdict.reason, "no landmarks");
        assert!(matches!(
            verdict.to_error(5.0, "a.jpg"),
            Some(AlignError::NoFaceDetected(_))
        ));
    }

    #[test]
    fn test_threshold_change_applies_immediately() {
        let mut classifier = TiltClassifier::default();
        let map = eyes_at(7.0);
        assert!(!classifier.classify(&map).acceptable);

        classifier.set_threshold(10.0).unwrap();
        assert!(classifier.classify(&map).acceptable);

        assert!(classifier.set_threshold(45.0).is_err());
        assert_eq!(classifier.threshold(), 10.0);
    }

    #[test]
    fn test_rejection_error() {
        let verdict = classify(&eyes_at(7.26), 5.0);
        let err = verdict.to_error(5.0, "a.jpg").unwrap();
        assert_eq!(err.to_string(), "head tilted 7.3° exceeds threshold 5°");
    }
}
