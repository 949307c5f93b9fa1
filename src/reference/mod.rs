//! Target landmark layout every image is aligned onto

use crate::config::check_eye_distance_percent;
use crate::error::{AlignError, AlignResult};
use crate::landmarks::{LandmarkExtractor, LandmarkKey, LandmarkMap, Point};
use crate::utils::SourceImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};

/// Fraction of the output height at which the eye line sits.
pub const EYE_LINE_HEIGHT_FRACTION: f64 = 0.38;

/// Where the active reference came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReferenceSource {
    Synthesized { eye_distance_percent: f64 },
    Image { id: String, size: (u32, u32) },
}

impl fmt::Display for ReferenceSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReferenceSource::Synthesized {
                eye_distance_percent,
            } => write!(f, "synthesized ({}% eye distance)", eye_distance_percent),
            ReferenceSource::Image { id, size } => write!(f, "{} ({}x{})", id, size.0, size.1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceModel {
    landmarks: LandmarkMap,
    output_size: (u32, u32),
    source: ReferenceSource,
}

impl ReferenceModel {
    /// Canonical frontal layout: eyes centered horizontally on the eye line,
    /// `eye_distance_percent` of the width apart, with the rest of the face
    /// at fixed fractions of the canvas.
    pub fn from_percentage(eye_distance_percent: f64, output_size: (u32, u32)) -> AlignResult<Self> {
        check_eye_distance_percent(eye_distance_percent).map_err(AlignError::ConfigurationError)?;
        if output_size.0 == 0 || output_size.1 == 0 {
            return Err(AlignError::ConfigurationError(format!(
                "output size must be non-zero, got {}x{}",
                output_size.0, output_size.1
            )));
        }

        let w = output_size.0 as f64;
        let h = output_size.1 as f64;
        let center_x = w / 2.0;
        let eye_y = h * EYE_LINE_HEIGHT_FRACTION;
        let half_distance = w * eye_distance_percent / 100.0 / 2.0;
        let left_x = center_x - half_distance;
        let right_x = center_x + half_distance;

        let below = |fraction: f64| eye_y + fraction * h;
        let landmarks = LandmarkMap::new()
            .with(LandmarkKey::LeftEye, Point::new(left_x, eye_y))
            .with(LandmarkKey::RightEye, Point::new(right_x, eye_y))
            .with(LandmarkKey::LeftEyeCorner, Point::new(left_x - 0.05 * w, eye_y))
            .with(LandmarkKey::RightEyeCorner, Point::new(right_x + 0.05 * w, eye_y))
            .with(LandmarkKey::LeftEyeInner, Point::new(left_x + 0.03 * w, eye_y))
            .with(LandmarkKey::RightEyeInner, Point::new(right_x - 0.03 * w, eye_y))
            .with(LandmarkKey::Forehead, Point::new(center_x, below(-0.15)))
            .with(LandmarkKey::TopNose, Point::new(center_x, below(0.04)))
            .with(LandmarkKey::NoseTip, Point::new(center_x, below(0.08)))
            .with(LandmarkKey::Nose, Point::new(center_x, below(0.12)))
            .with(LandmarkKey::BottomNose, Point::new(center_x, below(0.16)))
            .with(LandmarkKey::UpperLip, Point::new(center_x, below(0.19)))
            .with(LandmarkKey::Mouth, Point::new(center_x, below(0.22)))
            .with(LandmarkKey::LeftMouth, Point::new(center_x - 0.08 * w, below(0.22)))
            .with(LandmarkKey::RightMouth, Point::new(center_x + 0.08 * w, below(0.22)))
            .with(LandmarkKey::LowerLip, Point::new(center_x, below(0.24)))
            .with(LandmarkKey::Chin, Point::new(center_x, below(0.35)));

        debug!(
            eye_distance_percent = eye_distance_percent,
            width = output_size.0,
            height = output_size.1,
            "Synthesized reference layout"
        );

        Ok(Self {
            landmarks,
            output_size,
            source: ReferenceSource::Synthesized {
                eye_distance_percent,
            },
        })
    }

    /// Use the landmarks of a chosen image as the target layout.
    ///
    /// With `force_reference_size` the output size becomes the reference
    /// image's own size, otherwise `configured_size` is kept.
    pub fn from_image(
        image: &SourceImage,
        extractor: &dyn LandmarkExtractor,
        force_reference_size: bool,
        configured_size: (u32, u32),
    ) -> AlignResult<Self> {
        let landmarks = extractor
            .extract(image)
            .ok_or_else(|| AlignError::NoFaceDetected(image.id.clone()))?;

        let output_size = if force_reference_size {
            image.dimensions()
        } else {
            configured_size
        };

        let model = Self::from_landmarks(
            landmarks,
            output_size,
            ReferenceSource::Image {
                id: image.id.clone(),
                size: image.dimensions(),
            },
        )?;

        info!(
            reference = %image.id,
            extractor = extractor.name(),
            width = output_size.0,
            height = output_size.1,
            forced_size = force_reference_size,
            "Reference set from image"
        );
        Ok(model)
    }

    /// Wrap an existing layout, checking it carries both eyes and a nose
    /// point.
    pub fn from_landmarks(
        landmarks: LandmarkMap,
        output_size: (u32, u32),
        source: ReferenceSource,
    ) -> AlignResult<Self> {
        landmarks.require(LandmarkKey::LeftEye)?;
        landmarks.require(LandmarkKey::RightEye)?;
        if !landmarks.contains(LandmarkKey::NoseTip) && !landmarks.contains(LandmarkKey::Nose) {
            return Err(AlignError::InsufficientLandmarks(
                "reference needs 'nose_tip' or 'nose'".to_string(),
            ));
        }

        Ok(Self {
            landmarks,
            output_size,
            source,
        })
    }

    /// Re-derive the output size of an image reference after the sizing
    /// settings changed. Synthesized layouts keep their size.
    pub fn apply_size_policy(&mut self, force_reference_size: bool, configured_size: (u32, u32)) {
        if let ReferenceSource::Image { size, .. } = &self.source {
            self.output_size = if force_reference_size {
                *size
            } else {
                configured_size
            };
        }
    }

    pub fn landmarks(&self) -> &LandmarkMap {
        &self.landmarks
    }

    pub fn output_size(&self) -> (u32, u32) {
        self.output_size
    }

    pub fn source(&self) -> &ReferenceSource {
        &self.source
    }

    pub fn is_from_image(&self) -> bool {
        matches!(self.source, ReferenceSource::Image { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    struct Fixed(Option<LandmarkMap>);

    impl LandmarkExtractor for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        fn extract(&self, _image: &SourceImage) -> Option<LandmarkMap> {
            self.0.clone()
        }
    }

    #[test]
    fn test_synthesized_eye_positions() {
        let model = ReferenceModel::from_percentage(30.0, (512, 512)).unwrap();
        let (left, right) = model.landmarks().eyes().unwrap();

        assert!((left.x - 179.2).abs() < 1e-9);
        assert!((right.x - 332.8).abs() < 1e-9);
        assert!((left.y - 194.56).abs() < 1e-9);
        assert_eq!(left.y, right.y);

        let nose = model.landmarks().get(LandmarkKey::NoseTip).unwrap();
        let chin = model.landmarks().get(LandmarkKey::Chin).unwrap();
        let forehead = model.landmarks().get(LandmarkKey::Forehead).unwrap();
        assert!(forehead.y < left.y && left.y < nose.y && nose.y < chin.y);
        assert_eq!(model.landmarks().len(), LandmarkKey::ALL.len());
    }

    #[test]
    fn test_percentage_out_of_range() {
        for percent in [10.0, 50.0, f64::NAN] {
            let err = ReferenceModel::from_percentage(percent, (512, 512)).unwrap_err();
            assert!(matches!(err, AlignError::ConfigurationError(_)));
        }
        assert!(ReferenceModel::from_percentage(15.0, (512, 512)).is_ok());
        assert!(ReferenceModel::from_percentage(45.0, (512, 512)).is_ok());
    }

    #[test]
    fn test_from_image_forces_size() {
        let image = SourceImage::new("ref.png", RgbImage::new(800, 600));
        let map = LandmarkMap::new()
            .with(LandmarkKey::LeftEye, Point::new(300.0, 250.0))
            .with(LandmarkKey::RightEye, Point::new(500.0, 250.0))
            .with(LandmarkKey::Nose, Point::new(400.0, 330.0));

        let forced = ReferenceModel::from_image(&image, &Fixed(Some(map.clone())), true, (512, 512)).unwrap();
        assert_eq!(forced.output_size(), (800, 600));
        assert!(forced.is_from_image());

        let kept = ReferenceModel::from_image(&image, &Fixed(Some(map)), false, (512, 512)).unwrap();
        assert_eq!(kept.output_size(), (512, 512));
    }

    #[test]
    fn test_size_policy_follows_flag() {
        let image = SourceImage::new("ref.png", RgbImage::new(300, 200));
        let map = LandmarkMap::new()
            .with(LandmarkKey::LeftEye, Point::new(120.0, 80.0))
            .with(LandmarkKey::RightEye, Point::new(180.0, 80.0))
            .with(LandmarkKey::NoseTip, Point::new(150.0, 110.0));
        let mut model = ReferenceModel::from_image(&image, &Fixed(Some(map)), true, (512, 512)).unwrap();

        model.apply_size_policy(false, (640, 480));
        assert_eq!(model.output_size(), (640, 480));
        model.apply_size_policy(true, (640, 480));
        assert_eq!(model.output_size(), (300, 200));

        let mut synthesized = ReferenceModel::from_percentage(30.0, (512, 512)).unwrap();
        synthesized.apply_size_policy(true, (640, 480));
        assert_eq!(synthesized.output_size(), (512, 512));
    }

    #[test]
    fn test_from_image_without_face() {
        let image = SourceImage::new("blank.png", RgbImage::new(64, 64));
        let err = ReferenceModel::from_image(&image, &Fixed(None), true, (512, 512)).unwrap_err();
        assert!(matches!(err, AlignError::NoFaceDetected(_)));
    }

    #[test]
    fn test_reference_without_nose_is_rejected() {
        let map = LandmarkMap::new()
            .with(LandmarkKey::LeftEye, Point::new(1.0, 1.0))
            .with(LandmarkKey::RightEye, Point::new(9.0, 1.0));
        let err = ReferenceModel::from_landmarks(
            map,
            (64, 64),
            ReferenceSource::Synthesized {
                eye_distance_percent: 30.0,
            },
        )
        .unwrap_err();
        assert!(matches!(err, AlignError::InsufficientLandmarks(_)));
    }
}
