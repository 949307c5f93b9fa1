use face_stack::config::EstimatorConfig;
use face_stack::landmarks::{LandmarkKey, LandmarkMap, ManifestExtractor, Point};
use face_stack::reference::ReferenceModel;
use face_stack::{AlignError, AlignmentEngine, ImageInput, SimilarityTransform, TransformEstimator};
use image::{ImageFormat, Rgb, RgbImage};
use std::io::Cursor;
use std::sync::Arc;

fn png(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| Rgb([(x % 200) as u8, (y % 200) as u8, 30]));
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png).unwrap();
    bytes
}

/// Deterministic spread of faces: varying position, size, roll and nose offset.
fn sample_faces() -> Vec<LandmarkMap> {
    let mut faces = Vec::new();
    for i in 0..6 {
        for j in 0..6 {
            let roll = (i as f64 - 2.5) * 9.0_f64.to_radians();
            let distance = 20.0 + 45.0 * j as f64;
            let (s, c) = roll.sin_cos();
            let left = Point::new(100.0 + 13.0 * i as f64, 150.0 + 7.0 * j as f64);
            let right = Point::new(left.x + distance * c, left.y + distance * s);
            let mid = left.midpoint(&right);
            let nose_drop = distance * 0.6;
            let nose_shift = (j as f64 - 2.0) * 4.0;
            let nose = Point::new(mid.x - nose_drop * s + nose_shift, mid.y + nose_drop * c);
            faces.push(
                LandmarkMap::new()
                    .with(LandmarkKey::LeftEye, left)
                    .with(LandmarkKey::RightEye, right)
                    .with(LandmarkKey::NoseTip, nose),
            );
        }
    }
    faces
}

#[test]
fn test_transform_bounds_hold_for_all_faces() {
    let reference = ReferenceModel::from_percentage(30.0, (512, 512)).unwrap();
    let estimator = TransformEstimator::default();

    for face in sample_faces() {
        let estimate = estimator
            .estimate(&face, reference.landmarks(), reference.output_size())
            .unwrap();
        let t = estimate.transform;
        assert!(t.scale() > 0.0);
        assert!(t.scale() >= 0.5 - 1e-12 && t.scale() <= 2.0 + 1e-12);
        assert!(t.rotation_degrees().abs() <= 8.0 + 1e-9);
        assert!((0.0..=1.0).contains(&estimate.quality.score));
    }
}

#[test]
fn test_eye_midpoint_lands_within_tolerance() {
    let reference = ReferenceModel::from_percentage(35.0, (600, 600)).unwrap();
    let (dst_left, dst_right) = reference.landmarks().eyes().unwrap();
    let dst_mid = dst_left.midpoint(&dst_right);
    let estimator = TransformEstimator::default();

    for face in sample_faces() {
        let (left, right) = face.eyes().unwrap();
        let estimate = estimator
            .estimate(&face, reference.landmarks(), reference.output_size())
            .unwrap();
        let mapped = estimate.transform.apply(left.midpoint(&right));
        assert!(
            mapped.distance(&dst_mid) <= 2.0 + 1e-9,
            "midpoint off by {}",
            mapped.distance(&dst_mid)
        );
    }
}

#[test]
fn test_matrix_is_strict_similarity() {
    let reference = ReferenceModel::from_percentage(30.0, (512, 512)).unwrap();
    let estimator = TransformEstimator::default();
    for face in sample_faces().into_iter().take(8) {
        let m = estimator
            .estimate(&face, reference.landmarks(), (512, 512))
            .unwrap()
            .transform
            .matrix();
        assert!((m[0][0] - m[1][1]).abs() < 1e-12);
        assert!((m[0][1] + m[1][0]).abs() < 1e-12);
    }
}

#[test]
fn test_round_trip_through_reference_image() {
    let face = LandmarkMap::new()
        .with(LandmarkKey::LeftEye, Point::new(120.0, 140.0))
        .with(LandmarkKey::RightEye, Point::new(200.0, 143.0))
        .with(LandmarkKey::NoseTip, Point::new(161.0, 190.0))
        .with(LandmarkKey::Chin, Point::new(160.0, 260.0));
    let mut manifest = ManifestExtractor::new();
    manifest.insert("me.png", face);

    let mut engine = AlignmentEngine::with_defaults(Arc::new(manifest));
    let input = ImageInput::from_bytes("me.png", png(320, 320));
    engine.set_reference_from_image(&input).unwrap();

    let outcome = engine.process(0, &input, None);
    let aligned = outcome.as_aligned().unwrap();
    let t = aligned.estimate.transform;
    assert!((t.scale() - 1.0).abs() < 1e-9);
    assert!(t.rotation_degrees().abs() < 1e-9);
    assert!(t.tx().abs() < 1e-6 && t.ty().abs() < 1e-6);
    assert!(!aligned.estimate.refined);
    assert_eq!(aligned.image.dimensions(), (320, 320));
}

#[test]
fn test_fallback_to_mandatory_triple_fails_cleanly() {
    let source = LandmarkMap::new()
        .with(LandmarkKey::LeftEye, Point::new(10.0, 10.0))
        .with(LandmarkKey::Forehead, Point::new(20.0, 0.0));
    let reference = LandmarkMap::new()
        .with(LandmarkKey::LeftEye, Point::new(10.0, 10.0))
        .with(LandmarkKey::RightEye, Point::new(30.0, 10.0))
        .with(LandmarkKey::NoseTip, Point::new(20.0, 20.0));

    let err = TransformEstimator::default()
        .estimate(&source, &reference, (64, 64))
        .unwrap_err();
    assert!(matches!(err, AlignError::InsufficientLandmarks(_)));
}

#[test]
fn test_refinement_parameters_are_configurable() {
    let reference = LandmarkMap::new()
        .with(LandmarkKey::LeftEye, Point::new(100.0, 100.0))
        .with(LandmarkKey::RightEye, Point::new(200.0, 100.0))
        .with(LandmarkKey::NoseTip, Point::new(150.0, 160.0));
    let source = LandmarkMap::new()
        .with(LandmarkKey::LeftEye, Point::new(100.0, 100.0))
        .with(LandmarkKey::RightEye, Point::new(200.0, 100.0))
        .with(LandmarkKey::NoseTip, Point::new(150.0, 150.0));

    let strict = TransformEstimator::new(EstimatorConfig {
        alignment_tolerance: 20.0,
        ..EstimatorConfig::default()
    });
    let estimate = strict.estimate(&source, &reference, (512, 512)).unwrap();
    assert!(!estimate.refined);
    assert_eq!(estimate.transform, SimilarityTransform::identity());

    let damped = TransformEstimator::new(EstimatorConfig {
        correction_factor: 0.1,
        ..EstimatorConfig::default()
    });
    let estimate = damped.estimate(&source, &reference, (512, 512)).unwrap();
    assert!(estimate.refined);
    assert!((estimate.transform.ty() - 1.0).abs() < 1e-9);
}
