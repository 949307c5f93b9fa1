use face_stack::landmarks::{LandmarkKey, LandmarkMap, ManifestExtractor, Point};
use face_stack::reference::{ReferenceModel, ReferenceSource};
use face_stack::tilt::{classify, eye_line_angle, TiltClassifier, TiltStatus};
use face_stack::{AlignError, AlignmentEngine, BatchOrchestrator, ImageInput};
use image::{ImageFormat, Rgb, RgbImage};
use std::io::Cursor;
use std::sync::Arc;

fn png(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| Rgb([(x % 251) as u8, (y % 251) as u8, 64]));
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png).unwrap();
    bytes
}

fn eyes_at_angle(degrees: f64) -> LandmarkMap {
    let rad = degrees.to_radians();
    LandmarkMap::new()
        .with(LandmarkKey::LeftEye, Point::new(200.0, 200.0))
        .with(
            LandmarkKey::RightEye,
            Point::new(200.0 + 100.0 * rad.cos(), 200.0 + 100.0 * rad.sin()),
        )
        .with(LandmarkKey::NoseTip, Point::new(250.0, 260.0))
}

#[test]
fn test_synthesized_reference_scenario() {
    let model = ReferenceModel::from_percentage(30.0, (512, 512)).unwrap();
    let left = model.landmarks().get(LandmarkKey::LeftEye).unwrap();
    let right = model.landmarks().get(LandmarkKey::RightEye).unwrap();

    // 256 - 0.5 * (512 * 0.30)
    assert!((left.x - 179.2).abs() < 1e-9);
    assert_eq!(left.x.round(), 179.0);
    assert_eq!(left.y.round(), 195.0);
    assert!((left.y - 512.0 * 0.38).abs() < 1e-9);
    assert!((right.x - left.x - 153.6).abs() < 1e-9);
    assert_eq!(model.output_size(), (512, 512));
    assert_eq!(
        model.source(),
        &ReferenceSource::Synthesized {
            eye_distance_percent: 30.0
        }
    );
}

#[test]
fn test_reference_invariant_holds_for_every_percentage() {
    for percent in [15.0, 22.5, 30.0, 37.5, 45.0] {
        let model = ReferenceModel::from_percentage(percent, (640, 480)).unwrap();
        for key in LandmarkKey::MANDATORY {
            assert!(model.landmarks().contains(key), "{} missing at {}%", key, percent);
        }
        let (left, right) = model.landmarks().eyes().unwrap();
        assert!((left.midpoint(&right).x - 320.0).abs() < 1e-9);
    }
}

#[test]
fn test_forced_reference_size_applies_to_all_outputs() {
    let mut manifest = ManifestExtractor::new();
    manifest.insert(
        "reference.png",
        LandmarkMap::new()
            .with(LandmarkKey::LeftEye, Point::new(330.0, 260.0))
            .with(LandmarkKey::RightEye, Point::new(470.0, 260.0))
            .with(LandmarkKey::NoseTip, Point::new(400.0, 330.0)),
    );
    manifest.insert("small.png", eyes_at_angle(2.0));
    manifest.insert("large.png", eyes_at_angle(-1.0));

    let mut engine = AlignmentEngine::with_defaults(Arc::new(manifest));
    let reference = ImageInput::from_bytes("reference.png", png(800, 600));
    let inputs = vec![
        ImageInput::from_bytes("small.png", png(400, 400)),
        ImageInput::from_bytes("large.png", png(1024, 768)),
    ];

    let report = BatchOrchestrator::new()
        .run(&mut engine, &inputs, Some(&reference))
        .unwrap();

    assert_eq!(engine.reference().unwrap().output_size(), (800, 600));
    assert_eq!(report.output_size, (800, 600));
    assert_eq!(report.success_count(), 2);
    for aligned in report.successes() {
        assert_eq!(aligned.image.dimensions(), (800, 600));
    }
}

#[test]
fn test_reference_without_face_is_fatal() {
    let mut engine = AlignmentEngine::with_defaults(Arc::new(ManifestExtractor::new()));
    let reference = ImageInput::from_bytes("stranger.png", png(64, 64));
    let inputs = vec![ImageInput::from_bytes("a.png", png(64, 64))];

    let err = BatchOrchestrator::new()
        .run(&mut engine, &inputs, Some(&reference))
        .unwrap_err();
    assert!(matches!(err, AlignError::NoFaceDetected(_)));
}

#[test]
fn test_tilt_angles() {
    assert!(classify(&eyes_at_angle(0.0), 5.0).acceptable);
    assert!(!classify(&eyes_at_angle(10.0), 5.0).acceptable);
    assert!(!classify(&eyes_at_angle(-10.0), 5.0).acceptable);

    let boundary = eyes_at_angle(5.0);
    let verdicts: Vec<bool> = (0..5).map(|_| classify(&boundary, 5.0).acceptable).collect();
    assert!(verdicts.iter().all(|v| *v == verdicts[0]));

    let angle = eye_line_angle(&eyes_at_angle(3.5)).unwrap();
    assert!((angle - 3.5).abs() < 1e-9);
}

#[test]
fn test_missing_eyes_are_not_tilt() {
    let map = LandmarkMap::new().with(LandmarkKey::RightEye, Point::new(10.0, 10.0));
    let verdict = TiltClassifier::default().classify(&map);
    assert_eq!(verdict.status, TiltStatus::NoLandmarks);
    assert!(verdict.angle_degrees.is_none());
}

#[test]
fn test_threshold_is_runtime_mutable() {
    let mut manifest = ManifestExtractor::new();
    manifest.insert("seven.png", eyes_at_angle(7.0));
    let mut engine = AlignmentEngine::with_defaults(Arc::new(manifest));
    let input = ImageInput::from_bytes("seven.png", png(500, 500));

    let before = engine.process(0, &input, None);
    assert!(before.as_skipped().unwrap().message().starts_with("tilted: "));

    engine.set_tilt_threshold(8.0).unwrap();
    assert!(engine.process(0, &input, None).is_aligned());

    assert!(matches!(
        engine.set_tilt_threshold(31.0),
        Err(AlignError::ConfigurationError(_))
    ));
}
