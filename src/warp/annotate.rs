use crate::landmarks::{LandmarkKey, LandmarkMap};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_line_segment_mut};

const KNOWN_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const EXTRA_COLOR: Rgb<u8> = Rgb([0, 0, 255]);
const EYE_LINE_COLOR: Rgb<u8> = Rgb([255, 255, 0]);

fn marker_radius(image: &RgbImage) -> i32 {
    let (w, h) = image.dimensions();
    ((w.min(h) / 150) as i32).max(2)
}

/// Copy of `image` with a dot on every landmark and the eye line drawn.
///
/// Points must already be in the coordinate frame of `image`.
pub fn draw_landmarks(image: &RgbImage, landmarks: &LandmarkMap) -> RgbImage {
    let mut canvas = image.clone();
    let radius = marker_radius(image);

    if let Some((left, right)) = landmarks.eyes() {
        draw_line_segment_mut(
            &mut canvas,
            (left.x as f32, left.y as f32),
            (right.x as f32, right.y as f32),
            EYE_LINE_COLOR,
        );
    }

    for (key, point) in landmarks.iter() {
        let r = if LandmarkKey::MANDATORY.contains(&key) {
            radius + 1
        } else {
            radius
        };
        draw_filled_circle_mut(
            &mut canvas,
            (point.x.round() as i32, point.y.round() as i32),
            r,
            KNOWN_COLOR,
        );
    }

    for (_, point) in landmarks.extras() {
        draw_filled_circle_mut(
            &mut canvas,
            (point.x.round() as i32, point.y.round() as i32),
            (radius / 2).max(1),
            EXTRA_COLOR,
        );
    }

    canvas
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::Point;

    #[test]
    fn test_markers_are_drawn() {
        let image = RgbImage::new(100, 100);
        let mut map = LandmarkMap::new()
            .with(LandmarkKey::LeftEye, Point::new(30.0, 40.0))
            .with(LandmarkKey::RightEye, Point::new(70.0, 40.0))
            .with(LandmarkKey::Chin, Point::new(50.0, 90.0));
        map.insert_extra("mesh_0", Point::new(10.0, 10.0));

        let annotated = draw_landmarks(&image, &map);
        assert_eq!(*annotated.get_pixel(30, 40), KNOWN_COLOR);
        assert_eq!(*annotated.get_pixel(50, 90), KNOWN_COLOR);
        assert_eq!(*annotated.get_pixel(10, 10), EXTRA_COLOR);
        assert_eq!(*annotated.get_pixel(50, 40), EYE_LINE_COLOR);
        // source untouched
        assert_eq!(*image.get_pixel(30, 40), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_points_off_canvas_are_ignored() {
        let image = RgbImage::new(20, 20);
        let map = LandmarkMap::new().with(LandmarkKey::Chin, Point::new(-50.0, 300.0));
        let annotated = draw_landmarks(&image, &map);
        assert_eq!(annotated, image);
    }
}
