use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;

use crate::provider::Detection;

const BOX_COLOR: Rgb<u8> = Rgb([128, 255, 0]);
const LANDMARK_COLOR: Rgb<u8> = Rgb([255, 64, 64]);
const BOX_THICKNESS: i32 = 2;
const LANDMARK_RADIUS: i32 = 2;

/// Draw every detected face box and landmark onto a copy of `image`.
///
/// With no faces the copy is identical to the input.
pub fn annotate(image: &RgbImage, detection: &Detection) -> RgbImage {
    let mut canvas = image.clone();
    for detected in &detection.faces {
        let face = &detected.face;
        let x = face.x.round() as i32;
        let y = face.y.round() as i32;
        let width = face.width.round() as i32;
        let height = face.height.round() as i32;
        for inset in 0..BOX_THICKNESS {
            let w = width - 2 * inset;
            let h = height - 2 * inset;
            if w <= 0 || h <= 0 {
                break;
            }
            let rect = Rect::at(x + inset, y + inset).of_size(w as u32, h as u32);
            draw_hollow_rect_mut(&mut canvas, rect, BOX_COLOR);
        }

        if let Some(landmarks) = &detected.landmarks {
            for (_, point) in landmarks.iter() {
                draw_filled_circle_mut(
                    &mut canvas,
                    (point.x.round() as i32, point.y.round() as i32),
                    LANDMARK_RADIUS,
                    LANDMARK_COLOR,
                );
            }
        }
    }
    canvas
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::LandmarkSet;
    use crate::provider::DetectedFace;
    use crate::FaceBox;

    #[test]
    fn no_faces_leaves_image_untouched() {
        let img = RgbImage::from_pixel(30, 20, Rgb([9, 8, 7]));
        assert_eq!(annotate(&img, &Detection::default()), img);
    }

    #[test]
    fn box_outline_is_two_pixels_wide() {
        let img = RgbImage::new(100, 100);
        let face = FaceBox::new(20.0, 20.0, 40.0, 40.0);
        let detection = Detection {
            faces: vec![DetectedFace {
                face,
                landmarks: None,
            }],
        };
        let out = annotate(&img, &detection);
        assert_eq!(*out.get_pixel(20, 40), BOX_COLOR);
        assert_eq!(*out.get_pixel(21, 40), BOX_COLOR);
        assert_eq!(*out.get_pixel(22, 40), Rgb([0, 0, 0]));
        assert_eq!(*out.get_pixel(40, 40), Rgb([0, 0, 0]));
    }

    #[test]
    fn landmarks_are_drawn() {
        let img = RgbImage::new(100, 100);
        let face = FaceBox::new(20.0, 20.0, 60.0, 60.0);
        let landmarks = LandmarkSet::estimate(&face);
        let nose = landmarks
            .get(crate::Landmark::NoseTip)
            .unwrap();
        let detection = Detection {
            faces: vec![DetectedFace {
                face,
                landmarks: Some(landmarks),
            }],
        };
        let out = annotate(&img, &detection);
        assert_eq!(
            *out.get_pixel(nose.x.round() as u32, nose.y.round() as u32),
            LANDMARK_COLOR
        );
    }

    #[test]
    fn tiny_boxes_do_not_panic() {
        let img = RgbImage::new(10, 10);
        let detection = Detection {
            faces: vec![DetectedFace {
                face: FaceBox::new(-5.0, 8.0, 1.0, 30.0),
                landmarks: None,
            }],
        };
        let out = annotate(&img, &detection);
        assert_eq!(out.dimensions(), (10, 10));
    }
}
