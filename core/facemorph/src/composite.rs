use image::{GrayImage, Luma, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_ellipse_mut, draw_filled_rect_mut, draw_line_segment_mut};
use imageproc::rect::Rect;
use tracing::{debug, warn};

use crate::face_detector::FaceBox;

const WALL_TOP: [f32; 3] = [70.0, 40.0, 30.0];
const WALL_BOTTOM: [f32; 3] = [100.0, 60.0, 50.0];
const RULER_MAJOR: Rgb<u8> = Rgb([230, 210, 200]);
const RULER_MINOR: Rgb<u8> = Rgb([165, 145, 130]);
const BAR: Rgb<u8> = Rgb([45, 18, 12]);

/// Ruler spans 4'0" (bottom) to 7'0" (top) in inches.
const RULER_SPAN_INCHES: u32 = 36;

/// Blend the subject over a mugshot backdrop when `background` is on.
///
/// Without a face box there is no subject region to keep, so the image is
/// returned unmodified.
pub fn composite(image: &RgbImage, face: Option<&FaceBox>, background: bool) -> RgbImage {
    if !background {
        return image.clone();
    }
    let (width, height) = image.dimensions();
    let Some(mask) = face.and_then(|f| person_mask(f, width, height)) else {
        warn!("no subject region, background replacement skipped");
        return image.clone();
    };

    let backdrop = mugshot_backdrop(width, height);
    let mut output = RgbImage::new(width, height);
    for (((out, fg), bg), alpha) in output
        .pixels_mut()
        .zip(image.pixels())
        .zip(backdrop.pixels())
        .zip(mask.pixels())
    {
        let a = alpha.0[0] as f32 / 255.0;
        for c in 0..3 {
            let v = fg.0[c] as f32 * a + bg.0[c] as f32 * (1.0 - a);
            out.0[c] = v.round().clamp(0.0, 255.0) as u8;
        }
    }
    apply_vignette(&mut output);
    debug!(width, height, "background replaced");
    output
}

/// Synthesized police-lineup wall: dark brown gradient that lightens toward
/// the floor, height ruler lines every six inches and dark header/footer bars.
pub fn mugshot_backdrop(width: u32, height: u32) -> RgbImage {
    let mut bg = RgbImage::from_fn(width, height, |_, y| {
        let t = y as f32 / height.max(1) as f32;
        let mut px = [0u8; 3];
        for c in 0..3 {
            px[c] = (WALL_TOP[c] + t * (WALL_BOTTOM[c] - WALL_TOP[c])) as u8;
        }
        Rgb(px)
    });
    if width == 0 || height == 0 {
        return bg;
    }

    let ruler_top = (height as f32 * 0.05) as i64;
    let ruler_bottom = (height as f32 * 0.90) as i64;
    let range = (ruler_bottom - ruler_top) as f32;
    for half_feet in 0..=(RULER_SPAN_INCHES / 6) {
        let inches = half_feet * 6;
        let y = ruler_bottom - (inches as f32 / RULER_SPAN_INCHES as f32 * range) as i64;
        if y < 0 || y >= height as i64 {
            continue;
        }
        let major = inches % 12 == 0;
        let (color, thickness) = if major { (RULER_MAJOR, 2) } else { (RULER_MINOR, 1) };
        for dy in 0..thickness {
            let line_y = (y + dy).min(height as i64 - 1) as f32;
            draw_line_segment_mut(&mut bg, (0.0, line_y), (width as f32 - 1.0, line_y), color);
        }
    }

    let header = ((height as f32 * 0.065) as u32).max(28).min(height);
    draw_filled_rect_mut(&mut bg, Rect::at(0, 0).of_size(width, header), BAR);
    let footer_y = (height as f32 * 0.92) as u32;
    if footer_y < height {
        draw_filled_rect_mut(
            &mut bg,
            Rect::at(0, footer_y as i32).of_size(width, height - footer_y),
            BAR,
        );
    }
    bg
}

/// Soft head-and-shoulders alpha mask (255 = subject) derived from the face box.
///
/// Returns `None` when the box does not overlap the image.
pub fn person_mask(face: &FaceBox, width: u32, height: u32) -> Option<GrayImage> {
    if !face.is_valid() || width == 0 || height == 0 {
        return None;
    }
    let center = face.center();
    if face.x >= width as f64
        || face.y >= height as f64
        || face.x + face.width <= 0.0
        || face.y + face.height <= 0.0
    {
        return None;
    }

    let mut mask = GrayImage::new(width, height);
    let white = Luma([255u8]);
    let cx = center.x.round() as i32;

    // head, a little larger than the detector box to keep hair and ears
    draw_filled_ellipse_mut(
        &mut mask,
        (cx, center.y.round() as i32),
        (face.width * 0.6).round() as i32,
        (face.height * 0.75).round() as i32,
        white,
    );
    // neck
    let neck_top = center.y.round() as i32;
    let neck_height = (face.height * 1.2).round().max(1.0) as u32;
    let neck_width = (face.width * 0.6).round().max(1.0) as u32;
    draw_filled_rect_mut(
        &mut mask,
        Rect::at(cx - neck_width as i32 / 2, neck_top).of_size(neck_width, neck_height),
        white,
    );
    // shoulders
    let shoulder_y = face.y + face.height * 2.1;
    draw_filled_ellipse_mut(
        &mut mask,
        (cx, shoulder_y.round() as i32),
        (face.width * 1.6).round() as i32,
        (face.height * 1.1).round() as i32,
        white,
    );

    let sigma = (face.width.min(face.height) * 0.05).max(1.0) as f32;
    let mut soft = imageproc::filter::gaussian_blur_f32(&mask, sigma);
    for px in soft.pixels_mut() {
        px.0[0] = (px.0[0] as f32 * 1.4).min(255.0) as u8;
    }
    Some(soft)
}

/// Darken towards the borders: `(4y(1-y))·(4x(1-x))·1.15`, clamped to 1.
pub fn apply_vignette(image: &mut RgbImage) {
    let (width, height) = image.dimensions();
    let span = |n: u32, i: u32| {
        if n <= 1 {
            0.5
        } else {
            i as f32 / (n - 1) as f32
        }
    };
    let columns: Vec<f32> = (0..width)
        .map(|x| {
            let t = span(width, x);
            4.0 * t * (1.0 - t)
        })
        .collect();
    for (x, y, px) in image.enumerate_pixels_mut() {
        let t = span(height, y);
        let gain = (4.0 * t * (1.0 - t) * columns[x as usize] * 1.15).clamp(0.0, 1.0);
        for c in px.0.iter_mut() {
            *c = (*c as f32 * gain).round().clamp(0.0, 255.0) as u8;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_test_rgb(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x * 3 % 256) as u8, (y * 5 % 256) as u8, 200])
        })
    }

    fn centered_face() -> FaceBox {
        FaceBox::new(120.0, 60.0, 80.0, 90.0)
    }

    #[test]
    fn disabled_background_is_pass_through() {
        let img = make_test_rgb(320, 240);
        assert_eq!(composite(&img, Some(&centered_face()), false), img);
    }

    #[test]
    fn missing_face_skips_compositing() {
        let img = make_test_rgb(320, 240);
        assert_eq!(composite(&img, None, true), img);
    }

    #[test]
    fn face_outside_image_skips_compositing() {
        let img = make_test_rgb(100, 100);
        let outside = FaceBox::new(500.0, 500.0, 40.0, 40.0);
        assert_eq!(composite(&img, Some(&outside), true), img);
    }

    #[test]
    fn background_replaces_corners_and_keeps_face() {
        let img = RgbImage::from_pixel(320, 240, Rgb([250, 250, 250]));
        let out = composite(&img, Some(&centered_face()), true);
        assert_eq!(out.dimensions(), (320, 240));

        // corner area is backdrop (dark wall), not the white input
        let wall = out.get_pixel(40, 120);
        assert!(wall.0[0] < 150, "{wall:?}");

        // face center keeps the subject at full opacity, minus the vignette
        let center = out.get_pixel(160, 105);
        assert!(center.0.iter().all(|&c| c > 200), "{center:?}");
    }

    #[test]
    fn mask_is_opaque_inside_and_clear_far_away() {
        let mask = person_mask(&centered_face(), 320, 240).unwrap();
        assert_eq!(mask.get_pixel(160, 105).0[0], 255);
        assert_eq!(mask.get_pixel(5, 5).0[0], 0);
        assert_eq!(mask.get_pixel(315, 20).0[0], 0);
    }

    #[test]
    fn mask_edges_are_feathered() {
        let mask = person_mask(&centered_face(), 320, 240).unwrap();
        let row = 105;
        let partial = (0..320)
            .map(|x| mask.get_pixel(x, row).0[0])
            .filter(|&v| v > 0 && v < 255)
            .count();
        assert!(partial > 0);
    }

    #[test]
    fn backdrop_has_bars_and_ruler() {
        let bg = mugshot_backdrop(200, 400);
        assert_eq!(*bg.get_pixel(100, 2), BAR);
        assert_eq!(*bg.get_pixel(100, 399), BAR);
        // 4'0" line sits on the bottom of the ruler
        let ruler_bottom = (400.0 * 0.90) as u32;
        assert_eq!(*bg.get_pixel(100, ruler_bottom), RULER_MAJOR);
        let lines = (0..400)
            .filter(|&y| *bg.get_pixel(100, y) == RULER_MAJOR || *bg.get_pixel(100, y) == RULER_MINOR)
            .count();
        // the 7'0" line is hidden under the header bar
        assert_eq!(lines, 3 * 2 + 3);
    }

    #[test]
    fn backdrop_wall_is_a_brown_gradient() {
        let bg = mugshot_backdrop(100, 1000);
        let upper = bg.get_pixel(50, 100).0;
        let lower = bg.get_pixel(50, 850).0;
        for px in [upper, lower] {
            assert!(px[0] > px[1] && px[1] > px[2], "{px:?}");
        }
        assert!((0..3).all(|c| lower[c] > upper[c]));
    }

    #[test]
    fn vignette_darkens_edges_more_than_center() {
        let mut img = RgbImage::from_pixel(50, 50, Rgb([200, 200, 200]));
        apply_vignette(&mut img);
        assert_eq!(img.get_pixel(0, 0).0, [0, 0, 0]);
        assert!(img.get_pixel(25, 25).0[0] > img.get_pixel(5, 25).0[0]);
    }
}
