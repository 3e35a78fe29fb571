use image::{GrayImage, RgbImage};
use imageproc::distance_transform::Norm;

use crate::field::clamp_strength;
use crate::rows::for_each_row;

/// Half-width of the smoothing window (a 9×9 neighbourhood).
const SMOOTH_RADIUS: u32 = 4;
const SMOOTH_SIGMA_SPACE: f32 = 3.0;
/// Largest possible Euclidean distance between two RGB8 colors, rounded up.
const MAX_COLOR_DISTANCE: usize = 442;
/// Canny hysteresis thresholds for the outline pass.
const EDGE_LOW: f32 = 20.0;
const EDGE_HIGH: f32 = 60.0;
const OUTLINE: [u8; 3] = [0, 0, 0];

/// Cartoon stylization: edge-preserving smoothing, posterization and bold
/// dark outlines along strong edges of the input.
///
/// Strength 0 returns the image unchanged; higher strengths smooth more,
/// use fewer color levels and draw thicker outlines.
pub fn stylize(image: &RgbImage, strength: f64) -> RgbImage {
    let strength = clamp_strength(strength) as f32;
    if strength == 0.0 || image.width() == 0 || image.height() == 0 {
        return image.clone();
    }

    let passes = (1.0 + strength).floor() as usize;
    let sigma_color = 20.0 + 30.0 * strength;
    let mut smooth = image.clone();
    for _ in 0..passes {
        smooth = bilateral(&smooth, SMOOTH_RADIUS, sigma_color, SMOOTH_SIGMA_SPACE);
    }

    let levels = (8.0 - 2.0 * strength).round().clamp(3.0, 8.0) as u8;
    posterize(&mut smooth, levels);

    let edges = outline_mask(image, strength.round() as u8);
    for (pixel, edge) in smooth.pixels_mut().zip(edges.pixels()) {
        if edge.0[0] > 0 {
            pixel.0 = OUTLINE;
        }
    }
    smooth
}

/// Bilateral filter over RGB: averages each pixel with neighbours that are
/// both spatially close and similar in color, so flat areas are smoothed and
/// strong edges survive.
pub fn bilateral(image: &RgbImage, radius: u32, sigma_color: f32, sigma_space: f32) -> RgbImage {
    let (width, height) = image.dimensions();
    let r = radius as i64;
    let side = (2 * r + 1) as usize;

    let spatial: Vec<f32> = (-r..=r)
        .flat_map(|dy| (-r..=r).map(move |dx| (dx * dx + dy * dy) as f32))
        .map(|d2| (-d2 / (2.0 * sigma_space * sigma_space)).exp())
        .collect();
    let range: Vec<f32> = (0..=MAX_COLOR_DISTANCE)
        .map(|d| (-((d * d) as f32) / (2.0 * sigma_color * sigma_color)).exp())
        .collect();

    let source = image.as_raw();
    let stride = width as usize * 3;
    let mut output = RgbImage::new(width, height);
    let rows: &mut [u8] = &mut output;
    for_each_row(rows, stride, |y, row| {
        let y = y as i64;
        for x in 0..width as i64 {
            let center_index = y as usize * stride + x as usize * 3;
            let center = &source[center_index..center_index + 3];
            let mut sum = [0.0f32; 3];
            let mut total = 0.0f32;
            for dy in -r..=r {
                let sy = y + dy;
                if sy < 0 || sy >= height as i64 {
                    continue;
                }
                for dx in -r..=r {
                    let sx = x + dx;
                    if sx < 0 || sx >= width as i64 {
                        continue;
                    }
                    let i = sy as usize * stride + sx as usize * 3;
                    let neighbour = &source[i..i + 3];
                    let distance = color_distance(center, neighbour);
                    let weight = spatial[(dy + r) as usize * side + (dx + r) as usize]
                        * range[distance.min(MAX_COLOR_DISTANCE)];
                    for c in 0..3 {
                        sum[c] += weight * neighbour[c] as f32;
                    }
                    total += weight;
                }
            }
            let out = &mut row[x as usize * 3..x as usize * 3 + 3];
            for c in 0..3 {
                out[c] = (sum[c] / total).round().clamp(0.0, 255.0) as u8;
            }
        }
    });
    output
}

fn color_distance(a: &[u8], b: &[u8]) -> usize {
    let d2: i32 = a
        .iter()
        .zip(b)
        .map(|(&p, &q)| {
            let d = p as i32 - q as i32;
            d * d
        })
        .sum();
    (d2 as f32).sqrt().round() as usize
}

/// Reduce each channel to `levels` evenly spaced values.
pub fn posterize(image: &mut RgbImage, levels: u8) {
    let levels = levels.max(2) as u32;
    let lut: Vec<u8> = (0..=255u32)
        .map(|v| {
            let bucket = (v * levels / 256).min(levels - 1);
            (bucket * 255 / (levels - 1)) as u8
        })
        .collect();
    for value in image.iter_mut() {
        *value = lut[*value as usize];
    }
}

/// Binary mask (255 = outline) of strong edges, dilated by `thickness` pixels.
fn outline_mask(image: &RgbImage, thickness: u8) -> GrayImage {
    let gray = image::imageops::grayscale(image);
    let denoised = imageproc::filter::median_filter(&gray, 3, 3);
    let edges = imageproc::edges::canny(&denoised, EDGE_LOW, EDGE_HIGH);
    if thickness == 0 {
        edges
    } else {
        imageproc::morphology::dilate(&edges, Norm::LInf, thickness)
    }
}
