use image::RgbImage;

use crate::error::MorphError;
use crate::field::DisplacementField;
use crate::rows::for_each_row;

/// Resample `image` through `field` with bilinear interpolation.
///
/// Pixels whose offset is zero, including everything outside the field's
/// region, are copied unchanged. Source positions outside the image are
/// clamped to the nearest edge pixel.
pub fn render(image: &RgbImage, field: &DisplacementField) -> Result<RgbImage, MorphError> {
    let (width, height) = image.dimensions();
    if field.dimensions() != (width, height) {
        return Err(MorphError::InternalRenderError(format!(
            "field is {}x{} but image is {width}x{height}",
            field.dimensions().0,
            field.dimensions().1,
        )));
    }

    let mut output = image.clone();
    let Some(region) = field.region() else {
        return Ok(output);
    };

    let stride = width as usize * 3;
    let source: &[u8] = image.as_raw();
    let rows: &mut [u8] = &mut output;
    for_each_row(rows, stride, |y, row| {
        let Some((_, offsets)) = field.row(y as u32) else {
            return;
        };
        for (i, &[dx, dy]) in offsets.iter().enumerate() {
            if dx == 0.0 && dy == 0.0 {
                continue;
            }
            let x = region.x as usize + i;
            let sample = bilinear(source, width, height, x as f32 + dx, y as f32 + dy);
            row[x * 3..x * 3 + 3].copy_from_slice(&sample);
        }
    });

    Ok(output)
}

/// Bilinear sample of an RGB buffer at a fractional position, clamped to the edges.
fn bilinear(source: &[u8], width: u32, height: u32, x: f32, y: f32) -> [u8; 3] {
    let max_x = (width - 1) as f32;
    let max_y = (height - 1) as f32;
    let x = if x.is_finite() { x.clamp(0.0, max_x) } else { 0.0 };
    let y = if y.is_finite() { y.clamp(0.0, max_y) } else { 0.0 };

    let x0 = x.floor() as usize;
    let y0 = y.floor() as usize;
    let x1 = (x0 + 1).min(width as usize - 1);
    let y1 = (y0 + 1).min(height as usize - 1);
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let stride = width as usize * 3;
    let at = |px: usize, py: usize, c: usize| source[py * stride + px * 3 + c] as f32;

    let mut out = [0u8; 3];
    for (c, value) in out.iter_mut().enumerate() {
        let top = at(x0, y0, c) * (1.0 - fx) + at(x1, y0, c) * fx;
        let bottom = at(x0, y1, c) * (1.0 - fx) + at(x1, y1, c) * fx;
        *value = (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8;
    }
    out
}
