use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{DynamicImage, ImageEncoder, RgbImage, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::error::MorphError;

/// Encoding used for images handed back to the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Lossy JPEG (the transport default).
    #[default]
    Jpeg,

    /// Lossless PNG.
    Png,
}

impl OutputFormat {
    pub fn mime_type(self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::Png => "image/png",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "jpg",
            OutputFormat::Png => "png",
        }
    }
}

/// Decode encoded image bytes (JPEG, PNG or WebP) into RGB.
///
/// Transparent pixels are flattened onto white.
pub fn decode(input: &[u8]) -> Result<RgbImage, MorphError> {
    if input.is_empty() {
        return Err(MorphError::InvalidImage("empty input".into()));
    }
    let decoded =
        image::load_from_memory(input).map_err(|e| MorphError::InvalidImage(e.to_string()))?;
    if decoded.width() == 0 || decoded.height() == 0 {
        return Err(MorphError::InvalidImage("image dimensions are zero".into()));
    }
    Ok(flatten_alpha(&decoded))
}

/// Decode a transported image: a `data:` URI or a bare base64 string.
pub fn decode_transport(payload: &str) -> Result<RgbImage, MorphError> {
    decode(&transport_bytes(payload)?)
}

/// Extract the encoded bytes from a `data:` URI or bare base64 string.
pub fn transport_bytes(payload: &str) -> Result<Vec<u8>, MorphError> {
    let payload = payload.trim();
    let encoded = match payload.strip_prefix("data:") {
        Some(rest) => {
            let (meta, data) = rest
                .split_once(',')
                .ok_or_else(|| MorphError::InvalidImage("malformed data URI".into()))?;
            if !meta.ends_with(";base64") {
                return Err(MorphError::InvalidImage(
                    "data URI is not base64 encoded".into(),
                ));
            }
            data
        }
        None => payload,
    };
    if encoded.is_empty() {
        return Err(MorphError::InvalidImage("empty input".into()));
    }
    STANDARD
        .decode(encoded)
        .map_err(|e| MorphError::InvalidImage(format!("invalid base64: {e}")))
}

/// Encode an RGB image. `quality` (0.0–1.0) applies to JPEG only.
pub fn encode(image: &RgbImage, format: OutputFormat, quality: f32) -> Result<Vec<u8>, MorphError> {
    let mut buffer = Vec::new();
    match format {
        OutputFormat::Jpeg => {
            let quality_percent = (quality * 100.0).round().clamp(1.0, 100.0) as u8;
            let encoder = JpegEncoder::new_with_quality(&mut buffer, quality_percent);
            encoder
                .write_image(
                    image.as_raw(),
                    image.width(),
                    image.height(),
                    image::ExtendedColorType::Rgb8,
                )
                .map_err(|e| MorphError::InternalRenderError(e.to_string()))?;
        }
        OutputFormat::Png => {
            let encoder = PngEncoder::new(&mut buffer);
            encoder
                .write_image(
                    image.as_raw(),
                    image.width(),
                    image.height(),
                    image::ExtendedColorType::Rgb8,
                )
                .map_err(|e| MorphError::InternalRenderError(e.to_string()))?;
        }
    }
    Ok(buffer)
}

/// Wrap encoded bytes in a self-describing `data:` URI.
pub fn to_data_uri(bytes: &[u8], format: OutputFormat) -> String {
    format!("data:{};base64,{}", format.mime_type(), STANDARD.encode(bytes))
}

/// Composite any alpha channel over white.
fn flatten_alpha(image: &DynamicImage) -> RgbImage {
    if !image.color().has_alpha() {
        return image.to_rgb8();
    }
    let rgba: RgbaImage = image.to_rgba8();
    let mut rgb = RgbImage::new(rgba.width(), rgba.height());
    for (out, pixel) in rgb.pixels_mut().zip(rgba.pixels()) {
        let [r, g, b, a] = pixel.0;
        let alpha = a as f32 / 255.0;
        let inv_alpha = 1.0 - alpha;
        out.0 = [r, g, b].map(|c| (c as f32 * alpha + 255.0 * inv_alpha).round() as u8);
    }
    rgb
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_test_rgb(width: u32, height: u32) -> RgbImage {
        let mut img = RgbImage::new(width, height);
        for (x, y, pixel) in img.enumerate_pixels_mut() {
            *pixel = image::Rgb([
                (x * 255 / width.max(1)) as u8,
                (y * 255 / height.max(1)) as u8,
                128,
            ]);
        }
        img
    }

    #[test]
    fn jpeg_magic_bytes() {
        let data = encode(&make_test_rgb(40, 30), OutputFormat::Jpeg, 0.92).unwrap();
        assert_eq!(data[0], 0xFF);
        assert_eq!(data[1], 0xD8);
    }

    #[test]
    fn png_is_lossless() {
        let img = make_test_rgb(33, 17);
        let data = encode(&img, OutputFormat::Png, 0.5).unwrap();
        assert_eq!(&data[1..4], b"PNG");
        assert_eq!(decode(&data).unwrap(), img);
    }

    #[test]
    fn jpeg_round_trip_keeps_dimensions_and_colors_close() {
        let img = make_test_rgb(64, 48);
        let decoded = decode(&encode(&img, OutputFormat::Jpeg, 0.92).unwrap()).unwrap();
        assert_eq!(decoded.dimensions(), (64, 48));
        let mean_error: f64 = img
            .as_raw()
            .iter()
            .zip(decoded.as_raw())
            .map(|(&a, &b)| (a as f64 - b as f64).abs())
            .sum::<f64>()
            / img.as_raw().len() as f64;
        assert!(mean_error < 6.0, "mean abs error {mean_error}");
    }

    #[test]
    fn data_uri_round_trip() {
        let img = make_test_rgb(20, 10);
        let data = encode(&img, OutputFormat::Png, 1.0).unwrap();
        let uri = to_data_uri(&data, OutputFormat::Png);
        assert!(uri.starts_with("data:image/png;base64,"));
        assert_eq!(decode_transport(&uri).unwrap(), img);
    }

    #[test]
    fn bare_base64_is_accepted() {
        let img = make_test_rgb(8, 8);
        let data = encode(&img, OutputFormat::Png, 1.0).unwrap();
        assert_eq!(decode_transport(&STANDARD.encode(&data)).unwrap(), img);
    }

    #[test]
    fn garbage_is_invalid_image() {
        assert!(matches!(decode(b"not an image"), Err(MorphError::InvalidImage(_))));
        assert!(matches!(decode(&[]), Err(MorphError::InvalidImage(_))));
        assert!(matches!(
            decode_transport("data:image/jpeg;base64,@@@"),
            Err(MorphError::InvalidImage(_))
        ));
        assert!(matches!(
            decode_transport("data:image/jpeg,abcd"),
            Err(MorphError::InvalidImage(_))
        ));
        assert!(matches!(decode_transport(""), Err(MorphError::InvalidImage(_))));
    }

    #[test]
    fn transparent_pixels_flatten_to_white() {
        let rgba = RgbaImage::from_pixel(4, 4, image::Rgba([0, 0, 0, 0]));
        let mut buffer = Vec::new();
        PngEncoder::new(&mut buffer)
            .write_image(rgba.as_raw(), 4, 4, image::ExtendedColorType::Rgba8)
            .unwrap();
        let decoded = decode(&buffer).unwrap();
        assert_eq!(decoded.get_pixel(0, 0).0, [255, 255, 255]);
    }
}
