use serde::{Deserialize, Serialize};

use crate::landmarks::Point;

/// Bounding box of a detected face within an image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaceBox {
    /// X coordinate of the top-left corner (pixels).
    pub x: f64,
    /// Y coordinate of the top-left corner (pixels).
    pub y: f64,
    /// Width of the bounding box (pixels).
    pub width: f64,
    /// Height of the bounding box (pixels).
    pub height: f64,
    /// Detection confidence score.
    pub confidence: f64,
}

impl FaceBox {
    /// Box with the given geometry and a confidence of 1.0.
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
            confidence: 1.0,
        }
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Half the length of the box diagonal.
    pub fn half_diagonal(&self) -> f64 {
        (self.width * self.width + self.height * self.height).sqrt() / 2.0
    }

    /// Map a point given in box-relative proportions (0..1) to image pixels.
    pub fn denormalize(&self, u: f64, v: f64) -> Point {
        Point::new(self.x + u * self.width, self.y + v * self.height)
    }

    /// Whether the box has a usable, finite, non-degenerate extent.
    pub fn is_valid(&self) -> bool {
        [self.x, self.y, self.width, self.height]
            .iter()
            .all(|v| v.is_finite())
            && self.width > 0.0
            && self.height > 0.0
    }

    /// Bit-level equality, used to drop duplicate detections.
    pub(crate) fn same_bits(&self, other: &FaceBox) -> bool {
        self.x.to_bits() == other.x.to_bits()
            && self.y.to_bits() == other.y.to_bits()
            && self.width.to_bits() == other.width.to_bits()
            && self.height.to_bits() == other.height.to_bits()
            && self.confidence.to_bits() == other.confidence.to_bits()
    }
}

/// Pluggable face detection backend.
///
/// Implement this trait to provide a custom face detector (ONNX, dlib, etc.)
/// and pass it to [`crate::MorphEngine::new`]. Implementations are shared
/// across threads, so any loaded model must be read-only after construction.
pub trait FaceDetector: Send + Sync {
    /// Detect faces in a row-major grayscale buffer of `width` × `height` bytes.
    ///
    /// Faces are returned in the backend's native confidence order.
    fn detect(&self, gray: &[u8], width: u32, height: u32) -> Vec<FaceBox>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn half_diagonal_of_square_box() {
        let face = FaceBox::new(220.0, 140.0, 200.0, 200.0);
        assert!((face.half_diagonal() - 141.421).abs() < 0.01);
        assert_eq!(face.center(), Point::new(320.0, 240.0));
    }

    #[test]
    fn degenerate_boxes_are_invalid() {
        assert!(!FaceBox::new(0.0, 0.0, 0.0, 10.0).is_valid());
        assert!(!FaceBox::new(f64::NAN, 0.0, 10.0, 10.0).is_valid());
        assert!(FaceBox::new(0.0, 0.0, 10.0, 10.0).is_valid());
    }
}
