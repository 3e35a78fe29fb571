use std::path::Path;

use tracing::info;

use crate::error::MorphError;
use crate::face_detector::{FaceBox, FaceDetector};

/// Face detector backed by the `rustface` crate (SeetaFace engine).
///
/// The model is parsed once when the detector is constructed and is never
/// mutated afterwards; each call to [`FaceDetector::detect`] builds a
/// short-lived detector around a clone of it, so one instance can be shared
/// by every worker thread.
pub struct RustfaceDetector {
    model: rustface::Model,
    min_face_size: u32,
}

impl RustfaceDetector {
    /// Load a SeetaFace frontal model (`seeta_fd_frontal_v1.0.bin`) from disk.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, MorphError> {
        let path = path.as_ref();
        let data = std::fs::read(path)
            .map_err(|e| MorphError::InvalidModel(format!("{}: {e}", path.display())))?;
        Self::from_bytes(&data)
    }

    /// Parse a SeetaFace model from an in-memory buffer.
    pub fn from_bytes(data: &[u8]) -> Result<Self, MorphError> {
        let model = rustface::read_model(std::io::Cursor::new(data))
            .map_err(|e| MorphError::InvalidModel(e.to_string()))?;
        info!(bytes = data.len(), "loaded SeetaFace model");
        Ok(Self {
            model,
            min_face_size: 20,
        })
    }

    /// Smallest face edge, in pixels, the detector will report (default: 20).
    pub fn min_face_size(mut self, size: u32) -> Self {
        self.min_face_size = size;
        self
    }
}

impl FaceDetector for RustfaceDetector {
    fn detect(&self, gray: &[u8], width: u32, height: u32) -> Vec<FaceBox> {
        let mut detector = rustface::create_detector_with_model(self.model.clone());
        detector.set_min_face_size(self.min_face_size);
        detector.set_score_thresh(2.0);
        detector.set_pyramid_scale_factor(0.8);
        detector.set_slide_window_step(4, 4);

        let mut faces = detector.detect(&rustface::ImageData::new(gray, width, height));
        faces.sort_by(|a, b| {
            b.score()
                .partial_cmp(&a.score())
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        faces
            .iter()
            .map(|face| {
                let bbox = face.bbox();
                FaceBox {
                    x: bbox.x() as f64,
                    y: bbox.y() as f64,
                    width: bbox.width() as f64,
                    height: bbox.height() as f64,
                    confidence: face.score(),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_model_file_is_rejected() {
        let result = RustfaceDetector::from_file("/nonexistent/seeta_fd_frontal_v1.0.bin");
        assert!(matches!(result, Err(MorphError::InvalidModel(_))));
    }
}
