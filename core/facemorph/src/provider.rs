use std::sync::Arc;

use image::RgbImage;
use serde::Serialize;
use tracing::debug;

use crate::error::MorphError;
use crate::face_detector::{FaceBox, FaceDetector};
use crate::landmarks::{LandmarkLocator, LandmarkSet};

/// One detected face and, when the locator produced them, its landmarks.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectedFace {
    pub face: FaceBox,
    pub landmarks: Option<LandmarkSet>,
}

/// Faces found in one image, in the detector's confidence order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Detection {
    pub faces: Vec<DetectedFace>,
}

impl Detection {
    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    pub fn len(&self) -> usize {
        self.faces.len()
    }

    /// Whether at least one face carries landmarks.
    pub fn has_landmarks(&self) -> bool {
        self.faces.iter().any(|f| f.landmarks.is_some())
    }

    /// The highest-confidence face; ties keep detector order.
    pub fn primary(&self) -> Option<&DetectedFace> {
        self.faces.iter().reduce(|best, candidate| {
            if candidate.face.confidence > best.face.confidence {
                candidate
            } else {
                best
            }
        })
    }

    pub(crate) fn primary_mut(&mut self) -> Option<&mut DetectedFace> {
        let index = self
            .faces
            .iter()
            .enumerate()
            .reduce(|best, candidate| {
                if candidate.1.face.confidence > best.1.face.confidence {
                    candidate
                } else {
                    best
                }
            })
            .map(|(i, _)| i)?;
        self.faces.get_mut(index)
    }
}

/// Runs the face detector and then the optional landmark locator per face.
#[derive(Clone)]
pub struct LandmarkProvider {
    detector: Arc<dyn FaceDetector>,
    locator: Option<Arc<dyn LandmarkLocator>>,
}

impl LandmarkProvider {
    pub fn new(detector: Arc<dyn FaceDetector>) -> Self {
        Self {
            detector,
            locator: None,
        }
    }

    pub fn with_locator(mut self, locator: Arc<dyn LandmarkLocator>) -> Self {
        self.locator = Some(locator);
        self
    }

    /// Detect faces and localize landmarks in a decoded image.
    ///
    /// Zero faces is a valid, empty result. Boxes that are degenerate or
    /// bit-identical to an earlier box are dropped.
    pub fn detect(&self, image: &RgbImage) -> Result<Detection, MorphError> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(MorphError::InvalidImage("image dimensions are zero".into()));
        }

        let gray = image::imageops::grayscale(image);
        let raw = self.detector.detect(gray.as_raw(), width, height);

        let mut boxes: Vec<FaceBox> = Vec::with_capacity(raw.len());
        for face in raw {
            if face.is_valid() && !boxes.iter().any(|b| b.same_bits(&face)) {
                boxes.push(face);
            }
        }

        let faces: Vec<DetectedFace> = boxes
            .into_iter()
            .map(|face| DetectedFace {
                face,
                landmarks: self
                    .locator
                    .as_ref()
                    .and_then(|locator| locator.locate(image, &face))
                    .filter(|set| !set.is_empty()),
            })
            .collect();

        debug!(
            faces = faces.len(),
            with_landmarks = faces.iter().filter(|f| f.landmarks.is_some()).count(),
            "face detection finished"
        );
        Ok(Detection { faces })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::ProportionalLocator;

    struct FixedDetector(Vec<FaceBox>);

    impl FaceDetector for FixedDetector {
        fn detect(&self, _gray: &[u8], _width: u32, _height: u32) -> Vec<FaceBox> {
            self.0.clone()
        }
    }

    struct NoLandmarks;

    impl LandmarkLocator for NoLandmarks {
        fn locate(&self, _image: &RgbImage, _face: &FaceBox) -> Option<LandmarkSet> {
            None
        }
    }

    fn scored(x: f64, confidence: f64) -> FaceBox {
        FaceBox {
            confidence,
            ..FaceBox::new(x, 10.0, 40.0, 40.0)
        }
    }

    #[test]
    fn zero_faces_is_not_an_error() {
        let provider = LandmarkProvider::new(Arc::new(FixedDetector(vec![])));
        let detection = provider.detect(&RgbImage::new(64, 64)).unwrap();
        assert!(detection.is_empty());
        assert!(!detection.has_landmarks());
        assert!(detection.primary().is_none());
    }

    #[test]
    fn identical_boxes_are_deduplicated() {
        let face = scored(10.0, 3.0);
        let provider = LandmarkProvider::new(Arc::new(FixedDetector(vec![face, face])));
        let detection = provider.detect(&RgbImage::new(64, 64)).unwrap();
        assert_eq!(detection.len(), 1);
    }

    #[test]
    fn degenerate_boxes_are_dropped() {
        let provider = LandmarkProvider::new(Arc::new(FixedDetector(vec![FaceBox::new(
            0.0, 0.0, 0.0, 0.0,
        )])));
        let detection = provider.detect(&RgbImage::new(64, 64)).unwrap();
        assert!(detection.is_empty());
    }

    #[test]
    fn primary_is_highest_confidence() {
        let provider = LandmarkProvider::new(Arc::new(FixedDetector(vec![
            scored(1.0, 2.0),
            scored(2.0, 9.0),
            scored(3.0, 5.0),
        ])));
        let detection = provider.detect(&RgbImage::new(64, 64)).unwrap();
        assert_eq!(detection.primary().unwrap().face.x, 2.0);
        // native order is preserved
        assert_eq!(detection.faces[0].face.x, 1.0);
    }

    #[test]
    fn missing_landmarks_keep_the_face() {
        let provider = LandmarkProvider::new(Arc::new(FixedDetector(vec![scored(1.0, 1.0)])))
            .with_locator(Arc::new(NoLandmarks));
        let detection = provider.detect(&RgbImage::new(64, 64)).unwrap();
        assert_eq!(detection.len(), 1);
        assert!(detection.faces[0].landmarks.is_none());
    }

    #[test]
    fn locator_populates_landmarks() {
        let provider = LandmarkProvider::new(Arc::new(FixedDetector(vec![scored(1.0, 1.0)])))
            .with_locator(Arc::new(ProportionalLocator));
        let detection = provider.detect(&RgbImage::new(64, 64)).unwrap();
        assert!(detection.has_landmarks());
    }

    #[test]
    fn empty_image_is_invalid() {
        let provider = LandmarkProvider::new(Arc::new(FixedDetector(vec![])));
        let result = provider.detect(&RgbImage::new(0, 0));
        assert!(matches!(result, Err(MorphError::InvalidImage(_))));
    }
}
