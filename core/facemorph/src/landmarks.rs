//! Canonical facial landmarks addressed by semantic name.
//!
//! Detector backends produce points in their own order (68-point iBUG, mesh
//! indices, ...). They are converted to a [`LandmarkSet`] at the backend
//! boundary so the field builders only ever ask for, e.g.,
//! [`Landmark::LeftEyeCenter`], never for "point 36".
//!
//! "Left" and "right" refer to the image: [`Landmark::LeftEyeCenter`] is the
//! eye with the smaller x coordinate in a frontal face.

use std::collections::BTreeMap;

use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::face_detector::FaceBox;

/// A 2D point in image pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn midpoint(&self, other: &Point) -> Point {
        Point::new((self.x + other.x) / 2.0, (self.y + other.y) / 2.0)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Semantic landmark names shared by every backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Landmark {
    LeftEyeCenter,
    LeftEyeOuter,
    LeftEyeInner,
    RightEyeCenter,
    RightEyeInner,
    RightEyeOuter,
    NoseTip,
    MouthLeft,
    MouthRight,
    UpperLip,
    LowerLip,
    JawLeft,
    Chin,
    JawRight,
}

impl Landmark {
    /// Every landmark of the canonical scheme.
    pub const ALL: [Landmark; 14] = [
        Landmark::LeftEyeCenter,
        Landmark::LeftEyeOuter,
        Landmark::LeftEyeInner,
        Landmark::RightEyeCenter,
        Landmark::RightEyeInner,
        Landmark::RightEyeOuter,
        Landmark::NoseTip,
        Landmark::MouthLeft,
        Landmark::MouthRight,
        Landmark::UpperLip,
        Landmark::LowerLip,
        Landmark::JawLeft,
        Landmark::Chin,
        Landmark::JawRight,
    ];

    /// Typical position of this landmark as a proportion of the face box.
    pub fn box_proportion(self) -> (f64, f64) {
        match self {
            Landmark::LeftEyeCenter => (0.30, 0.38),
            Landmark::LeftEyeOuter => (0.23, 0.38),
            Landmark::LeftEyeInner => (0.37, 0.38),
            Landmark::RightEyeCenter => (0.70, 0.38),
            Landmark::RightEyeInner => (0.63, 0.38),
            Landmark::RightEyeOuter => (0.77, 0.38),
            Landmark::NoseTip => (0.50, 0.60),
            Landmark::MouthLeft => (0.34, 0.72),
            Landmark::MouthRight => (0.66, 0.72),
            Landmark::UpperLip => (0.50, 0.67),
            Landmark::LowerLip => (0.50, 0.77),
            Landmark::JawLeft => (0.04, 0.65),
            Landmark::Chin => (0.50, 1.00),
            Landmark::JawRight => (0.96, 0.65),
        }
    }
}

/// Indices into the 68-point iBUG annotation used by dlib-style predictors.
const IBUG68_SINGLE: [(Landmark, usize); 11] = [
    (Landmark::LeftEyeOuter, 36),
    (Landmark::LeftEyeInner, 39),
    (Landmark::RightEyeInner, 42),
    (Landmark::RightEyeOuter, 45),
    (Landmark::NoseTip, 30),
    (Landmark::MouthLeft, 48),
    (Landmark::MouthRight, 54),
    (Landmark::UpperLip, 51),
    (Landmark::LowerLip, 57),
    (Landmark::JawLeft, 4),
    (Landmark::JawRight, 12),
];
const IBUG68_CHIN: usize = 8;
const IBUG68_LEFT_EYE: std::ops::Range<usize> = 36..42;
const IBUG68_RIGHT_EYE: std::ops::Range<usize> = 42..48;

/// Named landmark points belonging to one face.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LandmarkSet {
    points: BTreeMap<Landmark, Point>,
}

impl LandmarkSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from `(name, point)` pairs, skipping non-finite points.
    pub fn from_points(points: impl IntoIterator<Item = (Landmark, Point)>) -> Self {
        let mut set = Self::new();
        for (name, point) in points {
            set.insert(name, point);
        }
        set
    }

    /// Convert a positional 68-point iBUG shape into semantic landmarks.
    ///
    /// Returns `None` unless exactly 68 points are given.
    pub fn from_ibug68(points: &[Point]) -> Option<Self> {
        if points.len() != 68 {
            return None;
        }
        let mut set = Self::new();
        for (name, index) in IBUG68_SINGLE {
            set.insert(name, points[index]);
        }
        set.insert(Landmark::Chin, points[IBUG68_CHIN]);
        set.insert(Landmark::LeftEyeCenter, centroid(&points[IBUG68_LEFT_EYE]));
        set.insert(Landmark::RightEyeCenter, centroid(&points[IBUG68_RIGHT_EYE]));
        Some(set)
    }

    /// Place every canonical landmark at its typical proportion of `face`.
    pub fn estimate(face: &FaceBox) -> Self {
        Self::from_points(Landmark::ALL.iter().map(|&name| {
            let (u, v) = name.box_proportion();
            (name, face.denormalize(u, v))
        }))
    }

    pub fn insert(&mut self, name: Landmark, point: Point) {
        if point.is_finite() {
            self.points.insert(name, point);
        }
    }

    pub fn get(&self, name: Landmark) -> Option<Point> {
        self.points.get(&name).copied()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Landmark, Point)> + '_ {
        self.points.iter().map(|(name, point)| (*name, *point))
    }

    /// Center of the left eye, falling back to the midpoint of its corners.
    pub fn left_eye(&self) -> Option<Point> {
        self.get(Landmark::LeftEyeCenter).or_else(|| {
            Some(self.get(Landmark::LeftEyeOuter)?.midpoint(&self.get(Landmark::LeftEyeInner)?))
        })
    }

    /// Center of the right eye, falling back to the midpoint of its corners.
    pub fn right_eye(&self) -> Option<Point> {
        self.get(Landmark::RightEyeCenter).or_else(|| {
            Some(self.get(Landmark::RightEyeInner)?.midpoint(&self.get(Landmark::RightEyeOuter)?))
        })
    }

    pub fn mouth_corners(&self) -> Option<(Point, Point)> {
        Some((self.get(Landmark::MouthLeft)?, self.get(Landmark::MouthRight)?))
    }
}

fn centroid(points: &[Point]) -> Point {
    let n = points.len().max(1) as f64;
    let (sx, sy) = points
        .iter()
        .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
    Point::new(sx / n, sy / n)
}

/// Pluggable dense-landmark backend, run once per detected face.
///
/// Returning `None` means localization is unavailable for this face; the
/// face is still reported, just without landmarks.
pub trait LandmarkLocator: Send + Sync {
    fn locate(&self, image: &RgbImage, face: &FaceBox) -> Option<LandmarkSet>;
}

/// Landmark backend that places points at fixed proportions of the face box.
///
/// Useful when no trained shape predictor is available but downstream
/// consumers want a complete landmark set.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProportionalLocator;

impl LandmarkLocator for ProportionalLocator {
    fn locate(&self, image: &RgbImage, face: &FaceBox) -> Option<LandmarkSet> {
        if !face.is_valid() {
            return None;
        }
        let max_x = image.width().saturating_sub(1) as f64;
        let max_y = image.height().saturating_sub(1) as f64;
        let estimated = LandmarkSet::estimate(face);
        Some(LandmarkSet::from_points(estimated.iter().map(|(name, p)| {
            (name, Point::new(p.x.clamp(0.0, max_x), p.y.clamp(0.0, max_y)))
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ibug_shape() -> Vec<Point> {
        (0..68).map(|i| Point::new(i as f64, 2.0 * i as f64)).collect()
    }

    #[test]
    fn ibug68_maps_semantic_names() {
        let set = LandmarkSet::from_ibug68(&ibug_shape()).unwrap();
        assert_eq!(set.get(Landmark::NoseTip), Some(Point::new(30.0, 60.0)));
        assert_eq!(set.get(Landmark::MouthLeft), Some(Point::new(48.0, 96.0)));
        // centroid of 36..42 is 38.5
        assert_eq!(set.get(Landmark::LeftEyeCenter), Some(Point::new(38.5, 77.0)));
        assert_eq!(set.len(), Landmark::ALL.len());
    }

    #[test]
    fn ibug68_rejects_wrong_point_count() {
        assert!(LandmarkSet::from_ibug68(&ibug_shape()[..5]).is_none());
    }

    #[test]
    fn estimate_places_eyes_in_upper_half() {
        let face = FaceBox::new(100.0, 100.0, 200.0, 200.0);
        let set = LandmarkSet::estimate(&face);
        let left = set.left_eye().unwrap();
        let right = set.right_eye().unwrap();
        assert!(left.x < right.x);
        assert!(left.y < face.center().y);
        assert_eq!(left, Point::new(160.0, 176.0));
    }

    #[test]
    fn eye_center_falls_back_to_corners() {
        let set = LandmarkSet::from_points([
            (Landmark::LeftEyeOuter, Point::new(10.0, 20.0)),
            (Landmark::LeftEyeInner, Point::new(30.0, 20.0)),
        ]);
        assert_eq!(set.left_eye(), Some(Point::new(20.0, 20.0)));
        assert_eq!(set.right_eye(), None);
    }

    #[test]
    fn non_finite_points_are_dropped() {
        let set = LandmarkSet::from_points([(Landmark::Chin, Point::new(f64::NAN, 1.0))]);
        assert!(set.is_empty());
    }

    #[test]
    fn proportional_locator_clamps_to_image() {
        let image = RgbImage::new(100, 100);
        let face = FaceBox::new(50.0, 50.0, 100.0, 100.0);
        let set = ProportionalLocator.locate(&image, &face).unwrap();
        for (_, p) in set.iter() {
            assert!(p.x <= 99.0 && p.y <= 99.0);
        }
    }
}
