//! Displacement fields for the geometric effects.
//!
//! A field maps every destination pixel `(x, y)` to the source position
//! `(x + dx, y + dy)` it is sampled from. Offsets are stored only for a
//! bounding region; everything outside it is identity. Every kernel uses the
//! falloff `w = (1 - ρ²)²`, which reaches zero with zero slope at the kernel
//! boundary, so warped areas blend into the untouched image without a seam.
//!
//! Gains are chosen so that each kernel stays monotonic (no folding) for
//! strengths up to [`MAX_STRENGTH`]. Kernels are composed rather than summed,
//! so overlapping kernels (several faces) cannot fold either.

use serde::Serialize;

use crate::error::MorphError;
use crate::face_detector::FaceBox;
use crate::landmarks::{Landmark, LandmarkSet, Point};
use crate::provider::DetectedFace;
use crate::rows::for_each_row;
use crate::Effect;

/// Upper bound applied to every strength value.
pub const MAX_STRENGTH: f64 = 2.0;

/// Center compression of the bulge at strength 1.0.
const BULGE_GAIN: f64 = 0.35;
/// Horizontal compression of the squeeze at strength 1.0. Must stay below 0.625.
const SQUEEZE_GAIN_X: f64 = 0.4;
/// Vertical elongation of the squeeze at strength 1.0. Must stay below 0.5.
const SQUEEZE_GAIN_Y: f64 = 0.2;
const EYE_GAIN: f64 = 0.4;
const SMILE_STRETCH: f64 = 0.25;
/// Corner lift as a fraction of the mouth radius at strength 1.0.
const SMILE_LIFT: f64 = 0.08;

/// Clamp a requested strength into `[0, MAX_STRENGTH]`; non-finite values become 0.
pub fn clamp_strength(strength: f64) -> f64 {
    if strength.is_finite() {
        strength.clamp(0.0, MAX_STRENGTH)
    } else {
        0.0
    }
}

/// Rectangle of pixels covered by a field, in image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x && y >= self.y && x < self.x + self.width && y < self.y + self.height
    }
}

/// Per-pixel source offsets over a region of an image; identity elsewhere.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplacementField {
    image_width: u32,
    image_height: u32,
    region: Option<Region>,
    offsets: Vec<[f32; 2]>,
}

impl DisplacementField {
    /// A field that leaves every pixel where it is.
    pub fn identity(image_width: u32, image_height: u32) -> Self {
        Self {
            image_width,
            image_height,
            region: None,
            offsets: Vec::new(),
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.image_width, self.image_height)
    }

    /// The bounding region outside of which the field is identity.
    pub fn region(&self) -> Option<Region> {
        self.region
    }

    pub fn is_identity(&self) -> bool {
        self.offsets.iter().all(|o| o[0] == 0.0 && o[1] == 0.0)
    }

    /// Source offset `(dx, dy)` for destination pixel `(x, y)`.
    pub fn offset(&self, x: u32, y: u32) -> (f32, f32) {
        match self.region {
            Some(r) if r.contains(x, y) => {
                let i = ((y - r.y) * r.width + (x - r.x)) as usize;
                let [dx, dy] = self.offsets[i];
                (dx, dy)
            }
            _ => (0.0, 0.0),
        }
    }

    /// Length of the offset at `(x, y)`.
    pub fn magnitude(&self, x: u32, y: u32) -> f32 {
        let (dx, dy) = self.offset(x, y);
        (dx * dx + dy * dy).sqrt()
    }

    /// Offsets of one region row, or `None` when the row is outside the region.
    pub(crate) fn row(&self, y: u32) -> Option<(Region, &[[f32; 2]])> {
        let r = self.region?;
        if y < r.y || y >= r.y + r.height {
            return None;
        }
        let start = ((y - r.y) * r.width) as usize;
        Some((r, &self.offsets[start..start + r.width as usize]))
    }

    fn from_kernels(image_width: u32, image_height: u32, kernels: &[Kernel]) -> Self {
        let kernels: Vec<&Kernel> = kernels.iter().filter(|k| k.bounds().is_some()).collect();
        let Some(region) = kernels
            .iter()
            .filter_map(|k| k.bounds())
            .reduce(|a, b| (a.0.min(b.0), a.1.min(b.1), a.2.max(b.2), a.3.max(b.3)))
            .and_then(|bounds| clip_region(bounds, image_width, image_height))
        else {
            return Self::identity(image_width, image_height);
        };

        let mut offsets = vec![[0.0f32; 2]; (region.width * region.height) as usize];
        for_each_row(&mut offsets, region.width as usize, |row, cells| {
            let y = (region.y as usize + row) as f64;
            for (col, cell) in cells.iter_mut().enumerate() {
                let x = (region.x as usize + col) as f64;
                let (mut dx, mut dy) = (0.0, 0.0);
                // each kernel samples where the previous one points
                for kernel in kernels.iter() {
                    let (kx, ky) = kernel.offset(x + dx, y + dy);
                    dx += kx;
                    dy += ky;
                }
                *cell = [dx as f32, dy as f32];
            }
        });

        Self {
            image_width,
            image_height,
            region: Some(region),
            offsets,
        }
    }
}

fn clip_region(
    (x0, y0, x1, y1): (f64, f64, f64, f64),
    image_width: u32,
    image_height: u32,
) -> Option<Region> {
    if image_width == 0 || image_height == 0 {
        return None;
    }
    let max_x = (image_width - 1) as f64;
    let max_y = (image_height - 1) as f64;
    if x1 < 0.0 || y1 < 0.0 || x0 > max_x || y0 > max_y {
        return None;
    }
    let left = x0.floor().max(0.0) as u32;
    let top = y0.floor().max(0.0) as u32;
    let right = x1.ceil().min(max_x) as u32;
    let bottom = y1.ceil().min(max_y) as u32;
    Some(Region {
        x: left,
        y: top,
        width: right - left + 1,
        height: bottom - top + 1,
    })
}

/// Smooth falloff that is 1 at the center and 0 (with zero slope) at ρ = 1.
fn falloff(rho_sq: f64) -> f64 {
    if rho_sq >= 1.0 {
        0.0
    } else {
        let t = 1.0 - rho_sq;
        t * t
    }
}

/// Closed set of localized warps the effects are assembled from.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Kernel {
    /// Magnifies around `center`; the source radius shrinks by `gain · w`.
    Radial { center: Point, radius: f64, gain: f64 },
    /// Compresses horizontally and stretches vertically inside an ellipse.
    /// With the ellipse inscribed in the face box, the box edges are identity.
    Axial {
        center: Point,
        radius_x: f64,
        radius_y: f64,
        gain_x: f64,
        gain_y: f64,
    },
    /// Horizontal magnification with the outer parts lifted upward.
    Smile {
        center: Point,
        radius: f64,
        stretch: f64,
        lift: f64,
    },
}

impl Kernel {
    fn bounds(&self) -> Option<(f64, f64, f64, f64)> {
        let (center, rx, ry) = match *self {
            Kernel::Radial { center, radius, .. } | Kernel::Smile { center, radius, .. } => {
                (center, radius, radius)
            }
            Kernel::Axial {
                center,
                radius_x,
                radius_y,
                ..
            } => (center, radius_x, radius_y),
        };
        if !(rx > 0.0 && ry > 0.0 && center.is_finite()) {
            return None;
        }
        Some((center.x - rx, center.y - ry, center.x + rx, center.y + ry))
    }

    fn offset(&self, x: f64, y: f64) -> (f64, f64) {
        match *self {
            Kernel::Radial {
                center,
                radius,
                gain,
            } => {
                let (dx, dy) = (x - center.x, y - center.y);
                let w = falloff((dx * dx + dy * dy) / (radius * radius));
                (-dx * gain * w, -dy * gain * w)
            }
            Kernel::Axial {
                center,
                radius_x,
                radius_y,
                gain_x,
                gain_y,
            } => {
                let (dx, dy) = (x - center.x, y - center.y);
                let (nx, ny) = (dx / radius_x, dy / radius_y);
                let w = falloff(nx * nx + ny * ny);
                (dx * gain_x * w, -dy * gain_y * w)
            }
            Kernel::Smile {
                center,
                radius,
                stretch,
                lift,
            } => {
                let (dx, dy) = (x - center.x, y - center.y);
                let w = falloff((dx * dx + dy * dy) / (radius * radius));
                let across = dx / radius;
                (-dx * stretch * w, lift * w * across * across)
            }
        }
    }
}

/// What the pipeline must do to realize an effect.
#[derive(Debug, Clone, PartialEq)]
pub enum EffectPlan {
    /// Resample the image through a displacement field.
    Warp(DisplacementField),
    /// Run the cartoon stylization at the given strength.
    Stylize { strength: f64 },
}

/// Builds displacement fields from face geometry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldBuilder {
    eye_radius_fraction: f64,
    mouth_radius_scale: f64,
}

impl Default for FieldBuilder {
    fn default() -> Self {
        Self {
            eye_radius_fraction: 0.15,
            mouth_radius_scale: 1.2,
        }
    }
}

impl FieldBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Radius of each eye magnification as a fraction of the smaller face box side
    /// (default: 0.15).
    pub fn eye_radius_fraction(mut self, fraction: f64) -> Self {
        self.eye_radius_fraction = fraction;
        self
    }

    /// Radius of the smile warp as a multiple of the mouth width (default: 1.2).
    pub fn mouth_radius_scale(mut self, scale: f64) -> Self {
        self.mouth_radius_scale = scale;
        self
    }

    /// Configured eye radius for a face box.
    pub fn eye_radius(&self, face: &FaceBox) -> f64 {
        self.eye_radius_fraction * face.width.min(face.height)
    }

    /// Plan an effect for a single face.
    ///
    /// Geometric effects require a face box and fail with
    /// [`MorphError::NoFaceAvailable`] without one. Missing landmarks fall back
    /// to box-relative positions.
    pub fn build(
        &self,
        face: Option<&FaceBox>,
        landmarks: Option<&LandmarkSet>,
        effect: Effect,
        strength: f64,
        image_width: u32,
        image_height: u32,
    ) -> Result<EffectPlan, MorphError> {
        let faces: Vec<DetectedFace> = face
            .map(|f| DetectedFace {
                face: *f,
                landmarks: landmarks.cloned(),
            })
            .into_iter()
            .collect();
        self.build_for_faces(&faces, effect, strength, image_width, image_height)
    }

    /// Plan an effect applied to every face in `faces`.
    pub fn build_for_faces(
        &self,
        faces: &[DetectedFace],
        effect: Effect,
        strength: f64,
        image_width: u32,
        image_height: u32,
    ) -> Result<EffectPlan, MorphError> {
        let strength = clamp_strength(strength);
        if effect == Effect::Cartoon {
            return Ok(EffectPlan::Stylize { strength });
        }

        let faces: Vec<&DetectedFace> = faces.iter().filter(|f| f.face.is_valid()).collect();
        if faces.is_empty() {
            return Err(MorphError::NoFaceAvailable);
        }

        let mut kernels = Vec::with_capacity(faces.len() * 2);
        for detected in faces {
            let landmarks = detected.landmarks.as_ref();
            match effect {
                Effect::Bulge => kernels.push(bulge(&detected.face, strength)),
                Effect::Squeeze => kernels.push(squeeze(&detected.face, strength)),
                Effect::BigEyes => {
                    kernels.extend(self.big_eyes(&detected.face, landmarks, strength))
                }
                Effect::WideSmile => {
                    kernels.push(self.wide_smile(&detected.face, landmarks, strength))
                }
                Effect::Cartoon => {}
            }
        }

        Ok(EffectPlan::Warp(DisplacementField::from_kernels(
            image_width,
            image_height,
            &kernels,
        )))
    }

    fn big_eyes(&self, face: &FaceBox, landmarks: Option<&LandmarkSet>, strength: f64) -> [Kernel; 2] {
        let estimated = |name: Landmark| {
            let (u, v) = name.box_proportion();
            face.denormalize(u, v)
        };
        let left = landmarks
            .and_then(|l| l.left_eye())
            .unwrap_or_else(|| estimated(Landmark::LeftEyeCenter));
        let right = landmarks
            .and_then(|l| l.right_eye())
            .unwrap_or_else(|| estimated(Landmark::RightEyeCenter));

        // Never let the two magnifiers overlap.
        let radius = self.eye_radius(face).min(left.distance(&right) / 2.0);
        let gain = EYE_GAIN * strength;
        [
            Kernel::Radial {
                center: left,
                radius,
                gain,
            },
            Kernel::Radial {
                center: right,
                radius,
                gain,
            },
        ]
    }

    fn wide_smile(&self, face: &FaceBox, landmarks: Option<&LandmarkSet>, strength: f64) -> Kernel {
        let (left, right) = landmarks.and_then(|l| l.mouth_corners()).unwrap_or_else(|| {
            let (lu, lv) = Landmark::MouthLeft.box_proportion();
            let (ru, rv) = Landmark::MouthRight.box_proportion();
            (face.denormalize(lu, lv), face.denormalize(ru, rv))
        });
        let radius = self.mouth_radius_scale * left.distance(&right);
        Kernel::Smile {
            center: left.midpoint(&right),
            radius,
            stretch: SMILE_STRETCH * strength,
            lift: SMILE_LIFT * radius * strength,
        }
    }
}

fn bulge(face: &FaceBox, strength: f64) -> Kernel {
    Kernel::Radial {
        center: face.center(),
        radius: face.half_diagonal(),
        gain: BULGE_GAIN * strength,
    }
}

fn squeeze(face: &FaceBox, strength: f64) -> Kernel {
    Kernel::Axial {
        center: face.center(),
        radius_x: face.width / 2.0,
        radius_y: face.height / 2.0,
        gain_x: SQUEEZE_GAIN_X * strength,
        gain_y: SQUEEZE_GAIN_Y * strength,
    }
}
