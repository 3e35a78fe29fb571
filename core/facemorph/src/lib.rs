//! Landmark-driven face warping: bulge, squeeze, big eyes and wide smile
//! warps, cartoon stylization and mugshot background replacement for still
//! images.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use facemorph::{Effect, FaceBox, FaceDetector, MorphEngine, MorphRequest};
//!
//! struct CenterDetector;
//! impl FaceDetector for CenterDetector {
//!     fn detect(&self, _gray: &[u8], width: u32, height: u32) -> Vec<FaceBox> {
//!         let (w, h) = (width as f64, height as f64);
//!         vec![FaceBox::new(w * 0.3, h * 0.25, w * 0.4, h * 0.5)]
//!     }
//! }
//!
//! let engine = MorphEngine::new(Arc::new(CenterDetector));
//! let image = facemorph::codec::decode(&std::fs::read("photo.jpg").unwrap()).unwrap();
//! let output = engine
//!     .morph(&image, &MorphRequest::new(Effect::Bulge).strength(1.2))
//!     .unwrap();
//! std::fs::write("bulge.jpg", engine.encode(&output.image).unwrap()).unwrap();
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

mod annotate;
/// Image decoding, encoding and `data:` URI transport.
pub mod codec;
mod composite;
mod engine;
mod error;
/// Face detection traits and data types.
pub mod face_detector;
/// Displacement fields and the per-effect field builder.
pub mod field;
/// Semantic facial landmarks and landmark backends.
pub mod landmarks;
mod persist;
mod provider;
mod rows;
#[cfg(feature = "rustface")]
/// Built-in SeetaFace-based face detector backend.
pub mod rustface_backend;
mod stylize;
mod warp;

pub use annotate::annotate;
pub use codec::OutputFormat;
pub use composite::{apply_vignette, composite, mugshot_backdrop, person_mask};
pub use engine::{
    DetectResponse, EngineConfig, FaceScope, MorphEngine, MorphOutput, MorphRequest, MorphResponse,
};
/// Error type returned by facemorph operations.
pub use error::MorphError;
pub use face_detector::{FaceBox, FaceDetector};
pub use field::{DisplacementField, EffectPlan, FieldBuilder, Region, MAX_STRENGTH};
pub use landmarks::{Landmark, LandmarkLocator, LandmarkSet, Point, ProportionalLocator};
pub use persist::{ImageSaver, SaveResponse};
pub use provider::{DetectedFace, Detection, LandmarkProvider};
#[cfg(feature = "rustface")]
/// Built-in detector backed by a SeetaFace model.
pub use rustface_backend::RustfaceDetector;
pub use stylize::{bilateral, posterize, stylize};
pub use warp::render;

/// The closed set of effects the engine can apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Effect {
    /// Fish-eye expansion centered on the face.
    Bulge,

    /// Flat colors with bold outlines; applies to the whole image.
    Cartoon,

    /// Narrower, taller face.
    Squeeze,

    /// Magnified eyes.
    BigEyes,

    /// Mouth stretched into a grin.
    WideSmile,
}

/// Catalog entry describing an effect for a picker UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EffectInfo {
    pub id: &'static str,
    pub name: &'static str,
    #[serde(rename = "desc")]
    pub description: &'static str,
}

impl Effect {
    /// Every effect, in catalog order.
    pub const ALL: [Effect; 5] = [
        Effect::Bulge,
        Effect::Cartoon,
        Effect::Squeeze,
        Effect::BigEyes,
        Effect::WideSmile,
    ];

    /// Wire identifier, e.g. `"big_eyes"`.
    pub fn id(self) -> &'static str {
        match self {
            Effect::Bulge => "bulge",
            Effect::Cartoon => "cartoon",
            Effect::Squeeze => "squeeze",
            Effect::BigEyes => "big_eyes",
            Effect::WideSmile => "wide_smile",
        }
    }

    /// Whether the effect warps geometry and therefore needs a face.
    pub fn is_geometric(self) -> bool {
        !matches!(self, Effect::Cartoon)
    }

    /// Whether the effect is placed from eye or mouth landmarks.
    pub fn uses_landmarks(self) -> bool {
        matches!(self, Effect::BigEyes | Effect::WideSmile)
    }

    pub fn info(self) -> EffectInfo {
        let (name, description) = match self {
            Effect::Bulge => ("Bulge", "Fish-eye inflation"),
            Effect::Cartoon => ("Cartoon", "Comic book style"),
            Effect::Squeeze => ("Squeeze", "Tall & thin"),
            Effect::BigEyes => ("Big Eyes", "Enlarged eyes"),
            Effect::WideSmile => ("Wide Smile", "Exaggerated grin"),
        };
        EffectInfo {
            id: self.id(),
            name,
            description,
        }
    }

    /// Catalog of all effects for display.
    pub fn catalog() -> Vec<EffectInfo> {
        Self::ALL.iter().map(|e| e.info()).collect()
    }
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Effect {
    type Err = MorphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|e| e.id() == s)
            .ok_or_else(|| MorphError::UnknownEffect(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_wire_identifiers() {
        for effect in Effect::ALL {
            assert_eq!(effect.id().parse::<Effect>().unwrap(), effect);
        }
    }

    #[test]
    fn unknown_identifier_is_rejected() {
        let err = "Bulge".parse::<Effect>().unwrap_err();
        assert_eq!(err.code(), "UNKNOWN_EFFECT");
        assert!(matches!("".parse::<Effect>(), Err(MorphError::UnknownEffect(_))));
    }

    #[test]
    fn serde_uses_wire_identifiers() {
        assert_eq!(serde_json::to_string(&Effect::BigEyes).unwrap(), "\"big_eyes\"");
        let parsed: Effect = serde_json::from_str("\"wide_smile\"").unwrap();
        assert_eq!(parsed, Effect::WideSmile);
    }

    #[test]
    fn catalog_lists_every_effect_once() {
        let catalog = Effect::catalog();
        assert_eq!(catalog.len(), 5);
        let ids: Vec<&str> = catalog.iter().map(|i| i.id).collect();
        assert_eq!(ids, ["bulge", "cartoon", "squeeze", "big_eyes", "wide_smile"]);
        let json = serde_json::to_value(catalog[1]).unwrap();
        assert_eq!(json["desc"], "Comic book style");
    }

    #[test]
    fn only_cartoon_is_non_geometric() {
        let geometric: Vec<Effect> = Effect::ALL.into_iter().filter(|e| e.is_geometric()).collect();
        assert_eq!(geometric.len(), 4);
        assert!(!Effect::Cartoon.is_geometric());
        assert!(!Effect::Cartoon.uses_landmarks());
    }
}
