use std::str::FromStr;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::RecvTimeoutError;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::annotate::annotate;
use crate::codec::{self, OutputFormat};
use crate::composite::composite;
use crate::error::MorphError;
use crate::face_detector::{FaceBox, FaceDetector};
use crate::field::{clamp_strength, EffectPlan, FieldBuilder};
use crate::landmarks::{LandmarkLocator, LandmarkSet};
use crate::provider::{DetectedFace, Detection, LandmarkProvider};
use crate::{stylize, warp, Effect};

/// Which detected faces a geometric effect is applied to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FaceScope {
    /// Only the highest-confidence face.
    #[default]
    Primary,
    /// Every detected face.
    All,
}

/// Engine settings, loadable from JSON and overridable through the builder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// JPEG quality from 0.0 to 1.0.
    pub jpeg_quality: f32,
    /// Per-request time budget. `None` disables the deadline.
    pub time_budget_ms: Option<u64>,
    pub face_scope: FaceScope,
    pub output_format: OutputFormat,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            jpeg_quality: 0.92,
            time_budget_ms: Some(10_000),
            face_scope: FaceScope::Primary,
            output_format: OutputFormat::Jpeg,
        }
    }
}

impl EngineConfig {
    /// Parse a configuration; missing keys take their defaults.
    pub fn from_json(json: &str) -> Result<Self, MorphError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| MorphError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), MorphError> {
        if !(0.0..=1.0).contains(&self.jpeg_quality) {
            return Err(MorphError::InvalidConfig(format!(
                "jpeg_quality must be within 0.0..=1.0, got {}",
                self.jpeg_quality
            )));
        }
        if self.time_budget_ms == Some(0) {
            return Err(MorphError::InvalidConfig(
                "time_budget_ms must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Wall-clock budget for one request.
struct Deadline {
    started: Instant,
    budget: Duration,
}

impl Deadline {
    fn start(budget_ms: Option<u64>) -> Option<Self> {
        budget_ms.map(|ms| Self {
            started: Instant::now(),
            budget: Duration::from_millis(ms),
        })
    }

    fn check(deadline: &Option<Self>, stage: &'static str) -> Result<(), MorphError> {
        match deadline {
            Some(d) if d.started.elapsed() > d.budget => Err(d.expired(stage)),
            _ => Ok(()),
        }
    }

    fn remaining(&self) -> Duration {
        self.budget.saturating_sub(self.started.elapsed())
    }

    fn expired(&self, stage: &'static str) -> MorphError {
        MorphError::ProcessingTimeout {
            stage,
            budget_ms: self.budget.as_millis() as u64,
        }
    }
}

/// Parameters of one morph request.
#[derive(Debug, Clone, PartialEq)]
pub struct MorphRequest {
    pub effect: Effect,
    pub strength: f64,
    pub background: bool,
    /// Landmarks supplied by the caller for the primary face. They take
    /// precedence over the configured locator.
    pub landmarks: Option<LandmarkSet>,
}

impl MorphRequest {
    /// Request `effect` at the reference strength 1.0, without background.
    pub fn new(effect: Effect) -> Self {
        Self {
            effect,
            strength: 1.0,
            background: false,
            landmarks: None,
        }
    }

    pub fn strength(mut self, strength: f64) -> Self {
        self.strength = strength;
        self
    }

    pub fn background(mut self, enable: bool) -> Self {
        self.background = enable;
        self
    }

    pub fn landmarks(mut self, landmarks: LandmarkSet) -> Self {
        self.landmarks = Some(landmarks);
        self
    }
}

/// Result of a successful morph.
#[derive(Debug, Clone)]
pub struct MorphOutput {
    pub image: RgbImage,
    pub detection: Detection,
    pub effect: Effect,
    /// Strength actually applied, after clamping.
    pub strength: f64,
}

/// Boundary response for a detection request.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectResponse {
    pub faces_count: usize,
    pub has_landmarks: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub face_box: Option<FaceBox>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotated_image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DetectResponse {
    fn failure(error: &MorphError) -> Self {
        Self {
            error: Some(error.to_string()),
            ..Self::default()
        }
    }
}

/// Boundary response for a morph request.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MorphResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub morphed_image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effect: Option<Effect>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strength: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MorphResponse {
    fn failure(error: &MorphError) -> Self {
        Self {
            error: Some(error.to_string()),
            ..Self::default()
        }
    }
}

/// Face warping pipeline: detect, plan, render, composite, encode.
///
/// The engine holds only read-only state after construction and can be
/// shared across threads behind an `Arc`.
///
/// ```no_run
/// use std::sync::Arc;
/// use facemorph::{Effect, FaceBox, FaceDetector, MorphEngine, MorphRequest};
///
/// struct MyDetector;
/// impl FaceDetector for MyDetector {
///     fn detect(&self, _gray: &[u8], width: u32, height: u32) -> Vec<FaceBox> {
///         vec![FaceBox::new(width as f64 / 4.0, height as f64 / 4.0, width as f64 / 2.0, height as f64 / 2.0)]
///     }
/// }
///
/// let engine = MorphEngine::new(Arc::new(MyDetector)).jpeg_quality(0.8);
/// let image = facemorph::codec::decode(&std::fs::read("face.jpg").unwrap()).unwrap();
/// let out = engine.morph(&image, &MorphRequest::new(Effect::BigEyes).strength(1.5)).unwrap();
/// std::fs::write("big_eyes.jpg", engine.encode(&out.image).unwrap()).unwrap();
/// ```
#[derive(Clone)]
pub struct MorphEngine {
    provider: LandmarkProvider,
    fields: FieldBuilder,
    config: EngineConfig,
}

impl MorphEngine {
    pub fn new(detector: Arc<dyn FaceDetector>) -> Self {
        let config = EngineConfig::default();
        info!(
            budget_ms = ?config.time_budget_ms,
            format = ?config.output_format,
            "morph engine created"
        );
        Self {
            provider: LandmarkProvider::new(detector),
            fields: FieldBuilder::new(),
            config,
        }
    }

    /// Add a dense-landmark backend run on every detected face.
    pub fn landmark_locator(mut self, locator: Arc<dyn LandmarkLocator>) -> Self {
        self.provider = self.provider.with_locator(locator);
        self
    }

    /// Replace the field builder (eye and mouth radii).
    pub fn field_builder(mut self, fields: FieldBuilder) -> Self {
        self.fields = fields;
        self
    }

    /// Replace the whole configuration. Later setters override it.
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the JPEG quality from 0.0 to 1.0 (default: 0.92).
    pub fn jpeg_quality(mut self, quality: f32) -> Self {
        self.config.jpeg_quality = quality;
        self
    }

    /// Set the per-request time budget (default: 10 s). `None` disables it.
    pub fn time_budget_ms(mut self, budget: Option<u64>) -> Self {
        self.config.time_budget_ms = budget;
        self
    }

    pub fn face_scope(mut self, scope: FaceScope) -> Self {
        self.config.face_scope = scope;
        self
    }

    pub fn output_format(mut self, format: OutputFormat) -> Self {
        self.config.output_format = format;
        self
    }

    pub fn settings(&self) -> &EngineConfig {
        &self.config
    }

    /// Detect faces and landmarks. Zero faces is an empty, successful result.
    pub fn detect(&self, image: &RgbImage) -> Result<Detection, MorphError> {
        self.config.validate()?;
        let deadline = Deadline::start(self.config.time_budget_ms);
        self.detect_within(image, &deadline)
    }

    /// Run the provider, bounded by the deadline when one is set.
    ///
    /// With a deadline the detector runs on a worker thread. When the budget
    /// runs out first the request fails and the worker's late result is
    /// dropped; the detector itself cannot be interrupted.
    fn detect_within(
        &self,
        image: &RgbImage,
        deadline: &Option<Deadline>,
    ) -> Result<Detection, MorphError> {
        let Some(d) = deadline else {
            return self.provider.detect(image);
        };

        let provider = self.provider.clone();
        let image = image.clone();
        let (tx, rx) = crossbeam_channel::bounded(1);
        thread::Builder::new()
            .name("facemorph-detect".into())
            .spawn(move || {
                let _ = tx.send(provider.detect(&image));
            })
            .map_err(|e| MorphError::InternalRenderError(format!("detector worker: {e}")))?;

        match rx.recv_timeout(d.remaining()) {
            Ok(result) => {
                let detection = result?;
                Deadline::check(deadline, "detection")?;
                Ok(detection)
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(budget_ms = d.budget.as_millis() as u64, "detector exceeded the time budget");
                Err(d.expired("detection"))
            }
            Err(RecvTimeoutError::Disconnected) => Err(MorphError::InternalRenderError(
                "detector worker stopped without a result".into(),
            )),
        }
    }

    /// Apply one effect to a decoded image.
    ///
    /// Either a complete image is returned or an error; a failure at any
    /// stage never yields a partially processed buffer. Detection is
    /// abandoned as soon as the time budget runs out. Rendering and
    /// compositing are checked against the budget when they finish.
    pub fn morph(&self, image: &RgbImage, request: &MorphRequest) -> Result<MorphOutput, MorphError> {
        self.config.validate()?;
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(MorphError::InvalidImage("image dimensions are zero".into()));
        }
        let deadline = Deadline::start(self.config.time_budget_ms);
        let effect = request.effect;
        let strength = clamp_strength(request.strength);

        let needs_faces = effect.is_geometric() || request.background;
        let mut detection = if needs_faces {
            self.detect_within(image, &deadline)?
        } else {
            Detection::default()
        };
        Deadline::check(&deadline, "detection")?;

        if let (Some(landmarks), Some(primary)) = (&request.landmarks, detection.primary_mut()) {
            primary.landmarks = Some(landmarks.clone());
        }

        let targets: Vec<DetectedFace> = match self.config.face_scope {
            FaceScope::Primary => detection.primary().cloned().into_iter().collect(),
            FaceScope::All => detection.faces.clone(),
        };
        if effect.uses_landmarks() && targets.iter().any(|f| f.landmarks.is_none()) {
            warn!(effect = effect.id(), "landmarks missing, using face-box proportions");
        }

        let plan = self
            .fields
            .build_for_faces(&targets, effect, strength, width, height)?;
        debug!(effect = effect.id(), strength, faces = targets.len(), "effect planned");

        let rendered = match plan {
            EffectPlan::Warp(field) => warp::render(image, &field)?,
            EffectPlan::Stylize { strength } => stylize::stylize(image, strength),
        };
        Deadline::check(&deadline, "render")?;
        debug!(effect = effect.id(), "effect rendered");

        let primary_box = detection.primary().map(|f| f.face);
        let output = composite(&rendered, primary_box.as_ref(), request.background);
        Deadline::check(&deadline, "composite")?;

        Ok(MorphOutput {
            image: output,
            detection,
            effect,
            strength,
        })
    }

    /// Encode with the configured format and quality.
    pub fn encode(&self, image: &RgbImage) -> Result<Vec<u8>, MorphError> {
        codec::encode(image, self.config.output_format, self.config.jpeg_quality)
    }

    /// Encode and wrap in a `data:` URI.
    pub fn encode_data_uri(&self, image: &RgbImage) -> Result<String, MorphError> {
        Ok(codec::to_data_uri(&self.encode(image)?, self.config.output_format))
    }

    /// Detection boundary: takes a data URI or base64 payload, never fails.
    pub fn handle_detect(&self, payload: &str) -> DetectResponse {
        match self.try_detect(payload) {
            Ok(response) => response,
            Err(e) => {
                debug!(code = e.code(), "detect request failed: {e}");
                DetectResponse::failure(&e)
            }
        }
    }

    fn try_detect(&self, payload: &str) -> Result<DetectResponse, MorphError> {
        let image = codec::decode_transport(payload)?;
        let detection = self.detect(&image)?;
        let annotated = annotate(&image, &detection);
        Ok(DetectResponse {
            faces_count: detection.len(),
            has_landmarks: detection.has_landmarks(),
            face_box: detection.primary().map(|f| f.face),
            annotated_image: Some(self.encode_data_uri(&annotated)?),
            error: None,
        })
    }

    /// Morph boundary: takes a data URI or base64 payload and a wire effect
    /// identifier, never fails.
    pub fn handle_morph(
        &self,
        payload: &str,
        effect: &str,
        strength: f64,
        background: bool,
    ) -> MorphResponse {
        match self.try_morph(payload, effect, strength, background) {
            Ok(response) => response,
            Err(e) => {
                debug!(code = e.code(), "morph request failed: {e}");
                MorphResponse::failure(&e)
            }
        }
    }

    fn try_morph(
        &self,
        payload: &str,
        effect: &str,
        strength: f64,
        background: bool,
    ) -> Result<MorphResponse, MorphError> {
        let effect = Effect::from_str(effect)?;
        let image = codec::decode_transport(payload)?;
        let request = MorphRequest::new(effect)
            .strength(strength)
            .background(background);
        let output = self.morph(&image, &request)?;
        Ok(MorphResponse {
            morphed_image: Some(self.encode_data_uri(&output.image)?),
            effect: Some(output.effect),
            strength: Some(output.strength),
            background: Some(background),
            error: None,
        })
    }
}
