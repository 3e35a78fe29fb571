use std::str::FromStr;
use std::sync::Arc;

use facemorph::codec::{self, OutputFormat};
use facemorph::{
    annotate, Effect, FaceBox, FaceDetector, FaceScope, MorphEngine, MorphError, MorphRequest,
    ProportionalLocator, RustfaceDetector,
};
use once_cell::sync::OnceCell;
use serde::Deserialize;
use wasm_bindgen::prelude::*;

/// Detector loaded by `initDetector`, shared by every call afterwards.
static DETECTOR: OnceCell<Arc<RustfaceDetector>> = OnceCell::new();

/// Options for `detect` and `morph`, passed as a JavaScript object.
///
/// All fields are optional.
#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct MorphOptions {
    pub strength: Option<f64>,
    pub background: Option<bool>,
    pub quality: Option<f32>,
    pub format: Option<String>,
    pub face_scope: Option<String>,
}

/// Stands in for the detector when no model was loaded: finds nothing.
struct NoFaces;

impl FaceDetector for NoFaces {
    fn detect(&self, _gray: &[u8], _width: u32, _height: u32) -> Vec<FaceBox> {
        Vec::new()
    }
}

fn string_to_format(format: &str) -> Result<OutputFormat, JsValue> {
    match format {
        "jpeg" => Ok(OutputFormat::Jpeg),
        "png" => Ok(OutputFormat::Png),
        _ => Err(make_error(
            "INVALID_OPTIONS",
            &format!("unknown format: {format}"),
        )),
    }
}

fn string_to_scope(scope: &str) -> Result<FaceScope, JsValue> {
    match scope {
        "primary" => Ok(FaceScope::Primary),
        "all" => Ok(FaceScope::All),
        _ => Err(make_error(
            "INVALID_OPTIONS",
            &format!("unknown face scope: {scope}"),
        )),
    }
}

/// Create a JS `Error` with a `code` property.
fn make_error(code: &str, message: &str) -> JsValue {
    let err = js_sys::Error::new(message);
    let _ = js_sys::Reflect::set(&err, &"code".into(), &JsValue::from_str(code));
    JsValue::from(err)
}

/// Convert a `MorphError` into a JS `Error` with a machine-readable `code` property.
fn to_js_error(e: MorphError) -> JsValue {
    make_error(e.code(), &e.to_string())
}

fn parse_options(options: JsValue) -> Result<MorphOptions, JsValue> {
    if options.is_undefined() || options.is_null() {
        Ok(MorphOptions::default())
    } else {
        serde_wasm_bindgen::from_value(options)
            .map_err(|e| make_error("INVALID_OPTIONS", &format!("invalid options: {e}")))
    }
}

/// Build an engine for one call. There is no monotonic clock on wasm, so
/// the time budget is always disabled.
fn build_engine(opts: &MorphOptions, needs_detector: bool) -> Result<MorphEngine, JsValue> {
    let detector: Arc<dyn FaceDetector> = match DETECTOR.get() {
        Some(detector) => detector.clone(),
        None if needs_detector => {
            return Err(make_error(
                "DETECTOR_UNAVAILABLE",
                "call initDetector with a SeetaFace model first",
            ))
        }
        None => Arc::new(NoFaces),
    };

    let mut engine = MorphEngine::new(detector)
        .landmark_locator(Arc::new(ProportionalLocator))
        .time_budget_ms(None);
    if let Some(q) = opts.quality {
        engine = engine.jpeg_quality(q);
    }
    if let Some(ref fmt) = opts.format {
        engine = engine.output_format(string_to_format(fmt)?);
    }
    if let Some(ref scope) = opts.face_scope {
        engine = engine.face_scope(string_to_scope(scope)?);
    }
    Ok(engine)
}

fn format_to_str(format: OutputFormat) -> &'static str {
    match format {
        OutputFormat::Jpeg => "jpeg",
        OutputFormat::Png => "png",
    }
}

/// Load the SeetaFace frontal model once. Later calls are no-ops.
///
/// @param model - Bytes of `seeta_fd_frontal_v1.0.bin`
#[wasm_bindgen(js_name = "initDetector")]
pub fn init_detector(model: Vec<u8>) -> Result<(), JsValue> {
    DETECTOR
        .get_or_try_init(|| RustfaceDetector::from_bytes(&model).map(Arc::new))
        .map(|_| ())
        .map_err(to_js_error)
}

/// Whether `initDetector` has completed.
#[wasm_bindgen(js_name = "detectorReady")]
pub fn detector_ready() -> bool {
    DETECTOR.get().is_some()
}

/// List the available effects as `{ id, name, desc }` objects.
#[wasm_bindgen]
pub fn effects() -> Result<JsValue, JsValue> {
    serde_wasm_bindgen::to_value(&Effect::catalog())
        .map_err(|e| make_error("INTERNAL", &e.to_string()))
}

/// Detect faces and return counts plus an annotated copy of the input.
///
/// @param input - Raw image bytes (JPEG, PNG, or WebP)
/// @param options - Optional object with fields: quality, format
#[wasm_bindgen]
pub fn detect(input: Vec<u8>, options: JsValue) -> Result<JsValue, JsValue> {
    let opts = parse_options(options)?;
    let engine = build_engine(&opts, true)?;

    let image = codec::decode(&input).map_err(to_js_error)?;
    let detection = engine.detect(&image).map_err(to_js_error)?;
    let annotated = engine
        .encode(&annotate(&image, &detection))
        .map_err(to_js_error)?;

    let obj = js_sys::Object::new();
    js_sys::Reflect::set(
        &obj,
        &"facesCount".into(),
        &JsValue::from(detection.len() as u32),
    )?;
    js_sys::Reflect::set(
        &obj,
        &"hasLandmarks".into(),
        &JsValue::from(detection.has_landmarks()),
    )?;
    let face_box = match detection.primary() {
        Some(primary) => serde_wasm_bindgen::to_value(&primary.face)
            .map_err(|e| make_error("INTERNAL", &e.to_string()))?,
        None => JsValue::NULL,
    };
    js_sys::Reflect::set(&obj, &"faceBox".into(), &face_box)?;
    js_sys::Reflect::set(
        &obj,
        &"annotatedImage".into(),
        &js_sys::Uint8Array::from(&annotated[..]),
    )?;
    js_sys::Reflect::set(
        &obj,
        &"format".into(),
        &JsValue::from_str(format_to_str(engine.settings().output_format)),
    )?;
    Ok(JsValue::from(obj))
}

/// Apply an effect.
///
/// @param input - Raw image bytes (JPEG, PNG, or WebP)
/// @param effect - One of bulge, cartoon, squeeze, big_eyes, wide_smile
/// @param options - Optional object with fields: strength, background,
///   quality, format, faceScope
#[wasm_bindgen]
pub fn morph(input: Vec<u8>, effect: &str, options: JsValue) -> Result<JsValue, JsValue> {
    let opts = parse_options(options)?;
    let effect = Effect::from_str(effect).map_err(to_js_error)?;
    let background = opts.background.unwrap_or(false);
    let engine = build_engine(&opts, effect.is_geometric() || background)?;

    let image = codec::decode(&input).map_err(to_js_error)?;
    let request = MorphRequest::new(effect)
        .strength(opts.strength.unwrap_or(1.0))
        .background(background);
    let output = engine.morph(&image, &request).map_err(to_js_error)?;
    let data = engine.encode(&output.image).map_err(to_js_error)?;

    let obj = js_sys::Object::new();
    js_sys::Reflect::set(&obj, &"data".into(), &js_sys::Uint8Array::from(&data[..]))?;
    js_sys::Reflect::set(
        &obj,
        &"format".into(),
        &JsValue::from_str(format_to_str(engine.settings().output_format)),
    )?;
    js_sys::Reflect::set(&obj, &"width".into(), &JsValue::from(output.image.width()))?;
    js_sys::Reflect::set(&obj, &"height".into(), &JsValue::from(output.image.height()))?;
    js_sys::Reflect::set(&obj, &"effect".into(), &JsValue::from_str(output.effect.id()))?;
    js_sys::Reflect::set(&obj, &"strength".into(), &JsValue::from(output.strength))?;
    js_sys::Reflect::set(&obj, &"background".into(), &JsValue::from(background))?;
    js_sys::Reflect::set(
        &obj,
        &"facesCount".into(),
        &JsValue::from(output.detection.len() as u32),
    )?;
    Ok(JsValue::from(obj))
}
