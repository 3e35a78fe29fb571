use facemorph_wasm::{detector_ready, effects, morph};
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder, Rgb, RgbImage};
use wasm_bindgen::JsValue;
use wasm_bindgen_test::*;

fn make_test_png(width: u32, height: u32) -> Vec<u8> {
    let mut img = RgbImage::new(width, height);
    for (x, y, pixel) in img.enumerate_pixels_mut() {
        *pixel = Rgb([
            (x * 255 / width.max(1)) as u8,
            (y * 255 / height.max(1)) as u8,
            128,
        ]);
    }

    let mut buffer = Vec::new();
    PngEncoder::new(&mut buffer)
        .write_image(img.as_raw(), width, height, ExtendedColorType::Rgb8)
        .unwrap();
    buffer
}

fn get(obj: &JsValue, key: &str) -> JsValue {
    js_sys::Reflect::get(obj, &key.into()).unwrap()
}

fn error_code(err: &JsValue) -> String {
    get(err, "code").as_string().unwrap()
}

fn options(entries: &[(&str, JsValue)]) -> JsValue {
    let obj = js_sys::Object::new();
    for (key, value) in entries {
        js_sys::Reflect::set(&obj, &(*key).into(), value).unwrap();
    }
    obj.into()
}

#[wasm_bindgen_test]
fn catalog_lists_five_effects() {
    let list = js_sys::Array::from(&effects().unwrap());
    assert_eq!(list.length(), 5);
    assert_eq!(get(&list.get(3), "id").as_string().unwrap(), "big_eyes");
}

#[wasm_bindgen_test]
fn cartoon_works_without_a_detector() {
    assert!(!detector_ready());
    let result = morph(make_test_png(64, 48), "cartoon", JsValue::UNDEFINED).unwrap();

    let data = js_sys::Uint8Array::new(&get(&result, "data")).to_vec();
    assert_eq!(&data[..2], &[0xFF, 0xD8]);
    assert_eq!(get(&result, "width").as_f64(), Some(64.0));
    assert_eq!(get(&result, "height").as_f64(), Some(48.0));
    assert_eq!(get(&result, "effect").as_string().unwrap(), "cartoon");
}

#[wasm_bindgen_test]
fn png_output_option() {
    let opts = options(&[("format", "png".into()), ("strength", 0.5.into())]);
    let result = morph(make_test_png(32, 32), "cartoon", opts).unwrap();
    let data = js_sys::Uint8Array::new(&get(&result, "data")).to_vec();
    assert_eq!(&data[1..4], b"PNG");
    assert_eq!(get(&result, "strength").as_f64(), Some(0.5));
}

#[wasm_bindgen_test]
fn geometric_effect_needs_the_detector() {
    let err = morph(make_test_png(32, 32), "bulge", JsValue::UNDEFINED).unwrap_err();
    assert_eq!(error_code(&err), "DETECTOR_UNAVAILABLE");
}

#[wasm_bindgen_test]
fn unknown_effect_returns_error() {
    let err = morph(make_test_png(32, 32), "melt", JsValue::UNDEFINED).unwrap_err();
    assert_eq!(error_code(&err), "UNKNOWN_EFFECT");
}

#[wasm_bindgen_test]
fn invalid_input_returns_error() {
    let err = morph(b"not an image".to_vec(), "cartoon", JsValue::NULL).unwrap_err();
    assert_eq!(error_code(&err), "INVALID_IMAGE");
}

#[wasm_bindgen_test]
fn invalid_options_are_rejected() {
    let opts = options(&[("format", "gif".into())]);
    let err = morph(make_test_png(16, 16), "cartoon", opts).unwrap_err();
    assert_eq!(error_code(&err), "INVALID_OPTIONS");

    let opts = options(&[("quality", 3.0.into())]);
    let err = morph(make_test_png(16, 16), "cartoon", opts).unwrap_err();
    assert_eq!(error_code(&err), "INVALID_CONFIG");
}
