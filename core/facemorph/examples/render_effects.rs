//! Render every effect at a few strengths on a synthetic portrait.
//!
//! Usage:
//!   cargo run --example render_effects [-- <output-dir>]
//!
//! Output goes to `target/effect_samples/` by default. Set `RUST_LOG=debug`
//! to see per-stage timings.

use std::path::PathBuf;
use std::sync::Arc;

use facemorph::{Effect, FaceBox, FaceDetector, MorphEngine, MorphRequest, ProportionalLocator};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_filled_ellipse_mut};
use tracing_subscriber::EnvFilter;

const WIDTH: u32 = 640;
const HEIGHT: u32 = 480;

/// Reports the face painted by `synthetic_portrait`.
struct PaintedFace;

impl FaceDetector for PaintedFace {
    fn detect(&self, _gray: &[u8], _width: u32, _height: u32) -> Vec<FaceBox> {
        vec![FaceBox::new(220.0, 140.0, 200.0, 200.0)]
    }
}

fn synthetic_portrait() -> RgbImage {
    let mut img = RgbImage::from_fn(WIDTH, HEIGHT, |x, y| {
        // checkerboard backdrop makes the warps easy to see
        if (x / 32 + y / 32) % 2 == 0 {
            Rgb([200, 210, 220])
        } else {
            Rgb([120, 140, 160])
        }
    });
    draw_filled_ellipse_mut(&mut img, (320, 240), 95, 110, Rgb([224, 180, 150]));
    for eye_x in [280, 360] {
        draw_filled_circle_mut(&mut img, (eye_x, 216), 14, Rgb([255, 255, 255]));
        draw_filled_circle_mut(&mut img, (eye_x, 216), 6, Rgb([40, 30, 20]));
    }
    draw_filled_ellipse_mut(&mut img, (320, 284), 32, 8, Rgb([170, 60, 60]));
    img
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let output_dir = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/../../target/effect_samples")));
    std::fs::create_dir_all(&output_dir).unwrap();

    let engine = MorphEngine::new(Arc::new(PaintedFace)).landmark_locator(Arc::new(ProportionalLocator));
    let portrait = synthetic_portrait();
    std::fs::write(output_dir.join("original.jpg"), engine.encode(&portrait).unwrap()).unwrap();

    for effect in Effect::ALL {
        for strength in [0.5, 1.0, 2.0] {
            for background in [false, true] {
                let request = MorphRequest::new(effect)
                    .strength(strength)
                    .background(background);
                let started = std::time::Instant::now();
                let output = engine.morph(&portrait, &request).unwrap();
                let data = engine.encode(&output.image).unwrap();

                let suffix = if background { "_bg" } else { "" };
                let filename = format!("{effect}_{strength:.1}{suffix}.jpg");
                std::fs::write(output_dir.join(&filename), &data).unwrap();
                println!(
                    "  {filename}: {} bytes in {:?}",
                    data.len(),
                    started.elapsed()
                );
            }
        }
    }

    println!("Samples written to {}", output_dir.display());
}
