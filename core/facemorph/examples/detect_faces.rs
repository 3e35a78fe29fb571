//! Run the SeetaFace detector over images and write annotated copies.
//!
//! Usage:
//!   cargo run --example detect_faces --features rustface -- <model.bin> <image>...
//!
//! The model is `seeta_fd_frontal_v1.0.bin` from the rustface repository.
//! Annotated images are written next to each input as `<name>.annotated.jpg`.

use std::path::Path;
use std::sync::Arc;

use facemorph::{annotate, codec, MorphEngine, ProportionalLocator, RustfaceDetector};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut args = std::env::args().skip(1);
    let Some(model_path) = args.next() else {
        eprintln!("usage: detect_faces <model.bin> <image>...");
        std::process::exit(2);
    };

    let detector = RustfaceDetector::from_file(&model_path).unwrap_or_else(|e| {
        eprintln!("{e}");
        std::process::exit(1);
    });
    let engine = MorphEngine::new(Arc::new(detector)).landmark_locator(Arc::new(ProportionalLocator));

    for input_path in args {
        let input = std::fs::read(&input_path).unwrap();
        let image = codec::decode(&input).unwrap();
        let detection = engine.detect(&image).unwrap();

        println!("=== {input_path} ({}x{}) ===", image.width(), image.height());
        if detection.is_empty() {
            println!("  NO FACES DETECTED");
        }
        for (i, detected) in detection.faces.iter().enumerate() {
            let face = &detected.face;
            let center = face.center();
            println!(
                "    face {i}: score={:.2}, bbox=({:.0}, {:.0}, {:.0}x{:.0}), center=({:.0}, {:.0})",
                face.confidence, face.x, face.y, face.width, face.height, center.x, center.y,
            );
        }

        let annotated = annotate(&image, &detection);
        let out_path = Path::new(&input_path).with_extension("annotated.jpg");
        std::fs::write(&out_path, engine.encode(&annotated).unwrap()).unwrap();
        println!("  wrote {}", out_path.display());
    }
}
