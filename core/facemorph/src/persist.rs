use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use image::RgbImage;
use serde::Serialize;
use tracing::{debug, warn};

use crate::codec::{self, OutputFormat};
use crate::error::MorphError;
use crate::Effect;

/// Outcome of a save request, shaped for the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SaveResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

/// Writes morph results as `morph_<effect>_<unix-seconds>.jpg` into a directory.
#[derive(Debug, Clone)]
pub struct ImageSaver {
    dir: PathBuf,
    quality: f32,
}

impl ImageSaver {
    /// Saver writing into `dir` (created on first save) at JPEG quality 0.92.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            quality: 0.92,
        }
    }

    pub fn quality(mut self, quality: f32) -> Self {
        self.quality = quality;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File name a save of `effect` would use right now.
    pub fn filename_for(effect: Effect) -> String {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        format!("morph_{}_{secs}.{}", effect.id(), OutputFormat::Jpeg.extension())
    }

    /// Encode and write `image`, returning the file name.
    pub fn save(&self, image: &RgbImage, effect: Effect) -> Result<String, MorphError> {
        let filename = Self::filename_for(effect);
        self.write(image, &filename)?;
        Ok(filename)
    }

    /// Save a transported image (data URI or base64) and report the outcome.
    pub fn save_transport(&self, payload: &str, effect: &str) -> SaveResponse {
        let result = effect
            .parse::<Effect>()
            .and_then(|effect| Ok((codec::decode_transport(payload)?, effect)))
            .and_then(|(image, effect)| self.save(&image, effect));
        match result {
            Ok(filename) => SaveResponse {
                success: true,
                filename: Some(filename),
            },
            Err(e) => {
                warn!(code = e.code(), "save failed: {e}");
                SaveResponse {
                    success: false,
                    filename: None,
                }
            }
        }
    }

    /// Write on a background thread and return the file name immediately.
    ///
    /// Failures are only logged; the caller never waits on the write.
    pub fn save_detached(&self, image: RgbImage, effect: Effect) -> String {
        let filename = Self::filename_for(effect);
        let saver = self.clone();
        let name = filename.clone();
        std::thread::spawn(move || {
            if let Err(e) = saver.write(&image, &name) {
                warn!(file = %name, "detached save failed: {e}");
            }
        });
        filename
    }

    fn write(&self, image: &RgbImage, filename: &str) -> Result<(), MorphError> {
        let data = codec::encode(image, OutputFormat::Jpeg, self.quality)?;
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| MorphError::Persistence(format!("{}: {e}", self.dir.display())))?;
        let path = self.dir.join(filename);
        std::fs::write(&path, data)
            .map_err(|e| MorphError::Persistence(format!("{}: {e}", path.display())))?;
        debug!(path = %path.display(), "image saved");
        Ok(())
    }
}
