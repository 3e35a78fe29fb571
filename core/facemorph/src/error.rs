use thiserror::Error;

#[derive(Debug, Error)]
pub enum MorphError {
    #[error("invalid image: {0}")]
    InvalidImage(String),

    #[error("no face available for this effect")]
    NoFaceAvailable,

    #[error("unknown effect: {0}")]
    UnknownEffect(String),

    #[error("processing exceeded the {budget_ms} ms budget during {stage}")]
    ProcessingTimeout { stage: &'static str, budget_ms: u64 },

    #[error("render failed: {0}")]
    InternalRenderError(String),

    #[error("failed to persist image: {0}")]
    Persistence(String),

    #[error("invalid detector model: {0}")]
    InvalidModel(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl MorphError {
    /// Stable machine-readable code for boundary responses.
    pub fn code(&self) -> &'static str {
        match self {
            MorphError::InvalidImage(_) => "INVALID_IMAGE",
            MorphError::NoFaceAvailable => "NO_FACE",
            MorphError::UnknownEffect(_) => "UNKNOWN_EFFECT",
            MorphError::ProcessingTimeout { .. } => "TIMEOUT",
            MorphError::InternalRenderError(_) => "RENDER_ERROR",
            MorphError::Persistence(_) => "PERSISTENCE_ERROR",
            MorphError::InvalidModel(_) => "INVALID_MODEL",
            MorphError::InvalidConfig(_) => "INVALID_CONFIG",
        }
    }
}
