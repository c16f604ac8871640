use thiserror::Error;

use crate::generate::GenerateError;

/// Failures inside the classification and retrieval pipelines.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Startup loading failed; permanent for the life of the process.
    #[error("Model not loaded.")]
    ModelUnavailable,

    #[error("invalid image: {0}")]
    Decode(String),

    #[error("{0}")]
    Validation(String),

    #[error("unexpected model output shape: {0:?}")]
    UnexpectedOutputShape(Vec<usize>),

    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("inference failed: {0}")]
    Inference(String),

    #[error("retrieval responder not available")]
    ResponderUnavailable,

    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("generation failed: {0}")]
    Generation(#[from] GenerateError),
}

impl PipelineError {
    /// True when the caller's input is at fault rather than the server.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Decode(_) | Self::Validation(_))
    }
}
