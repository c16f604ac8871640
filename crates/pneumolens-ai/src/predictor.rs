//! Forward pass → sigmoid → thresholded label.

use std::sync::Arc;

use ndarray::ArrayView4;
use pneumolens_core::Prediction;
use tracing::{debug, info};

use crate::cnn::{CnnSpec, Forward};
use crate::error::PipelineError;
use crate::preprocess::preprocess;

/// A loaded model plus the input contract it was built for.
pub struct Predictor {
    model: Box<dyn Forward>,
    spec: CnnSpec,
}

impl Predictor {
    pub fn new(model: Box<dyn Forward>, spec: CnnSpec) -> Self {
        Self { model, spec }
    }

    pub fn spec(&self) -> &CnnSpec {
        &self.spec
    }

    pub fn backend(&self) -> &'static str {
        self.model.backend()
    }

    /// Classify one preprocessed `[1, C, H, W]` tensor.
    pub fn predict(&self, input: ArrayView4<'_, f32>) -> Result<Prediction, PipelineError> {
        let expected = self.spec.input_shape();
        if input.shape() != expected.as_slice() {
            return Err(PipelineError::ShapeMismatch(format!(
                "input {:?}, expected {expected:?}",
                input.shape()
            )));
        }

        let output = self.model.forward(input)?;
        debug!(output = ?output, "raw model output");

        // Exactly one logit: anything else is a model/contract mismatch.
        if output.len() != 1 {
            return Err(PipelineError::UnexpectedOutputShape(output.shape().to_vec()));
        }
        let logit = output.iter().copied().next().unwrap_or(f32::NAN);
        if !logit.is_finite() {
            return Err(PipelineError::Inference(format!("non-finite logit {logit}")));
        }

        let prediction = Prediction::from_logit(logit);
        info!(
            prediction = %prediction.label,
            confidence = prediction.confidence,
            backend = self.model.backend(),
            "prediction"
        );
        Ok(prediction)
    }

    /// Decode and classify raw upload bytes.
    pub fn predict_image(&self, bytes: &[u8]) -> Result<Prediction, PipelineError> {
        let tensor = preprocess(bytes, self.spec.input_size as u32)?;
        self.predict(tensor.view())
    }
}

/// Outcome of startup loading. Never changes afterwards.
#[derive(Clone)]
pub enum ModelState {
    Ready(Arc<Predictor>),
    Unavailable { reason: String },
}

impl ModelState {
    pub fn predictor(&self) -> Result<&Arc<Predictor>, PipelineError> {
        match self {
            Self::Ready(p) => Ok(p),
            Self::Unavailable { .. } => Err(PipelineError::ModelUnavailable),
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }
}
