//! ONNX Runtime backend for a fully serialized classifier graph.
//!
//! The graph must take one `[N, 1, H, W]` float input and produce `[N, 1]`
//! (or `[N]`) logits. It is expected to be exported in inference mode.

use std::path::Path;
use std::sync::Mutex;

use ndarray::{Array2, ArrayView4};
use ort::session::Session;
use ort::value::Tensor;
use tracing::info;

use crate::cnn::{CnnSpec, Forward};
use crate::error::PipelineError;
use crate::loader::ModelLoader;

/// Loads the model file as a complete ONNX graph.
pub struct OnnxGraphLoader;

impl ModelLoader for OnnxGraphLoader {
    fn name(&self) -> &'static str {
        "full-graph"
    }

    fn load(&self, path: &Path, _spec: &CnnSpec) -> anyhow::Result<Box<dyn Forward>> {
        Ok(Box::new(OnnxModel::load(path)?))
    }
}

/// A classifier graph executed by ONNX Runtime.
pub struct OnnxModel {
    // `Session::run` needs exclusive access.
    session: Mutex<Session>,
}

impl OnnxModel {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        anyhow::ensure!(path.exists(), "{path:?} not found");
        let session = Session::builder()?.commit_from_file(path)?;
        info!(model = %path.display(), "loaded ONNX classifier graph");
        Ok(Self {
            session: Mutex::new(session),
        })
    }
}

impl Forward for OnnxModel {
    fn forward(&self, input: ArrayView4<'_, f32>) -> Result<Array2<f32>, PipelineError> {
        let (n, c, h, w) = input.dim();
        let shape = [n as i64, c as i64, h as i64, w as i64];
        let data: Vec<f32> = input.iter().copied().collect();
        let tensor = Tensor::from_array((shape, data.into_boxed_slice()))
            .map_err(|e| PipelineError::Inference(e.to_string()))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| PipelineError::Inference("onnx session lock poisoned".into()))?;
        let outputs = session
            .run(ort::inputs![tensor])
            .map_err(|e| PipelineError::Inference(e.to_string()))?;

        let (output_shape, output_data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| PipelineError::Inference(e.to_string()))?;
        let dims: &[i64] = output_shape;
        let dims: Vec<usize> = dims.iter().map(|&d| d.max(0) as usize).collect();

        let batch = dims.first().copied().unwrap_or(0);
        if batch == 0 || output_data.len() % batch != 0 {
            return Err(PipelineError::UnexpectedOutputShape(dims));
        }
        Array2::from_shape_vec((batch, output_data.len() / batch), output_data.to_vec())
            .map_err(|_| PipelineError::UnexpectedOutputShape(dims))
    }

    fn backend(&self) -> &'static str {
        "onnx"
    }
}
