//! Classifier parameter files in the safetensors layout.
//!
//! The buffer is parsed and bounds-checked by the `safetensors` crate before
//! anything else touches it. Binding checks only that every parameter the
//! network declares is present as `F32` with the declared shape; extra
//! tensors (e.g. `num_batches_tracked` counters) are ignored.

use std::path::Path;

use candle_core::{DType, Device};
use candle_nn::VarBuilder;
use safetensors::{Dtype, SafeTensorError, SafeTensors};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WeightsError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed parameter file: {0}")]
    Format(#[from] SafeTensorError),

    #[error("missing tensor: {0}")]
    Missing(String),

    #[error("tensor {name} has unsupported dtype {dtype}")]
    Dtype { name: String, dtype: String },

    #[error("tensor {name} has shape {actual:?}, expected {expected:?}")]
    Shape {
        name: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("tensor backend: {0}")]
    Tensor(#[from] candle_core::Error),
}

/// A safetensors buffer whose header has already been validated.
#[derive(Debug, Clone)]
pub struct ParameterFile {
    bytes: Vec<u8>,
}

impl ParameterFile {
    pub fn read(path: &Path) -> Result<Self, WeightsError> {
        Self::from_bytes(std::fs::read(path)?)
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, WeightsError> {
        SafeTensors::deserialize(&bytes)?;
        Ok(Self { bytes })
    }

    fn tensors(&self) -> Result<SafeTensors<'_>, WeightsError> {
        Ok(SafeTensors::deserialize(&self.bytes)?)
    }

    /// Tensor names, sorted.
    pub fn names(&self) -> Result<Vec<String>, WeightsError> {
        let mut names: Vec<String> = self.tensors()?.names().into_iter().cloned().collect();
        names.sort();
        Ok(names)
    }

    /// Confirm every `(name, shape)` pair is present as an `F32` tensor.
    pub fn check(&self, expected: &[(String, Vec<usize>)]) -> Result<(), WeightsError> {
        let tensors = self.tensors()?;
        for (name, shape) in expected {
            let view = tensors
                .tensor(name)
                .map_err(|_| WeightsError::Missing(name.clone()))?;
            if view.dtype() != Dtype::F32 {
                return Err(WeightsError::Dtype {
                    name: name.clone(),
                    dtype: format!("{:?}", view.dtype()),
                });
            }
            if view.shape() != shape.as_slice() {
                return Err(WeightsError::Shape {
                    name: name.clone(),
                    expected: shape.clone(),
                    actual: view.shape().to_vec(),
                });
            }
        }
        Ok(())
    }

    /// Hand the buffer to candle for layer construction.
    pub fn into_var_builder(self, device: &Device) -> Result<VarBuilder<'static>, WeightsError> {
        Ok(VarBuilder::from_buffered_safetensors(
            self.bytes,
            DType::F32,
            device,
        )?)
    }
}
