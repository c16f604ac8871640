//! Local inference: the pneumonia CNN classifier and the retrieval responder.
//!
//! The classifier runs natively on candle from safetensors weights, or
//! through ONNX Runtime with the `onnx` feature. The responder embeds a fixed
//! passage collection and answers queries from its nearest neighbours.

pub mod cnn;
pub mod embed;
#[cfg(feature = "onnx")]
mod embedder;
pub mod error;
pub mod generate;
pub mod index;
pub mod lexical;
pub mod loader;
#[cfg(feature = "onnx")]
mod onnx;
pub mod predictor;
pub mod preprocess;
pub mod responder;
pub mod weights;

pub use cnn::{CnnSpec, Forward, PneumoniaCnn};
pub use embed::Embed;
#[cfg(feature = "onnx")]
pub use embedder::OnnxEmbedder;
pub use error::PipelineError;
pub use generate::{GenerateError, HttpGenerator, TextGenerator};
pub use index::{FlatL2Index, Neighbor};
pub use lexical::LexicalEmbedder;
pub use loader::{ModelLoader, StateDictLoader, default_loaders, load_model};
#[cfg(feature = "onnx")]
pub use onnx::{OnnxGraphLoader, OnnxModel};
pub use predictor::{ModelState, Predictor};
pub use preprocess::preprocess;
pub use responder::{AnswerStrategy, DEFAULT_TOP_K, Responder, ResponderState, Retriever};
pub use weights::{ParameterFile, WeightsError};
