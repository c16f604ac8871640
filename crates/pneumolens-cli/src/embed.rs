//! Embedder selection for the retrieval responder.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use clap::ValueEnum;
use pneumolens_ai::{Embed, LexicalEmbedder};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EmbedderKind {
    /// ONNX sentence embedder when its model files load, lexical otherwise.
    Auto,
    Onnx,
    Lexical,
}

pub fn load_embedder(
    kind: EmbedderKind,
    model_dir: &Path,
    corpus: &[&str],
) -> anyhow::Result<Arc<dyn Embed>> {
    let start = Instant::now();
    let embedder: Arc<dyn Embed> = match kind {
        EmbedderKind::Lexical => Arc::new(LexicalEmbedder::from_corpus(corpus)),
        EmbedderKind::Onnx => onnx(model_dir)?,
        EmbedderKind::Auto => match onnx(model_dir) {
            Ok(e) => e,
            Err(e) => {
                warn!(error = %e, "ONNX embedder unavailable, falling back to lexical");
                Arc::new(LexicalEmbedder::from_corpus(corpus))
            }
        },
    };
    info!(
        ?kind,
        dim = embedder.dim(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "embedder ready"
    );
    Ok(embedder)
}

#[cfg(feature = "onnx")]
fn onnx(model_dir: &Path) -> anyhow::Result<Arc<dyn Embed>> {
    Ok(Arc::new(pneumolens_ai::OnnxEmbedder::load(model_dir)?))
}

#[cfg(not(feature = "onnx"))]
fn onnx(_model_dir: &Path) -> anyhow::Result<Arc<dyn Embed>> {
    anyhow::bail!("built without the `onnx` feature")
}
