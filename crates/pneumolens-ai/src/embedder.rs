//! Sentence embeddings from an ONNX export of all-MiniLM-L6-v2.
//!
//! The directory holds `model.onnx` and `tokenizer.json`. Token states are
//! mean-pooled under the attention mask and scaled to unit length.

use std::path::Path;
use std::sync::Mutex;

use ndarray::{Array2, ArrayView2, ArrayView3, Axis};
use ort::session::Session;
use ort::value::Tensor;
use tokenizers::{Encoding, PaddingParams, Tokenizer, TruncationParams};
use tracing::{debug, info};

use crate::embed::{Embed, normalize};

const MAX_TOKENS: usize = 256;
const FALLBACK_DIM: usize = 384;

pub struct OnnxEmbedder {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    dim: usize,
}

impl OnnxEmbedder {
    pub fn load(model_dir: &Path) -> anyhow::Result<Self> {
        let model_path = model_dir.join("model.onnx");
        let tokenizer_path = model_dir.join("tokenizer.json");
        for required in [&model_path, &tokenizer_path] {
            anyhow::ensure!(required.exists(), "{} not found", required.display());
        }

        let session = Session::builder()?.commit_from_file(&model_path)?;
        let dim = session
            .outputs()
            .first()
            .and_then(|output| hidden_width(output.dtype()))
            .unwrap_or(FALLBACK_DIM);

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow::anyhow!("tokenizer {}: {e}", tokenizer_path.display()))?;
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: MAX_TOKENS,
                ..Default::default()
            }))
            .map_err(|e| anyhow::anyhow!("tokenizer truncation: {e}"))?;
        // pad to the longest sequence in each batch
        tokenizer.with_padding(Some(PaddingParams::default()));

        info!(dim, model = %model_path.display(), "loaded sentence embedder");
        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            dim,
        })
    }
}

/// One `[batch, seq]` input matrix, zero padded on the right.
fn token_matrix(encodings: &[Encoding], seq: usize, field: fn(&Encoding) -> &[u32]) -> Array2<i64> {
    Array2::from_shape_fn((encodings.len(), seq), |(row, col)| {
        field(&encodings[row]).get(col).map_or(0, |&v| i64::from(v))
    })
}

fn to_tensor(matrix: Array2<i64>) -> ort::Result<Tensor<i64>> {
    let (rows, cols) = matrix.dim();
    let (data, _) = matrix.into_raw_vec_and_offset();
    Tensor::from_array(([rows as i64, cols as i64], data.into_boxed_slice()))
}

/// Masked mean over the sequence axis, one unit-length row per input.
pub(crate) fn mean_pool(tokens: ArrayView3<'_, f32>, mask: ArrayView2<'_, f32>) -> Vec<Vec<f32>> {
    tokens
        .axis_iter(Axis(0))
        .zip(mask.axis_iter(Axis(0)))
        .map(|(states, weights)| {
            let count = weights.sum();
            let mut pooled = weights.dot(&states);
            if count > 0.0 {
                pooled /= count;
            }
            let mut row = pooled.to_vec();
            normalize(&mut row);
            row
        })
        .collect()
}

impl Embed for OnnxEmbedder {
    fn dim(&self) -> usize {
        self.dim
    }

    fn embed_batch(&self, texts: &[&str]) -> anyhow::Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| anyhow::anyhow!("tokenize: {e}"))?;
        let seq = encodings.iter().map(|e| e.len()).max().unwrap_or(0);
        debug!(batch = texts.len(), seq, "tokenized batch");

        let ids = token_matrix(&encodings, seq, Encoding::get_ids);
        let attention = token_matrix(&encodings, seq, Encoding::get_attention_mask);
        let type_ids = token_matrix(&encodings, seq, Encoding::get_type_ids);
        let mask = attention.mapv(|m| m as f32);

        let mut session = self
            .session
            .lock()
            .map_err(|_| anyhow::anyhow!("embedding session lock poisoned"))?;
        let outputs = session.run(ort::inputs![
            "input_ids" => to_tensor(ids)?,
            "attention_mask" => to_tensor(attention)?,
            "token_type_ids" => to_tensor(type_ids)?,
        ])?;

        let (shape, data) = outputs[0].try_extract_tensor::<f32>()?;
        let dims: Vec<usize> = shape.iter().map(|&d| d as usize).collect();
        anyhow::ensure!(
            dims == [texts.len(), seq, self.dim],
            "token states have shape {dims:?}, expected [{}, {seq}, {}]",
            texts.len(),
            self.dim
        );
        let tokens = ArrayView3::from_shape((texts.len(), seq, self.dim), data)?;
        Ok(mean_pool(tokens, mask.view()))
    }
}

/// Last static axis of the first output, when the export declares it.
fn hidden_width(output: &ort::value::ValueType) -> Option<usize> {
    let ort::value::ValueType::Tensor { shape, .. } = output else {
        return None;
    };
    shape.last().copied().filter(|&d| d > 0).map(|d| d as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::FlatL2Index;
    use ndarray::{Array3, array};
    use pneumolens_core::REFERENCE_CORPUS;
    use std::path::PathBuf;

    #[test]
    fn pooling_ignores_padding() {
        // second row has one real token, then padding with large states
        let tokens = Array3::from_shape_vec(
            (2, 2, 2),
            vec![3.0, 0.0, 0.0, 4.0, 0.0, 2.0, 100.0, 100.0],
        )
        .unwrap();
        let mask = array![[1.0f32, 1.0], [1.0, 0.0]];
        let pooled = mean_pool(tokens.view(), mask.view());
        // mean (1.5, 2.0) normalized
        assert!((pooled[0][0] - 0.6).abs() < 1e-6);
        assert!((pooled[0][1] - 0.8).abs() < 1e-6);
        assert_eq!(pooled[1], vec![0.0, 1.0]);
    }

    #[test]
    fn pooling_all_masked_row_is_zero() {
        let tokens = Array3::from_elem((1, 3, 2), 1.0f32);
        let mask = Array2::<f32>::zeros((1, 3));
        assert_eq!(mean_pool(tokens.view(), mask.view()), vec![vec![0.0, 0.0]]);
    }

    fn model_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../models/all-MiniLM-L6-v2")
    }

    fn require_model() -> PathBuf {
        let dir = model_dir();
        assert!(
            dir.join("model.onnx").exists(),
            "embedding model missing at {}; fetch sentence-transformers/all-MiniLM-L6-v2 \
             (onnx/model.onnx and tokenizer.json) from HuggingFace",
            dir.display()
        );
        dir
    }

    #[test]
    fn loads_with_declared_width() {
        let embedder = OnnxEmbedder::load(&require_model()).unwrap();
        assert_eq!(embedder.dim(), 384);
    }

    #[test]
    fn embeddings_are_unit_length() {
        let embedder = OnnxEmbedder::load(&require_model()).unwrap();
        let vectors = embedder
            .embed_batch(&["Chest X-ray shows lobar consolidation", "fever"])
            .unwrap();
        for v in vectors {
            assert_eq!(v.len(), 384);
            let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
            assert!((norm - 1.0).abs() < 1e-4, "norm {norm}");
        }
    }

    #[test]
    fn padded_batch_matches_single_embedding() {
        let embedder = OnnxEmbedder::load(&require_model()).unwrap();
        let alone = embedder.embed("fever").unwrap();
        let batched = embedder
            .embed_batch(&["fever", "a much longer sentence about viral pneumonia in children"])
            .unwrap();
        let drift: f32 = alone.iter().zip(&batched[0]).map(|(a, b)| (a - b).abs()).sum();
        assert!(drift < 1e-3, "drift {drift}");
    }

    #[test]
    fn empty_batch_is_empty() {
        let embedder = OnnxEmbedder::load(&require_model()).unwrap();
        assert!(embedder.embed_batch(&[]).unwrap().is_empty());
    }

    #[test]
    fn bacterial_query_finds_streptococcus() {
        let embedder = OnnxEmbedder::load(&require_model()).unwrap();
        let vectors = embedder.embed_batch(REFERENCE_CORPUS).unwrap();
        let index = FlatL2Index::build(embedder.dim(), &vectors).unwrap();

        let query = embedder.embed("what bacteria cause bacterial pneumonia").unwrap();
        let hits = index.search(&query, 2).unwrap();
        assert!(
            hits.iter()
                .any(|h| REFERENCE_CORPUS[h.index].contains("Streptococcus pneumoniae")),
            "top-2 was {hits:?}"
        );
    }
}
