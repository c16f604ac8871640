//! Bag-of-words embedder over a fixed vocabulary.
//!
//! Needs no model files, so the responder can run without ONNX Runtime. Words
//! outside the vocabulary are ignored; a text with no known words embeds to
//! the zero vector.

use std::collections::BTreeMap;

use crate::embed::{Embed, normalize};

pub struct LexicalEmbedder {
    vocab: BTreeMap<String, usize>,
}

impl LexicalEmbedder {
    /// Build the vocabulary from every word in `passages`.
    pub fn from_corpus(passages: &[&str]) -> Self {
        let mut words: Vec<String> = passages.iter().flat_map(|p| tokens(p)).collect();
        words.sort();
        words.dedup();
        let vocab = words.into_iter().enumerate().map(|(i, w)| (w, i)).collect();
        Self { vocab }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.vocab.len()];
        for word in tokens(text) {
            if let Some(&i) = self.vocab.get(&word) {
                v[i] += 1.0;
            }
        }
        normalize(&mut v);
        v
    }
}

impl Embed for LexicalEmbedder {
    fn dim(&self) -> usize {
        self.vocab.len()
    }

    fn embed_batch(&self, texts: &[&str]) -> anyhow::Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vocabulary_is_deduplicated_and_lowercased() {
        let e = LexicalEmbedder::from_corpus(&["Cough cough", "COUGH, fever."]);
        assert_eq!(e.dim(), 2);
    }

    #[test]
    fn vectors_are_unit_norm() {
        let e = LexicalEmbedder::from_corpus(&["fever and cough", "chest pain"]);
        let v = e.embed("cough with chest pain").unwrap();
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
    }

    #[test]
    fn unknown_words_embed_to_zero() {
        let e = LexicalEmbedder::from_corpus(&["fever"]);
        let v = e.embed("xylophone").unwrap();
        assert_eq!(v, vec![0.0]);
    }

    #[test]
    fn batch_matches_singles() {
        let e = LexicalEmbedder::from_corpus(&["a b c", "c d"]);
        let batch = e.embed_batch(&["a c", "d"]).unwrap();
        assert_eq!(batch[0], e.embed("a c").unwrap());
        assert_eq!(batch[1], e.embed("d").unwrap());
    }
}
