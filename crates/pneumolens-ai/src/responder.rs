//! Retrieval-augmented question answering over a fixed passage collection.

use std::sync::Arc;

use pneumolens_core::Answer;
use tracing::{info, warn};

use crate::embed::Embed;
use crate::error::PipelineError;
use crate::generate::{TextGenerator, answer_prompt, extract_answer};
use crate::index::FlatL2Index;

/// Default number of passages joined into the context.
pub const DEFAULT_TOP_K: usize = 2;

/// Embeds passages once at build time and looks up the nearest ones per query.
pub struct Retriever {
    embedder: Arc<dyn Embed>,
    index: FlatL2Index,
    passages: Vec<String>,
}

impl Retriever {
    pub fn build(embedder: Arc<dyn Embed>, passages: &[&str]) -> Result<Self, PipelineError> {
        let vectors = embedder
            .embed_batch(passages)
            .map_err(|e| PipelineError::Embedding(e.to_string()))?;
        if vectors.len() != passages.len() {
            return Err(PipelineError::Embedding(format!(
                "embedder returned {} vectors for {} passages",
                vectors.len(),
                passages.len()
            )));
        }
        let index = FlatL2Index::build(embedder.dim(), &vectors)?;
        info!(passages = index.len(), dim = index.dim(), "built retrieval index");
        Ok(Self {
            embedder,
            index,
            passages: passages.iter().map(|p| p.to_string()).collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.passages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }

    /// The `min(k, len)` closest passages, closest first.
    pub fn retrieve(&self, query: &str, k: usize) -> Result<Vec<&str>, PipelineError> {
        validate_query(query)?;
        let vector = self
            .embedder
            .embed(query)
            .map_err(|e| PipelineError::Embedding(e.to_string()))?;
        let hits = self.index.search(&vector, k)?;
        Ok(hits
            .iter()
            .map(|h| self.passages[h.index].as_str())
            .collect())
    }
}

/// How the final answer text is produced from query and context.
#[derive(Clone)]
pub enum AnswerStrategy {
    /// Deterministic template echoing query and context.
    Concatenate,
    /// Completion from a text generator.
    Generate(Arc<dyn TextGenerator>),
}

impl AnswerStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Concatenate => "concatenate",
            Self::Generate(_) => "generate",
        }
    }
}

pub struct Responder {
    retriever: Retriever,
    strategy: AnswerStrategy,
    top_k: usize,
}

impl Responder {
    pub fn new(retriever: Retriever, strategy: AnswerStrategy, top_k: usize) -> Self {
        Self {
            retriever,
            strategy,
            top_k,
        }
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub fn strategy(&self) -> &AnswerStrategy {
        &self.strategy
    }

    /// Retrieved passages joined with single spaces.
    ///
    /// Synchronous and possibly compute-bound; async callers should run it
    /// on a blocking thread.
    pub fn context(&self, query: &str) -> Result<String, PipelineError> {
        let passages = self.retriever.retrieve(query, self.top_k)?;
        Ok(passages.join(" "))
    }

    /// Produce the answer for `query` given an already retrieved `context`.
    /// The query is echoed exactly as received.
    pub async fn answer(&self, query: &str, context: &str) -> Result<Answer, PipelineError> {
        validate_query(query)?;
        let text = match &self.strategy {
            AnswerStrategy::Concatenate => concatenated_answer(query, context),
            AnswerStrategy::Generate(generator) => {
                let generated = generator.generate(&answer_prompt(query, context)).await?;
                extract_answer(&generated).to_string()
            }
        };
        info!(strategy = self.strategy.name(), chars = text.len(), "answered query");
        Ok(Answer::new(text))
    }

    /// Retrieve then answer.
    pub async fn generate_answer(&self, query: &str) -> Result<Answer, PipelineError> {
        let context = self.context(query)?;
        self.answer(query, &context).await
    }
}

/// Template answer used when no generator is configured.
pub fn concatenated_answer(query: &str, context: &str) -> String {
    format!("Q: {query}\nContext: {context}\nAnswer: (Here an LLM would generate response)")
}

fn validate_query(query: &str) -> Result<(), PipelineError> {
    if query.trim().is_empty() {
        return Err(PipelineError::Validation("Query must not be empty.".into()));
    }
    Ok(())
}

/// Whether the responder finished building at startup.
#[derive(Clone)]
pub enum ResponderState {
    Ready(Arc<Responder>),
    Unavailable { reason: String },
}

impl ResponderState {
    /// Build a responder, recording the failure instead of aborting startup.
    pub fn build(
        embedder: anyhow::Result<Arc<dyn Embed>>,
        passages: &[&str],
        strategy: AnswerStrategy,
        top_k: usize,
    ) -> Self {
        let retriever = embedder
            .map_err(|e| e.to_string())
            .and_then(|e| Retriever::build(e, passages).map_err(|e| e.to_string()));
        match retriever {
            Ok(r) => Self::Ready(Arc::new(Responder::new(r, strategy, top_k))),
            Err(reason) => {
                warn!(%reason, "retrieval responder unavailable");
                Self::Unavailable { reason }
            }
        }
    }

    pub fn responder(&self) -> Result<&Arc<Responder>, PipelineError> {
        match self {
            Self::Ready(r) => Ok(r),
            Self::Unavailable { .. } => Err(PipelineError::ResponderUnavailable),
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate::GenerateError;
    use crate::lexical::LexicalEmbedder;
    use async_trait::async_trait;
    use pneumolens_core::REFERENCE_CORPUS;

    fn corpus_responder(strategy: AnswerStrategy, k: usize) -> Responder {
        let embedder = Arc::new(LexicalEmbedder::from_corpus(REFERENCE_CORPUS));
        let retriever = Retriever::build(embedder, REFERENCE_CORPUS).unwrap();
        Responder::new(retriever, strategy, k)
    }

    struct Canned(&'static str);

    #[async_trait]
    impl TextGenerator for Canned {
        async fn generate(&self, _prompt: &str) -> Result<String, GenerateError> {
            Ok(self.0.to_string())
        }
    }

    /// Records the prompt it was given.
    #[derive(Default)]
    struct Recording(std::sync::Mutex<Option<String>>);

    #[async_trait]
    impl TextGenerator for Recording {
        async fn generate(&self, prompt: &str) -> Result<String, GenerateError> {
            *self.0.lock().unwrap() = Some(prompt.to_string());
            Ok("Answer: ok".into())
        }
    }

    struct Failing;

    #[async_trait]
    impl TextGenerator for Failing {
        async fn generate(&self, _prompt: &str) -> Result<String, GenerateError> {
            Err(GenerateError::Empty)
        }
    }

    #[test]
    fn bacterial_query_retrieves_streptococcus() {
        let r = corpus_responder(AnswerStrategy::Concatenate, 2);
        let context = r.context("bacterial pneumonia").unwrap();
        assert!(context.contains("Streptococcus pneumoniae"), "{context}");
    }

    #[test]
    fn retrieval_count_is_min_of_k_and_corpus() {
        let embedder = Arc::new(LexicalEmbedder::from_corpus(REFERENCE_CORPUS));
        let retriever = Retriever::build(embedder, REFERENCE_CORPUS).unwrap();
        assert_eq!(retriever.len(), REFERENCE_CORPUS.len());
        assert_eq!(retriever.retrieve("fever", 2).unwrap().len(), 2);
        assert_eq!(
            retriever.retrieve("fever", 50).unwrap().len(),
            REFERENCE_CORPUS.len()
        );
    }

    #[test]
    fn blank_query_rejected() {
        let r = corpus_responder(AnswerStrategy::Concatenate, 2);
        let err = r.context("   ").unwrap_err();
        assert!(err.is_client_error());
    }

    #[tokio::test]
    async fn concatenate_strategy_uses_template() {
        let r = corpus_responder(AnswerStrategy::Concatenate, 2);
        let answer = r.generate_answer("bacterial pneumonia").await.unwrap();
        let context = r.context("bacterial pneumonia").unwrap();
        assert_eq!(
            answer.answer,
            format!(
                "Q: bacterial pneumonia\nContext: {context}\nAnswer: (Here an LLM would generate response)"
            )
        );
    }

    #[tokio::test]
    async fn concatenate_echoes_query_untrimmed() {
        let r = corpus_responder(AnswerStrategy::Concatenate, 2);
        let answer = r.answer("  bacterial pneumonia \t", "ctx").await.unwrap();
        assert!(
            answer.answer.starts_with("Q:   bacterial pneumonia \t\nContext: ctx\n"),
            "{}",
            answer.answer
        );
    }

    #[tokio::test]
    async fn generator_prompt_keeps_query_whitespace() {
        let generator = Arc::new(Recording::default());
        let r = corpus_responder(AnswerStrategy::Generate(generator.clone()), 2);
        r.generate_answer(" fever ").await.unwrap();
        let prompt = generator.0.lock().unwrap().clone().unwrap();
        assert!(prompt.starts_with("Q:  fever \nContext: "), "{prompt}");
    }

    #[tokio::test]
    async fn generate_strategy_extracts_answer() {
        let generator = Arc::new(Canned("Q: q\nContext: c\nAnswer:  Antibiotics. "));
        let r = corpus_responder(AnswerStrategy::Generate(generator), 2);
        let answer = r.generate_answer("how is bacterial pneumonia treated").await.unwrap();
        assert_eq!(answer.answer, "Antibiotics.");
    }

    #[tokio::test]
    async fn generator_failure_propagates() {
        let r = corpus_responder(AnswerStrategy::Generate(Arc::new(Failing)), 2);
        let err = r.generate_answer("fever").await.unwrap_err();
        assert!(matches!(err, PipelineError::Generation(_)));
        assert!(!err.is_client_error());
    }

    #[test]
    fn state_records_embedder_failure() {
        let state = ResponderState::build(
            Err(anyhow::anyhow!("model.onnx not found")),
            REFERENCE_CORPUS,
            AnswerStrategy::Concatenate,
            2,
        );
        assert!(!state.is_ready());
        assert!(matches!(
            state.responder(),
            Err(PipelineError::ResponderUnavailable)
        ));
        match state {
            ResponderState::Unavailable { reason } => assert!(reason.contains("model.onnx")),
            ResponderState::Ready(_) => panic!("expected unavailable"),
        }
    }
}
