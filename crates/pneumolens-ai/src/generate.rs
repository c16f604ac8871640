//! Text generation over HTTP for the generative answer strategy.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

const ANSWER_MARKER: &str = "Answer:";

#[derive(Error, Debug)]
pub enum GenerateError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned {status}: {body}")]
    Server { status: u16, body: String },
    #[error("generator returned no text")]
    Empty,
}

/// A model that continues a text prompt.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, GenerateError>;
}

/// Client for an Ollama-style `/api/generate` completion endpoint.
pub struct HttpGenerator {
    client: reqwest::Client,
    base_url: String,
    model: String,
    max_tokens: u32,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    num_predict: u32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

impl HttpGenerator {
    /// `base_url` should be like `http://localhost:11434` (no trailing slash).
    pub fn new(base_url: String, model: String, max_tokens: u32) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            max_tokens,
        }
    }
}

#[async_trait]
impl TextGenerator for HttpGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, GenerateError> {
        let url = format!("{}/api/generate", self.base_url);
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: GenerateOptions {
                num_predict: self.max_tokens,
            },
        };

        info!(url = %url, model = %self.model, "requesting completion");
        let resp = self.client.post(&url).json(&request).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(GenerateError::Server {
                status: status.as_u16(),
                body,
            });
        }

        let result: GenerateResponse = resp.json().await?;
        if result.response.trim().is_empty() {
            return Err(GenerateError::Empty);
        }
        Ok(result.response)
    }
}

/// Prompt for the generative strategy.
pub fn answer_prompt(query: &str, context: &str) -> String {
    format!("Q: {query}\nContext: {context}\n{ANSWER_MARKER}")
}

/// Text after the last `Answer:` marker, trimmed; the whole text when absent.
pub fn extract_answer(generated: &str) -> &str {
    generated
        .rsplit_once(ANSWER_MARKER)
        .map_or(generated, |(_, answer)| answer)
        .trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_layout() {
        assert_eq!(
            answer_prompt("what is it?", "ctx one. ctx two."),
            "Q: what is it?\nContext: ctx one. ctx two.\nAnswer:"
        );
    }

    #[test]
    fn extract_after_last_marker() {
        let echoed = "Q: x\nContext: y\nAnswer: first Answer: the real one ";
        assert_eq!(extract_answer(echoed), "the real one");
    }

    #[test]
    fn extract_without_marker_returns_whole_text() {
        assert_eq!(extract_answer("  just text \n"), "just text");
    }

    #[test]
    fn trailing_slash_trimmed() {
        let g = HttpGenerator::new("http://localhost:11434/".into(), "m".into(), 64);
        assert_eq!(g.base_url, "http://localhost:11434");
    }

    #[tokio::test]
    async fn generate_posts_prompt() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/generate")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "model": "tiny",
                "prompt": "Q: hi\nContext: c\nAnswer:",
                "stream": false,
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"response":" Rest and fluids."}"#)
            .create_async()
            .await;

        let g = HttpGenerator::new(server.url(), "tiny".into(), 32);
        let text = g.generate(&answer_prompt("hi", "c")).await.unwrap();
        assert_eq!(text, " Rest and fluids.");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn server_error_surfaces_status() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/generate")
            .with_status(503)
            .with_body("overloaded")
            .create_async()
            .await;

        let g = HttpGenerator::new(server.url(), "tiny".into(), 32);
        match g.generate("p").await {
            Err(GenerateError::Server { status, body }) => {
                assert_eq!(status, 503);
                assert_eq!(body, "overloaded");
            }
            other => panic!("expected server error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn blank_completion_is_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/generate")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"response":"   "}"#)
            .create_async()
            .await;

        let g = HttpGenerator::new(server.url(), "tiny".into(), 32);
        assert!(matches!(g.generate("p").await, Err(GenerateError::Empty)));
    }
}
