//! Embedding clients
//!
//! HTTP clients that turn an entity's descriptive text into a vector,
//! one per provider. Failure mapping matters here: network errors,
//! timeouts, 429s and 5xx responses surface as
//! [`EngineError::EmbeddingUnavailable`] so the batch layer retries
//! them, while 4xx responses and unparseable payloads are
//! [`EngineError::ModelError`] and fail fast.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use entigraph_core::{ClassifierConfig, EngineError, ModelProvider, Result};

use crate::EmbeddingClient;

/// Vector width for a known model name; unknown names fall back to the
/// provider's most common width.
fn model_dimension(model: &str, fallback: usize) -> usize {
    match model {
        "text-embedding-3-large" => 3072,
        "text-embedding-3-small" | "text-embedding-ada-002" => 1536,
        "nomic-embed-text" => 768,
        "mxbai-embed-large" => 1024,
        "all-minilm" => 384,
        _ => fallback,
    }
}

fn http_client(timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| EngineError::ConfigError(format!("http client: {e}")))
}

/// A failed send is indistinguishable from a down provider; retryable.
fn send_error(e: reqwest::Error) -> EngineError {
    EngineError::EmbeddingUnavailable(format!("request failed: {e}"))
}

/// Map a non-success status: server-side trouble is retryable, a
/// client-side rejection is not.
fn status_error(status: StatusCode, body: &str) -> EngineError {
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        EngineError::EmbeddingUnavailable(format!("{status}: {body}"))
    } else {
        EngineError::ModelError(format!("{status}: {body}"))
    }
}

fn parse_error(e: reqwest::Error) -> EngineError {
    EngineError::ModelError(format!("unparseable embedding response: {e}"))
}

// ============================================================================
// OpenAI
// ============================================================================

/// OpenAI embeddings endpoint client
pub struct OpenAiEmbedding {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    dimension: usize,
}

#[derive(Serialize)]
struct OpenAiEmbeddingRequest<'a> {
    input: &'a [String],
    model: &'a str,
}

#[derive(Deserialize)]
struct OpenAiEmbeddingResponse {
    data: Vec<OpenAiEmbeddingRow>,
}

#[derive(Deserialize)]
struct OpenAiEmbeddingRow {
    index: usize,
    embedding: Vec<f32>,
}

impl OpenAiEmbedding {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        let model = model.into();
        let dimension = model_dimension(&model, 1536);
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: "https://api.openai.com/v1".to_string(),
            model,
            dimension,
        }
    }

    pub fn from_config(config: &ClassifierConfig) -> Result<Self> {
        let api_key = config
            .openai_api_key
            .as_ref()
            .ok_or_else(|| EngineError::ConfigError("OpenAI API key required".to_string()))?;

        let mut client = Self::new(api_key.clone(), config.embedding_model.clone());
        client.client = http_client(config.timeout_secs)?;
        if let Some(base_url) = &config.openai_base_url {
            client.base_url = base_url.clone();
        }
        Ok(client)
    }
}

#[async_trait]
impl EmbeddingClient for OpenAiEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let input = [text.to_string()];
        let results = self.embed_batch(&input).await?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| EngineError::ModelError("empty embedding response".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&OpenAiEmbeddingRequest {
                input: texts,
                model: &self.model,
            })
            .send()
            .await
            .map_err(send_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &body));
        }

        let parsed: OpenAiEmbeddingResponse = response.json().await.map_err(parse_error)?;

        // The API may reorder rows; restore input order
        let mut rows = parsed.data;
        rows.sort_by_key(|row| row.index);
        Ok(rows.into_iter().map(|row| row.embedding).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

// ============================================================================
// Ollama
// ============================================================================

/// Ollama embeddings endpoint client
pub struct OllamaEmbedding {
    client: Client,
    base_url: String,
    model: String,
    dimension: usize,
}

#[derive(Serialize)]
struct OllamaEmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct OllamaEmbeddingResponse {
    embedding: Vec<f32>,
}

impl OllamaEmbedding {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        let model = model.into();
        let dimension = model_dimension(&model, 768);
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            model,
            dimension,
        }
    }

    pub fn from_config(config: &ClassifierConfig) -> Result<Self> {
        let mut client = Self::new(config.ollama_url.clone(), config.embedding_model.clone());
        client.client = http_client(config.timeout_secs)?;
        Ok(client)
    }
}

#[async_trait]
impl EmbeddingClient for OllamaEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let response = self
            .client
            .post(format!("{}/api/embeddings", self.base_url))
            .json(&OllamaEmbeddingRequest {
                model: &self.model,
                prompt: text,
            })
            .send()
            .await
            .map_err(send_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &body));
        }

        let parsed: OllamaEmbeddingResponse = response.json().await.map_err(parse_error)?;
        Ok(parsed.embedding)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        // No batch endpoint; one request per text
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Build the embedding client the configuration names
pub fn create_embedding_client(config: &ClassifierConfig) -> Result<Box<dyn EmbeddingClient>> {
    match config.provider {
        ModelProvider::OpenAi => Ok(Box::new(OpenAiEmbedding::from_config(config)?)),
        ModelProvider::Ollama => Ok(Box::new(OllamaEmbedding::from_config(config)?)),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_model_dimensions() {
        assert_eq!(OpenAiEmbedding::new("k", "text-embedding-3-small").dimension(), 1536);
        assert_eq!(OpenAiEmbedding::new("k", "text-embedding-3-large").dimension(), 3072);
        assert_eq!(
            OllamaEmbedding::new("http://localhost:11434", "nomic-embed-text").dimension(),
            768
        );
        assert_eq!(
            OllamaEmbedding::new("http://localhost:11434", "all-minilm").dimension(),
            384
        );
    }

    #[test]
    fn test_unknown_model_uses_provider_fallback() {
        assert_eq!(OpenAiEmbedding::new("k", "future-model").dimension(), 1536);
        assert_eq!(
            OllamaEmbedding::new("http://localhost:11434", "future-model").dimension(),
            768
        );
    }

    #[test]
    fn test_server_side_failures_are_retryable() {
        assert!(status_error(StatusCode::INTERNAL_SERVER_ERROR, "boom").is_transient());
        assert!(status_error(StatusCode::SERVICE_UNAVAILABLE, "down").is_transient());
        assert!(status_error(StatusCode::TOO_MANY_REQUESTS, "slow down").is_transient());
    }

    #[test]
    fn test_client_side_failures_are_permanent() {
        assert!(!status_error(StatusCode::BAD_REQUEST, "bad input").is_transient());
        assert!(!status_error(StatusCode::UNAUTHORIZED, "bad key").is_transient());
        assert!(!status_error(StatusCode::NOT_FOUND, "no such model").is_transient());
    }
}
