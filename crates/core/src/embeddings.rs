use crate::error::ChatError;
use crate::llm::{check_ollama_response, OllamaConfig};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 128;
pub const DEFAULT_EMBEDDING_MODEL: &str = "all-minilm";

#[async_trait]
pub trait Embedder {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ChatError>;

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, ChatError>;
}

#[async_trait]
impl<T> Embedder for Box<T>
where
    T: Embedder + ?Sized + Send + Sync,
{
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ChatError> {
        (**self).embed_documents(texts).await
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, ChatError> {
        (**self).embed_query(text).await
    }
}

/// Offline embedder hashing character trigrams into a unit-length vector.
#[derive(Debug, Clone, Copy)]
pub struct CharacterNgramEmbedder {
    pub dimensions: usize,
}

impl Default for CharacterNgramEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

impl CharacterNgramEmbedder {
    pub fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions.max(1)];
        let lowered = text.to_lowercase();
        let chars: Vec<char> = lowered.chars().collect();

        if chars.is_empty() {
            return vector;
        }

        for window in chars.windows(3) {
            let mut hash = 1469598103934665603u64;
            for ch in window {
                let mut buffer = [0u8; 4];
                for byte in ch.encode_utf8(&mut buffer).bytes() {
                    hash ^= byte as u64;
                    hash = hash.wrapping_mul(1099511628211);
                }
            }
            let bucket = (hash % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }

        let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut vector {
                *value /= magnitude;
            }
        }

        vector
    }
}

#[async_trait]
impl Embedder for CharacterNgramEmbedder {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ChatError> {
        Ok(texts.iter().map(|text| self.embed(text)).collect())
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, ChatError> {
        Ok(self.embed(text))
    }
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    #[serde(default)]
    embeddings: Vec<Vec<f32>>,
}

/// Embeds text through Ollama's batch `/api/embed` endpoint.
pub struct OllamaEmbedder {
    config: OllamaConfig,
    endpoint: String,
    client: Client,
}

impl OllamaEmbedder {
    pub fn new(config: OllamaConfig) -> Result<Self, ChatError> {
        Ok(Self {
            endpoint: config.endpoint("api/embed")?,
            client: config.http_client()?,
            config,
        })
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ChatError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(model = %self.config.model, inputs = texts.len(), "ollama embed");

        let response = self
            .client
            .post(&self.endpoint)
            .json(&EmbedRequest {
                model: &self.config.model,
                input: texts,
            })
            .send()
            .await
            .map_err(|error| ChatError::Generation(error.to_string()))?;
        let response = check_ollama_response(response).await?;

        let parsed: EmbedResponse = response
            .json()
            .await
            .map_err(|error| ChatError::Generation(error.to_string()))?;

        if parsed.embeddings.len() != texts.len() {
            return Err(ChatError::BackendResponse {
                backend: "ollama".to_string(),
                details: format!(
                    "expected {} embeddings, got {}",
                    texts.len(),
                    parsed.embeddings.len()
                ),
            });
        }

        Ok(parsed.embeddings)
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, ChatError> {
        let mut vectors = self.embed_documents(&[text.to_string()]).await?;
        vectors.pop().ok_or_else(|| ChatError::BackendResponse {
            backend: "ollama".to_string(),
            details: "empty embedding response".to_string(),
        })
    }
}
