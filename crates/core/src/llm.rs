use crate::error::ChatError;
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_LLM_MODEL: &str = "llama2";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[async_trait]
pub trait LanguageModel {
    async fn complete(&self, prompt: &str) -> Result<String, ChatError>;
}

#[async_trait]
impl<T> LanguageModel for Box<T>
where
    T: LanguageModel + ?Sized + Send + Sync,
{
    async fn complete(&self, prompt: &str) -> Result<String, ChatError> {
        (**self).complete(prompt).await
    }
}

/// Connection settings shared by the Ollama completion and embedding clients.
#[derive(Debug, Clone)]
pub struct OllamaConfig {
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_OLLAMA_URL.to_string(),
            model: DEFAULT_LLM_MODEL.to_string(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl OllamaConfig {
    pub(crate) fn endpoint(&self, path: &str) -> Result<String, ChatError> {
        let base = Url::parse(&self.base_url)?;
        Ok(format!("{}/{}", base.as_str().trim_end_matches('/'), path))
    }

    pub(crate) fn http_client(&self) -> Result<Client, ChatError> {
        Ok(Client::builder().timeout(self.timeout).build()?)
    }
}

#[derive(Debug, Deserialize)]
struct OllamaErrorBody {
    error: String,
}

/// Maps a non-success Ollama response to a generation error carrying the
/// server's message when it sent one.
pub(crate) async fn check_ollama_response(response: Response) -> Result<Response, ChatError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let details = serde_json::from_str::<OllamaErrorBody>(&body)
        .map(|parsed| parsed.error)
        .unwrap_or(body);
    Err(ChatError::Generation(format!("ollama returned {status}: {details}")))
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

pub struct OllamaClient {
    config: OllamaConfig,
    endpoint: String,
    client: Client,
}

impl OllamaClient {
    pub fn new(config: OllamaConfig) -> Result<Self, ChatError> {
        Ok(Self {
            endpoint: config.endpoint("api/generate")?,
            client: config.http_client()?,
            config,
        })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }
}

#[async_trait]
impl LanguageModel for OllamaClient {
    async fn complete(&self, prompt: &str) -> Result<String, ChatError> {
        debug!(model = %self.config.model, prompt_chars = prompt.len(), "ollama generate");

        let request = GenerateRequest {
            model: &self.config.model,
            prompt,
            stream: false,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|error| ChatError::Generation(error.to_string()))?;
        let response = check_ollama_response(response).await?;

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|error| ChatError::Generation(error.to_string()))?;

        Ok(parsed.response)
    }
}
