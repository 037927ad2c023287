use crate::traits::{ensure_matching_lengths, VectorStore};
use crate::{ChatError, RetrievedChunk, TextChunk};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;
use url::Url;

pub struct QdrantStore {
    endpoint: String,
    collection: String,
    client: Client,
}

impl QdrantStore {
    pub fn new(
        endpoint: &str,
        collection: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ChatError> {
        let endpoint = Url::parse(endpoint)?.as_str().trim_end_matches('/').to_string();
        Ok(Self {
            endpoint,
            collection: collection.into(),
            client: Client::builder().timeout(timeout).build()?,
        })
    }

    fn collection_url(&self) -> String {
        format!("{}/collections/{}", self.endpoint, self.collection)
    }

    async fn drop_collection(&self) -> Result<(), ChatError> {
        let response = self.client.delete(self.collection_url()).send().await?;

        if response.status().is_success() || response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }

        Err(backend_error(response.status()))
    }

    async fn create_collection(&self, vector_size: usize) -> Result<(), ChatError> {
        let response = self
            .client
            .put(self.collection_url())
            .json(&json!({
                "vectors": {
                    "size": vector_size,
                    "distance": "Cosine",
                }
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(backend_error(response.status()));
        }
        Ok(())
    }
}

fn backend_error(status: StatusCode) -> ChatError {
    ChatError::BackendResponse {
        backend: "qdrant".to_string(),
        details: status.to_string(),
    }
}

pub(crate) fn build_points(
    chunks: &[TextChunk],
    embeddings: &[Vec<f32>],
) -> Result<Vec<Value>, ChatError> {
    ensure_matching_lengths(chunks, embeddings)?;

    let vector_size = embeddings.first().map(Vec::len).unwrap_or_default();
    chunks
        .iter()
        .zip(embeddings.iter())
        .map(|(chunk, embedding)| {
            if embedding.len() != vector_size {
                return Err(ChatError::Request(format!(
                    "embedding dimension {} != {}",
                    embedding.len(),
                    vector_size
                )));
            }

            Ok(json!({
                "id": chunk.chunk_index,
                "vector": embedding,
                "payload": {
                    "chunk_id": chunk.chunk_id,
                    "document_id": chunk.document_id,
                    "chunk_index": chunk.chunk_index,
                    "start_char": chunk.start_char,
                    "text": chunk.text,
                },
            }))
        })
        .collect()
}

pub(crate) fn parse_hits(parsed: &Value) -> Vec<RetrievedChunk> {
    let hits = parsed
        .pointer("/result")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    hits.iter()
        .map(|hit| {
            let text_field = |name: &str| {
                hit.pointer(&format!("/payload/{name}"))
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string()
            };
            let chunk_index = hit
                .pointer("/payload/chunk_index")
                .and_then(Value::as_u64)
                .or_else(|| hit.pointer("/id").and_then(Value::as_u64))
                .unwrap_or_default();
            let start_char = hit
                .pointer("/payload/start_char")
                .and_then(Value::as_u64)
                .unwrap_or_default() as usize;

            RetrievedChunk {
                chunk: TextChunk {
                    chunk_id: text_field("chunk_id"),
                    document_id: text_field("document_id"),
                    chunk_index,
                    start_char,
                    text: text_field("text"),
                },
                score: hit.pointer("/score").and_then(Value::as_f64).unwrap_or(0.0),
            }
        })
        .collect()
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn rebuild(
        &mut self,
        chunks: &[TextChunk],
        embeddings: &[Vec<f32>],
    ) -> Result<(), ChatError> {
        let points = build_points(chunks, embeddings)?;

        self.drop_collection().await?;
        if points.is_empty() {
            return Ok(());
        }

        let vector_size = embeddings.first().map(Vec::len).unwrap_or_default();
        self.create_collection(vector_size).await?;

        debug!(collection = %self.collection, points = points.len(), "qdrant upsert");
        let response = self
            .client
            .put(format!("{}/points?wait=true", self.collection_url()))
            .json(&json!({ "points": points }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(backend_error(response.status()));
        }

        Ok(())
    }

    async fn search_vector(
        &self,
        query_vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>, ChatError> {
        let response = self
            .client
            .post(format!("{}/points/search", self.collection_url()))
            .json(&json!({
                "vector": query_vector,
                "limit": top_k,
                "with_payload": true,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(backend_error(response.status()));
        }

        let parsed: Value = response.json().await?;
        let mut hits = parse_hits(&parsed);
        hits.truncate(top_k);
        Ok(hits)
    }

    async fn clear(&mut self) -> Result<(), ChatError> {
        self.drop_collection().await
    }
}
