use crate::embeddings::Embedder;
use crate::traits::VectorStore;
use crate::{ChatError, RetrievedChunk, TextChunk};
use tracing::{debug, info, warn};

/// Embeds chunks and queries with one embedder and keeps the vectors in `S`.
pub struct EmbeddingIndex<E, S>
where
    E: Embedder,
    S: VectorStore,
{
    embedder: E,
    store: S,
    entry_count: usize,
    dimensions: Option<usize>,
}

impl<E, S> EmbeddingIndex<E, S>
where
    E: Embedder + Send + Sync,
    S: VectorStore + Send + Sync,
{
    pub fn new(embedder: E, store: S) -> Self {
        Self {
            embedder,
            store,
            entry_count: 0,
            dimensions: None,
        }
    }

    pub fn len(&self) -> usize {
        self.entry_count
    }

    pub fn is_empty(&self) -> bool {
        self.entry_count == 0
    }

    pub fn dimensions(&self) -> Option<usize> {
        self.dimensions
    }

    /// Replaces the index contents with `chunks`. On failure the index is
    /// left empty.
    pub async fn build(&mut self, chunks: &[TextChunk]) -> Result<usize, ChatError> {
        self.entry_count = 0;
        self.dimensions = None;

        let texts = chunks
            .iter()
            .map(|chunk| chunk.text.clone())
            .collect::<Vec<_>>();
        let embeddings = self.embedder.embed_documents(&texts).await?;

        let dimensions = embeddings.first().map(Vec::len).unwrap_or_default();
        if let Some(bad) = embeddings.iter().find(|vector| vector.len() != dimensions) {
            return Err(ChatError::Request(format!(
                "embedding dimension {} != {}",
                bad.len(),
                dimensions
            )));
        }

        if let Err(error) = self.store.rebuild(chunks, &embeddings).await {
            // A partial rebuild must not stay visible to queries.
            if let Err(clear_error) = self.store.clear().await {
                warn!(error = %clear_error, "store cleanup after failed build failed");
            }
            return Err(error);
        }

        self.entry_count = chunks.len();
        self.dimensions = (dimensions > 0).then_some(dimensions);
        info!(entries = self.entry_count, dimensions, "embedding index built");
        Ok(self.entry_count)
    }

    pub async fn query(&self, text: &str, top_k: usize) -> Result<Vec<RetrievedChunk>, ChatError> {
        if self.is_empty() {
            return Err(ChatError::EmptyIndex);
        }

        let query_vector = self.embedder.embed_query(text).await?;
        if let Some(dimensions) = self.dimensions {
            if query_vector.len() != dimensions {
                return Err(ChatError::Request(format!(
                    "query vector dim {} is not {}",
                    query_vector.len(),
                    dimensions
                )));
            }
        }

        let hits = self.store.search_vector(&query_vector, top_k).await?;
        debug!(top_k, hits = hits.len(), "index query");
        Ok(hits)
    }

    pub async fn clear(&mut self) -> Result<(), ChatError> {
        self.entry_count = 0;
        self.dimensions = None;
        self.store.clear().await
    }
}
