use crate::{ChatError, RetrievedChunk, TextChunk};
use async_trait::async_trait;

/// Storage backend holding the `(chunk, vector)` entries of one index.
#[async_trait]
pub trait VectorStore {
    /// Replaces every stored entry with `chunks` paired with `embeddings`.
    async fn rebuild(
        &mut self,
        chunks: &[TextChunk],
        embeddings: &[Vec<f32>],
    ) -> Result<(), ChatError>;

    /// Returns at most `top_k` entries ordered by descending similarity.
    async fn search_vector(
        &self,
        query_vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>, ChatError>;

    async fn clear(&mut self) -> Result<(), ChatError>;
}

#[async_trait]
impl<T> VectorStore for Box<T>
where
    T: VectorStore + ?Sized + Send + Sync,
{
    async fn rebuild(
        &mut self,
        chunks: &[TextChunk],
        embeddings: &[Vec<f32>],
    ) -> Result<(), ChatError> {
        (**self).rebuild(chunks, embeddings).await
    }

    async fn search_vector(
        &self,
        query_vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>, ChatError> {
        (**self).search_vector(query_vector, top_k).await
    }

    async fn clear(&mut self) -> Result<(), ChatError> {
        (**self).clear().await
    }
}

pub(crate) fn ensure_matching_lengths(
    chunks: &[TextChunk],
    embeddings: &[Vec<f32>],
) -> Result<(), ChatError> {
    if chunks.len() != embeddings.len() {
        return Err(ChatError::Request(format!(
            "embedding count {} doesn't match chunk count {}",
            embeddings.len(),
            chunks.len()
        )));
    }
    Ok(())
}
