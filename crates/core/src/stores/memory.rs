use crate::traits::{ensure_matching_lengths, VectorStore};
use crate::{ChatError, RetrievedChunk, TextChunk};
use async_trait::async_trait;

#[derive(Debug, Clone)]
struct IndexEntry {
    chunk: TextChunk,
    vector: Vec<f32>,
}

/// Exhaustive cosine-similarity store kept in process memory.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    entries: Vec<IndexEntry>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub fn cosine_similarity(left: &[f32], right: &[f32]) -> f64 {
    let mut dot = 0f64;
    let mut left_norm = 0f64;
    let mut right_norm = 0f64;
    for (a, b) in left.iter().zip(right) {
        dot += f64::from(*a) * f64::from(*b);
        left_norm += f64::from(*a) * f64::from(*a);
        right_norm += f64::from(*b) * f64::from(*b);
    }

    if left_norm == 0.0 || right_norm == 0.0 {
        return 0.0;
    }
    dot / (left_norm.sqrt() * right_norm.sqrt())
}

#[async_trait]
impl VectorStore for InMemoryStore {
    async fn rebuild(
        &mut self,
        chunks: &[TextChunk],
        embeddings: &[Vec<f32>],
    ) -> Result<(), ChatError> {
        ensure_matching_lengths(chunks, embeddings)?;

        self.entries = chunks
            .iter()
            .zip(embeddings)
            .map(|(chunk, vector)| IndexEntry {
                chunk: chunk.clone(),
                vector: vector.clone(),
            })
            .collect();

        Ok(())
    }

    async fn search_vector(
        &self,
        query_vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>, ChatError> {
        let mut hits = self
            .entries
            .iter()
            .map(|entry| RetrievedChunk {
                chunk: entry.chunk.clone(),
                score: cosine_similarity(query_vector, &entry.vector),
            })
            .collect::<Vec<_>>();

        hits.sort_by(|left, right| {
            right
                .score
                .total_cmp(&left.score)
                .then_with(|| left.chunk.chunk_index.cmp(&right.chunk.chunk_index))
        });
        hits.truncate(top_k);

        Ok(hits)
    }

    async fn clear(&mut self) -> Result<(), ChatError> {
        self.entries.clear();
        Ok(())
    }
}
