pub mod memory;
pub mod qdrant;

pub use memory::{cosine_similarity, InMemoryStore};
pub use qdrant::QdrantStore;
