pub mod answerer;
pub mod chunking;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod index;
pub mod ingest;
pub mod llm;
pub mod models;
pub mod session;
pub mod stores;
pub mod traits;

pub use answerer::{condense_prompt, ConversationalAnswerer, PromptRequest, DEFAULT_TOP_K};
pub use chunking::{build_chunks, split_spans, split_text, ChunkSpan, ChunkingConfig};
pub use embeddings::{
    CharacterNgramEmbedder, Embedder, OllamaEmbedder, DEFAULT_EMBEDDING_DIMENSIONS,
    DEFAULT_EMBEDDING_MODEL,
};
pub use error::{ChatError, ExtractionError};
pub use extractor::{extract_document_text, LopdfExtractor, PageText, PdfExtractor};
pub use index::EmbeddingIndex;
pub use ingest::{digest_file, ingest_pdf, persist_upload, IngestedDocument};
pub use llm::{
    LanguageModel, OllamaClient, OllamaConfig, DEFAULT_LLM_MODEL, DEFAULT_OLLAMA_URL,
    DEFAULT_REQUEST_TIMEOUT,
};
pub use models::{
    ChatOptions, ConversationHistory, ConversationTurn, DocumentFingerprint, ProcessReport,
    RetrievedChunk, SessionState, TextChunk,
};
pub use session::{Session, NOT_READY_RESPONSE};
pub use stores::{InMemoryStore, QdrantStore};
pub use traits::VectorStore;
