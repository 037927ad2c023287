use crate::answerer::ConversationalAnswerer;
use crate::chunking::ChunkingConfig;
use crate::embeddings::Embedder;
use crate::extractor::PdfExtractor;
use crate::index::EmbeddingIndex;
use crate::ingest::{ingest_pdf, persist_upload};
use crate::llm::LanguageModel;
use crate::traits::VectorStore;
use crate::{
    ChatError, ChatOptions, ConversationHistory, DocumentFingerprint, ProcessReport, SessionState,
};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use uuid::Uuid;

pub const NOT_READY_RESPONSE: &str = "Please process a PDF file first.";

/// One user's upload → process → ask pipeline.
pub struct Session<X, E, S, L>
where
    X: PdfExtractor,
    E: Embedder,
    S: VectorStore,
    L: LanguageModel,
{
    id: Uuid,
    upload_dir: PathBuf,
    upload_path: Option<PathBuf>,
    document: Option<DocumentFingerprint>,
    state: SessionState,
    chunking: ChunkingConfig,
    extractor: X,
    answerer: ConversationalAnswerer<E, S, L>,
}

impl<X, E, S, L> Session<X, E, S, L>
where
    X: PdfExtractor,
    E: Embedder + Send + Sync,
    S: VectorStore + Send + Sync,
    L: LanguageModel + Send + Sync,
{
    pub fn new(
        id: Uuid,
        upload_root: &Path,
        options: &ChatOptions,
        extractor: X,
        index: EmbeddingIndex<E, S>,
        model: L,
    ) -> Self {
        let answerer = ConversationalAnswerer::new(index, model)
            .with_top_k(options.top_k)
            .with_condense_question(options.condense_question);

        Self {
            id,
            upload_dir: upload_root.join(id.to_string()),
            upload_path: None,
            document: None,
            state: SessionState::Empty,
            chunking: ChunkingConfig::from(options),
            extractor,
            answerer,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn upload_path(&self) -> Option<&Path> {
        self.upload_path.as_deref()
    }

    pub fn document(&self) -> Option<&DocumentFingerprint> {
        self.document.as_ref()
    }

    pub fn history(&self) -> &ConversationHistory {
        self.answerer.history()
    }

    pub fn chunk_count(&self) -> usize {
        self.answerer.chunk_count()
    }

    /// Persists an uploaded file under this session's upload directory.
    pub async fn store_upload(
        &mut self,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<PathBuf, ChatError> {
        let stored = persist_upload(&self.upload_dir, file_name, bytes).await?;
        self.upload_path = Some(stored.clone());
        Ok(stored)
    }

    /// Extracts, chunks and indexes the uploaded PDF. The session is `Ready`
    /// only if every step succeeds and `Empty` otherwise.
    pub async fn process_pdf(&mut self) -> Result<ProcessReport, ChatError> {
        let path = self.upload_path.clone().ok_or(ChatError::NoUpload)?;

        self.state = SessionState::Empty;
        self.document = None;

        let result = self.run_pipeline(&path).await;
        match &result {
            Ok(report) => {
                self.state = SessionState::Ready;
                self.document = Some(report.document.clone());
                info!(
                    session = %self.id,
                    document = %report.document.document_title,
                    chunks = report.chunk_count,
                    "session ready"
                );
            }
            Err(error) => {
                warn!(session = %self.id, %error, "processing failed");
                if let Err(clear_error) = self.answerer.unload().await {
                    warn!(session = %self.id, error = %clear_error, "index cleanup failed");
                }
            }
        }
        result
    }

    async fn run_pipeline(&mut self, path: &Path) -> Result<ProcessReport, ChatError> {
        let ingested = tokio::task::block_in_place(|| {
            ingest_pdf(&self.extractor, path, self.chunking)
        })?;
        let chunk_count = self.answerer.load(&ingested.chunks).await?;

        Ok(ProcessReport {
            document: ingested.fingerprint,
            chunk_count,
        })
    }

    /// Answers `question`, turning every failure into display text.
    pub async fn ask(&mut self, question: &str) -> String {
        if self.state == SessionState::Empty {
            return NOT_READY_RESPONSE.to_string();
        }

        match self.answerer.ask(question).await {
            Ok(answer) => answer,
            Err(ChatError::NotReady | ChatError::EmptyIndex) => NOT_READY_RESPONSE.to_string(),
            Err(error) => {
                warn!(session = %self.id, %error, "answer failed");
                format!("Error generating response: {error}")
            }
        }
    }

    /// Drops the indexed document and conversation, returning to `Empty`.
    pub async fn reset(&mut self) -> Result<(), ChatError> {
        self.state = SessionState::Empty;
        self.document = None;
        self.answerer.unload().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::answerer::tests::ScriptedModel;
    use crate::embeddings::CharacterNgramEmbedder;
    use crate::extractor::tests::write_text_pdf;
    use crate::extractor::{LopdfExtractor, PageText};
    use crate::stores::InMemoryStore;
    use crate::ExtractionError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::tempdir;

    struct FixedText(String);

    impl PdfExtractor for FixedText {
        fn extract_pages(&self, _path: &Path) -> Result<Vec<PageText>, ExtractionError> {
            Ok(vec![PageText {
                number: 1,
                text: self.0.clone(),
            }])
        }
    }

    #[derive(Clone, Default)]
    struct CountingEmbedder {
        calls: Arc<AtomicUsize>,
        fail: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Embedder for CountingEmbedder {
        async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ChatError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(ChatError::Generation("embedding model unavailable".to_string()));
            }
            CharacterNgramEmbedder::default().embed_documents(texts).await
        }

        async fn embed_query(&self, text: &str) -> Result<Vec<f32>, ChatError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            CharacterNgramEmbedder::default().embed_query(text).await
        }
    }

    fn five_thousand_chars() -> String {
        let mut text = String::from("Chapter 1: ");
        while text.chars().count() < 5_000 {
            text.push_str("The quick brown fox jumps over the lazy dog. ");
        }
        text.chars().take(5_000).collect()
    }

    fn session<X: PdfExtractor>(
        root: &Path,
        extractor: X,
        embedder: CountingEmbedder,
        model: ScriptedModel,
    ) -> Session<X, CountingEmbedder, InMemoryStore, ScriptedModel> {
        Session::new(
            Uuid::new_v4(),
            root,
            &ChatOptions::default(),
            extractor,
            EmbeddingIndex::new(embedder, InMemoryStore::new()),
            model,
        )
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn sample_pdf_scenario() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let mut session = session(
            dir.path(),
            FixedText(five_thousand_chars()),
            CountingEmbedder::default(),
            ScriptedModel::default(),
        );

        session.store_upload("sample.pdf", b"%PDF-1.4").await?;
        let report = session.process_pdf().await?;

        assert_eq!(session.state(), SessionState::Ready);
        assert!((6..=8).contains(&report.chunk_count), "got {}", report.chunk_count);
        assert_eq!(session.chunk_count(), report.chunk_count);
        assert_eq!(report.document.char_count, 5_000);

        let answer = session.ask("What is chapter 1 about?").await;
        assert!(!answer.is_empty());
        assert_ne!(answer, NOT_READY_RESPONSE);
        assert_eq!(session.history().len(), 1);
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn empty_session_never_touches_backends() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let embedder = CountingEmbedder::default();
        let model = ScriptedModel::default();
        let mut session = session(
            dir.path(),
            FixedText("unused".to_string()),
            embedder.clone(),
            model.clone(),
        );

        let answer = session.ask("What is chapter 1 about?").await;

        assert_eq!(answer, NOT_READY_RESPONSE);
        assert_eq!(session.state(), SessionState::Empty);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
        assert!(model.prompts.lock().unwrap().is_empty());
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn processing_without_upload_fails() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let mut session = session(
            dir.path(),
            FixedText("text".to_string()),
            CountingEmbedder::default(),
            ScriptedModel::default(),
        );

        assert!(matches!(session.process_pdf().await, Err(ChatError::NoUpload)));
        assert_eq!(session.state(), SessionState::Empty);
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn malformed_pdf_leaves_session_empty() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let mut session = session(
            dir.path(),
            LopdfExtractor,
            CountingEmbedder::default(),
            ScriptedModel::default(),
        );

        session.store_upload("broken.pdf", b"%PDF-1.4\n%broken").await?;
        let result = session.process_pdf().await;

        assert!(matches!(
            result,
            Err(ChatError::Extraction(ExtractionError::PdfParse(_)))
        ));
        assert_eq!(session.state(), SessionState::Empty);
        assert_eq!(session.ask("Anything?").await, NOT_READY_RESPONSE);
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn embedding_failure_reverts_a_ready_session() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let embedder = CountingEmbedder::default();
        let mut session = session(
            dir.path(),
            FixedText(five_thousand_chars()),
            embedder.clone(),
            ScriptedModel::default(),
        );
        session.store_upload("sample.pdf", b"%PDF-1.4").await?;
        session.process_pdf().await?;
        assert_eq!(session.state(), SessionState::Ready);

        embedder.fail.store(true, Ordering::SeqCst);
        session.store_upload("second.pdf", b"%PDF-1.4").await?;
        let result = session.process_pdf().await;

        assert!(matches!(result, Err(ChatError::Generation(_))));
        assert_eq!(session.state(), SessionState::Empty);
        assert_eq!(session.chunk_count(), 0);
        assert!(session.document().is_none());
        assert_eq!(session.ask("Still there?").await, NOT_READY_RESPONSE);
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn generation_failure_becomes_answer_text() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let mut session = session(
            dir.path(),
            FixedText(five_thousand_chars()),
            CountingEmbedder::default(),
            ScriptedModel {
                fail: true,
                ..ScriptedModel::default()
            },
        );
        session.store_upload("sample.pdf", b"%PDF-1.4").await?;
        session.process_pdf().await?;

        let answer = session.ask("What is chapter 1 about?").await;

        assert!(answer.starts_with("Error generating response:"), "{answer}");
        assert_eq!(session.state(), SessionState::Ready);
        assert!(session.history().is_empty());
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn sessions_keep_uploads_apart() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let mut first = session(
            dir.path(),
            FixedText("a".to_string()),
            CountingEmbedder::default(),
            ScriptedModel::default(),
        );
        let mut second = session(
            dir.path(),
            FixedText("b".to_string()),
            CountingEmbedder::default(),
            ScriptedModel::default(),
        );

        let first_path = first.store_upload("book.pdf", b"first").await?;
        let second_path = second.store_upload("book.pdf", b"second").await?;

        assert_ne!(first_path, second_path);
        assert_eq!(std::fs::read(first_path)?, b"first");
        assert_eq!(std::fs::read(second_path)?, b"second");
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn reset_returns_to_empty() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let mut session = session(
            dir.path(),
            FixedText(five_thousand_chars()),
            CountingEmbedder::default(),
            ScriptedModel::default(),
        );
        session.store_upload("sample.pdf", b"%PDF-1.4").await?;
        session.process_pdf().await?;
        session.ask("What is chapter 1 about?").await;

        session.reset().await?;

        assert_eq!(session.state(), SessionState::Empty);
        assert!(session.history().is_empty());
        assert_eq!(session.ask("Again?").await, NOT_READY_RESPONSE);
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn generated_pdf_goes_through_the_real_extractor() -> Result<(), Box<dyn std::error::Error>>
    {
        let dir = tempdir()?;
        let source = dir.path().join("source.pdf");
        write_text_pdf(&source, &["Chapter 1: The quick brown fox"]);

        let mut session = session(
            dir.path(),
            LopdfExtractor,
            CountingEmbedder::default(),
            ScriptedModel::default(),
        );
        session
            .store_upload("sample.pdf", &std::fs::read(&source)?)
            .await?;
        let report = session.process_pdf().await?;

        assert_eq!(report.document.document_title, "sample.pdf");
        assert_eq!(report.document.page_count, 1);
        assert_eq!(report.chunk_count, 1);
        assert_eq!(session.state(), SessionState::Ready);
        Ok(())
    }
}
