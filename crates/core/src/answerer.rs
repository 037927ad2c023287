use crate::embeddings::Embedder;
use crate::index::EmbeddingIndex;
use crate::llm::LanguageModel;
use crate::traits::VectorStore;
use crate::models::render_turns;
use crate::{ChatError, ConversationHistory, ConversationTurn, RetrievedChunk, TextChunk};
use tracing::{debug, warn};

pub const DEFAULT_TOP_K: usize = 3;

/// Everything the language model sees for one answer.
#[derive(Debug, Clone)]
pub struct PromptRequest<'a> {
    pub question: &'a str,
    pub retrieved: &'a [RetrievedChunk],
    pub history: &'a [ConversationTurn],
}

impl PromptRequest<'_> {
    pub fn render(&self) -> String {
        let context = self
            .retrieved
            .iter()
            .map(|hit| hit.chunk.text.trim())
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n");

        let mut prompt = String::from(
            "Use the following pieces of context to answer the question at the end. \
             If you don't know the answer, just say that you don't know, don't try to make up an answer.\n\n",
        );
        prompt.push_str(&context);
        prompt.push_str("\n\n");

        if !self.history.is_empty() {
            prompt.push_str("Chat History:\n");
            prompt.push_str(&render_turns(self.history));
            prompt.push_str("\n\n");
        }

        prompt.push_str("Question: ");
        prompt.push_str(self.question);
        prompt.push_str("\nHelpful Answer:");
        prompt
    }
}

pub fn condense_prompt(history: &[ConversationTurn], question: &str) -> String {
    format!(
        "Given the following conversation and a follow up question, rephrase the follow up \
         question to be a standalone question, in its original language.\n\n\
         Chat History:\n{}\nFollow Up Input: {}\nStandalone question:",
        render_turns(history),
        question
    )
}

pub struct ConversationalAnswerer<E, S, L>
where
    E: Embedder,
    S: VectorStore,
    L: LanguageModel,
{
    index: EmbeddingIndex<E, S>,
    model: L,
    history: ConversationHistory,
    top_k: usize,
    condense_question: bool,
}

impl<E, S, L> ConversationalAnswerer<E, S, L>
where
    E: Embedder + Send + Sync,
    S: VectorStore + Send + Sync,
    L: LanguageModel + Send + Sync,
{
    pub fn new(index: EmbeddingIndex<E, S>, model: L) -> Self {
        Self {
            index,
            model,
            history: ConversationHistory::default(),
            top_k: DEFAULT_TOP_K,
            condense_question: true,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    pub fn with_condense_question(mut self, enabled: bool) -> Self {
        self.condense_question = enabled;
        self
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    pub fn is_ready(&self) -> bool {
        !self.index.is_empty()
    }

    pub fn chunk_count(&self) -> usize {
        self.index.len()
    }

    /// Indexes a new document and starts a fresh conversation about it.
    pub async fn load(&mut self, chunks: &[TextChunk]) -> Result<usize, ChatError> {
        self.history = ConversationHistory::default();
        self.index.build(chunks).await
    }

    pub async fn unload(&mut self) -> Result<(), ChatError> {
        self.history = ConversationHistory::default();
        self.index.clear().await
    }

    pub async fn ask(&mut self, question: &str) -> Result<String, ChatError> {
        if !self.is_ready() {
            return Err(ChatError::NotReady);
        }

        let search_text = self.standalone_question(question).await;
        let retrieved = self.index.query(&search_text, self.top_k).await?;
        debug!(retrieved = retrieved.len(), "context retrieved");

        let prompt = PromptRequest {
            question,
            retrieved: &retrieved,
            history: self.history.turns(),
        }
        .render();

        let answer = self.model.complete(&prompt).await?.trim().to_string();
        if answer.is_empty() {
            return Err(ChatError::Generation(
                "language model returned an empty answer".to_string(),
            ));
        }

        self.history.push(question, answer.as_str());
        Ok(answer)
    }

    async fn standalone_question(&self, question: &str) -> String {
        if !self.condense_question || self.history.is_empty() {
            return question.to_string();
        }

        let prompt = condense_prompt(self.history.turns(), question);
        match self.model.complete(&prompt).await {
            Ok(rephrased) if !rephrased.trim().is_empty() => rephrased.trim().to_string(),
            Ok(_) => question.to_string(),
            Err(error) => {
                warn!(%error, "question rephrase failed; retrieving with the raw question");
                question.to_string()
            }
        }
    }
}
