//! One chat turn, end to end.
//!
//! [`ChatOrchestrator`] decides whether to search the web, looks up the
//! attached document index, assembles the prompt, calls the model, and on
//! success records the exchange in the caller's [`ConversationBuffer`].
//! Collaborators are injected as trait objects.
//!
//! Failure policy: search errors are logged and the turn continues without
//! search context; retrieval and model errors are returned to the caller.
//! Nothing is retried.

use std::path::Path;
use std::sync::Arc;

use crate::config::Config;
use crate::conversation::ConversationBuffer;
use crate::embedding::create_embedder;
use crate::index::{InMemoryIndexService, IndexId, IndexService};
use crate::ingest::DocumentIngestor;
use crate::llm::{GeminiClient, ModelClient, ModelError};
use crate::models::Role;
use crate::prompt::{format_document_chunks, format_search_results, ContextAssembler};
use crate::web_search::{needs_search, DuckDuckGoSearch, NoSearch, WebSearch};

/// The reply shown to the user when a turn fails.
pub const APOLOGY: &str =
    "I'm sorry, I encountered an error. Could you please rephrase your question?";

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("message cannot be empty")]
    EmptyMessage,
    #[error("document index not found: {0}")]
    UnknownDocument(String),
    #[error("document retrieval failed: {0}")]
    Retrieval(String),
    #[error("failed to generate response: {0}")]
    Model(#[from] ModelError),
}

pub struct ChatOrchestrator {
    model: Arc<dyn ModelClient>,
    search: Arc<dyn WebSearch>,
    index: Arc<dyn IndexService>,
    assembler: ContextAssembler,
    max_results: usize,
    k: usize,
}

impl ChatOrchestrator {
    pub fn new(
        model: Arc<dyn ModelClient>,
        search: Arc<dyn WebSearch>,
        index: Arc<dyn IndexService>,
        config: &Config,
    ) -> Self {
        Self {
            model,
            search,
            index,
            assembler: ContextAssembler::default(),
            max_results: config.search.max_results,
            k: config.retrieval.k,
        }
    }

    /// Gathers search and document context and assembles the prompt for
    /// `message`. Search and retrieval run concurrently.
    pub async fn build_prompt(
        &self,
        buffer: &ConversationBuffer,
        message: &str,
        document: Option<&IndexId>,
    ) -> Result<String, ChatError> {
        if let Some(id) = document {
            if !self.index.contains(id) {
                return Err(ChatError::UnknownDocument(id.to_string()));
            }
        }

        let search = async {
            if !needs_search(message) {
                return None;
            }
            match self.search.search(message, self.max_results).await {
                Ok(hits) => format_search_results(&hits),
                Err(e) => {
                    tracing::warn!(error = %e, "web search failed; continuing without it");
                    None
                }
            }
        };

        let retrieval = async {
            match document {
                Some(id) => self
                    .index
                    .similarity_search(id, message, self.k)
                    .await
                    .map(|chunks| format_document_chunks(&chunks))
                    .map_err(|e| ChatError::Retrieval(e.to_string())),
                None => Ok(None),
            }
        };

        let (search_context, document_context) = tokio::join!(search, retrieval);
        let document_context = document_context?;

        Ok(self.assembler.assemble(
            &buffer.get_context(),
            search_context.as_deref(),
            document_context.as_deref(),
            message,
        ))
    }

    /// Runs one turn. On success the user and assistant turns are appended
    /// to `buffer`; on failure `buffer` is left untouched.
    pub async fn respond(
        &self,
        buffer: &mut ConversationBuffer,
        message: &str,
        document: Option<&IndexId>,
    ) -> Result<String, ChatError> {
        if message.trim().is_empty() {
            return Err(ChatError::EmptyMessage);
        }

        let prompt = self.build_prompt(buffer, message, document).await?;
        tracing::debug!(prompt_chars = prompt.len(), "calling model");

        let reply = self.model.generate(&prompt).await.map_err(|e| {
            tracing::error!(error = %e, "model call failed");
            ChatError::from(e)
        })?;

        buffer.add(Role::User, message);
        buffer.add(Role::Assistant, reply.clone());
        Ok(reply)
    }

    /// Like [`respond`](Self::respond), but any failure becomes [`APOLOGY`].
    pub async fn respond_or_apologize(
        &self,
        buffer: &mut ConversationBuffer,
        message: &str,
        document: Option<&IndexId>,
    ) -> String {
        match self.respond(buffer, message, document).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(error = %e, "chat turn failed");
                APOLOGY.to_string()
            }
        }
    }
}

/// CLI entry point for `efiko chat`: one turn against the configured model,
/// optionally grounded in a local document.
pub async fn run_chat(config: &Config, message: &str, document: Option<&Path>) -> anyhow::Result<()> {
    let embedder = create_embedder(&config.embedding)?;
    let index: Arc<dyn IndexService> = Arc::new(InMemoryIndexService::new(embedder));
    let model: Arc<dyn ModelClient> = Arc::new(GeminiClient::new(&config.model)?);
    let search: Arc<dyn WebSearch> = if config.search.enabled {
        Arc::new(DuckDuckGoSearch::new(&config.search)?)
    } else {
        Arc::new(NoSearch)
    };

    let index_id = match document {
        Some(path) => {
            let bytes = std::fs::read(path)?;
            let filename = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let outcome = DocumentIngestor::new(index.clone(), config)
                .ingest(&filename, &bytes)
                .await?;
            Some(outcome.index_id)
        }
        None => None,
    };

    let orchestrator = ChatOrchestrator::new(model, search, index, config);
    let mut buffer = ConversationBuffer::new(config.conversation.max_turns);
    let reply = orchestrator
        .respond(&mut buffer, message, index_id.as_ref())
        .await?;
    println!("{}", reply);
    Ok(())
}
