//! Conversation manager: one user utterance in, one model answer out.
//!
//! A turn runs retrieval, assembles context, renders the query prompt, and
//! sends the history plus the new prompt to the chat API through the
//! retry policy. Retrieval failures degrade to the no-context sentinel;
//! chat API failures surface as [`DocbotError::Upstream`] and leave the
//! history untouched.

use std::sync::Arc;

use crate::config::Config;
use crate::context::{self, NO_CONTEXT};
use crate::error::{ChatError, DocbotError, Result};
use crate::history::ConversationHistory;
use crate::llm::{ChatClient, ChatRequest};
use crate::models::{ConversationTurn, SearchResult};
use crate::retrieve::Retriever;
use crate::retry::RetryPolicy;

/// Model and prompt settings for a session, taken from `[llm]`,
/// `[chunking]` and `[chat]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatSettings {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub system_prompt: String,
    pub query_prompt: String,
    pub max_chunks: usize,
    pub min_relevance: f64,
    pub max_history: usize,
}

impl ChatSettings {
    pub fn from_config(config: &Config) -> Result<Self> {
        let llm = config.require_llm()?;
        Ok(Self {
            model: llm.model.clone(),
            max_tokens: llm.max_tokens,
            temperature: llm.temperature,
            system_prompt: llm.prompts.system.clone(),
            query_prompt: llm.prompts.query.clone(),
            max_chunks: config.chunking.max_chunks,
            min_relevance: config.chunking.min_relevance,
            max_history: config.chat.max_history,
        })
    }
}

/// What retrieval contributed to a turn.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ContextStatus {
    /// At least one chunk passed the threshold.
    Found,
    /// The index returned nothing.
    NoResults,
    /// Results came back but none reached `min_relevance`.
    BelowThreshold { min_relevance: f64 },
    /// Embedding or search failed; answered without context.
    RetrievalFailed,
}

#[derive(Debug, Clone)]
pub struct Reply {
    pub text: String,
    /// Results that passed the relevance threshold, best first.
    pub results: Vec<SearchResult>,
    pub context_status: ContextStatus,
}

impl Reply {
    /// Distinct source URLs of the context, in rank order.
    pub fn sources(&self) -> Vec<String> {
        context::distinct_sources(&self.results)
    }

    /// The answer, with a "Sources:" list appended when `with_sources` is
    /// set and context was used.
    pub fn render(&self, with_sources: bool) -> String {
        let sources = self.sources();
        if !with_sources || sources.is_empty() {
            return self.text.clone();
        }
        let bullets: Vec<String> = sources.iter().map(|s| format!("• {}", s)).collect();
        format!("{}\n\nSources:\n{}", self.text, bullets.join("\n"))
    }
}

pub struct ConversationManager {
    settings: ChatSettings,
    retriever: Retriever,
    client: Arc<dyn ChatClient>,
    retry: RetryPolicy,
    history: ConversationHistory,
    annotate: bool,
}

impl ConversationManager {
    pub fn new(settings: ChatSettings, retriever: Retriever, client: Arc<dyn ChatClient>) -> Self {
        let history = ConversationHistory::new(settings.max_history);
        Self {
            settings,
            retriever,
            client,
            retry: RetryPolicy::default(),
            history,
            annotate: false,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Annotate context blocks with chunk position and relevance.
    pub fn with_annotations(mut self, annotate: bool) -> Self {
        self.annotate = annotate;
        self
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    pub fn settings(&self) -> &ChatSettings {
        &self.settings
    }

    /// Retrieve and filter context for `user_text`. Never fails.
    async fn gather_context(&self, user_text: &str) -> (Vec<SearchResult>, ContextStatus) {
        let min_relevance = self.settings.min_relevance;
        match self
            .retriever
            .search(user_text, self.settings.max_chunks)
            .await
        {
            Ok(results) if results.is_empty() => {
                tracing::warn!("no documents found in the vector index");
                (results, ContextStatus::NoResults)
            }
            Ok(results) => {
                let filtered = context::filter_by_relevance(&results, min_relevance);
                if filtered.is_empty() {
                    tracing::warn!(
                        min_relevance,
                        "results found but none met the minimum relevance threshold"
                    );
                    (filtered, ContextStatus::BelowThreshold { min_relevance })
                } else {
                    (filtered, ContextStatus::Found)
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "retrieval failed, answering without context");
                (Vec::new(), ContextStatus::RetrievalFailed)
            }
        }
    }

    /// Answer one user utterance.
    ///
    /// # Errors
    ///
    /// [`DocbotError::Upstream`] when the chat API keeps failing after
    /// retries or fails with a non-transient error.
    pub async fn respond(&mut self, user_text: &str) -> Result<Reply> {
        let (results, context_status) = self.gather_context(user_text).await;
        let context_block = if results.is_empty() {
            NO_CONTEXT.to_string()
        } else {
            context::render_blocks(&results, self.annotate)
        };
        let prompt = context::render_prompt(&self.settings.query_prompt, &context_block, user_text);

        let mut messages: Vec<ConversationTurn> = self.history.turns().cloned().collect();
        messages.push(ConversationTurn::user(prompt.clone()));
        let request = ChatRequest {
            model: self.settings.model.clone(),
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
            system: self.settings.system_prompt.clone(),
            messages,
        };

        let client = &self.client;
        let request = &request;
        let text = self
            .retry
            .run(move || client.complete(request), ChatError::is_transient)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "chat API call failed");
                DocbotError::from(e)
            })?;

        self.history.push_exchange(prompt, text.clone());

        Ok(Reply {
            text,
            results,
            context_status,
        })
    }
}
