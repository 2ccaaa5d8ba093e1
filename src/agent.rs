//! Query orchestration pipeline.
//!
//! Fixed stage topology per turn: persist the user message, fan out the
//! guardrail check and hybrid retrieval + rerank (no data dependency
//! between them), join, synthesize once, persist exactly one assistant
//! message. Guardrail verdicts and reranked document text are never written
//! to the conversation log.
//!
//! Known limitation: the log is append-only and keyed by chat_id with no
//! per-session lock, so concurrent requests on the same chat_id may persist
//! their turns interleaved.

use log::{error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use uuid::Uuid;

use crate::cli::Args;
use crate::errors::PersistenceError;
use crate::guardrail::{GuardrailClassifier, GuardrailVerdict};
use crate::history::ConversationStore;
use crate::models::chat::Conversation;
use crate::retrieval::{DocumentRetriever, Reranker, RetrievedCandidate};
use crate::synthesis::AnswerSynthesizer;

/// One unit of work: a single user query against a session.
#[derive(Debug, Clone)]
pub struct PipelineRequest {
    pub chat_id: String,
    pub query: String,
}

/// The only artifact persisted and streamed back to the caller.
#[derive(Debug, Clone)]
pub struct PipelineResult {
    pub answer_text: String,
    pub session_id: String,
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub min_score: f32,
    pub history_window: usize,
    pub classify_timeout: Duration,
    pub retrieval_timeout: Duration,
}

impl From<&Args> for PipelineSettings {
    fn from(args: &Args) -> Self {
        Self {
            min_score: args.min_score,
            history_window: args.history_window,
            classify_timeout: Duration::from_secs(args.classify_timeout_secs),
            retrieval_timeout: Duration::from_secs(args.retrieval_timeout_secs),
        }
    }
}

/// Resolves the session identity for a request: an external session token
/// wins over a caller-supplied chat_id, which wins over a fresh id.
pub fn resolve_chat_id(session_token: Option<String>, supplied: Option<String>) -> String {
    session_token
        .filter(|t| !t.is_empty())
        .or_else(|| supplied.filter(|s| !s.is_empty()))
        .unwrap_or_else(|| {
            let hex = Uuid::new_v4().simple().to_string();
            format!("chat_{}", &hex[..16])
        })
}

pub struct PolicyAgent {
    store: Arc<dyn ConversationStore>,
    guardrail: GuardrailClassifier,
    retriever: Arc<dyn DocumentRetriever>,
    reranker: Reranker,
    synthesizer: AnswerSynthesizer,
    settings: PipelineSettings,
}

impl PolicyAgent {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        guardrail: GuardrailClassifier,
        retriever: Arc<dyn DocumentRetriever>,
        reranker: Reranker,
        synthesizer: AnswerSynthesizer,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            store,
            guardrail,
            retriever,
            reranker,
            synthesizer,
            settings,
        }
    }

    /// Runs one query through the pipeline. Only a persistence failure
    /// aborts the turn; every other stage degrades and the turn still
    /// produces and persists an answer.
    pub async fn process_query(
        &self,
        request: PipelineRequest,
    ) -> Result<PipelineResult, PersistenceError> {
        let PipelineRequest { chat_id, query } = request;

        // The user turn is persisted unconditionally, before classification:
        // blocked queries are part of the conversation record too.
        self.store.ensure_session(&chat_id).await?;
        self.store.append_message(&chat_id, "user", &query).await?;

        let conversation = match self
            .store
            .recent_history(&chat_id, self.settings.history_window)
            .await
        {
            Ok(conversation) => conversation,
            Err(e) => {
                warn!(
                    "History read failed for '{}', continuing without context: {}",
                    chat_id, e
                );
                Conversation::empty(&chat_id)
            }
        };

        let retrieval_query = build_retrieval_query(&conversation, &query);

        // No data dependency between classification and retrieval; both must
        // finish before synthesis.
        let verdict_branch = self.classify_with_timeout(&query);
        let context_branch = self.retrieve_with_timeout(&retrieval_query);
        let (verdict, best) = tokio::join!(verdict_branch, context_branch);

        info!(
            "Pipeline join for '{}': verdict={}, context={}",
            chat_id,
            verdict.prompt_label(),
            best.as_ref()
                .map(|c| c.source_document.as_str())
                .unwrap_or("none")
        );

        let answer_text = match self
            .synthesizer
            .synthesize(&verdict, best.as_ref(), &conversation, &query)
            .await
        {
            Ok(answer) => answer,
            Err(e) => {
                error!("Answer synthesis failed for '{}': {}", chat_id, e);
                self.synthesizer.fallback_answer()
            }
        };

        // Exactly one assistant message per turn; intermediate results are
        // discarded with the request.
        self.store
            .append_message(&chat_id, "assistant", &answer_text)
            .await?;

        Ok(PipelineResult {
            answer_text,
            session_id: chat_id,
        })
    }

    async fn classify_with_timeout(&self, query: &str) -> GuardrailVerdict {
        match timeout(self.settings.classify_timeout, self.guardrail.classify(query)).await {
            Ok(verdict) => verdict,
            Err(_) => {
                warn!("Guardrail classification timed out, allowing query");
                GuardrailVerdict::allowed()
            }
        }
    }

    async fn retrieve_with_timeout(&self, retrieval_query: &str) -> Option<RetrievedCandidate> {
        match timeout(
            self.settings.retrieval_timeout,
            self.retriever.search(retrieval_query, self.settings.min_score),
        )
        .await
        {
            Ok(Ok(candidates)) => self.reranker.select_best(candidates),
            Ok(Err(e)) => {
                warn!("Retrieval failed, continuing without context: {}", e);
                None
            }
            Err(_) => {
                warn!("Retrieval timed out, continuing without context");
                None
            }
        }
    }
}

/// The retrieval query carries the recent conversation so follow-up
/// questions ("who can approve those?") resolve against prior turns. The
/// window already ends with the just-persisted user message.
fn build_retrieval_query(conversation: &Conversation, query: &str) -> String {
    if conversation.messages.is_empty() {
        return query.to_string();
    }
    conversation
        .messages
        .iter()
        .map(|m| format!("{}: {}", m.role, m.content))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::chat::ChatMessage;
    use chrono::Utc;

    #[test]
    fn session_token_wins_over_supplied_id() {
        let resolved = resolve_chat_id(Some("token_1".into()), Some("chat_body".into()));
        assert_eq!(resolved, "token_1");
    }

    #[test]
    fn supplied_id_wins_over_generated() {
        let resolved = resolve_chat_id(None, Some("chat_body".into()));
        assert_eq!(resolved, "chat_body");
    }

    #[test]
    fn empty_token_falls_through() {
        let resolved = resolve_chat_id(Some(String::new()), Some("chat_body".into()));
        assert_eq!(resolved, "chat_body");
    }

    #[test]
    fn generated_id_has_expected_shape() {
        let resolved = resolve_chat_id(None, None);
        assert!(resolved.starts_with("chat_"));
        assert_eq!(resolved.len(), "chat_".len() + 16);
    }

    #[test]
    fn retrieval_query_includes_conversation_turns() {
        let conversation = Conversation {
            id: "chat_1".to_string(),
            messages: vec![
                ChatMessage {
                    id: 1,
                    role: "user".to_string(),
                    content: "what is the purchase limit?".to_string(),
                    created_at: Utc::now(),
                },
                ChatMessage {
                    id: 2,
                    role: "assistant".to_string(),
                    content: "$10,000 without bidding".to_string(),
                    created_at: Utc::now(),
                },
                ChatMessage {
                    id: 3,
                    role: "user".to_string(),
                    content: "who can approve more?".to_string(),
                    created_at: Utc::now(),
                },
            ],
        };
        let retrieval_query = build_retrieval_query(&conversation, "who can approve more?");
        assert!(retrieval_query.contains("user: what is the purchase limit?"));
        assert!(retrieval_query.ends_with("user: who can approve more?"));
    }

    #[test]
    fn retrieval_query_falls_back_to_raw_query() {
        let conversation = Conversation::empty("chat_1");
        assert_eq!(
            build_retrieval_query(&conversation, "travel policy?"),
            "travel policy?"
        );
    }
}
