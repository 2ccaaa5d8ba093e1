use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

use crate::config::prompt::{self, PromptConfig};
use crate::errors::SynthesisError;
use crate::guardrail::GuardrailVerdict;
use crate::history;
use crate::llm::chat::ChatClient;
use crate::models::chat::Conversation;
use crate::retrieval::rerank;
use crate::retrieval::RetrievedCandidate;

const DEFAULT_FALLBACK_ANSWER: &str =
    "I apologize, but I am unable to generate an answer right now. Please try again in a moment.";

/// Wraps the opaque language-model capability. Builds one prompt from
/// verdict, retrieved context and conversation history, and makes exactly
/// one completion call per turn, bounded by a caller-configured timeout.
pub struct AnswerSynthesizer {
    chat_client: Arc<dyn ChatClient>,
    prompt_config: Arc<PromptConfig>,
    call_timeout: Duration,
}

impl AnswerSynthesizer {
    pub fn new(
        chat_client: Arc<dyn ChatClient>,
        prompt_config: Arc<PromptConfig>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            chat_client,
            prompt_config,
            call_timeout,
        }
    }

    pub async fn synthesize(
        &self,
        verdict: &GuardrailVerdict,
        best: Option<&RetrievedCandidate>,
        conversation: &Conversation,
        question: &str,
    ) -> Result<String, SynthesisError> {
        let documents = rerank::format_selected_document(best);
        let history_text = history::format_history_for_prompt(conversation);
        let answer_prompt = prompt::get_answer_prompt(
            &self.prompt_config,
            &verdict.prompt_label(),
            &documents,
            &history_text,
            question,
        )?;

        let completion = timeout(self.call_timeout, self.chat_client.complete(&answer_prompt))
            .await
            .map_err(|_| SynthesisError::Timeout {
                secs: self.call_timeout.as_secs(),
            })?
            .map_err(|e| SynthesisError::Model(e.to_string()))?;

        let answer = completion.response.trim().to_string();
        if answer.is_empty() {
            return Err(SynthesisError::EmptyAnswer);
        }

        Ok(answer)
    }

    /// Apologetic answer used when synthesis itself fails. It is persisted
    /// as the assistant turn like any other answer.
    pub fn fallback_answer(&self) -> String {
        prompt::get_fallback_answer(&self.prompt_config)
            .unwrap_or_else(|_| DEFAULT_FALLBACK_ANSWER.to_string())
    }
}
