use log::warn;
use std::sync::Arc;

use crate::config::prompt::{self, PromptConfig};
use crate::errors::ClassificationError;
use crate::llm::chat::ChatClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardrailStatus {
    Allowed,
    Blocked,
}

/// Ephemeral allow/block decision. Never persisted as a message; it only
/// shapes what the synthesizer is asked to produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardrailVerdict {
    pub status: GuardrailStatus,
    pub category: Option<String>,
}

impl GuardrailVerdict {
    pub fn allowed() -> Self {
        Self {
            status: GuardrailStatus::Allowed,
            category: None,
        }
    }

    pub fn blocked(category: Option<String>) -> Self {
        Self {
            status: GuardrailStatus::Blocked,
            category,
        }
    }

    pub fn is_blocked(&self) -> bool {
        self.status == GuardrailStatus::Blocked
    }

    /// Parses a raw classifier completion. Accepted forms: `ALLOWED`,
    /// `BLOCKED`, `BLOCKED: <category>`; case-insensitive, first line only.
    pub fn parse(raw: &str) -> Result<Self, ClassificationError> {
        let line = raw
            .trim()
            .lines()
            .next()
            .unwrap_or("")
            .trim()
            .trim_matches('"');
        let upper = line.to_uppercase();

        if upper.starts_with("ALLOWED") {
            return Ok(Self::allowed());
        }
        if upper.starts_with("BLOCKED") {
            let category = line
                .splitn(2, ':')
                .nth(1)
                .map(|c| c.trim().to_lowercase())
                .filter(|c| !c.is_empty());
            return Ok(Self::blocked(category));
        }

        Err(ClassificationError::UnexpectedVerdict(line.to_string()))
    }

    /// Rendering used inside the synthesis prompt.
    pub fn prompt_label(&self) -> String {
        match (&self.status, &self.category) {
            (GuardrailStatus::Allowed, _) => "ALLOWED".to_string(),
            (GuardrailStatus::Blocked, Some(category)) => {
                format!("BLOCKED (category: {})", category)
            }
            (GuardrailStatus::Blocked, None) => "BLOCKED".to_string(),
        }
    }
}

/// LLM-prompted safety classifier run over the raw query before synthesis.
pub struct GuardrailClassifier {
    chat_client: Arc<dyn ChatClient>,
    prompt_config: Arc<PromptConfig>,
}

impl GuardrailClassifier {
    pub fn new(chat_client: Arc<dyn ChatClient>, prompt_config: Arc<PromptConfig>) -> Self {
        Self {
            chat_client,
            prompt_config,
        }
    }

    /// Total function of the query text: classification failures fall open
    /// to an uncategorized ALLOWED verdict. Fail-open applies only when the
    /// classifier itself errors; a real BLOCKED verdict is never masked.
    pub async fn classify(&self, query: &str) -> GuardrailVerdict {
        match self.classify_inner(query).await {
            Ok(verdict) => verdict,
            Err(e) => {
                warn!("Guardrail classification failed, allowing query: {}", e);
                GuardrailVerdict::allowed()
            }
        }
    }

    async fn classify_inner(&self, query: &str) -> Result<GuardrailVerdict, ClassificationError> {
        let classification_prompt = prompt::get_guardrail_prompt(&self.prompt_config, query)?;
        let resp = self
            .chat_client
            .complete(&classification_prompt)
            .await
            .map_err(|e| ClassificationError::Model(e.to_string()))?;

        GuardrailVerdict::parse(&resp.response)
    }
}
