//! Error taxonomy for the query pipeline.
//!
//! Each stage has its own error type so the orchestrator can decide, per
//! stage, whether a failure degrades that stage's output or aborts the
//! request. Only `PersistenceError` on the user-turn write is fatal.

use thiserror::Error;

/// The guardrail failed to produce a verdict. Non-fatal: the classifier
/// falls open to an uncategorized ALLOWED verdict.
#[derive(Debug, Error)]
pub enum ClassificationError {
    #[error("guardrail prompt error: {0}")]
    Prompt(#[from] crate::config::prompt::PromptError),

    #[error("guardrail model call failed: {0}")]
    Model(String),

    #[error("unexpected guardrail verdict: '{0}'")]
    UnexpectedVerdict(String),
}

/// The index was unreachable or the embedding step failed. Non-fatal:
/// synthesis proceeds without retrieved context.
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("query embedding failed: {0}")]
    Embedding(String),

    #[error("hybrid index search failed: {0}")]
    Index(String),
}

/// A candidate payload was malformed. Non-fatal: the candidate is discarded
/// and reranking continues with the rest.
#[derive(Debug, Error)]
pub enum RerankError {
    #[error("candidate is missing required field '{0}'")]
    MissingField(&'static str),

    #[error("candidate carries a non-finite relevance score ({0})")]
    InvalidScore(f32),
}

/// The synthesis model call failed or timed out. The turn still produces a
/// user-visible fallback answer, which is persisted like any other.
#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("synthesis prompt error: {0}")]
    Prompt(#[from] crate::config::prompt::PromptError),

    #[error("synthesis model call failed: {0}")]
    Model(String),

    #[error("synthesis timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("synthesis returned an empty answer")]
    EmptyAnswer,
}

/// The conversation store is unreachable or rejected a write. Fatal when it
/// hits the user-turn or assistant-turn write; surfaced as a request-level
/// failure.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("conversation store unavailable: {0}")]
    Unavailable(String),
}
