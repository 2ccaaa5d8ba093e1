pub mod rerank;
pub mod retriever;

pub use rerank::Reranker;
pub use retriever::HybridRetriever;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::RetrievalError;

/// One scored chunk returned by the hybrid index. Ephemeral: produced per
/// request, never persisted. Provenance fields feed the citation text in the
/// synthesis prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedCandidate {
    pub source_document: String,
    pub page: Option<String>,
    pub score: f32,
    pub content: String,
}

/// Seam between the orchestrator and the external index so the pipeline can
/// be exercised without a live vector store.
#[async_trait]
pub trait DocumentRetriever: Send + Sync {
    /// Hybrid (dense + lexical) search. Candidates scoring below `min_score`
    /// are excluded. An index with no relevant matches yields an empty vec,
    /// not an error.
    async fn search(
        &self,
        query: &str,
        min_score: f32,
    ) -> Result<Vec<RetrievedCandidate>, RetrievalError>;
}
