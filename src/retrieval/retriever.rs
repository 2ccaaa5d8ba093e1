use async_trait::async_trait;
use log::{info, warn};
use serde_json::Value;
use std::error::Error as StdError;
use std::sync::Arc;

use vector_nexus::db::{
    create_vector_store, get_store_type as get_vector_store_type, VectorStore, VectorStoreConfig,
};

use crate::cli::Args;
use crate::errors::RetrievalError;
use crate::llm::embedding::EmbeddingClient;
use crate::retrieval::{DocumentRetriever, RetrievedCandidate};

pub async fn connect_vector_store(
    args: &Args,
) -> Result<Arc<dyn VectorStore>, Box<dyn StdError + Send + Sync>> {
    info!("Connecting to vector store at: {}", args.host);
    let vector_store_type = get_vector_store_type(args.vector_type.as_str())
        .map_err(|e| format!("Failed to get vector store type: {}", e))?;
    let vector_store_config = VectorStoreConfig {
        store_type: vector_store_type,
        host: args.host.clone(),
        api_key: Some(args.secret.clone()),
        tenant: Some(args.tenant.clone()),
        database: Some(args.database.clone()),
        namespace: Some(args.namespace.clone()),
        index_name: Some(args.indexes.clone()),
        user: Some(args.user.clone()),
        pass: Some(args.pass.clone()),
        dimension: Some(args.dimension.clone()),
        metric: Some(args.metric.clone()),
    };
    create_vector_store(vector_store_config.clone()).await
}

/// Queries the index with both dense (vector similarity) and sparse
/// (lexical) signals; the index combines them into one hybrid score and
/// returns a bounded top-K. Failures propagate; there is no automatic retry
/// here.
pub struct HybridRetriever {
    vector_store: Arc<dyn VectorStore>,
    embedding_client: Arc<dyn EmbeddingClient>,
    index: String,
    limit: usize,
}

impl HybridRetriever {
    pub fn new(
        vector_store: Arc<dyn VectorStore>,
        embedding_client: Arc<dyn EmbeddingClient>,
        index: String,
        limit: usize,
    ) -> Self {
        Self {
            vector_store,
            embedding_client,
            index,
            limit,
        }
    }
}

#[async_trait]
impl DocumentRetriever for HybridRetriever {
    async fn search(
        &self,
        query: &str,
        min_score: f32,
    ) -> Result<Vec<RetrievedCandidate>, RetrievalError> {
        let embed_resp = self
            .embedding_client
            .embed(query)
            .await
            .map_err(|e| RetrievalError::Embedding(e.to_string()))?;

        let hits = self
            .vector_store
            .search_hybrid(
                &self.index,
                query,
                &embed_resp.embedding,
                self.limit,
                None,
            )
            .await
            .map_err(|e| RetrievalError::Index(e.to_string()))?;

        let mut candidates = Vec::new();
        for (score, id, payload) in hits {
            match parse_candidate(score, &payload) {
                Some(candidate) => candidates.push(candidate),
                None => warn!("Skipping malformed index payload for hit '{}'", id),
            }
        }

        Ok(filter_by_min_score(candidates, min_score))
    }
}

/// Maps an index payload onto a candidate. The ingester writes
/// `doc_source`/`file_name` for provenance, `page_label`/`page_number` for
/// the page, and `content`/`text` for the chunk body.
pub(crate) fn parse_candidate(score: f32, payload: &Value) -> Option<RetrievedCandidate> {
    let obj = payload.as_object()?;

    let source_document = obj
        .get("doc_source")
        .or_else(|| obj.get("file_name"))
        .and_then(Value::as_str)?
        .to_string();

    let page = obj
        .get("page_label")
        .or_else(|| obj.get("page_number"))
        .map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        });

    let content = obj
        .get("content")
        .or_else(|| obj.get("text"))
        .and_then(Value::as_str)?
        .to_string();

    Some(RetrievedCandidate {
        source_document,
        page,
        score,
        content,
    })
}

pub(crate) fn filter_by_min_score(
    candidates: Vec<RetrievedCandidate>,
    min_score: f32,
) -> Vec<RetrievedCandidate> {
    candidates
        .into_iter()
        .filter(|c| c.score >= min_score)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn candidate(score: f32) -> RetrievedCandidate {
        RetrievedCandidate {
            source_document: "hr_policy.pdf".to_string(),
            page: Some("4".to_string()),
            score,
            content: "chunk".to_string(),
        }
    }

    #[test]
    fn parses_payload_with_provenance() {
        let payload = json!({
            "doc_source": "procurement_policy.pdf",
            "page_label": "12",
            "content": "Purchases over $10,000 require competitive bidding."
        });
        let parsed = parse_candidate(0.82, &payload).unwrap();
        assert_eq!(parsed.source_document, "procurement_policy.pdf");
        assert_eq!(parsed.page.as_deref(), Some("12"));
        assert!((parsed.score - 0.82).abs() < f32::EPSILON);
    }

    #[test]
    fn parses_fallback_field_names() {
        let payload = json!({
            "file_name": "travel.pdf",
            "page_number": 3,
            "text": "Travel must be booked through the portal."
        });
        let parsed = parse_candidate(0.6, &payload).unwrap();
        assert_eq!(parsed.source_document, "travel.pdf");
        assert_eq!(parsed.page.as_deref(), Some("3"));
        assert_eq!(parsed.content, "Travel must be booked through the portal.");
    }

    #[test]
    fn rejects_payload_without_content() {
        let payload = json!({ "doc_source": "x.pdf", "page_label": "1" });
        assert!(parse_candidate(0.9, &payload).is_none());
    }

    #[test]
    fn rejects_non_object_payload() {
        assert!(parse_candidate(0.9, &json!("just a string")).is_none());
    }

    #[test]
    fn min_score_filter_excludes_low_candidates() {
        let filtered = filter_by_min_score(
            vec![candidate(0.92), candidate(0.5), candidate(0.49)],
            0.5,
        );
        let scores: Vec<f32> = filtered.iter().map(|c| c.score).collect();
        assert_eq!(scores, vec![0.92, 0.5]);
    }
}
