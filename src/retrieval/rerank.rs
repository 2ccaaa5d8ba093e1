use log::warn;
use std::cmp::Ordering;

use crate::errors::RerankError;
use crate::retrieval::RetrievedCandidate;

/// Second-pass selection over the retriever's candidate set. Only the single
/// best document is forwarded downstream: a smaller, higher-precision
/// synthesis context is preferred over recall here.
pub struct Reranker;

impl Reranker {
    /// Discards malformed candidates, sorts the rest by score descending
    /// (stable: the first-seen candidate wins a tie) and returns the top
    /// one. `None` means "no documents found", a normal outcome rather than
    /// an error.
    pub fn select_best(&self, candidates: Vec<RetrievedCandidate>) -> Option<RetrievedCandidate> {
        let mut valid = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            match validate(&candidate) {
                Ok(()) => valid.push(candidate),
                Err(e) => warn!(
                    "Discarding candidate from '{}': {}",
                    candidate.source_document, e
                ),
            }
        }

        valid.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        valid.into_iter().next()
    }
}

fn validate(candidate: &RetrievedCandidate) -> Result<(), RerankError> {
    if candidate.source_document.trim().is_empty() {
        return Err(RerankError::MissingField("source_document"));
    }
    if candidate.content.trim().is_empty() {
        return Err(RerankError::MissingField("content"));
    }
    if !candidate.score.is_finite() {
        return Err(RerankError::InvalidScore(candidate.score));
    }
    Ok(())
}

/// Citation-ready rendering of the selected document for the synthesis
/// prompt.
pub fn format_selected_document(best: Option<&RetrievedCandidate>) -> String {
    match best {
        None => "No documents found".to_string(),
        Some(doc) => {
            let mut result = format!("Document: {}", doc.source_document);
            if let Some(page) = &doc.page {
                if page != "N/A" {
                    result.push_str(&format!("\nPage: {}", page));
                }
            }
            result.push_str("\n\n");
            result.push_str(&doc.content);
            result
        }
    }
}
