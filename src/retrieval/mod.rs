// Retrieval module
// Nearest-ticket lookup for a user query


use std::sync::Arc;
use tracing::{debug, error};

use crate::embeddings::Embedder;
use crate::records::Sentence;
use crate::vector_index::{IndexHandle, VectorIndexService};
use crate::{Result, SupportError};

/// Number of sentences fed into each prompt unless configured otherwise
pub const DEFAULT_TOP_K: usize = 1;

/// Embeds a query and asks the index for its closest sentences
#[derive(Clone)]
pub struct Retriever {
    service: Arc<dyn VectorIndexService>,
    embedder: Arc<dyn Embedder>,
}

impl Retriever {
    #[inline]
    pub fn new(service: Arc<dyn VectorIndexService>, embedder: Arc<dyn Embedder>) -> Self {
        Self { service, embedder }
    }

    /// Up to `k` sentences of `handle` ordered by decreasing similarity to `query`.
    ///
    /// A failing index or embedding backend is an error, never an empty
    /// result: answering from no context would hide the outage.
    #[inline]
    pub fn search(&self, handle: &IndexHandle, query: &str, k: usize) -> Result<Vec<Sentence>> {
        if k == 0 {
            return Err(SupportError::InvalidInput(
                "Number of results must be at least 1".to_string(),
            ));
        }

        let vector = self.embedder.embed_one(query).map_err(|e| {
            error!("Failed to embed query: {:#}", e);
            SupportError::Retrieval(format!("Failed to embed query: {:#}", e))
        })?;

        let matches = self
            .service
            .query(handle, &vector, k)
            .map_err(|e| {
                error!("Query against {} failed: {}", handle.name, e);
                SupportError::Retrieval(format!(
                    "Query against {} failed: {}",
                    handle.name, e
                ))
            })?;

        debug!(
            "Retrieved {} matches from {} (best score {:?})",
            matches.len(),
            handle.name,
            matches.first().map(|m| m.score)
        );

        Ok(matches.into_iter().map(|m| m.sentence).take(k).collect())
    }
}
