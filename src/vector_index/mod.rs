// Vector index module
// Contract for the external similarity-search service plus its implementations

pub mod memory;
pub mod pinecone;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::records::Sentence;

pub use memory::InMemoryIndexService;
pub use pinecone::PineconeClient;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    #[default]
    Cosine,
    Euclidean,
    DotProduct,
}

/// Shape of an index to create
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    pub name: String,
    pub dimension: usize,
    pub metric: Metric,
}

impl IndexSpec {
    #[inline]
    pub fn cosine(name: impl Into<String>, dimension: usize) -> Self {
        Self {
            name: name.into(),
            dimension,
            metric: Metric::Cosine,
        }
    }
}

/// Reference to a live index that queries and upserts go through
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexHandle {
    pub name: String,
    pub dimension: usize,
    /// Where the service serves data-plane requests for this index
    pub locator: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub id: String,
    pub sentence: Sentence,
    pub vector: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredMatch {
    pub id: String,
    pub score: f32,
    pub sentence: Sentence,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    Created(IndexHandle),
    AlreadyExists,
}

#[derive(Debug, Error)]
pub enum IndexServiceError {
    #[error("Index not found: {0}")]
    NotFound(String),

    #[error("Request rejected by index service: {0}")]
    Rejected(String),

    #[error("Index service unavailable: {0}")]
    Unavailable(String),
}

pub type ServiceResult<T> = std::result::Result<T, IndexServiceError>;

/// Operations the pipeline needs from a vector index service.
///
/// `create_index_if_absent` must be atomic on the service side: two callers
/// racing on the same name see exactly one `Created`.
pub trait VectorIndexService: Send + Sync {
    fn list_indexes(&self) -> ServiceResult<Vec<String>>;

    /// Handle for an existing index, `NotFound` when there is none
    fn describe_index(&self, name: &str) -> ServiceResult<IndexHandle>;

    fn create_index_if_absent(&self, spec: &IndexSpec) -> ServiceResult<CreateOutcome>;

    fn delete_index(&self, name: &str) -> ServiceResult<()>;

    /// Insert entries, returning how many the service accepted
    fn upsert(&self, handle: &IndexHandle, entries: &[IndexEntry]) -> ServiceResult<usize>;

    /// Nearest entries to `vector`, most similar first
    fn query(
        &self,
        handle: &IndexHandle,
        vector: &[f32],
        top_k: usize,
    ) -> ServiceResult<Vec<ScoredMatch>>;

    #[inline]
    fn index_exists(&self, name: &str) -> ServiceResult<bool> {
        Ok(self.list_indexes()?.iter().any(|n| n == name))
    }
}
