//! In-process [`VectorIndexService`] used by tests and local experiments.
//!
//! Search is brute-force cosine similarity over every stored vector.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{
    CreateOutcome, IndexEntry, IndexHandle, IndexServiceError, IndexSpec, ScoredMatch,
    ServiceResult, VectorIndexService,
};

#[derive(Debug, Default)]
struct StoredIndex {
    dimension: usize,
    entries: Vec<IndexEntry>,
}

#[derive(Debug, Default)]
pub struct InMemoryIndexService {
    indexes: Mutex<HashMap<String, StoredIndex>>,
}

impl InMemoryIndexService {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, StoredIndex>> {
        self.indexes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of entries stored in `name`, if it exists
    #[inline]
    pub fn entry_count(&self, name: &str) -> Option<usize> {
        self.lock().get(name).map(|index| index.entries.len())
    }

    /// Stored sentences of `name` in insertion order
    #[inline]
    pub fn sentences(&self, name: &str) -> Vec<String> {
        self.lock()
            .get(name)
            .map(|index| {
                index
                    .entries
                    .iter()
                    .map(|e| e.sentence.as_str().to_string())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn handle(name: &str, index: &StoredIndex) -> IndexHandle {
        IndexHandle {
            name: name.to_string(),
            dimension: index.dimension,
            locator: format!("memory://{}", name),
        }
    }
}

impl VectorIndexService for InMemoryIndexService {
    #[inline]
    fn list_indexes(&self) -> ServiceResult<Vec<String>> {
        let mut names: Vec<String> = self.lock().keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    #[inline]
    fn describe_index(&self, name: &str) -> ServiceResult<IndexHandle> {
        self.lock()
            .get(name)
            .map(|index| Self::handle(name, index))
            .ok_or_else(|| IndexServiceError::NotFound(name.to_string()))
    }

    #[inline]
    fn create_index_if_absent(&self, spec: &IndexSpec) -> ServiceResult<CreateOutcome> {
        if spec.dimension == 0 {
            return Err(IndexServiceError::Rejected(
                "dimension must be positive".to_string(),
            ));
        }

        let mut indexes = self.lock();
        if indexes.contains_key(&spec.name) {
            return Ok(CreateOutcome::AlreadyExists);
        }

        let index = StoredIndex {
            dimension: spec.dimension,
            entries: Vec::new(),
        };
        let handle = Self::handle(&spec.name, &index);
        indexes.insert(spec.name.clone(), index);
        Ok(CreateOutcome::Created(handle))
    }

    #[inline]
    fn delete_index(&self, name: &str) -> ServiceResult<()> {
        self.lock()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| IndexServiceError::NotFound(name.to_string()))
    }

    #[inline]
    fn upsert(&self, handle: &IndexHandle, entries: &[IndexEntry]) -> ServiceResult<usize> {
        let mut indexes = self.lock();
        let index = indexes
            .get_mut(&handle.name)
            .ok_or_else(|| IndexServiceError::NotFound(handle.name.clone()))?;

        if let Some(bad) = entries.iter().find(|e| e.vector.len() != index.dimension) {
            return Err(IndexServiceError::Rejected(format!(
                "vector {} has dimension {}, index expects {}",
                bad.id,
                bad.vector.len(),
                index.dimension
            )));
        }

        for entry in entries {
            match index.entries.iter_mut().find(|e| e.id == entry.id) {
                Some(existing) => *existing = entry.clone(),
                None => index.entries.push(entry.clone()),
            }
        }
        Ok(entries.len())
    }

    #[inline]
    fn query(
        &self,
        handle: &IndexHandle,
        vector: &[f32],
        top_k: usize,
    ) -> ServiceResult<Vec<ScoredMatch>> {
        let indexes = self.lock();
        let index = indexes
            .get(&handle.name)
            .ok_or_else(|| IndexServiceError::NotFound(handle.name.clone()))?;

        if vector.len() != index.dimension {
            return Err(IndexServiceError::Rejected(format!(
                "query has dimension {}, index expects {}",
                vector.len(),
                index.dimension
            )));
        }

        let mut matches: Vec<ScoredMatch> = index
            .entries
            .iter()
            .map(|entry| ScoredMatch {
                id: entry.id.clone(),
                score: cosine_similarity(vector, &entry.vector),
                sentence: entry.sentence.clone(),
            })
            .collect();

        matches.sort_by(|a, b| b.score.total_cmp(&a.score));
        matches.truncate(top_k);
        Ok(matches)
    }
}

/// Cosine similarity in `[-1, 1]`; `0.0` for empty, mismatched or zero vectors.
#[inline]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}
