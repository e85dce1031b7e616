// Indexer module
// Makes sure the ticket index exists, building it from the source records when needed


use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::embeddings::Embedder;
use crate::records::{MalformedRecordPolicy, RecordSource, Sentence, normalize_all};
use crate::vector_index::{
    CreateOutcome, IndexEntry, IndexHandle, IndexServiceError, IndexSpec, VectorIndexService,
};
use crate::{Result, SupportError};

/// Sentences embedded and upserted per round trip, unless configured otherwise
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Whether an index is created on demand or wiped and rebuilt first
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RebuildMode {
    #[default]
    ReuseExisting,
    ForceRecreate,
}

impl From<bool> for RebuildMode {
    #[inline]
    fn from(force_recreate: bool) -> Self {
        if force_recreate {
            Self::ForceRecreate
        } else {
            Self::ReuseExisting
        }
    }
}

/// Statistics about the last build
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexingStats {
    pub records_read: usize,
    pub records_skipped: usize,
    pub entries_inserted: usize,
}

/// What [`IndexManager::ensure_index`] ended up doing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnsureOutcome {
    /// The index existed and was reused as-is
    Attached(IndexHandle),
    /// The index was created and filled from the source
    Built(IndexHandle, IndexingStats),
}

impl EnsureOutcome {
    #[inline]
    pub fn handle(&self) -> &IndexHandle {
        match self {
            Self::Attached(handle) | Self::Built(handle, _) => handle,
        }
    }

    #[inline]
    pub fn into_handle(self) -> IndexHandle {
        match self {
            Self::Attached(handle) | Self::Built(handle, _) => handle,
        }
    }
}

fn creation_error(action: &str, name: &str, e: &IndexServiceError) -> SupportError {
    error!("Failed to {} index {}: {}", action, name, e);
    SupportError::IndexCreation(format!("Failed to {} index {}: {}", action, name, e))
}

/// Creates or reattaches the vector index backing retrieval
pub struct IndexManager {
    service: Arc<dyn VectorIndexService>,
    embedder: Arc<dyn Embedder>,
    policy: MalformedRecordPolicy,
    batch_size: usize,
    show_progress: bool,
}

impl IndexManager {
    #[inline]
    pub fn new(service: Arc<dyn VectorIndexService>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            service,
            embedder,
            policy: MalformedRecordPolicy::default(),
            batch_size: DEFAULT_BATCH_SIZE,
            show_progress: false,
        }
    }

    #[inline]
    pub fn with_policy(mut self, policy: MalformedRecordPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[inline]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Draw a progress bar on stderr while embedding, when someone is watching
    #[inline]
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Ensure the index `name` exists and return a handle to it.
    ///
    /// An existing index is reused without touching `source` unless `mode`
    /// is [`RebuildMode::ForceRecreate`]. Source records are loaded and
    /// normalized before anything is deleted, so a bad file never leaves the
    /// service without an index. An index whose population fails is removed
    /// again, so the next call rebuilds it instead of attaching to it.
    #[inline]
    pub fn ensure_index(
        &self,
        name: &str,
        source: &dyn RecordSource,
        mode: RebuildMode,
    ) -> Result<EnsureOutcome> {
        let exists = self
            .service
            .index_exists(name)
            .map_err(|e| creation_error("look up", name, &e))?;

        if exists && mode == RebuildMode::ReuseExisting {
            let handle = self
                .service
                .describe_index(name)
                .map_err(|e| creation_error("describe", name, &e))?;
            info!("Attached to existing index {}", name);
            return Ok(EnsureOutcome::Attached(handle));
        }

        info!("Loading records from {}", source.describe());
        let records = source.load()?;
        let sentences = normalize_all(&records, self.policy)?;
        let stats = IndexingStats {
            records_read: records.len(),
            records_skipped: records.len() - sentences.len(),
            entries_inserted: 0,
        };

        if exists {
            warn!("Deleting index {} before rebuilding it", name);
            self.service
                .delete_index(name)
                .map_err(|e| creation_error("delete", name, &e))?;
        }

        let spec = IndexSpec::cosine(name, self.embedder.dimension());
        let handle = match self
            .service
            .create_index_if_absent(&spec)
            .map_err(|e| creation_error("create", name, &e))?
        {
            CreateOutcome::Created(handle) => handle,
            CreateOutcome::AlreadyExists => {
                // Someone else created it between our lookup and create.
                warn!("Index {} appeared concurrently, attaching to it", name);
                let handle = self
                    .service
                    .describe_index(name)
                    .map_err(|e| creation_error("describe", name, &e))?;
                return Ok(EnsureOutcome::Attached(handle));
            }
        };

        let entries_inserted = match self.populate(&handle, &sentences) {
            Ok(inserted) => inserted,
            Err(e) => {
                // A partly filled index would be reattached on the next start.
                warn!("Removing index {} after failed build", name);
                if let Err(cleanup) = self.service.delete_index(name) {
                    warn!("Failed to remove index {}: {}", name, cleanup);
                }
                return Err(e);
            }
        };
        let stats = IndexingStats {
            entries_inserted,
            ..stats
        };

        info!(
            "Built index {} with {} entries ({} records skipped)",
            name, stats.entries_inserted, stats.records_skipped
        );
        Ok(EnsureOutcome::Built(handle, stats))
    }

    fn populate(&self, handle: &IndexHandle, sentences: &[(usize, Sentence)]) -> Result<usize> {
        let bar = if self.show_progress {
            ProgressBar::new(sentences.len() as u64).with_style(
                ProgressStyle::with_template("{spinner} [{pos}/{len}] Embedding tickets")
                    .unwrap_or_else(|_| ProgressStyle::default_bar()),
            )
        } else {
            ProgressBar::hidden()
        };

        let mut inserted = 0;
        for batch in sentences.chunks(self.batch_size) {
            let texts: Vec<String> = batch
                .iter()
                .map(|(_, sentence)| sentence.as_str().to_string())
                .collect();

            let vectors = self.embedder.embed(&texts).map_err(|e| {
                SupportError::Embedding(format!(
                    "Failed to embed {} sentences for {}: {:#}",
                    texts.len(),
                    handle.name,
                    e
                ))
            })?;

            if vectors.len() != batch.len() {
                return Err(SupportError::Embedding(format!(
                    "Expected {} embeddings, got {}",
                    batch.len(),
                    vectors.len()
                )));
            }

            let entries: Vec<IndexEntry> = batch
                .iter()
                .zip(vectors)
                .map(|((row, sentence), vector)| IndexEntry {
                    id: format!("ticket-{}", row),
                    sentence: sentence.clone(),
                    vector,
                })
                .collect();

            inserted += self
                .service
                .upsert(handle, &entries)
                .map_err(|e| creation_error("populate", &handle.name, &e))?;

            debug!("Indexed {} of {} sentences", inserted, sentences.len());
            bar.inc(batch.len() as u64);
        }

        bar.finish_and_clear();
        Ok(inserted)
    }
}
