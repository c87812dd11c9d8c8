//! Knowledge-graph curation: find near-duplicate entities per type and fold
//! them together through the store's merge operation.
//!
//! The batch runs in three stages:
//! 1. group the entity embedding table by type ([`group_embeddings_by_type`])
//! 2. compute per-type similarity matrices and qualifying pairs
//!    ([`compute_similarity`])
//! 3. submit one merge request per pair above the merge threshold
//!    ([`merge_similar_entities`]), collecting a typed [`CurationReport`]
//!
//! One logical task drives the whole batch sequentially; a file lock keeps
//! two curation processes from mutating the same store.

pub mod merge;
pub mod similarity;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs::{File, OpenOptions};
use std::path::Path;

use async_trait::async_trait;
use fs2::FileExt;
use tracing::{debug, info};

pub use merge::{
    merge_similar_entities, CurationReport, CurationStore, GroupReport, PairOutcome, PairResult,
};
pub use similarity::{
    compute_similarity, group_embeddings_by_type, EmbeddingGroup, GroupSimilarity, Metric,
    SimilarityPair,
};

use crate::config::{DEFAULT_MERGE_THRESHOLD, DEFAULT_REPORT_THRESHOLD};
use crate::error::{Error, Result};
use crate::kg::{KnowledgeStore, MergeStrategy};

/// Batch parameters with the standard defaults.
#[derive(Debug, Clone)]
pub struct CurationOptions {
    pub metric: Metric,
    pub report_threshold: f32,
    pub merge_threshold: f32,
}

impl Default for CurationOptions {
    fn default() -> Self {
        Self {
            metric: Metric::Cosine,
            report_threshold: DEFAULT_REPORT_THRESHOLD,
            merge_threshold: DEFAULT_MERGE_THRESHOLD,
        }
    }
}

/// Stage 1 + 2: fetch the embedding table, group by type, compute
/// similarity. Read-only — nothing is mutated before this returns, so a
/// metric failure aborts the batch cleanly.
pub async fn analyze<S: CurationStore + ?Sized>(
    store: &S,
    metric: Metric,
    report_threshold: f32,
) -> Result<BTreeMap<String, GroupSimilarity>> {
    let known: HashSet<String> = store.entity_names().await?.into_iter().collect();
    let (names, matrix) = store.entity_table().await?;

    // Keep only table rows whose entity still exists in the graph,
    // preserving scan order.
    let mut kept_names = Vec::new();
    let mut kept_rows = Vec::new();
    for (name, row) in names.into_iter().zip(matrix) {
        if known.contains(&name) {
            kept_names.push(name);
            kept_rows.push(row);
        }
    }

    let mut types = HashMap::new();
    for name in &kept_names {
        if let Some(entity_type) = store.entity_type(name).await? {
            types.insert(name.clone(), entity_type);
        }
    }

    let groups = group_embeddings_by_type(&kept_names, &kept_rows, &types)?;
    for (entity_type, group) in &groups {
        debug!("{}: {} entities", entity_type, group.entity_names.len());
    }

    compute_similarity(&groups, metric, report_threshold)
}

/// Full batch: analyze, then submit merges for qualifying pairs.
pub async fn curate<S: CurationStore + ?Sized>(
    store: &S,
    options: &CurationOptions,
) -> Result<CurationReport> {
    let results = analyze(store, options.metric, options.report_threshold).await?;

    let reported: usize = results.values().map(|r| r.pairs.len()).sum();
    info!(
        "Curation: {} candidate pairs across {} types (metric {}, threshold {})",
        reported,
        results.len(),
        options.metric,
        options.report_threshold
    );

    Ok(merge_similar_entities(store, &results, options.merge_threshold).await)
}

#[async_trait]
impl CurationStore for KnowledgeStore {
    async fn entity_names(&self) -> Result<Vec<String>> {
        KnowledgeStore::entity_names(self).await
    }

    async fn entity_table(&self) -> Result<(Vec<String>, Vec<Vec<f32>>)> {
        self.entity_vectors().await
    }

    async fn entity_type(&self, name: &str) -> Result<Option<String>> {
        self.node_type(name).await
    }

    async fn merge_entities(
        &self,
        sources: &[String],
        target: &str,
        strategy: &MergeStrategy,
        target_data: &BTreeMap<String, String>,
    ) -> Result<()> {
        KnowledgeStore::merge_entities(self, sources, target, strategy, target_data).await
    }
}

/// File lock guarding a curation batch against parallel runs.
pub struct BatchLock {
    lock_file: Option<File>,
}

impl BatchLock {
    /// Acquire an exclusive lock, failing fast if another batch holds it.
    pub fn acquire(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let lock_file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        match lock_file.try_lock_exclusive() {
            Ok(()) => Ok(Self {
                lock_file: Some(lock_file),
            }),
            Err(_) => Err(Error::CurationLocked),
        }
    }

    /// Release the lock manually.
    pub fn release(&mut self) {
        if let Some(ref file) = self.lock_file {
            let _ = fs2::FileExt::unlock(file);
        }
        self.lock_file = None;
    }
}

impl Drop for BatchLock {
    fn drop(&mut self) {
        self.release();
    }
}
