//! Merge decision and execution over per-type similarity results.
//!
//! Each qualifying pair becomes one independent merge request: the second
//! pair element survives, the first is absorbed. A failed merge is recorded
//! and logged, and the batch moves on — this is best-effort, not a
//! transaction. Scores were computed against a pre-merge snapshot, so a
//! later pair may reference an entity that an earlier merge in the same
//! batch already absorbed; such requests surface as per-pair failures.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tracing::{info, warn};

use super::similarity::{GroupSimilarity, Metric};
use crate::error::Result;
use crate::kg::MergeStrategy;

/// The store operations the curation batch consumes.
#[async_trait]
pub trait CurationStore: Send + Sync {
    /// All entity names known to the graph.
    async fn entity_names(&self) -> Result<Vec<String>>;

    /// Index-aligned entity embedding table: names and matrix rows.
    async fn entity_table(&self) -> Result<(Vec<String>, Vec<Vec<f32>>)>;

    /// Entity type lookup; `None` when the entity or its type is absent.
    async fn entity_type(&self, name: &str) -> Result<Option<String>>;

    /// Fold `sources` into `target` atomically.
    async fn merge_entities(
        &self,
        sources: &[String],
        target: &str,
        strategy: &MergeStrategy,
        target_data: &BTreeMap<String, String>,
    ) -> Result<()>;
}

/// Outcome of one reported pair.
#[derive(Debug, Clone, PartialEq)]
pub enum PairOutcome {
    Merged,
    SkippedBelowThreshold,
    Failed { reason: String },
}

impl PairOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            PairOutcome::Merged => "merged",
            PairOutcome::SkippedBelowThreshold => "skipped_below_threshold",
            PairOutcome::Failed { .. } => "failed",
        }
    }
}

/// One reported pair with its outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct PairResult {
    pub source: String,
    pub target: String,
    pub score: f32,
    pub outcome: PairOutcome,
}

/// Per-type slice of the batch report.
#[derive(Debug, Clone, Default)]
pub struct GroupReport {
    pub entity_count: usize,
    pub results: Vec<PairResult>,
}

/// Typed result of a curation batch: one outcome per reported pair,
/// grouped by entity type.
#[derive(Debug, Clone)]
pub struct CurationReport {
    pub groups: BTreeMap<String, GroupReport>,
    pub metric: Metric,
    pub report_threshold: f32,
    pub merge_threshold: f32,
}

impl CurationReport {
    pub fn merged_count(&self) -> usize {
        self.count(|o| matches!(o, PairOutcome::Merged))
    }

    pub fn failed_count(&self) -> usize {
        self.count(|o| matches!(o, PairOutcome::Failed { .. }))
    }

    pub fn skipped_count(&self) -> usize {
        self.count(|o| matches!(o, PairOutcome::SkippedBelowThreshold))
    }

    fn count(&self, predicate: impl Fn(&PairOutcome) -> bool) -> usize {
        self.groups
            .values()
            .flat_map(|g| &g.results)
            .filter(|r| predicate(&r.outcome))
            .count()
    }
}

/// Submit merge requests for every pair at or above `merge_threshold`.
///
/// Pairs are processed per type in descending-similarity order. Setting
/// `merge_threshold` below the reporting threshold is legal (every reported
/// pair is then submitted) but wasteful.
pub async fn merge_similar_entities<S: CurationStore + ?Sized>(
    store: &S,
    results: &BTreeMap<String, GroupSimilarity>,
    merge_threshold: f32,
) -> CurationReport {
    let strategy = MergeStrategy::default();
    let mut groups = BTreeMap::new();
    let mut metric = Metric::Cosine;
    let mut report_threshold = 0.0;

    for (entity_type, similarity) in results {
        metric = similarity.metric;
        report_threshold = similarity.threshold;

        let mut report = GroupReport {
            entity_count: similarity.entity_names.len(),
            results: Vec::new(),
        };

        for pair in &similarity.pairs {
            if pair.score < merge_threshold {
                report.results.push(PairResult {
                    source: pair.source.clone(),
                    target: pair.target.clone(),
                    score: pair.score,
                    outcome: PairOutcome::SkippedBelowThreshold,
                });
                continue;
            }

            let mut target_data = BTreeMap::new();
            target_data.insert("entity_type".to_string(), entity_type.clone());

            let sources = [pair.source.clone()];
            let outcome = match store
                .merge_entities(&sources, &pair.target, &strategy, &target_data)
                .await
            {
                Ok(()) => {
                    info!("Merged {} into {}", pair.source, pair.target);
                    PairOutcome::Merged
                }
                Err(err) => {
                    warn!(
                        "Error merging {} into {}: {}",
                        pair.source, pair.target, err
                    );
                    PairOutcome::Failed {
                        reason: err.to_string(),
                    }
                }
            };

            report.results.push(PairResult {
                source: pair.source.clone(),
                target: pair.target.clone(),
                score: pair.score,
                outcome,
            });
        }

        groups.insert(entity_type.clone(), report);
    }

    CurationReport {
        groups,
        metric,
        report_threshold,
        merge_threshold,
    }
}
