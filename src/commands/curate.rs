//! Knowledge-graph curation batch: report near-duplicate entities and merge
//! the ones above the merge threshold.

use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::config::Config;
use crate::curation::{self, BatchLock, CurationOptions, CurationReport, Metric, PairOutcome};
use crate::kg::KnowledgeStore;
use crate::metrics;

pub struct CurateArgs {
    pub metric: String,
    pub threshold: f32,
    pub merge_threshold: f32,
    pub dry_run: bool,
    pub report: Option<PathBuf>,
}

pub async fn run(args: CurateArgs) -> anyhow::Result<()> {
    let config = Config::new();
    let metric: Metric = args.metric.parse()?;

    let store = KnowledgeStore::open(&config)
        .await
        .context("failed to open knowledge store")?;

    // One curation batch at a time per working dir.
    let _lock = BatchLock::acquire(config.curation_lock_path())?;

    if args.dry_run {
        let results = curation::analyze(&store, metric, args.threshold).await?;

        println!("Similar entity pairs found:");
        for (entity_type, similarity) in &results {
            if similarity.pairs.is_empty() {
                println!("\n{}: no similar pairs above threshold", entity_type);
                continue;
            }
            println!("\n{}:", entity_type);
            for pair in &similarity.pairs {
                println!(
                    "- {} <-> {} (similarity: {:.3})",
                    pair.source, pair.target, pair.score
                );
            }
        }
        return Ok(());
    }

    let options = CurationOptions {
        metric,
        report_threshold: args.threshold,
        merge_threshold: args.merge_threshold,
    };
    let report = curation::curate(&store, &options).await?;

    for (entity_type, group) in &report.groups {
        for result in &group.results {
            metrics::record_merge_outcome(result.outcome.as_str());
            match &result.outcome {
                PairOutcome::Merged => println!(
                    "[{}] merged {} into {} ({:.3})",
                    entity_type, result.source, result.target, result.score
                ),
                PairOutcome::Failed { reason } => println!(
                    "[{}] FAILED {} into {} ({:.3}): {}",
                    entity_type, result.source, result.target, result.score, reason
                ),
                PairOutcome::SkippedBelowThreshold => println!(
                    "[{}] reported {} <-> {} ({:.3}), below merge threshold",
                    entity_type, result.source, result.target, result.score
                ),
            }
        }
    }

    println!(
        "\nCuration finished: {} merged, {} failed, {} below merge threshold",
        report.merged_count(),
        report.failed_count(),
        report.skipped_count()
    );

    if let Some(path) = &args.report {
        write_csv_report(&report, path)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        println!("Report written to {}", path.display());
    }

    Ok(())
}

/// Export the per-pair outcomes as CSV.
fn write_csv_report(report: &CurationReport, path: &Path) -> anyhow::Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record([
        "entity_type",
        "source",
        "target",
        "score",
        "outcome",
        "detail",
    ])?;

    for (entity_type, group) in &report.groups {
        for result in &group.results {
            let detail = match &result.outcome {
                PairOutcome::Failed { reason } => reason.as_str(),
                _ => "",
            };
            writer.write_record([
                entity_type.as_str(),
                result.source.as_str(),
                result.target.as_str(),
                &format!("{:.4}", result.score),
                result.outcome.as_str(),
                detail,
            ])?;
        }
    }

    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curation::{GroupReport, PairResult};
    use std::collections::BTreeMap;

    fn sample_report() -> CurationReport {
        let mut groups = BTreeMap::new();
        groups.insert(
            "PERSON".to_string(),
            GroupReport {
                entity_count: 3,
                results: vec![
                    PairResult {
                        source: "A".into(),
                        target: "B".into(),
                        score: 0.95,
                        outcome: PairOutcome::Merged,
                    },
                    PairResult {
                        source: "A".into(),
                        target: "C".into(),
                        score: 0.82,
                        outcome: PairOutcome::SkippedBelowThreshold,
                    },
                    PairResult {
                        source: "B".into(),
                        target: "C".into(),
                        score: 0.91,
                        outcome: PairOutcome::Failed {
                            reason: "source entity not found".into(),
                        },
                    },
                ],
            },
        );

        CurationReport {
            groups,
            metric: Metric::Cosine,
            report_threshold: 0.8,
            merge_threshold: 0.9,
        }
    }

    #[test]
    fn csv_report_has_one_row_per_pair() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.csv");

        write_csv_report(&sample_report(), &path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 4); // header + 3 pairs
        assert!(lines[0].starts_with("entity_type,source,target"));
        assert!(content.contains("merged"));
        assert!(content.contains("skipped_below_threshold"));
        assert!(content.contains("source entity not found"));
    }
}
