//! Integration tests for the hr_rag_agent library
//!
//! These tests verify the public API and module interactions.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;

use hr_rag_agent::{
    config::{Config, DEFAULT_MERGE_THRESHOLD, DEFAULT_REPORT_THRESHOLD},
    curation::{
        self, CurationOptions, CurationStore, Metric, PairOutcome,
    },
    error::{Error, Result},
    kg::{mdhash_id, Chunker, EntityExtractor, MergeStrategy, VectorIndex, VectorRecord},
    session::{ChatTurn, SessionStore},
};

// ============================================================================
// Config Tests
// ============================================================================

#[test]
fn test_config_defaults() {
    let config = Config::from_file("definitely_not_here.yml");
    assert_eq!(config.curation_metric, "cosine");
    assert!((config.report_threshold - DEFAULT_REPORT_THRESHOLD).abs() < f32::EPSILON);
    assert!((config.merge_threshold - DEFAULT_MERGE_THRESHOLD).abs() < f32::EPSILON);
    assert!(config.merge_threshold >= config.report_threshold);
}

#[test]
fn test_config_lock_path_is_inside_working_dir() {
    let config = Config::from_file("definitely_not_here.yml");
    assert!(config.curation_lock_path().starts_with(&config.working_dir));
}

// ============================================================================
// Error Tests
// ============================================================================

#[test]
fn test_error_variants_display() {
    let errors = vec![
        Error::Config("bad config".into()),
        Error::Graph("bolt refused".into()),
        Error::VectorIndex("misaligned".into()),
        Error::Metric("zero-magnitude vector".into()),
        Error::Memory("401".into()),
        Error::OpenAi("rate limit".into()),
        Error::CurationLocked,
        Error::InvalidArgument("bad arg".into()),
    ];

    for error in errors {
        assert!(!error.to_string().is_empty());
    }
}

#[test]
fn test_merge_error_names_both_entities() {
    let error = Error::Merge {
        source_name: "bgb".into(),
        target: "§ 622 bgb".into(),
        reason: "gone".into(),
    };
    let msg = error.to_string();
    assert!(msg.contains("bgb"));
    assert!(msg.contains("§ 622 bgb"));
}

// ============================================================================
// Chunker / Extractor Tests
// ============================================================================

#[test]
fn test_chunker_ids_are_stable_across_runs() {
    let chunker = Chunker::new(16, 2);
    let text = "Die gesetzliche Kündigungsfrist beträgt vier Wochen zum Fünfzehnten \
                oder zum Ende eines Kalendermonats.";

    let first = chunker.chunk(text, "doc");
    let second = chunker.chunk(text, "doc");

    assert_eq!(first.len(), second.len());
    for (a, b) in first.iter().zip(&second) {
        assert_eq!(a.id, b.id);
    }
}

#[test]
fn test_extractor_finds_statutes_in_real_prose() {
    let extractor = EntityExtractor::new();
    let chunker = Chunker::new(64, 0);
    let chunks = chunker.chunk(
        "Nach § 622 BGB beträgt die Kündigungsfrist in der Probezeit zwei Wochen. \
         Das Kündigungsschutzgesetz gilt erst nach sechs Monaten.",
        "handbook",
    );

    let (entities, relations) = extractor.extract(&chunks[0]);

    assert!(entities.iter().any(|e| e.entity_type == "LAW" && e.name == "§ 622 BGB"));
    assert!(entities
        .iter()
        .any(|e| e.name == "Kündigungsschutzgesetz" && e.entity_type == "LAW"));
    assert!(!relations.is_empty());
}

// ============================================================================
// Vector Index Tests
// ============================================================================

#[test]
fn test_vector_index_survives_reload() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("entities_vdb.json");

    {
        let mut index = VectorIndex::open(&path, 4).unwrap();
        index
            .upsert(
                VectorRecord {
                    id: mdhash_id("probezeit", "ent-"),
                    name: "probezeit".into(),
                    content: "probezeit".into(),
                    source_id: "chunk-abc".into(),
                    created_at: chrono::Utc::now(),
                },
                vec![0.1, 0.2, 0.3, 0.4],
            )
            .unwrap();
        index.save().unwrap();
    }

    let reloaded = VectorIndex::open(&path, 4).unwrap();
    let (record, vector) = reloaded.get("probezeit").unwrap();
    assert_eq!(record.source_id, "chunk-abc");
    assert_eq!(vector, &[0.1, 0.2, 0.3, 0.4]);
}

// ============================================================================
// Curation Pipeline Tests
// ============================================================================

/// Store backed by fixed in-memory tables, recording merge requests.
struct FixtureStore {
    names: Vec<String>,
    matrix: Vec<Vec<f32>>,
    types: HashMap<String, String>,
    fail_pairs: Vec<(String, String)>,
    merges: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl CurationStore for FixtureStore {
    async fn entity_names(&self) -> Result<Vec<String>> {
        Ok(self.names.clone())
    }

    async fn entity_table(&self) -> Result<(Vec<String>, Vec<Vec<f32>>)> {
        Ok((self.names.clone(), self.matrix.clone()))
    }

    async fn entity_type(&self, name: &str) -> Result<Option<String>> {
        Ok(self.types.get(name).cloned())
    }

    async fn merge_entities(
        &self,
        sources: &[String],
        target: &str,
        _strategy: &MergeStrategy,
        _target_data: &BTreeMap<String, String>,
    ) -> Result<()> {
        if self
            .fail_pairs
            .iter()
            .any(|(s, t)| s == &sources[0] && t == target)
        {
            return Err(Error::Merge {
                source_name: sources[0].clone(),
                target: target.to_string(),
                reason: "entity already absorbed".into(),
            });
        }
        self.merges
            .lock()
            .unwrap()
            .push((sources[0].clone(), target.to_string()));
        Ok(())
    }
}

fn three_person_store(fail_pairs: &[(&str, &str)]) -> FixtureStore {
    // A and B nearly identical, C close to A but below the merge threshold.
    let sin_b = (1.0f32 - 0.95 * 0.95).sqrt();
    let sin_c = (1.0f32 - 0.82 * 0.82).sqrt();
    let names = vec!["A".to_string(), "B".to_string(), "C".to_string()];

    FixtureStore {
        types: names
            .iter()
            .map(|n| (n.clone(), "PERSON".to_string()))
            .collect(),
        names,
        matrix: vec![
            vec![1.0, 0.0],
            vec![0.95, sin_b],
            vec![0.82, -sin_c],
        ],
        fail_pairs: fail_pairs
            .iter()
            .map(|(s, t)| (s.to_string(), t.to_string()))
            .collect(),
        merges: Mutex::new(Vec::new()),
    }
}

#[tokio::test]
async fn test_curate_merges_above_threshold_only() {
    let store = three_person_store(&[]);
    let report = curation::curate(&store, &CurationOptions::default())
        .await
        .unwrap();

    assert_eq!(report.merged_count(), 1);
    assert_eq!(report.skipped_count(), 1);
    assert_eq!(report.failed_count(), 0);

    let merges = store.merges.lock().unwrap();
    assert_eq!(*merges, vec![("A".to_string(), "B".to_string())]);
}

#[tokio::test]
async fn test_failed_merge_is_isolated() {
    let store = three_person_store(&[("A", "B")]);
    let options = CurationOptions {
        merge_threshold: 0.8, // both reported pairs qualify for merging
        ..Default::default()
    };

    let report = curation::curate(&store, &options).await.unwrap();

    assert_eq!(report.failed_count(), 1);
    assert_eq!(report.merged_count(), 1);

    let person = &report.groups["PERSON"];
    assert!(person
        .results
        .iter()
        .any(|r| matches!(r.outcome, PairOutcome::Failed { .. })));
}

#[tokio::test]
async fn test_analyze_reports_sorted_pairs() {
    let store = three_person_store(&[]);
    let results = curation::analyze(&store, Metric::Cosine, 0.8).await.unwrap();

    let person = &results["PERSON"];
    assert_eq!(person.pairs.len(), 2);
    assert!(person.pairs[0].score >= person.pairs[1].score);
    assert!((person.pairs[0].score - 0.95).abs() < 1e-3);
}

#[tokio::test]
async fn test_unsupported_metric_string_is_rejected() {
    let err = "hamming".parse::<Metric>().unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
}

// ============================================================================
// Session Store Tests
// ============================================================================

#[test]
fn test_session_store_keeps_per_session_history() {
    let store = SessionStore::default();
    store.append("alpha", &[ChatTurn::user("Hallo")]);
    store.append("beta", &[ChatTurn::user("Servus"), ChatTurn::assistant("Hi")]);

    assert_eq!(store.history("alpha").len(), 1);
    assert_eq!(store.history("beta").len(), 2);
    assert_eq!(store.len(), 2);
}
