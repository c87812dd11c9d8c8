//! Per-type pairwise similarity over entity embeddings.
//!
//! Entities are partitioned by type, a full symmetric similarity matrix is
//! computed inside each partition, and the qualifying upper-triangle pairs
//! are reported sorted by score. Entities of different types are never
//! compared.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::kg::UNKNOWN_TYPE;

/// Similarity metric selector.
///
/// Bounded metrics (cosine, correlation, jaccard) convert distance to
/// similarity as `1 - d`, which ranges over [-1, 1] — similarity can be
/// negative and is reported unclamped. Unbounded distance metrics
/// (euclidean, manhattan) use `1 / (1 + d)`, ranging over (0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    Cosine,
    Euclidean,
    Manhattan,
    Correlation,
    Jaccard,
}

impl Metric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Cosine => "cosine",
            Metric::Euclidean => "euclidean",
            Metric::Manhattan => "manhattan",
            Metric::Correlation => "correlation",
            Metric::Jaccard => "jaccard",
        }
    }

    /// Whether the metric's distance is already bounded in [0, 2].
    fn is_bounded(&self) -> bool {
        matches!(self, Metric::Cosine | Metric::Correlation | Metric::Jaccard)
    }

    /// Pairwise distance between two equal-length vectors.
    pub fn distance(&self, a: &[f32], b: &[f32]) -> Result<f32> {
        match self {
            Metric::Cosine => cosine_distance(a, b),
            Metric::Euclidean => Ok(a
                .iter()
                .zip(b)
                .map(|(x, y)| (x - y) * (x - y))
                .sum::<f32>()
                .sqrt()),
            Metric::Manhattan => Ok(a.iter().zip(b).map(|(x, y)| (x - y).abs()).sum()),
            Metric::Correlation => correlation_distance(a, b),
            Metric::Jaccard => Ok(jaccard_distance(a, b)),
        }
    }

    /// Convert a distance into a similarity score.
    pub fn to_similarity(&self, distance: f32) -> f32 {
        if self.is_bounded() {
            1.0 - distance
        } else {
            1.0 / (1.0 + distance)
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_lowercase().as_str() {
            "cosine" => Ok(Metric::Cosine),
            "euclidean" => Ok(Metric::Euclidean),
            "manhattan" => Ok(Metric::Manhattan),
            "correlation" => Ok(Metric::Correlation),
            "jaccard" => Ok(Metric::Jaccard),
            other => Err(Error::InvalidArgument(format!(
                "unknown similarity metric '{}'",
                other
            ))),
        }
    }
}

/// Per-type partition of the entity embedding table.
///
/// The three sequences are index-aligned: `entity_names[i]` has embedding
/// `embeddings[i]` and sat at `indices[i]` in the original table.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingGroup {
    pub entity_names: Vec<String>,
    pub embeddings: Vec<Vec<f32>>,
    pub indices: Vec<usize>,
}

/// Partition entities by type, preserving scan order.
///
/// `names` and `matrix` must be index-aligned; entities without a resolvable
/// type land in the explicit `UNKNOWN` bucket.
pub fn group_embeddings_by_type(
    names: &[String],
    matrix: &[Vec<f32>],
    types: &HashMap<String, String>,
) -> Result<BTreeMap<String, EmbeddingGroup>> {
    if names.len() != matrix.len() {
        return Err(Error::InvalidArgument(format!(
            "embedding table misaligned: {} names vs {} matrix rows",
            names.len(),
            matrix.len()
        )));
    }

    let mut groups: BTreeMap<String, EmbeddingGroup> = BTreeMap::new();

    for (index, (name, vector)) in names.iter().zip(matrix).enumerate() {
        let entity_type = types
            .get(name)
            .map(String::as_str)
            .unwrap_or(UNKNOWN_TYPE)
            .to_string();

        let group = groups.entry(entity_type).or_insert_with(|| EmbeddingGroup {
            entity_names: Vec::new(),
            embeddings: Vec::new(),
            indices: Vec::new(),
        });
        group.entity_names.push(name.clone());
        group.embeddings.push(vector.clone());
        group.indices.push(index);
    }

    Ok(groups)
}

/// Candidate duplicate pair. `source` precedes `target` positionally in the
/// group; on merge, `target` survives and `source` is absorbed.
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityPair {
    pub source: String,
    pub target: String,
    pub score: f32,
}

/// Similarity result for one entity type.
#[derive(Debug, Clone)]
pub struct GroupSimilarity {
    /// Entity names in matrix row/column order
    pub entity_names: Vec<String>,
    /// Full symmetric similarity matrix
    pub matrix: Vec<Vec<f32>>,
    /// Qualifying pairs, sorted by score descending
    pub pairs: Vec<SimilarityPair>,
    /// Provenance: metric and threshold used
    pub metric: Metric,
    pub threshold: f32,
}

/// Compute per-type similarity matrices and qualifying pairs.
///
/// Only the strict upper triangle is scanned for pairs, so there are no
/// self-pairs and no reversed duplicates. The sort is stable: ties keep
/// their upper-triangle scan order.
pub fn compute_similarity(
    groups: &BTreeMap<String, EmbeddingGroup>,
    metric: Metric,
    threshold: f32,
) -> Result<BTreeMap<String, GroupSimilarity>> {
    let mut results = BTreeMap::new();

    for (entity_type, group) in groups {
        let matrix = similarity_matrix(&group.embeddings, metric).map_err(|err| {
            Error::Metric(format!(
                "type '{}' under {} metric: {}",
                entity_type, metric, err
            ))
        })?;

        let n = group.entity_names.len();
        let mut pairs = Vec::new();
        for i in 0..n {
            for j in (i + 1)..n {
                let score = matrix[i][j];
                if score >= threshold {
                    pairs.push(SimilarityPair {
                        source: group.entity_names[i].clone(),
                        target: group.entity_names[j].clone(),
                        score,
                    });
                }
            }
        }

        pairs.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

        results.insert(
            entity_type.clone(),
            GroupSimilarity {
                entity_names: group.entity_names.clone(),
                matrix,
                pairs,
                metric,
                threshold,
            },
        );
    }

    Ok(results)
}

/// Full symmetric similarity matrix over a set of vectors.
fn similarity_matrix(embeddings: &[Vec<f32>], metric: Metric) -> Result<Vec<Vec<f32>>> {
    let n = embeddings.len();

    if let Some(first) = embeddings.first() {
        let dim = first.len();
        if embeddings.iter().any(|v| v.len() != dim) {
            return Err(Error::Metric(
                "embedding dimensionality differs within group".to_string(),
            ));
        }
    }

    let mut matrix = vec![vec![0.0f32; n]; n];
    for i in 0..n {
        for j in i..n {
            let distance = metric.distance(&embeddings[i], &embeddings[j])?;
            let similarity = metric.to_similarity(distance);
            matrix[i][j] = similarity;
            matrix[j][i] = similarity;
        }
    }

    Ok(matrix)
}

fn cosine_distance(a: &[f32], b: &[f32]) -> Result<f32> {
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return Err(Error::Metric(
            "zero-magnitude vector under cosine metric".to_string(),
        ));
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    Ok(1.0 - dot / (norm_a * norm_b))
}

fn correlation_distance(a: &[f32], b: &[f32]) -> Result<f32> {
    let mean = |v: &[f32]| v.iter().sum::<f32>() / v.len().max(1) as f32;
    let (mean_a, mean_b) = (mean(a), mean(b));

    let centered_a: Vec<f32> = a.iter().map(|x| x - mean_a).collect();
    let centered_b: Vec<f32> = b.iter().map(|x| x - mean_b).collect();

    cosine_distance(&centered_a, &centered_b).map_err(|_| {
        Error::Metric("zero-variance vector under correlation metric".to_string())
    })
}

/// Boolean jaccard over non-zero components. An empty union means two
/// all-zero vectors, which count as identical.
fn jaccard_distance(a: &[f32], b: &[f32]) -> f32 {
    let mut union = 0u32;
    let mut disagree = 0u32;

    for (x, y) in a.iter().zip(b) {
        let (nx, ny) = (*x != 0.0, *y != 0.0);
        if nx || ny {
            union += 1;
            if nx != ny {
                disagree += 1;
            }
        }
    }

    if union == 0 {
        0.0
    } else {
        disagree as f32 / union as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn grouping_partitions_by_type_and_preserves_order() {
        let entity_names = names(&["anna schmidt", "müller gmbh", "ben maier"]);
        let matrix = vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![1.0, 1.0]];
        let mut types = HashMap::new();
        types.insert("anna schmidt".to_string(), "PERSON".to_string());
        types.insert("müller gmbh".to_string(), "ORGANIZATION".to_string());
        types.insert("ben maier".to_string(), "PERSON".to_string());

        let groups = group_embeddings_by_type(&entity_names, &matrix, &types).unwrap();

        assert_eq!(groups.len(), 2);
        let persons = &groups["PERSON"];
        assert_eq!(persons.entity_names, names(&["anna schmidt", "ben maier"]));
        assert_eq!(persons.indices, vec![0, 2]);
        assert_eq!(persons.embeddings[1], vec![1.0, 1.0]);
    }

    #[test]
    fn grouping_defaults_missing_type_to_unknown() {
        let entity_names = names(&["mystery"]);
        let matrix = vec![vec![1.0]];
        let groups = group_embeddings_by_type(&entity_names, &matrix, &HashMap::new()).unwrap();

        assert!(groups.contains_key(UNKNOWN_TYPE));
    }

    #[test]
    fn grouping_rejects_misaligned_table() {
        let err =
            group_embeddings_by_type(&names(&["a", "b"]), &[vec![1.0]], &HashMap::new())
                .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn empty_and_singleton_groups_yield_no_pairs() {
        let mut groups = BTreeMap::new();
        groups.insert(
            "PERSON".to_string(),
            EmbeddingGroup {
                entity_names: names(&["only one"]),
                embeddings: vec![vec![1.0, 0.0]],
                indices: vec![0],
            },
        );
        groups.insert(
            "ORGANIZATION".to_string(),
            EmbeddingGroup {
                entity_names: Vec::new(),
                embeddings: Vec::new(),
                indices: Vec::new(),
            },
        );

        let results = compute_similarity(&groups, Metric::Cosine, 0.8).unwrap();

        let singleton = &results["PERSON"];
        assert!(singleton.pairs.is_empty());
        assert_eq!(singleton.matrix.len(), 1);
        assert!((singleton.matrix[0][0] - 1.0).abs() < 1e-6);

        let empty = &results["ORGANIZATION"];
        assert!(empty.pairs.is_empty());
        assert!(empty.matrix.is_empty());
    }

    #[test]
    fn scenario_three_entities_with_known_cosines() {
        // A=[1,0], B at cos 0.95 from A, C at cos 0.82 from A on the other
        // side, so sim(B,C) ≈ 0.60 stays below threshold.
        let group_names = names(&["A", "B", "C"]);
        let sin_b = (1.0f32 - 0.95 * 0.95).sqrt();
        let sin_c = (1.0f32 - 0.82 * 0.82).sqrt();
        let embeddings = vec![
            vec![1.0, 0.0],
            vec![0.95, sin_b],
            vec![0.82, -sin_c],
        ];

        let mut groups = BTreeMap::new();
        groups.insert(
            "PERSON".to_string(),
            EmbeddingGroup {
                entity_names: group_names,
                embeddings,
                indices: vec![0, 1, 2],
            },
        );

        let results = compute_similarity(&groups, Metric::Cosine, 0.8).unwrap();
        let person = &results["PERSON"];

        assert_eq!(person.pairs.len(), 2);
        assert_eq!(person.pairs[0].source, "A");
        assert_eq!(person.pairs[0].target, "B");
        assert!((person.pairs[0].score - 0.95).abs() < 1e-3);
        assert_eq!(person.pairs[1].source, "A");
        assert_eq!(person.pairs[1].target, "C");
        assert!((person.pairs[1].score - 0.82).abs() < 1e-3);

        // pairs above the merge threshold (0.9) would be [(A, B)] only
        let merge_ready: Vec<_> = person.pairs.iter().filter(|p| p.score >= 0.9).collect();
        assert_eq!(merge_ready.len(), 1);
        assert_eq!(merge_ready[0].target, "B");
    }

    #[test]
    fn pairs_only_come_from_strict_upper_triangle() {
        let mut groups = BTreeMap::new();
        groups.insert(
            "CONCEPT".to_string(),
            EmbeddingGroup {
                entity_names: names(&["a", "b", "c"]),
                embeddings: vec![vec![1.0, 0.0], vec![1.0, 0.0], vec![1.0, 0.01]],
                indices: vec![0, 1, 2],
            },
        );

        let results = compute_similarity(&groups, Metric::Cosine, -1.0).unwrap();
        let pairs = &results["CONCEPT"].pairs;

        // exactly n*(n-1)/2 pairs, each with source preceding target
        assert_eq!(pairs.len(), 3);
        let positions: HashMap<&str, usize> =
            results["CONCEPT"].entity_names.iter().enumerate().map(|(i, n)| (n.as_str(), i)).collect();
        for pair in pairs {
            assert!(positions[pair.source.as_str()] < positions[pair.target.as_str()]);
            assert_ne!(pair.source, pair.target);
        }
    }

    #[test]
    fn retained_pairs_respect_threshold_and_order() {
        let mut groups = BTreeMap::new();
        groups.insert(
            "CONCEPT".to_string(),
            EmbeddingGroup {
                entity_names: names(&["w", "x", "y", "z"]),
                embeddings: vec![
                    vec![1.0, 0.0],
                    vec![0.99, 0.141],
                    vec![0.0, 1.0],
                    vec![0.05, 0.9987],
                ],
                indices: vec![0, 1, 2, 3],
            },
        );

        let results = compute_similarity(&groups, Metric::Cosine, 0.8).unwrap();
        let pairs = &results["CONCEPT"].pairs;

        assert!(!pairs.is_empty());
        for pair in pairs {
            assert!(pair.score >= 0.8);
        }
        for window in pairs.windows(2) {
            assert!(window[0].score >= window[1].score);
        }
    }

    #[test]
    fn similarity_is_deterministic() {
        let mut groups = BTreeMap::new();
        groups.insert(
            "LAW".to_string(),
            EmbeddingGroup {
                entity_names: names(&["a", "b", "c"]),
                embeddings: vec![
                    vec![0.3, 0.7, 0.1],
                    vec![0.31, 0.69, 0.12],
                    vec![0.9, 0.0, 0.4],
                ],
                indices: vec![0, 1, 2],
            },
        );

        let first = compute_similarity(&groups, Metric::Cosine, 0.5).unwrap();
        let second = compute_similarity(&groups, Metric::Cosine, 0.5).unwrap();

        assert_eq!(first["LAW"].matrix, second["LAW"].matrix);
        assert_eq!(first["LAW"].pairs, second["LAW"].pairs);
    }

    #[test]
    fn negative_similarities_pass_through_unclamped() {
        let mut groups = BTreeMap::new();
        groups.insert(
            "CONCEPT".to_string(),
            EmbeddingGroup {
                entity_names: names(&["plus", "minus"]),
                embeddings: vec![vec![1.0, 0.0], vec![-1.0, 0.0]],
                indices: vec![0, 1],
            },
        );

        let results = compute_similarity(&groups, Metric::Cosine, 0.0).unwrap();
        let concept = &results["CONCEPT"];

        // opposite vectors: similarity -1, kept in the matrix, not clamped
        assert!((concept.matrix[0][1] + 1.0).abs() < 1e-6);
        assert!(concept.pairs.is_empty());

        let permissive = compute_similarity(&groups, Metric::Cosine, -1.0).unwrap();
        assert_eq!(permissive["CONCEPT"].pairs.len(), 1);
    }

    #[test]
    fn unbounded_metrics_map_distance_into_unit_interval() {
        let a = vec![0.0, 0.0];
        let b = vec![3.0, 4.0];

        // euclidean distance 5 -> 1/(1+5)
        let d = Metric::Euclidean.distance(&a, &b).unwrap();
        assert!((d - 5.0).abs() < 1e-6);
        assert!((Metric::Euclidean.to_similarity(d) - 1.0 / 6.0).abs() < 1e-6);

        // manhattan distance 7 -> 1/8
        let d = Metric::Manhattan.distance(&a, &b).unwrap();
        assert!((d - 7.0).abs() < 1e-6);
        assert!((Metric::Manhattan.to_similarity(d) - 0.125).abs() < 1e-6);

        // identical vectors -> similarity 1 under both conversions
        assert!((Metric::Euclidean.to_similarity(0.0) - 1.0).abs() < 1e-6);
        assert!((Metric::Cosine.to_similarity(0.0) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn jaccard_counts_nonzero_disagreement() {
        let a = vec![1.0, 0.0, 2.0];
        let b = vec![0.0, 0.0, 5.0];

        // union {0, 2}, disagreement {0} -> distance 0.5, similarity 0.5
        let d = Metric::Jaccard.distance(&a, &b).unwrap();
        assert!((d - 0.5).abs() < 1e-6);
        assert!((Metric::Jaccard.to_similarity(d) - 0.5).abs() < 1e-6);

        // two all-zero vectors count as identical
        let zeros = Metric::Jaccard.distance(&[0.0, 0.0], &[0.0, 0.0]).unwrap();
        assert_eq!(zeros, 0.0);
    }

    #[test]
    fn correlation_detects_linear_relationship() {
        let d = Metric::Correlation
            .distance(&[1.0, 2.0, 3.0], &[2.0, 4.0, 6.0])
            .unwrap();
        assert!((Metric::Correlation.to_similarity(d) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn metric_failures_abort_the_group() {
        let mut groups = BTreeMap::new();
        groups.insert(
            "CONCEPT".to_string(),
            EmbeddingGroup {
                entity_names: names(&["flat", "other"]),
                embeddings: vec![vec![1.0, 1.0], vec![2.0, 3.0]],
                indices: vec![0, 1],
            },
        );

        // zero-variance vector under correlation
        let err = compute_similarity(&groups, Metric::Correlation, 0.8).unwrap_err();
        assert!(matches!(err, Error::Metric(_)));

        // zero-magnitude vector under cosine
        let mut zero_groups = BTreeMap::new();
        zero_groups.insert(
            "CONCEPT".to_string(),
            EmbeddingGroup {
                entity_names: names(&["zero", "one"]),
                embeddings: vec![vec![0.0, 0.0], vec![1.0, 0.0]],
                indices: vec![0, 1],
            },
        );
        let err = compute_similarity(&zero_groups, Metric::Cosine, 0.8).unwrap_err();
        assert!(matches!(err, Error::Metric(_)));
    }

    #[test]
    fn mismatched_dimensions_are_rejected() {
        let mut groups = BTreeMap::new();
        groups.insert(
            "CONCEPT".to_string(),
            EmbeddingGroup {
                entity_names: names(&["a", "b"]),
                embeddings: vec![vec![1.0, 0.0], vec![1.0, 0.0, 0.0]],
                indices: vec![0, 1],
            },
        );

        let err = compute_similarity(&groups, Metric::Cosine, 0.8).unwrap_err();
        assert!(matches!(err, Error::Metric(_)));
    }

    #[test]
    fn metric_parsing_round_trips() {
        for metric in [
            Metric::Cosine,
            Metric::Euclidean,
            Metric::Manhattan,
            Metric::Correlation,
            Metric::Jaccard,
        ] {
            assert_eq!(metric.as_str().parse::<Metric>().unwrap(), metric);
        }
        assert!("chebyshev".parse::<Metric>().is_err());
    }

    #[test]
    fn group_types_are_never_mixed() {
        let entity_names = names(&["anna", "anna gmbh"]);
        let matrix = vec![vec![1.0, 0.0], vec![1.0, 0.0]];
        let mut types = HashMap::new();
        types.insert("anna".to_string(), "PERSON".to_string());
        types.insert("anna gmbh".to_string(), "ORGANIZATION".to_string());

        let groups = group_embeddings_by_type(&entity_names, &matrix, &types).unwrap();
        let results = compute_similarity(&groups, Metric::Cosine, 0.0).unwrap();

        // identical vectors, but different types: no cross-type pair
        assert!(results["PERSON"].pairs.is_empty());
        assert!(results["ORGANIZATION"].pairs.is_empty());
    }
}
