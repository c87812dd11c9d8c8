//! JSON-persisted vector index.
//!
//! Keeps a record list ("data") and an embedding matrix index-aligned: row
//! `i` of the matrix is the vector of `data[i]`. The whole table is cheap to
//! scan, which the curation engine relies on for pairwise similarity.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// One stored record; its vector lives at the same position in the matrix.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VectorRecord {
    /// Content-hash id ("ent-…", "chunk-…")
    pub id: String,
    /// Entity name or chunk id this row belongs to
    pub name: String,
    /// The text that was embedded (chunk text, or entity name + description)
    pub content: String,
    /// Originating chunk id (for entities) or document source (for chunks)
    pub source_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedIndex {
    dim: usize,
    data: Vec<VectorRecord>,
    matrix: Vec<Vec<f32>>,
}

/// In-memory vector index with JSON persistence.
#[derive(Debug)]
pub struct VectorIndex {
    dim: usize,
    data: Vec<VectorRecord>,
    matrix: Vec<Vec<f32>>,
    path: Option<PathBuf>,
}

impl VectorIndex {
    /// Empty, non-persisted index (tests, ephemeral runs).
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            data: Vec::new(),
            matrix: Vec::new(),
            path: None,
        }
    }

    /// Load an index from disk, or create an empty one bound to `path`.
    pub fn open(path: impl AsRef<Path>, dim: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if path.exists() {
            let content = fs::read_to_string(&path)?;
            let persisted: PersistedIndex = serde_json::from_str(&content)?;
            if persisted.data.len() != persisted.matrix.len() {
                return Err(Error::VectorIndex(format!(
                    "corrupt index {}: {} records vs {} matrix rows",
                    path.display(),
                    persisted.data.len(),
                    persisted.matrix.len()
                )));
            }
            debug!(
                "Loaded vector index {} ({} records)",
                path.display(),
                persisted.data.len()
            );
            Ok(Self {
                dim: persisted.dim,
                data: persisted.data,
                matrix: persisted.matrix,
                path: Some(path),
            })
        } else {
            Ok(Self {
                dim,
                data: Vec::new(),
                matrix: Vec::new(),
                path: Some(path),
            })
        }
    }

    /// Persist to the bound path (no-op for unbound indexes).
    pub fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let persisted = PersistedIndex {
            dim: self.dim,
            data: self.data.clone(),
            matrix: self.matrix.clone(),
        };
        fs::write(path, serde_json::to_string(&persisted)?)?;
        Ok(())
    }

    /// Insert or replace a record by id. The vector must match the index
    /// dimension.
    pub fn upsert(&mut self, record: VectorRecord, vector: Vec<f32>) -> Result<()> {
        if vector.len() != self.dim {
            return Err(Error::VectorIndex(format!(
                "vector for '{}' has dimension {}, index expects {}",
                record.name,
                vector.len(),
                self.dim
            )));
        }

        match self.data.iter().position(|r| r.id == record.id) {
            Some(pos) => {
                self.data[pos] = record;
                self.matrix[pos] = vector;
            }
            None => {
                self.data.push(record);
                self.matrix.push(vector);
            }
        }
        Ok(())
    }

    /// Remove a record (and its matrix row) by name. Returns whether a
    /// record was removed.
    pub fn remove_by_name(&mut self, name: &str) -> bool {
        match self.data.iter().position(|r| r.name == name) {
            Some(pos) => {
                self.data.remove(pos);
                self.matrix.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Record and vector for a name, if present.
    pub fn get(&self, name: &str) -> Option<(&VectorRecord, &[f32])> {
        let pos = self.data.iter().position(|r| r.name == name)?;
        Some((&self.data[pos], self.matrix[pos].as_slice()))
    }

    /// Top-k records by cosine similarity to `query`.
    pub fn query(&self, query: &[f32], top_k: usize) -> Vec<(VectorRecord, f32)> {
        let mut scored: Vec<(VectorRecord, f32)> = self
            .data
            .iter()
            .zip(self.matrix.iter())
            .map(|(record, row)| (record.clone(), cosine_similarity(query, row)))
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        scored
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.dim
    }

    /// Index-aligned views over records and matrix rows.
    pub fn table(&self) -> (&[VectorRecord], &[Vec<f32>]) {
        (&self.data, &self.matrix)
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return 0.0;
    }

    let mut dot = 0.0;
    let mut norm_a = 0.0;
    let mut norm_b = 0.0;

    for (&x, &y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a.sqrt() * norm_b.sqrt())
}
