//! Knowledge store façade.
//!
//! Composes the Neo4j graph, the entity/chunk vector indexes and the
//! embedding backend into one store with an ingestion pipeline
//! (chunk -> extract -> embed -> upsert) and mode-based retrieval.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::chunker::{mdhash_id, Chunker, FIELD_SEP};
use super::embeddings::Embedder;
use super::extractor::EntityExtractor;
use super::graph::{EdgeRecord, EntityRecord, GraphStats, GraphStore, MergeStrategy};
use super::vdb::{VectorIndex, VectorRecord};
use crate::config::Config;
use crate::error::{Error, Result};

const ENTITIES_VDB_FILE: &str = "entities_vdb.json";
const CHUNKS_VDB_FILE: &str = "chunks_vdb.json";

/// Retrieval mode, mirroring the classic RAG query modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryMode {
    /// Plain vector search over chunks
    Naive,
    /// Entity-centric: matched entities and their source chunks
    Local,
    /// Relation-centric: edges around matched entities
    Global,
    /// Local + global
    Hybrid,
    /// Vector search + hybrid graph context (default)
    Mix,
}

impl QueryMode {
    /// Map CLI/API string to a mode; unknown values fall back to `Mix`.
    pub fn parse(value: &str) -> Self {
        match value.to_lowercase().as_str() {
            "naive" => QueryMode::Naive,
            "local" => QueryMode::Local,
            "global" => QueryMode::Global,
            "hybrid" => QueryMode::Hybrid,
            _ => QueryMode::Mix,
        }
    }
}

/// Counters returned by a single insert.
#[derive(Debug, Default, Clone, Copy)]
pub struct InsertStats {
    pub chunks: usize,
    pub entities: usize,
    pub relations: usize,
}

/// Full picture of one entity, for exploration tooling.
#[derive(Debug)]
pub struct EntityDetails {
    pub record: EntityRecord,
    pub edges: Vec<EdgeRecord>,
    pub vector: Option<(VectorRecord, Vec<f32>)>,
    pub chunk: Option<VectorRecord>,
}

/// Store-level statistics.
#[derive(Debug)]
pub struct StoreStats {
    pub graph: GraphStats,
    pub entity_vectors: usize,
    pub chunk_vectors: usize,
}

/// Knowledge store: graph + vector indexes + embedder.
pub struct KnowledgeStore {
    graph: GraphStore,
    entities: RwLock<VectorIndex>,
    chunks: RwLock<VectorIndex>,
    embedder: Embedder,
    chunker: Chunker,
    extractor: EntityExtractor,
    working_dir: PathBuf,
}

impl KnowledgeStore {
    /// Connect to the graph, load the vector indexes from the working
    /// directory and initialize the schema.
    pub async fn open(config: &Config) -> Result<Self> {
        std::fs::create_dir_all(&config.working_dir)?;

        let graph = GraphStore::connect(config).await?;
        graph.init_schema().await?;

        let embedder = Embedder::from_env(&config.embedding_model, 256);
        let dim = embedder.dimension();

        let entities = VectorIndex::open(config.working_dir.join(ENTITIES_VDB_FILE), dim)?;
        let chunks = VectorIndex::open(config.working_dir.join(CHUNKS_VDB_FILE), dim)?;

        for (label, index) in [("entity", &entities), ("chunk", &chunks)] {
            if !index.is_empty() && index.dimension() != dim {
                return Err(Error::Config(format!(
                    "{} index dimension {} does not match embedder dimension {}",
                    label,
                    index.dimension(),
                    dim
                )));
            }
        }

        info!(
            "Knowledge store ready: {} entity vectors, {} chunk vectors",
            entities.len(),
            chunks.len()
        );

        Ok(Self {
            graph,
            entities: RwLock::new(entities),
            chunks: RwLock::new(chunks),
            embedder,
            chunker: Chunker::default(),
            extractor: EntityExtractor::new(),
            working_dir: config.working_dir.clone(),
        })
    }

    pub fn working_dir(&self) -> &PathBuf {
        &self.working_dir
    }

    /// Ingest one document: chunk, extract entities/relations, embed, and
    /// upsert everything into the graph and the vector indexes.
    pub async fn insert(&self, source: &str, text: &str) -> Result<InsertStats> {
        if text.trim().is_empty() {
            return Ok(InsertStats::default());
        }

        let chunks = self.chunker.chunk(text, source);
        if chunks.is_empty() {
            return Ok(InsertStats::default());
        }

        let mut stats = InsertStats {
            chunks: chunks.len(),
            ..Default::default()
        };

        let mut entity_rows: Vec<(VectorRecord, String)> = Vec::new();

        for chunk in &chunks {
            let (entities, relations) = self.extractor.extract(chunk);

            for entity in &entities {
                self.graph
                    .upsert_entity(
                        &entity.normalized,
                        &entity.entity_type,
                        &entity.description,
                        &chunk.id,
                    )
                    .await?;

                let content = format!("{}\n{}", entity.name, entity.description);
                entity_rows.push((
                    VectorRecord {
                        id: mdhash_id(&entity.normalized, "ent-"),
                        name: entity.normalized.clone(),
                        content: content.clone(),
                        source_id: chunk.id.clone(),
                        created_at: Utc::now(),
                    },
                    content,
                ));
            }

            for relation in &relations {
                self.graph
                    .upsert_relation(
                        &relation.from,
                        &relation.to,
                        &relation.description,
                        relation.weight as f64,
                    )
                    .await?;
            }

            stats.entities += entities.len();
            stats.relations += relations.len();
        }

        // One embedding batch per concern keeps API calls bounded.
        let chunk_texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let chunk_vectors = self.embedder.embed_batch(&chunk_texts).await?;

        {
            let mut index = self.chunks.write().await;
            for (chunk, vector) in chunks.iter().zip(chunk_vectors) {
                if vector.is_empty() {
                    continue;
                }
                index.upsert(
                    VectorRecord {
                        id: chunk.id.clone(),
                        name: chunk.id.clone(),
                        content: chunk.text.clone(),
                        source_id: chunk.source.clone(),
                        created_at: Utc::now(),
                    },
                    vector,
                )?;
            }
            index.save()?;
        }

        let entity_texts: Vec<String> = entity_rows.iter().map(|(_, text)| text.clone()).collect();
        let entity_vectors = self.embedder.embed_batch(&entity_texts).await?;

        {
            let mut index = self.entities.write().await;
            for ((record, _), vector) in entity_rows.into_iter().zip(entity_vectors) {
                if vector.is_empty() {
                    continue;
                }
                index.upsert(record, vector)?;
            }
            index.save()?;
        }

        debug!(
            "Ingested '{}': {} chunks, {} entity mentions, {} relations",
            source, stats.chunks, stats.entities, stats.relations
        );
        Ok(stats)
    }

    /// Retrieve context for a question under the given mode.
    pub async fn query(&self, question: &str, mode: QueryMode, top_k: usize) -> Result<String> {
        let mut sections: Vec<String> = Vec::new();

        if matches!(mode, QueryMode::Local | QueryMode::Hybrid | QueryMode::Mix) {
            let entities = self.entity_context(question).await?;
            if !entities.is_empty() {
                sections.push(format!("-----Entities-----\n{}", entities.join("\n")));
            }
        }

        if matches!(mode, QueryMode::Global | QueryMode::Hybrid | QueryMode::Mix) {
            let relations = self.relation_context(question).await?;
            if !relations.is_empty() {
                sections.push(format!("-----Relationships-----\n{}", relations.join("\n")));
            }
        }

        if matches!(mode, QueryMode::Naive | QueryMode::Mix) {
            let sources = self.vector_context(question, top_k).await?;
            if !sources.is_empty() {
                sections.push(format!("-----Sources-----\n{}", sources.join("\n")));
            }
        }

        if sections.is_empty() {
            return Ok("No relevant information found in the knowledge base.".to_string());
        }

        Ok(sections.join("\n\n"))
    }

    async fn vector_context(&self, question: &str, top_k: usize) -> Result<Vec<String>> {
        let query_vector = self.embedder.embed(question).await?;
        let index = self.chunks.read().await;
        Ok(index
            .query(&query_vector, top_k)
            .into_iter()
            .map(|(record, score)| {
                format!("- [{} | {:.3}] {}", record.source_id, score, record.content)
            })
            .collect())
    }

    async fn entity_context(&self, question: &str) -> Result<Vec<String>> {
        let mut lines = Vec::new();

        for keyword in self.extractor.extract_keywords(question) {
            let Some(record) = self.graph.get_node(&keyword).await? else {
                continue;
            };

            lines.push(format!(
                "- {} ({}): {}",
                record.entity_id,
                record.entity_type_or_unknown(),
                record.description.as_deref().unwrap_or("no description")
            ));

            // Pull the first originating chunk as supporting text.
            if let Some(chunk_id) = record
                .source_id
                .as_deref()
                .and_then(|s| s.split(FIELD_SEP).next())
            {
                let index = self.chunks.read().await;
                if let Some((chunk, _)) = index.get(chunk_id) {
                    lines.push(format!("  source: {}", chunk.content));
                }
            }
        }

        Ok(lines)
    }

    async fn relation_context(&self, question: &str) -> Result<Vec<String>> {
        let mut lines = Vec::new();

        for keyword in self.extractor.extract_keywords(question) {
            for edge in self.graph.get_node_edges(&keyword).await? {
                lines.push(format_edge(&edge));
            }
        }

        lines.sort();
        lines.dedup();
        Ok(lines)
    }

    /// All entity names known to the graph.
    pub async fn entity_names(&self) -> Result<Vec<String>> {
        self.graph.get_all_entity_names().await
    }

    /// Entity type lookup, `None` when absent.
    pub async fn node_type(&self, name: &str) -> Result<Option<String>> {
        self.graph.get_node_type(name).await
    }

    /// Index-aligned snapshot of the entity embedding table.
    pub async fn entity_vectors(&self) -> Result<(Vec<String>, Vec<Vec<f32>>)> {
        let index = self.entities.read().await;
        let (records, matrix) = index.table();
        Ok((
            records.iter().map(|r| r.name.clone()).collect(),
            matrix.to_vec(),
        ))
    }

    /// Merge source entities into a target: graph transaction first, then
    /// vector-index maintenance (source rows removed, target re-embedded
    /// from the merged description).
    pub async fn merge_entities(
        &self,
        sources: &[String],
        target: &str,
        strategy: &MergeStrategy,
        target_data: &BTreeMap<String, String>,
    ) -> Result<()> {
        self.graph
            .merge_entities(sources, target, strategy, target_data)
            .await?;

        let merged = self.graph.get_node(target).await?;

        let mut index = self.entities.write().await;
        for source in sources {
            index.remove_by_name(source);
        }

        if let Some(record) = merged {
            let content = format!(
                "{}\n{}",
                record.entity_id,
                record.description.as_deref().unwrap_or_default()
            );
            match self.embedder.embed(&content).await {
                Ok(vector) => {
                    index.upsert(
                        VectorRecord {
                            id: mdhash_id(target, "ent-"),
                            name: target.to_string(),
                            content,
                            source_id: record
                                .source_id
                                .as_deref()
                                .and_then(|s| s.split(FIELD_SEP).next())
                                .unwrap_or_default()
                                .to_string(),
                            created_at: Utc::now(),
                        },
                        vector,
                    )?;
                }
                Err(err) => warn!("Could not refresh embedding for '{}': {}", target, err),
            }
        }

        index.save()?;
        Ok(())
    }

    /// Everything known about one entity (exploration tooling).
    pub async fn entity_details(&self, name: &str) -> Result<EntityDetails> {
        let record = self
            .graph
            .get_node(name)
            .await?
            .ok_or_else(|| Error::EntityNotFound(name.to_string()))?;

        let edges = self.graph.get_node_edges(name).await?;

        let entities = self.entities.read().await;
        let vector = entities
            .get(name)
            .map(|(record, row)| (record.clone(), row.to_vec()));

        let chunk = {
            let chunk_id = record
                .source_id
                .as_deref()
                .and_then(|s| s.split(FIELD_SEP).next());
            match chunk_id {
                Some(id) => {
                    let chunks = self.chunks.read().await;
                    chunks.get(id).map(|(record, _)| record.clone())
                }
                None => None,
            }
        };

        Ok(EntityDetails {
            record,
            edges,
            vector,
            chunk,
        })
    }

    /// Store-wide statistics.
    pub async fn stats(&self) -> Result<StoreStats> {
        Ok(StoreStats {
            graph: self.graph.stats().await?,
            entity_vectors: self.entities.read().await.len(),
            chunk_vectors: self.chunks.read().await.len(),
        })
    }
}

fn format_edge(edge: &EdgeRecord) -> String {
    match edge.description.as_deref() {
        Some(description) => format!(
            "- {} -- {}: {} (weight {:.1})",
            edge.from, edge.to, description, edge.weight
        ),
        None => format!("- {} -- {} (weight {:.1})", edge.from, edge.to, edge.weight),
    }
}
