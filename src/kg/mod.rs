//! Knowledge store: chunking, entity extraction, embeddings, Neo4j graph
//! and JSON vector indexes, composed behind [`store::KnowledgeStore`].
//!
//! The design goals:
//! - deterministic content-hash ids so re-ingestion overwrites, never
//!   duplicates
//! - the entity embedding table stays index-aligned and fully scannable
//!   (the curation engine computes pairwise similarity over it)
//! - optional OpenAI embeddings with a local fallback for offline runs

pub mod chunker;
pub mod embeddings;
pub mod extractor;
pub mod graph;
pub mod store;
pub mod vdb;

pub use chunker::{mdhash_id, Chunk, Chunker, FIELD_SEP};
pub use embeddings::{Embedder, LocalEmbedder};
pub use extractor::{EntityExtractor, ExtractedEntity, ExtractedRelation, UNKNOWN_TYPE};
pub use graph::{
    EdgeRecord, EntityRecord, FieldRule, GraphStats, GraphStore, MergeStrategy,
};
pub use store::{EntityDetails, InsertStats, KnowledgeStore, QueryMode, StoreStats};
pub use vdb::{cosine_similarity, VectorIndex, VectorRecord};
