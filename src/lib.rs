//! HR & German Labor-Law RAG Assistant Library
//!
//! This library provides tools to:
//! - Ingest documents into a knowledge store (Neo4j graph + vector indexes)
//! - Answer HR/labor-law questions via an OpenAI agent with tool calling
//! - Remember per-user personal interests in a hosted memory service
//! - Curate the knowledge graph by merging near-duplicate entities
//! - Serve the agent over HTTP and WebSocket

pub mod agent;
pub mod commands;
pub mod config;
pub mod curation;
pub mod error;
pub mod integrations;
pub mod kg;
pub mod metrics;
pub mod server;
pub mod session;

// Re-export common types
pub use agent::{AgentDeps, AgentReply, RagAgent};
pub use config::Config;
pub use curation::{CurationOptions, CurationReport, Metric};
pub use error::{Error, Result};
pub use integrations::{Mem0Client, MemoryMessage, MemoryRecord};
pub use kg::{KnowledgeStore, QueryMode};
pub use session::{ChatTurn, SessionStore};
