//! Error types for the RAG assistant

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Graph store error: {0}")]
    Graph(String),

    #[error("Vector index error: {0}")]
    VectorIndex(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("OpenAI API error: {0}")]
    OpenAi(String),

    #[error("Memory service error: {0}")]
    Memory(String),

    #[error("Similarity metric error: {0}")]
    Metric(String),

    #[error("Merge of '{source_name}' into '{target}' failed: {reason}")]
    Merge {
        source_name: String,
        target: String,
        reason: String,
    },

    #[error("Entity not found: {0}")]
    EntityNotFound(String),

    #[error("Curation batch is locked by another process")]
    CurationLocked,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<neo4rs::Error> for Error {
    fn from(err: neo4rs::Error) -> Self {
        Error::Graph(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Memory(err.to_string())
    }
}

impl From<async_openai::error::OpenAIError> for Error {
    fn from(err: async_openai::error::OpenAIError) -> Self {
        Error::OpenAi(err.to_string())
    }
}
