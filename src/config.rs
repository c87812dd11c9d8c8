//! Configuration for the RAG assistant
//!
//! Loads configuration from config.yml, with environment variables taking
//! precedence for connection secrets (NEO4J_*, OPENAI_API_KEY, MEM0_*).

use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Default constants (fallback if config.yml not found)
pub const DEFAULT_WORKING_DIR: &str = "data";
pub const DEFAULT_NEO4J_URI: &str = "bolt://localhost:7687";
pub const DEFAULT_NEO4J_DATABASE: &str = "chunk-entity-relation";
pub const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
pub const DEFAULT_USER_ID: &str = "user_andrei";
pub const DEFAULT_SERVER_PORT: u16 = 8001;

/// Curation defaults (reporting vs merge threshold)
pub const DEFAULT_REPORT_THRESHOLD: f32 = 0.8;
pub const DEFAULT_MERGE_THRESHOLD: f32 = 0.9;

/// Lock file guarding a curation batch (created inside the working dir)
pub const CURATION_LOCK_FILE: &str = "curation.lock";

/// YAML config structures
#[derive(Debug, Deserialize)]
struct YamlConfig {
    working_dir: Option<String>,
    server: Option<ServerConfig>,
    neo4j: Option<Neo4jConfig>,
    openai: Option<OpenAIConfig>,
    memory: Option<MemoryConfig>,
    curation: Option<CurationConfig>,
}

#[derive(Debug, Deserialize)]
struct ServerConfig {
    host: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Deserialize)]
struct Neo4jConfig {
    uri: Option<String>,
    username: Option<String>,
    password: Option<String>,
    database: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIConfig {
    model: Option<String>,
    embedding_model: Option<String>,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct MemoryConfig {
    org_id: Option<String>,
    project_id: Option<String>,
    default_user: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CurationConfig {
    metric: Option<String>,
    report_threshold: Option<f32>,
    merge_threshold: Option<f32>,
}

/// Main configuration struct
#[derive(Debug, Clone)]
pub struct Config {
    pub working_dir: PathBuf,
    pub server_host: String,
    pub server_port: u16,
    pub neo4j_uri: String,
    pub neo4j_username: String,
    pub neo4j_password: String,
    pub neo4j_database: String,
    pub chat_model: String,
    pub embedding_model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub mem0_org_id: Option<String>,
    pub mem0_project_id: Option<String>,
    pub default_user: String,
    pub curation_metric: String,
    pub report_threshold: f32,
    pub merge_threshold: f32,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    /// Load from config.yml in the current directory, or fall back to
    /// defaults. Environment variables override connection settings.
    pub fn new() -> Self {
        let yaml = Self::load_yaml("config.yml");
        Self::from_yaml(yaml)
    }

    /// Load from an explicit config path.
    pub fn from_file(path: impl AsRef<Path>) -> Self {
        let yaml = Self::load_yaml(path);
        Self::from_yaml(yaml)
    }

    fn load_yaml(path: impl AsRef<Path>) -> Option<YamlConfig> {
        let content = fs::read_to_string(path).ok()?;
        match serde_yaml::from_str(&content) {
            Ok(cfg) => Some(cfg),
            Err(err) => {
                tracing::warn!("Failed to parse config.yml, using defaults: {}", err);
                None
            }
        }
    }

    fn from_yaml(yaml: Option<YamlConfig>) -> Self {
        let yaml = yaml.unwrap_or(YamlConfig {
            working_dir: None,
            server: None,
            neo4j: None,
            openai: None,
            memory: None,
            curation: None,
        });

        let server = yaml.server;
        let neo4j = yaml.neo4j;
        let openai = yaml.openai;
        let memory = yaml.memory;
        let curation = yaml.curation;

        Self {
            working_dir: PathBuf::from(
                yaml.working_dir
                    .unwrap_or_else(|| DEFAULT_WORKING_DIR.to_string()),
            ),
            server_host: server
                .as_ref()
                .and_then(|s| s.host.clone())
                .unwrap_or_else(|| "0.0.0.0".to_string()),
            server_port: server
                .as_ref()
                .and_then(|s| s.port)
                .unwrap_or(DEFAULT_SERVER_PORT),
            neo4j_uri: env_or(
                "NEO4J_URI",
                neo4j.as_ref().and_then(|n| n.uri.clone()),
                DEFAULT_NEO4J_URI,
            ),
            neo4j_username: env_or(
                "NEO4J_USERNAME",
                neo4j.as_ref().and_then(|n| n.username.clone()),
                "neo4j",
            ),
            neo4j_password: env_or(
                "NEO4J_PASSWORD",
                neo4j.as_ref().and_then(|n| n.password.clone()),
                "password",
            ),
            neo4j_database: env_or(
                "NEO4J_DATABASE",
                neo4j.as_ref().and_then(|n| n.database.clone()),
                DEFAULT_NEO4J_DATABASE,
            ),
            chat_model: openai
                .as_ref()
                .and_then(|o| o.model.clone())
                .unwrap_or_else(|| DEFAULT_CHAT_MODEL.to_string()),
            embedding_model: openai
                .as_ref()
                .and_then(|o| o.embedding_model.clone())
                .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
            max_tokens: openai.as_ref().and_then(|o| o.max_tokens).unwrap_or(1000),
            temperature: openai.as_ref().and_then(|o| o.temperature).unwrap_or(0.2),
            mem0_org_id: env::var("MEM0_ORG_ID")
                .ok()
                .or_else(|| memory.as_ref().and_then(|m| m.org_id.clone())),
            mem0_project_id: env::var("MEM0_PROJECT_ID")
                .ok()
                .or_else(|| memory.as_ref().and_then(|m| m.project_id.clone())),
            default_user: memory
                .as_ref()
                .and_then(|m| m.default_user.clone())
                .unwrap_or_else(|| DEFAULT_USER_ID.to_string()),
            curation_metric: curation
                .as_ref()
                .and_then(|c| c.metric.clone())
                .unwrap_or_else(|| "cosine".to_string()),
            report_threshold: curation
                .as_ref()
                .and_then(|c| c.report_threshold)
                .unwrap_or(DEFAULT_REPORT_THRESHOLD),
            merge_threshold: curation
                .as_ref()
                .and_then(|c| c.merge_threshold)
                .unwrap_or(DEFAULT_MERGE_THRESHOLD),
        }
    }

    /// Path of the curation lock file inside the working directory.
    pub fn curation_lock_path(&self) -> PathBuf {
        self.working_dir.join(CURATION_LOCK_FILE)
    }
}

fn env_or(var: &str, yaml_value: Option<String>, default: &str) -> String {
    env::var(var)
        .ok()
        .or(yaml_value)
        .unwrap_or_else(|| default.to_string())
}
