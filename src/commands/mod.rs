//! CLI command implementations.

pub mod ask;
pub mod curate;
pub mod ingest;
pub mod serve;

use std::sync::Arc;

use crate::agent::AgentDeps;
use crate::config::Config;
use crate::error::Result;
use crate::integrations::Mem0Client;
use crate::kg::KnowledgeStore;

/// Build the agent dependency context: knowledge store + memory client.
/// Created once per process and passed around explicitly.
pub async fn build_agent_deps(config: &Config, user_id: Option<String>) -> Result<Arc<AgentDeps>> {
    let store = Arc::new(KnowledgeStore::open(config).await?);
    let memory = Mem0Client::from_env(config.mem0_org_id.clone(), config.mem0_project_id.clone())?;

    Ok(Arc::new(AgentDeps {
        store,
        memory,
        user_id: user_id.unwrap_or_else(|| config.default_user.clone()),
    }))
}
