//! One-shot agent question from the command line.

use anyhow::Context;

use crate::agent::RagAgent;
use crate::config::Config;
use crate::metrics;

pub async fn run(question: &str, user: Option<String>) -> anyhow::Result<()> {
    let config = Config::new();

    let deps = super::build_agent_deps(&config, user)
        .await
        .context("failed to initialize agent dependencies")?;
    let agent = RagAgent::from_config(&config)?;

    let result = agent.run(&deps, question, &[]).await;
    metrics::record_agent_query("cli", result.is_ok());
    let reply = result?;

    println!("\nResponse:");
    println!("{}", reply.answer);
    Ok(())
}
