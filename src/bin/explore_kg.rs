//! Knowledge-store exploration script.
//!
//! Prints one entity's graph node, relations, embedding row and originating
//! chunk — handy for eyeballing what ingestion and curation actually wrote.

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use hr_rag_agent::config::Config;
use hr_rag_agent::kg::KnowledgeStore;

#[derive(Parser)]
#[command(name = "explore_kg")]
#[command(about = "Inspect entities in the knowledge store")]
struct Cli {
    /// Entity to inspect (defaults to the first entity in the store)
    #[arg(long)]
    entity: Option<String>,

    /// Print store statistics only
    #[arg(long, default_value_t = false)]
    stats: bool,

    /// How many relations to display
    #[arg(long, default_value_t = 10)]
    relations: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("hr_rag_agent=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::new();
    let store = KnowledgeStore::open(&config).await?;

    if cli.stats {
        let stats = store.stats().await?;
        println!("Entities:        {}", stats.graph.entity_count);
        println!("Relations:       {}", stats.graph.relation_count);
        println!("Entity vectors:  {}", stats.entity_vectors);
        println!("Chunk vectors:   {}", stats.chunk_vectors);
        return Ok(());
    }

    let entity = match cli.entity {
        Some(entity) => entity,
        None => {
            let names = store.entity_names().await?;
            match names.into_iter().next() {
                Some(first) => first,
                None => {
                    println!("The knowledge graph is empty. Ingest documents first.");
                    return Ok(());
                }
            }
        }
    };

    info!("Inspecting entity '{}'", entity);
    let details = store.entity_details(&entity).await?;

    println!("=== {} ===", details.record.entity_id);
    println!("type:        {}", details.record.entity_type_or_unknown());
    println!(
        "description: {}",
        details.record.description.as_deref().unwrap_or("(none)")
    );
    println!(
        "source_id:   {}",
        details.record.source_id.as_deref().unwrap_or("(none)")
    );

    println!("\nRelations ({} total):", details.edges.len());
    for edge in details.edges.iter().take(cli.relations) {
        println!(
            "- {} -- {} (weight {:.1})",
            edge.from, edge.to, edge.weight
        );
    }

    match &details.vector {
        Some((record, row)) => {
            let preview: Vec<String> = row.iter().take(8).map(|v| format!("{:.4}", v)).collect();
            println!(
                "\nEmbedding: {} dims, id {}\n[{}, ...]",
                row.len(),
                record.id,
                preview.join(", ")
            );
        }
        None => println!("\nEmbedding: none stored"),
    }

    match &details.chunk {
        Some(chunk) => println!(
            "\nSource chunk ({}):\n{}",
            chunk.source_id,
            truncate(&chunk.content.replace('\n', " "), 240)
        ),
        None => println!("\nSource chunk: not found"),
    }

    Ok(())
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        format!("{}...", s.chars().take(max_len).collect::<String>())
    }
}
