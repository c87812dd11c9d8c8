//! Ingest text files into the knowledge store.

use std::path::{Path, PathBuf};

use anyhow::Context;
use futures::future::join_all;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::config::Config;
use crate::kg::KnowledgeStore;
use crate::metrics;

pub async fn run(
    file: Option<PathBuf>,
    directory: Option<PathBuf>,
    pattern: &str,
) -> anyhow::Result<()> {
    let config = Config::new();
    let store = KnowledgeStore::open(&config)
        .await
        .context("failed to open knowledge store")?;

    let files = match (file, directory) {
        (Some(file), None) => vec![file],
        (None, Some(directory)) => collect_files(&directory, pattern),
        _ => anyhow::bail!("pass exactly one of --file or --directory"),
    };

    if files.is_empty() {
        println!("No matching files found");
        return Ok(());
    }

    // Files are processed concurrently; one bad file never aborts the rest.
    let tasks = files.iter().map(|path| process_file(&store, path));
    let results = join_all(tasks).await;

    let succeeded = results.iter().filter(|ok| **ok).count();
    metrics::record_ingested_documents(succeeded as u64);

    println!(
        "Successfully processed {} of {} files",
        succeeded,
        files.len()
    );
    Ok(())
}

async fn process_file(store: &KnowledgeStore, path: &Path) -> bool {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(err) => {
            warn!("Error reading {}: {}", path.display(), err);
            return false;
        }
    };

    match store.insert(&path.display().to_string(), &content).await {
        Ok(stats) => {
            info!(
                "Successfully processed {}: {} chunks, {} entity mentions",
                path.display(),
                stats.chunks,
                stats.entities
            );
            true
        }
        Err(err) => {
            warn!("Error processing {}: {}", path.display(), err);
            false
        }
    }
}

fn collect_files(directory: &Path, pattern: &str) -> Vec<PathBuf> {
    WalkDir::new(directory)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            entry
                .file_name()
                .to_str()
                .map(|name| matches_pattern(name, pattern))
                .unwrap_or(false)
        })
        .map(|entry| entry.into_path())
        .collect()
}

/// Minimal glob matching: literal segments separated by `*`, in order.
fn matches_pattern(name: &str, pattern: &str) -> bool {
    let mut rest = name;
    let segments: Vec<&str> = pattern.split('*').collect();

    for (i, segment) in segments.iter().enumerate() {
        if segment.is_empty() {
            continue;
        }
        match rest.find(segment) {
            Some(pos) => {
                // a leading literal must match at the start
                if i == 0 && pos != 0 {
                    return false;
                }
                rest = &rest[pos + segment.len()..];
            }
            None => return false,
        }
    }

    // a trailing literal must match at the end
    match segments.last() {
        Some(last) if !last.is_empty() => name.ends_with(last),
        _ => true,
    }
}
