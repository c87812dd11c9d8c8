//! Embedding generation: OpenAI with a deterministic local fallback.

use async_openai::{
    config::OpenAIConfig,
    types::{CreateEmbeddingRequestArgs, EmbeddingInput},
    Client as OpenAIClient,
};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Maximum characters sent per text (longer inputs are truncated).
const MAX_EMBED_CHARS: usize = 8000;

/// Embedding backend: OpenAI when an API key is available, otherwise a
/// deterministic local hashing embedder (offline runs and tests).
pub enum Embedder {
    OpenAI { client: OpenAIClient<OpenAIConfig>, model: String },
    Local(LocalEmbedder),
}

impl Embedder {
    /// OpenAI embedder; fails if OPENAI_API_KEY is not set.
    pub fn openai(model: impl Into<String>) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| Error::Config("OPENAI_API_KEY not set".to_string()))?;

        let config = OpenAIConfig::new().with_api_key(api_key);
        Ok(Embedder::OpenAI {
            client: OpenAIClient::with_config(config),
            model: model.into(),
        })
    }

    /// Deterministic local embedder.
    pub fn local(dim: usize) -> Self {
        Embedder::Local(LocalEmbedder::new(dim))
    }

    /// OpenAI if configured, local fallback otherwise.
    pub fn from_env(model: impl Into<String>, local_dim: usize) -> Self {
        match Self::openai(model) {
            Ok(embedder) => {
                info!("Embeddings: using OpenAI backend");
                embedder
            }
            Err(err) => {
                warn!("Embeddings: falling back to local backend ({err})");
                Self::local(local_dim)
            }
        }
    }

    /// Generate embedding for a single text.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let embeddings = self.embed_batch(&[text.to_string()]).await?;
        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| Error::Embedding("no embedding returned".to_string()))
    }

    /// Generate embeddings for multiple texts in one call.
    ///
    /// Empty or whitespace-only texts map to empty vectors so the output
    /// stays index-aligned with the input.
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        match self {
            Embedder::Local(local) => Ok(texts
                .iter()
                .map(|t| {
                    if t.trim().is_empty() {
                        Vec::new()
                    } else {
                        local.embed(t)
                    }
                })
                .collect()),
            Embedder::OpenAI { client, model } => {
                if texts.is_empty() {
                    return Ok(Vec::new());
                }

                debug!("Generating embeddings for {} texts", texts.len());

                let processed: Vec<String> = texts
                    .iter()
                    .map(|t| {
                        let trimmed = t.trim();
                        if trimmed.len() > MAX_EMBED_CHARS {
                            truncate_at_boundary(trimmed, MAX_EMBED_CHARS)
                        } else {
                            trimmed.to_string()
                        }
                    })
                    .filter(|t| !t.is_empty())
                    .collect();

                if processed.is_empty() {
                    return Ok(vec![Vec::new(); texts.len()]);
                }

                let request = CreateEmbeddingRequestArgs::default()
                    .model(model)
                    .input(EmbeddingInput::StringArray(processed))
                    .build()?;

                let response = client.embeddings().create(request).await?;

                info!(
                    "Generated {} embeddings, tokens used: {}",
                    response.data.len(),
                    response.usage.total_tokens
                );

                // Map back to original indices (empty texts get empty vectors)
                let mut result = Vec::with_capacity(texts.len());
                let mut embed_iter = response.data.into_iter();

                for text in texts {
                    if text.trim().is_empty() {
                        result.push(Vec::new());
                    } else if let Some(embed) = embed_iter.next() {
                        result.push(embed.embedding);
                    }
                }

                Ok(result)
            }
        }
    }

    /// Embedding dimension for the backend.
    pub fn dimension(&self) -> usize {
        match self {
            Embedder::OpenAI { model, .. } => match model.as_str() {
                "text-embedding-3-small" => 1536,
                "text-embedding-3-large" => 3072,
                "text-embedding-ada-002" => 1536,
                _ => 1536,
            },
            Embedder::Local(local) => local.dimension(),
        }
    }
}

/// Deterministic, fast embedding for offline/local use.
#[derive(Debug, Clone)]
pub struct LocalEmbedder {
    dim: usize,
}

impl LocalEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(8) }
    }

    pub fn embed(&self, text: &str) -> Vec<f32> {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut vec = vec![0.0f32; self.dim];
        for token in text.split_whitespace() {
            let mut hasher = DefaultHasher::new();
            token.to_lowercase().hash(&mut hasher);
            let idx = (hasher.finish() as usize) % self.dim;
            vec[idx] += 1.0;
        }

        normalize(&mut vec);
        vec
    }

    pub fn dimension(&self) -> usize {
        self.dim
    }
}

/// Truncate at a char boundary at or below `max_bytes`.
fn truncate_at_boundary(text: &str, max_bytes: usize) -> String {
    let mut end = max_bytes;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}

fn normalize(vec: &mut [f32]) {
    let norm = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in vec.iter_mut() {
            *v /= norm;
        }
    }
}
