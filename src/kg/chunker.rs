/// Field separator used inside multi-valued graph properties (source id
/// lists, merged descriptions).
pub const FIELD_SEP: &str = "<SEP>";

/// Compute a deterministic, prefixed content-hash id ("chunk-<md5>",
/// "ent-<md5>", ...). Identical content always maps to the same id, so
/// re-ingesting a document overwrites rather than duplicates.
pub fn mdhash_id(content: &str, prefix: &str) -> String {
    let digest = md5::compute(content.trim().as_bytes());
    format!("{}{:x}", prefix, digest)
}

/// Text chunk produced by the chunker.
#[derive(Debug, Clone)]
pub struct Chunk {
    /// Deterministic content-hash id ("chunk-<md5>")
    pub id: String,
    /// Raw text of the chunk
    pub text: String,
    /// Word index of the first token (for reference)
    pub start: usize,
    /// Word index after the last token (for reference)
    pub end: usize,
    /// Source document label (file path, URL, ...)
    pub source: String,
}

impl Chunk {
    pub fn new(text: String, start: usize, end: usize, source: impl Into<String>) -> Self {
        let id = mdhash_id(&text, "chunk-");
        Self {
            id,
            text,
            start,
            end,
            source: source.into(),
        }
    }
}

/// Word-window chunker with overlap.
#[derive(Debug, Clone)]
pub struct Chunker {
    size: usize,
    overlap: usize,
}

impl Chunker {
    pub fn new(size: usize, overlap: usize) -> Self {
        Self {
            size: size.max(1),
            overlap: overlap.min(size.saturating_sub(1)),
        }
    }

    /// Split text into overlapping word-window chunks.
    pub fn chunk(&self, text: &str, source: impl Into<String>) -> Vec<Chunk> {
        let words: Vec<&str> = text.split_whitespace().collect();
        if words.is_empty() {
            return Vec::new();
        }

        let step = self.size.saturating_sub(self.overlap).max(1);
        let mut chunks = Vec::new();
        let mut idx = 0;
        let source = source.into();

        while idx < words.len() {
            let end = (idx + self.size).min(words.len());
            let chunk_text = words[idx..end].join(" ");
            chunks.push(Chunk::new(chunk_text, idx, end, source.clone()));

            if end == words.len() {
                break;
            }
            idx += step;
        }

        chunks
    }
}

impl Default for Chunker {
    fn default() -> Self {
        Self::new(256, 32)
    }
}
