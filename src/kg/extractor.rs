use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

use super::chunker::Chunk;

/// Entity type assigned when no heuristic matches.
pub const UNKNOWN_TYPE: &str = "UNKNOWN";

/// Statute reference, e.g. "§ 622 BGB" or "§§ 74 HGB".
static STATUTE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"§§?\s*\d+[a-z]?(?:\s+Abs\.\s*\d+)?\s+[A-ZÄÖÜ][A-Za-zÄÖÜäöüß]{1,30}")
        .expect("statute regex is valid")
});

/// Legal-form suffixes marking a company name.
const ORG_SUFFIXES: &[&str] = &["GmbH", "AG", "e.V.", "SE", "KG", "KGaA", "mbH", "UG"];

/// Named entity found in text, typed by heuristic.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedEntity {
    /// Original surface form
    pub name: String,
    /// Normalized form used as graph key
    pub normalized: String,
    /// Entity type label (PERSON, ORGANIZATION, LAW, CONCEPT, UNKNOWN)
    pub entity_type: String,
    /// Short description: the sentence-sized window around the mention
    pub description: String,
    /// Chunk where the entity was found
    pub chunk_id: String,
    /// Word position inside chunk
    pub position: usize,
}

/// Relation between entities (co-occurrence within a chunk).
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedRelation {
    pub from: String,
    pub to: String,
    pub description: String,
    pub weight: f32,
}

/// Heuristic entity extractor — no network calls.
///
/// Recognizes German statute references (LAW), company names by legal-form
/// suffix (ORGANIZATION), capitalized multi-word spans (PERSON), and single
/// capitalized domain terms (CONCEPT).
#[derive(Debug, Default, Clone)]
pub struct EntityExtractor {
    stopwords: HashSet<String>,
}

impl EntityExtractor {
    pub fn new() -> Self {
        let mut stopwords = HashSet::new();
        for w in [
            "and", "or", "but", "the", "a", "an", "of", "in", "on", "for", "to", "with", "der",
            "die", "das", "und", "oder", "ein", "eine", "bei", "nach", "gilt", "laut", "wird",
            "sind", "ist", "vom", "zum", "zur", "den", "dem", "des", "wie", "was", "wann",
        ] {
            stopwords.insert(w.to_string());
        }
        Self { stopwords }
    }

    /// Extract typed entities and co-occurrence relations from a chunk.
    pub fn extract(&self, chunk: &Chunk) -> (Vec<ExtractedEntity>, Vec<ExtractedRelation>) {
        let mut entities = Vec::new();
        let mut seen = HashSet::new();

        for m in STATUTE_RE.find_iter(&chunk.text) {
            let name = normalize_whitespace(m.as_str());
            let position = chunk.text[..m.start()].split_whitespace().count();
            if seen.insert(name.clone()) {
                entities.push(ExtractedEntity {
                    normalized: name.clone(),
                    name,
                    entity_type: "LAW".to_string(),
                    description: window_around(&chunk.text, position, 12),
                    chunk_id: chunk.id.clone(),
                    position,
                });
            }
        }

        for mut span in capitalized_spans(&chunk.text) {
            // Sentence-initial articles ("Die Kündigungsfrist") glue onto the
            // span; strip leading stopwords before classification.
            while let Some(first) = span.words.first() {
                if self.stopwords.contains(&first.to_lowercase()) {
                    span.words.remove(0);
                    span.position += 1;
                } else {
                    break;
                }
            }
            if span.words.is_empty() {
                continue;
            }

            let name = span.words.join(" ");
            if STATUTE_RE.is_match(&name) {
                continue; // already handled above
            }
            let normalized = normalize_key(&name);
            if normalized.len() < 3 || self.stopwords.contains(&normalized) {
                continue;
            }
            if !seen.insert(normalized.clone()) {
                continue;
            }

            let entity_type = classify_span(&span.words);
            entities.push(ExtractedEntity {
                name,
                normalized,
                entity_type: entity_type.to_string(),
                description: window_around(&chunk.text, span.position, 12),
                chunk_id: chunk.id.clone(),
                position: span.position,
            });
        }

        entities.sort_by_key(|e| e.position);

        // Co-occurrence relations between neighboring entities
        let mut relations = Vec::new();
        for pair in entities.windows(2) {
            if let [a, b] = pair {
                relations.push(ExtractedRelation {
                    from: a.normalized.clone(),
                    to: b.normalized.clone(),
                    description: format!("{} and {} appear in the same passage", a.name, b.name),
                    weight: 1.0,
                });
            }
        }

        (entities, relations)
    }

    /// Extract normalized entity keys from free text (used for queries).
    pub fn extract_keywords(&self, text: &str) -> Vec<String> {
        let dummy = Chunk::new(
            text.to_string(),
            0,
            text.split_whitespace().count(),
            "query",
        );
        let (entities, _) = self.extract(&dummy);
        entities
            .into_iter()
            .map(|e| e.normalized)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect()
    }
}

struct Span {
    words: Vec<String>,
    position: usize,
}

/// Group consecutive capitalized tokens into spans.
fn capitalized_spans(text: &str) -> Vec<Span> {
    let mut spans = Vec::new();
    let mut current: Option<Span> = None;

    for (idx, raw_token) in text.split_whitespace().enumerate() {
        let token = raw_token.trim_matches(|c: char| !c.is_alphanumeric() && c != '.' && c != '§');
        // Keep internal dots ("e.V.") but drop a plain trailing period.
        let token = if token.ends_with('.') && token.chars().filter(|c| *c == '.').count() == 1 {
            &token[..token.len() - 1]
        } else {
            token
        };
        let is_candidate = token.len() >= 2
            && token
                .chars()
                .next()
                .map(|c| c.is_uppercase())
                .unwrap_or(false);

        if is_candidate {
            match current.as_mut() {
                Some(span) => span.words.push(token.to_string()),
                None => {
                    current = Some(Span {
                        words: vec![token.to_string()],
                        position: idx,
                    })
                }
            }
        } else if let Some(span) = current.take() {
            spans.push(span);
        }
    }

    if let Some(span) = current.take() {
        spans.push(span);
    }

    spans
}

fn classify_span(words: &[String]) -> &'static str {
    if words
        .iter()
        .any(|w| ORG_SUFFIXES.contains(&w.trim_end_matches(',')))
    {
        return "ORGANIZATION";
    }

    let last = words.last().map(String::as_str).unwrap_or_default();
    let lowered = last.to_lowercase();
    if lowered.ends_with("gesetz") || lowered.ends_with("verordnung") || is_law_acronym(last) {
        return "LAW";
    }

    match words.len() {
        1 => "CONCEPT",
        2..=4 => "PERSON",
        _ => UNKNOWN_TYPE,
    }
}

/// Acronyms like BGB, KSchG, ArbZG: short tokens with 2+ uppercase letters.
fn is_law_acronym(token: &str) -> bool {
    let uppercase = token.chars().filter(|c| c.is_uppercase()).count();
    (2..=6).contains(&token.len()) && uppercase >= 2 && token.chars().all(|c| c.is_alphabetic())
}

fn normalize_key(name: &str) -> String {
    name.to_lowercase()
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Word window of `radius` words on each side of `position`.
fn window_around(text: &str, position: usize, radius: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    let start = position.saturating_sub(radius);
    let end = (position + radius).min(words.len());
    words[start..end].join(" ")
}
