use serde::{Deserialize, Serialize};

/// A chunk as stored in the index: the chunker output plus document
/// metadata and an optional embedding. Absence of the embedding is a
/// valid state and never disables keyword search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedChunk {
    pub source_path: String,
    pub heading_path: String,
    pub content: String,
    pub ordinal: usize,
    /// Unix mtime (seconds) of the source note at indexing time
    pub document_mtime: u64,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub folder: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

impl IndexedChunk {
    /// Stable chunk identifier: `"<path>#<ordinal>"`
    #[must_use]
    pub fn id(&self) -> String {
        format!("{}#{}", self.source_path, self.ordinal)
    }

    /// Note title derived from the path's file stem
    #[must_use]
    pub fn title(&self) -> &str {
        note_title(&self.source_path)
    }
}

/// Title of a note: its file name without the extension
#[must_use]
pub fn note_title(path: &str) -> &str {
    let name = path.rsplit('/').next().unwrap_or(path);
    match name.rfind('.') {
        Some(0) | None => name,
        Some(dot) => &name[..dot],
    }
}

/// Lowercased alphanumeric tokens of at least two characters, deduplicated
#[must_use]
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens: Vec<String> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|raw| raw.chars().count() >= 2)
        .map(str::to_lowercase)
        .collect();
    tokens.sort();
    tokens.dedup();
    tokens
}
