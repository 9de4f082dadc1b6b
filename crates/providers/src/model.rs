use serde::{Deserialize, Serialize};

/// Conservative characters-per-token ratio used to derive a client-side
/// character budget from a model's token context length
pub const CHARS_PER_TOKEN: usize = 3;

/// Task prefixes some embedding models require to distinguish indexed
/// content from queries
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskPrefixes {
    pub document: String,
    pub query: String,
}

/// Per-model embedding behavior: task prefixes and truncation budget
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelProfile {
    pub model_id: String,
    #[serde(default)]
    pub prefixes: TaskPrefixes,
    /// Character budget per input; derived from the provider's reported
    /// context length unless set explicitly
    #[serde(default)]
    pub max_input_chars: Option<usize>,
}

impl ModelProfile {
    /// Profile for a model id, with well-known prefix conventions applied
    #[must_use]
    pub fn for_model(model_id: &str) -> Self {
        let lower = model_id.to_ascii_lowercase();
        let prefixes = if lower.contains("nomic-embed") {
            TaskPrefixes {
                document: "search_document: ".to_string(),
                query: "search_query: ".to_string(),
            }
        } else if lower.contains("e5") {
            TaskPrefixes {
                document: "passage: ".to_string(),
                query: "query: ".to_string(),
            }
        } else {
            TaskPrefixes::default()
        };

        Self {
            model_id: model_id.to_string(),
            prefixes,
            max_input_chars: None,
        }
    }

    /// Character budget derived from a context length, unless overridden
    #[must_use]
    pub fn char_budget(&self, context_length: usize) -> usize {
        self.max_input_chars
            .unwrap_or_else(|| context_length.saturating_mul(CHARS_PER_TOKEN))
            .max(1)
    }

    #[must_use]
    pub fn prefix_document(&self, text: &str) -> String {
        format!("{}{}", self.prefixes.document, text)
    }

    #[must_use]
    pub fn prefix_query(&self, text: &str) -> String {
        format!("{}{}", self.prefixes.query, text)
    }
}

/// Truncate to at most `max_chars` characters on a UTF-8 boundary
#[must_use]
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}
