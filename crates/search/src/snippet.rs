use unicode_segmentation::UnicodeSegmentation;

/// Target snippet length in bytes before boundary snapping
const SNIPPET_BYTES: usize = 180;

/// A short content excerpt centered on the first query-term hit.
///
/// Falls back to the head of the content when nothing matches. Cut edges
/// are snapped to grapheme boundaries and marked with an ellipsis.
#[must_use]
pub fn make_snippet(content: &str, terms: &[String]) -> String {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    let lower = trimmed.to_lowercase();
    let hit = terms
        .iter()
        .filter(|t| !t.is_empty())
        .filter_map(|t| lower.find(t.as_str()))
        .min();

    let center = hit.unwrap_or(0);
    let half = SNIPPET_BYTES / 2;
    let want_start = center.saturating_sub(half);
    let want_end = (center + half).min(trimmed.len());

    let (start, end) = snap_to_graphemes(trimmed, want_start, want_end);
    let mut snippet = String::new();
    if start > 0 {
        snippet.push('…');
    }
    snippet.push_str(trimmed[start..end].trim());
    if end < trimmed.len() {
        snippet.push('…');
    }
    snippet
}

/// Widen (start, end) outward to the nearest grapheme boundaries
fn snap_to_graphemes(text: &str, want_start: usize, want_end: usize) -> (usize, usize) {
    let mut start = 0;
    let mut end = text.len();
    for (idx, _) in text.grapheme_indices(true) {
        if idx <= want_start {
            start = idx;
        }
        if idx >= want_end {
            end = idx;
            break;
        }
    }
    (start, end)
}
