use noteseek_index::{tokenize, IndexedChunk};
use nucleo_matcher::{pattern::Pattern, Matcher};

/// Relative field weights: a query term hitting the note title counts for
/// more than the same term in the body
const TITLE_WEIGHT: f32 = 2.0;
const HEADING_WEIGHT: f32 = 1.4;
const BODY_WEIGHT: f32 = 1.0;

/// Bytes of chunk content considered for proximity scoring
const CONTENT_PREVIEW_BYTES: usize = 1000;

/// Keyword/proximity scoring over postings candidates.
///
/// Each query token is scored independently against title, heading path,
/// and a bounded content preview, taking its best field-weighted score;
/// token scores sum, scaled by query coverage so chunks matching more of
/// the query rank higher. Chunks matching no token are dropped. Needs no
/// embedding provider and is always available.
#[allow(clippy::cast_precision_loss)]
pub fn fulltext_scores<'a>(
    tokens: &[String],
    candidates: &[&'a IndexedChunk],
) -> Vec<(&'a IndexedChunk, f32)> {
    if tokens.is_empty() {
        return Vec::new();
    }

    let patterns: Vec<Pattern> = tokens
        .iter()
        .map(|token| {
            Pattern::parse(
                token,
                nucleo_matcher::pattern::CaseMatching::Ignore,
                nucleo_matcher::pattern::Normalization::Smart,
            )
        })
        .collect();
    let mut matcher = Matcher::new(nucleo_matcher::Config::DEFAULT);

    let mut scored: Vec<(&IndexedChunk, f32)> = candidates
        .iter()
        .filter_map(|chunk| {
            let title = nucleo_matcher::Utf32String::from(chunk.title());
            let heading = (!chunk.heading_path.is_empty())
                .then(|| nucleo_matcher::Utf32String::from(chunk.heading_path.as_str()));
            let content =
                nucleo_matcher::Utf32String::from(content_preview(&chunk.content));

            let mut total = 0.0f32;
            let mut matched = 0usize;
            for pattern in &patterns {
                let title_score = pattern
                    .score(title.slice(..), &mut matcher)
                    .map(|s| s as f32 * TITLE_WEIGHT);
                let heading_score = heading.as_ref().and_then(|h| {
                    pattern
                        .score(h.slice(..), &mut matcher)
                        .map(|s| s as f32 * HEADING_WEIGHT)
                });
                let content_score = pattern
                    .score(content.slice(..), &mut matcher)
                    .map(|s| s as f32 * BODY_WEIGHT);

                if let Some(best) = [title_score, heading_score, content_score]
                    .into_iter()
                    .flatten()
                    .fold(None::<f32>, |acc, s| Some(acc.map_or(s, |a| a.max(s))))
                {
                    total += best;
                    matched += 1;
                }
            }

            if matched == 0 {
                return None;
            }
            let coverage = matched as f32 / tokens.len() as f32;
            Some((*chunk, total * coverage))
        })
        .collect();

    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scored
}

/// Query tokens used for postings candidate selection and scoring
#[must_use]
pub fn query_tokens(query: &str) -> Vec<String> {
    tokenize(query)
}

/// Safe unicode truncation: char boundary at or before the byte budget
fn content_preview(content: &str) -> &str {
    if content.len() <= CONTENT_PREVIEW_BYTES {
        return content;
    }
    let mut boundary = CONTENT_PREVIEW_BYTES;
    while boundary > 0 && !content.is_char_boundary(boundary) {
        boundary -= 1;
    }
    &content[..boundary]
}
