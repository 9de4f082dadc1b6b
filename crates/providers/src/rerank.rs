use crate::error::{ProviderError, Result};
use crate::model::truncate_chars;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Characters of candidate content included per passage in the judge prompt
const CANDIDATE_CONTENT_BUDGET: usize = 500;

/// A shortlist entry handed to the judge model
#[derive(Debug, Clone)]
pub struct RerankCandidate {
    pub id: String,
    pub content: String,
}

/// One parsed `index: score` pair from the judge response
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct RerankScore {
    pub index: usize,
    pub score: f32,
}

/// Second-pass relevance scoring over a shortlist of candidates.
///
/// Implementations must degrade gracefully: the returned ordering falls
/// back to the input ordering whenever the provider fails or the response
/// cannot be parsed. Callers never see a rerank error.
#[async_trait]
pub trait RerankProvider: Send + Sync {
    /// Return candidate indices in final order, at most `top_k` of them
    async fn rerank(&self, query: &str, candidates: &[RerankCandidate], top_k: usize)
        -> Vec<usize>;
}

/// Judge-model client against an OpenAI-compatible chat completions
/// endpoint, non-streaming, temperature 0
pub struct HttpRerankClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model_id: String,
}

#[derive(Serialize)]
struct ChatRequestBody {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    stream: bool,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponseBody {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

impl HttpRerankClient {
    #[must_use]
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        model_id: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            model_id: model_id.into(),
        }
    }

    async fn judge(&self, prompt: String) -> Result<String> {
        let body = ChatRequestBody {
            model: self.model_id.clone(),
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: 0.0,
            stream: false,
        };

        let url = format!("{}/chat/completions", self.base_url);
        let mut request = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Http { status, body });
        }

        let parsed: ChatResponseBody = response.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| ProviderError::InvalidResponse("no choices in response".to_string()))
    }
}

#[async_trait]
impl RerankProvider for HttpRerankClient {
    async fn rerank(
        &self,
        query: &str,
        candidates: &[RerankCandidate],
        top_k: usize,
    ) -> Vec<usize> {
        if candidates.is_empty() || top_k == 0 {
            return Vec::new();
        }

        let prompt = build_prompt(query, candidates);
        match self.judge(prompt).await {
            Ok(content) => match parse_scores(&content, candidates.len()) {
                Some(scores) => order_from_scores(scores, candidates.len(), top_k),
                None => {
                    log::warn!("Unparsable rerank response; keeping original order");
                    identity_order(candidates.len(), top_k)
                }
            },
            Err(err) => {
                log::warn!("Rerank request failed: {err}; keeping original order");
                identity_order(candidates.len(), top_k)
            }
        }
    }
}

fn build_prompt(query: &str, candidates: &[RerankCandidate]) -> String {
    let mut prompt = format!(
        "Score each passage for relevance to the query on a 0-10 scale.\n\
         Query: {query}\n\nPassages:\n"
    );
    for (index, candidate) in candidates.iter().enumerate() {
        let content = truncate_chars(&candidate.content, CANDIDATE_CONTENT_BUDGET);
        prompt.push_str(&format!("[{index}] {content}\n\n"));
    }
    prompt.push_str(
        "Respond with only a JSON array of objects, one per passage, \
         shaped like [{\"index\": 0, \"score\": 7.5}].",
    );
    prompt
}

/// Strict structured parse, then a permissive `index: score` pair scan.
/// Returns `None` on total failure so the caller keeps its own order.
fn parse_scores(content: &str, candidate_count: usize) -> Option<Vec<RerankScore>> {
    if let Some(scores) = parse_strict(content, candidate_count) {
        return Some(scores);
    }
    parse_permissive(content, candidate_count)
}

fn parse_strict(content: &str, candidate_count: usize) -> Option<Vec<RerankScore>> {
    let start = content.find('[')?;
    let end = content.rfind(']')?;
    if end <= start {
        return None;
    }
    let parsed: Vec<RerankScore> = serde_json::from_str(&content[start..=end]).ok()?;
    let valid: Vec<RerankScore> = parsed
        .into_iter()
        .filter(|s| s.index < candidate_count && s.score.is_finite())
        .collect();
    (!valid.is_empty()).then_some(valid)
}

static SCORE_PAIR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d+)\s*[:=]\s*(-?\d+(?:\.\d+)?)").expect("valid score-pair pattern")
});

fn parse_permissive(content: &str, candidate_count: usize) -> Option<Vec<RerankScore>> {
    let mut scores = Vec::new();
    for caps in SCORE_PAIR.captures_iter(content) {
        let index: usize = caps[1].parse().ok()?;
        let score: f32 = caps[2].parse().ok()?;
        if index < candidate_count && score.is_finite() {
            scores.push(RerankScore { index, score });
        }
    }
    (!scores.is_empty()).then_some(scores)
}

/// Sort scored indices descending, then fill with any unscored candidates
/// in their original relative order
fn order_from_scores(mut scores: Vec<RerankScore>, candidate_count: usize, top_k: usize) -> Vec<usize> {
    scores.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.index.cmp(&b.index))
    });

    let mut order = Vec::with_capacity(candidate_count);
    let mut seen = vec![false; candidate_count];
    for entry in scores {
        if !seen[entry.index] {
            seen[entry.index] = true;
            order.push(entry.index);
        }
    }
    for index in 0..candidate_count {
        if !seen[index] {
            order.push(index);
        }
    }
    order.truncate(top_k);
    order
}

fn identity_order(candidate_count: usize, top_k: usize) -> Vec<usize> {
    (0..candidate_count.min(top_k)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn candidates(n: usize) -> Vec<RerankCandidate> {
        (0..n)
            .map(|i| RerankCandidate {
                id: format!("note.md#{i}"),
                content: format!("passage {i}"),
            })
            .collect()
    }

    #[test]
    fn prompt_lists_indexed_truncated_passages() {
        let mut cands = candidates(2);
        cands[1].content = "x".repeat(800);
        let prompt = build_prompt("tea ceremony", &cands);
        assert!(prompt.contains("Query: tea ceremony"));
        assert!(prompt.contains("[0] passage 0"));
        assert!(prompt.contains(&format!("[1] {}", "x".repeat(500))));
        assert!(!prompt.contains(&"x".repeat(501)));
    }

    #[test]
    fn strict_json_parse_wins() {
        let content = r#"Here you go: [{"index": 1, "score": 9.0}, {"index": 0, "score": 2.5}]"#;
        let scores = parse_scores(content, 2).unwrap();
        assert_eq!(scores.len(), 2);
        assert_eq!(scores[0], RerankScore { index: 1, score: 9.0 });
    }

    #[test]
    fn permissive_parse_handles_loose_pairs() {
        let content = "scores:\n0: 3.5\n1: 9\n2: 7.25";
        let scores = parse_scores(content, 3).unwrap();
        assert_eq!(scores.len(), 3);
        assert_eq!(scores[1], RerankScore { index: 1, score: 9.0 });
    }

    #[test]
    fn out_of_range_indices_are_dropped() {
        let content = r#"[{"index": 7, "score": 9.0}, {"index": 1, "score": 4.0}]"#;
        let scores = parse_scores(content, 2).unwrap();
        assert_eq!(scores, vec![RerankScore { index: 1, score: 4.0 }]);
    }

    #[test]
    fn garbage_yields_none() {
        assert!(parse_scores("I cannot score these passages.", 5).is_none());
        assert!(parse_scores("", 5).is_none());
    }

    #[test]
    fn order_sorts_descending_and_fills_missing() {
        let scores = vec![
            RerankScore { index: 2, score: 1.0 },
            RerankScore { index: 0, score: 8.0 },
        ];
        // Candidate 1 was never scored: it trails in original order.
        assert_eq!(order_from_scores(scores, 3, 3), vec![0, 2, 1]);
    }

    #[test]
    fn order_truncates_to_top_k() {
        let scores = vec![
            RerankScore { index: 0, score: 1.0 },
            RerankScore { index: 1, score: 2.0 },
            RerankScore { index: 2, score: 3.0 },
        ];
        assert_eq!(order_from_scores(scores, 3, 2), vec![2, 1]);
    }

    #[test]
    fn identity_order_preserves_input() {
        assert_eq!(identity_order(4, 10), vec![0, 1, 2, 3]);
        assert_eq!(identity_order(4, 2), vec![0, 1]);
    }
}
