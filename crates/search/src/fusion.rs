use std::collections::HashMap;

/// Weighted Reciprocal Rank Fusion for combining the semantic and keyword
/// rankings of a hybrid query.
///
/// RRF formula: score(d) = Σ `weight_i` / (k + `rank_i(d)`)
pub struct RankFusion {
    /// RRF constant k (typically 60)
    k: f32,
    semantic_weight: f32,
    keyword_weight: f32,
}

impl RankFusion {
    #[must_use]
    pub const fn new(semantic_weight: f32, keyword_weight: f32, k: f32) -> Self {
        Self {
            k,
            semantic_weight,
            keyword_weight,
        }
    }

    /// Fuse two rankings given as `(chunk_id, score)` lists sorted by
    /// score descending. Returns fused `(chunk_id, score)` sorted
    /// descending.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn fuse(
        &self,
        semantic_results: &[(String, f32)],
        keyword_results: &[(String, f32)],
    ) -> Vec<(String, f32)> {
        let mut scores: HashMap<String, f32> = HashMap::new();

        for (rank, (id, _score)) in semantic_results.iter().enumerate() {
            let rrf = self.semantic_weight / (self.k + rank as f32 + 1.0);
            *scores.entry(id.clone()).or_insert(0.0) += rrf;
        }
        for (rank, (id, _score)) in keyword_results.iter().enumerate() {
            let rrf = self.keyword_weight / (self.k + rank as f32 + 1.0);
            *scores.entry(id.clone()).or_insert(0.0) += rrf;
        }

        let mut fused: Vec<(String, f32)> = scores.into_iter().collect();
        fused.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        fused
    }
}

impl Default for RankFusion {
    /// Semantic signal dominates by default: queries against a knowledge
    /// store are typically conceptual rather than exact-term
    fn default() -> Self {
        Self::new(0.7, 0.3, 60.0)
    }
}

/// Boosts results whose note title contains query terms
pub struct TitleBooster;

impl TitleBooster {
    /// Multiply the score of every result whose title carries at least
    /// one query token
    #[must_use]
    pub fn boost(
        results: Vec<(String, f32)>,
        tokens: &[String],
        title_of: impl Fn(&str) -> String,
        multiplier: f32,
    ) -> Vec<(String, f32)> {
        if tokens.is_empty() {
            return results;
        }
        let mut boosted: Vec<(String, f32)> = results
            .into_iter()
            .map(|(id, score)| {
                let title = title_of(&id).to_lowercase();
                let hit = tokens.iter().any(|t| title.contains(t.as_str()));
                (id, if hit { score * multiplier } else { score })
            })
            .collect();
        boosted.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        boosted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ranked(ids: &[&str]) -> Vec<(String, f32)> {
        ids.iter()
            .enumerate()
            .map(|(i, id)| ((*id).to_string(), 1.0 - i as f32 * 0.1))
            .collect()
    }

    #[test]
    fn fusion_rewards_presence_in_both_rankings() {
        let fusion = RankFusion::default();
        let semantic = ranked(&["a.md#0", "b.md#0", "c.md#0"]);
        let keyword = ranked(&["c.md#0", "a.md#0", "d.md#0"]);

        let fused = fusion.fuse(&semantic, &keyword);
        assert!(!fused.is_empty());
        // "a" appears near the top of both lists and must come first.
        assert_eq!(fused[0].0, "a.md#0");
        for (_, score) in &fused {
            assert!(*score > 0.0);
        }
    }

    #[test]
    fn semantic_weight_dominates_ties() {
        let fusion = RankFusion::new(0.9, 0.1, 60.0);
        let semantic = ranked(&["sem.md#0"]);
        let keyword = ranked(&["key.md#0"]);

        let fused = fusion.fuse(&semantic, &keyword);
        assert_eq!(fused[0].0, "sem.md#0");
    }

    #[test]
    fn title_boost_reorders_only_title_hits() {
        let results = vec![
            ("journal.md#0".to_string(), 0.9),
            ("tea log.md#0".to_string(), 0.8),
        ];
        let tokens = vec!["tea".to_string()];
        let boosted = TitleBooster::boost(
            results,
            &tokens,
            |id| id.split('#').next().unwrap_or(id).to_string(),
            1.5,
        );
        assert_eq!(boosted[0].0, "tea log.md#0");
    }
}
