use crate::error::{Result, SearchError};
use crate::fulltext::{fulltext_scores, query_tokens};
use crate::fusion::{RankFusion, TitleBooster};
use crate::phrase::{partition_by_phrases, quoted_phrases};
use crate::snippet::make_snippet;
use lru::LruCache;
use noteseek_index::{cosine_similarity, note_title, IndexedChunk, SearchIndex};
use noteseek_providers::{EmbeddingProvider, RerankCandidate, RerankProvider};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    Fulltext,
    Vector,
    Hybrid,
}

/// One query against the index. State-free: everything the engine needs
/// is in the request and the index reference.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub query: String,
    pub mode: SearchMode,
    /// Only notes whose path starts with this prefix
    pub path_prefix: Option<String>,
    /// Notes must carry every listed tag
    pub tags: Vec<String>,
    pub limit: usize,
    /// Minimum cosine similarity for vector results
    pub min_score: f32,
    /// Run the judge-model second pass over the shortlist
    pub rerank: bool,
}

impl SearchRequest {
    #[must_use]
    pub fn new(query: impl Into<String>, mode: SearchMode) -> Self {
        Self {
            query: query.into(),
            mode,
            path_prefix: None,
            tags: Vec::new(),
            limit: 10,
            min_score: 0.0,
            rerank: false,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    /// Stable chunk identifier: `"<path>#<ordinal>"`
    pub chunk_id: String,
    pub path: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heading_path: Option<String>,
    pub score: f32,
    pub snippet: String,
}

/// Ranking knobs, all tunable; the defaults are observed-in-practice
/// values, not derived ones
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryOptions {
    pub semantic_weight: f32,
    pub keyword_weight: f32,
    pub rrf_k: f32,
    pub title_boost: f32,
    /// Candidates fetched before phrase boosting: `limit * multiplier`,
    /// never less than `overfetch_floor`
    pub overfetch_multiplier: usize,
    pub overfetch_floor: usize,
    pub query_cache_size: usize,
    /// Shortlist size handed to the reranker
    pub rerank_top_k: usize,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            semantic_weight: 0.7,
            keyword_weight: 0.3,
            rrf_k: 60.0,
            title_boost: 1.25,
            overfetch_multiplier: 3,
            overfetch_floor: 30,
            query_cache_size: 64,
            rerank_top_k: 10,
        }
    }
}

/// Executes fulltext, vector, and hybrid queries against a
/// [`SearchIndex`].
///
/// Owns no index state; holds the provider handles, ranking options, and
/// a small LRU cache of query embeddings so repeated interactive queries
/// skip a provider round-trip.
pub struct QueryEngine {
    embedder: Arc<dyn EmbeddingProvider>,
    reranker: Option<Arc<dyn RerankProvider>>,
    options: QueryOptions,
    fusion: RankFusion,
    query_cache: Mutex<LruCache<String, Vec<f32>>>,
}

impl QueryEngine {
    #[must_use]
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        reranker: Option<Arc<dyn RerankProvider>>,
        options: QueryOptions,
    ) -> Self {
        let cache_size =
            NonZeroUsize::new(options.query_cache_size.max(1)).unwrap_or(NonZeroUsize::MIN);
        let fusion = RankFusion::new(options.semantic_weight, options.keyword_weight, options.rrf_k);
        Self {
            embedder,
            reranker,
            options,
            fusion,
            query_cache: Mutex::new(LruCache::new(cache_size)),
        }
    }

    /// Execute one search. Fulltext never touches the embedding provider;
    /// vector and hybrid surface provider failures as recoverable errors
    /// so the caller can retry in fulltext mode.
    pub async fn search(
        &self,
        index: &SearchIndex,
        request: &SearchRequest,
    ) -> Result<Vec<SearchHit>> {
        let query = request.query.trim();
        if query.is_empty() {
            return Err(SearchError::EmptyQuery);
        }

        let tokens = query_tokens(query);
        let phrases = quoted_phrases(query);
        let limit = request.limit.max(1);
        let pool = (limit * self.options.overfetch_multiplier.max(1))
            .max(self.options.overfetch_floor);

        log::debug!(
            "Search: mode={:?} query='{query}' limit={limit} pool={pool}",
            request.mode
        );

        let mut ranked: Vec<(&IndexedChunk, f32)> = match request.mode {
            SearchMode::Fulltext => self.run_fulltext(index, request, &tokens, pool),
            SearchMode::Vector => {
                self.run_vector(index, request, query, pool).await?
            }
            SearchMode::Hybrid => {
                let keyword = self.run_fulltext(index, request, &tokens, pool);
                let semantic = self.run_vector(index, request, query, pool).await?;
                self.fuse_rankings(keyword, semantic, &tokens, pool)
            }
        };

        normalize_scores(&mut ranked);

        let deduped = dedupe_by_document(ranked);
        let boosted = partition_by_phrases(deduped, &phrases, |(chunk, _)| {
            chunk.content.to_lowercase()
        });
        let mut shortlist: Vec<(&IndexedChunk, f32)> =
            boosted.into_iter().take(limit).collect();

        if request.rerank {
            shortlist = self.rerank_shortlist(query, shortlist).await;
        }

        let mut terms = phrases;
        terms.extend(tokens);
        Ok(shortlist
            .into_iter()
            .map(|(chunk, score)| SearchHit {
                chunk_id: chunk.id(),
                path: chunk.source_path.clone(),
                title: chunk.title().to_string(),
                heading_path: (!chunk.heading_path.is_empty())
                    .then(|| chunk.heading_path.clone()),
                score,
                snippet: make_snippet(&chunk.content, &terms),
            })
            .collect())
    }

    fn run_fulltext<'a>(
        &self,
        index: &'a SearchIndex,
        request: &SearchRequest,
        tokens: &[String],
        pool: usize,
    ) -> Vec<(&'a IndexedChunk, f32)> {
        let candidates: Vec<&IndexedChunk> = index
            .candidates(tokens)
            .into_iter()
            .filter(|chunk| passes_filters(chunk, request))
            .collect();
        let mut scored = fulltext_scores(tokens, &candidates);
        scored.truncate(pool);
        scored
    }

    async fn run_vector<'a>(
        &self,
        index: &'a SearchIndex,
        request: &SearchRequest,
        query: &str,
        pool: usize,
    ) -> Result<Vec<(&'a IndexedChunk, f32)>> {
        let query_vector = self.embed_query_cached(query).await?;

        let mut scored: Vec<(&IndexedChunk, f32)> = index
            .iter_chunks()
            .filter(|chunk| passes_filters(chunk, request))
            .filter_map(|chunk| {
                let embedding = chunk.embedding.as_ref()?;
                let score = cosine_similarity(&query_vector, embedding);
                (score >= request.min_score).then_some((chunk, score))
            })
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(pool);
        Ok(scored)
    }

    fn fuse_rankings<'a>(
        &self,
        keyword: Vec<(&'a IndexedChunk, f32)>,
        semantic: Vec<(&'a IndexedChunk, f32)>,
        tokens: &[String],
        pool: usize,
    ) -> Vec<(&'a IndexedChunk, f32)> {
        let mut by_id: HashMap<String, &IndexedChunk> = HashMap::new();
        let keyword_ranked: Vec<(String, f32)> = keyword
            .into_iter()
            .map(|(chunk, score)| {
                let id = chunk.id();
                by_id.insert(id.clone(), chunk);
                (id, score)
            })
            .collect();
        let semantic_ranked: Vec<(String, f32)> = semantic
            .into_iter()
            .map(|(chunk, score)| {
                let id = chunk.id();
                by_id.insert(id.clone(), chunk);
                (id, score)
            })
            .collect();

        let fused = self.fusion.fuse(&semantic_ranked, &keyword_ranked);
        let boosted = TitleBooster::boost(
            fused,
            tokens,
            |id| note_title(id.split('#').next().unwrap_or(id)).to_string(),
            self.options.title_boost,
        );

        boosted
            .into_iter()
            .filter_map(|(id, score)| by_id.get(&id).map(|chunk| (*chunk, score)))
            .take(pool)
            .collect()
    }

    async fn embed_query_cached(&self, query: &str) -> Result<Vec<f32>> {
        if let Some(vector) = self
            .query_cache
            .lock()
            .expect("query cache lock")
            .get(query)
            .cloned()
        {
            return Ok(vector);
        }

        let vector = self.embedder.embed_query(query).await?;
        self.query_cache
            .lock()
            .expect("query cache lock")
            .put(query.to_string(), vector.clone());
        Ok(vector)
    }

    /// Judge-model second pass. Degrades to the incoming order on any
    /// provider or parse failure; the shortlist length never changes.
    async fn rerank_shortlist<'a>(
        &self,
        query: &str,
        shortlist: Vec<(&'a IndexedChunk, f32)>,
    ) -> Vec<(&'a IndexedChunk, f32)> {
        let Some(reranker) = &self.reranker else {
            return shortlist;
        };
        if shortlist.len() < 2 {
            return shortlist;
        }

        let considered = shortlist.len().min(self.options.rerank_top_k.max(1));
        let candidates: Vec<RerankCandidate> = shortlist[..considered]
            .iter()
            .map(|(chunk, _)| RerankCandidate {
                id: chunk.id(),
                content: chunk.content.clone(),
            })
            .collect();

        let order = reranker.rerank(query, &candidates, considered).await;

        let mut reordered: Vec<(&IndexedChunk, f32)> = order
            .into_iter()
            .filter_map(|i| shortlist.get(i).copied())
            .collect();
        // A short or partial ordering keeps the tail in its original order.
        for entry in &shortlist {
            if !reordered.iter().any(|(c, _)| c.id() == entry.0.id()) {
                reordered.push(*entry);
            }
        }
        reordered
    }
}

fn passes_filters(chunk: &IndexedChunk, request: &SearchRequest) -> bool {
    if let Some(prefix) = &request.path_prefix {
        if !chunk.source_path.starts_with(prefix.as_str()) {
            return false;
        }
    }
    request
        .tags
        .iter()
        .all(|tag| chunk.tags.iter().any(|t| t == tag))
}

/// Collapse multiple chunks of one note to its single best-scoring chunk,
/// preserving overall order
fn dedupe_by_document(ranked: Vec<(&IndexedChunk, f32)>) -> Vec<(&IndexedChunk, f32)> {
    let mut seen: std::collections::HashSet<&str> = std::collections::HashSet::new();
    ranked
        .into_iter()
        .filter(|(chunk, _)| seen.insert(chunk.source_path.as_str()))
        .collect()
}

/// Min-max normalization to a 0-1 score range
fn normalize_scores(results: &mut [(&IndexedChunk, f32)]) {
    if results.is_empty() {
        return;
    }
    let mut min = f32::MAX;
    let mut max = f32::MIN;
    for (_, score) in results.iter() {
        if score.is_finite() {
            min = min.min(*score);
            max = max.max(*score);
        }
    }
    if !min.is_finite() || !max.is_finite() {
        for (_, score) in results.iter_mut() {
            *score = 0.0;
        }
        return;
    }

    const MIN_DELTA: f32 = 1e-6;
    if (max - min).abs() < MIN_DELTA {
        for (_, score) in results.iter_mut() {
            *score = 1.0;
        }
        return;
    }

    let range = max - min;
    for (_, score) in results.iter_mut() {
        if score.is_finite() {
            *score = (*score - min) / range;
        } else {
            *score = 0.0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use noteseek_index::NoteChunk;
    use noteseek_providers::{ModelInfo, ProviderError};
    use pretty_assertions::assert_eq;

    /// Deterministic embedder: axis vectors keyed by topic words
    struct MockEmbedder {
        fail: bool,
    }

    fn axis_for(text: &str) -> Vec<f32> {
        let lower = text.to_lowercase();
        if lower.contains("tea") {
            vec![1.0, 0.0, 0.0]
        } else if lower.contains("rust") {
            vec![0.0, 1.0, 0.0]
        } else {
            vec![0.0, 0.0, 1.0]
        }
    }

    #[async_trait]
    impl EmbeddingProvider for MockEmbedder {
        async fn model_info(&self) -> noteseek_providers::Result<ModelInfo> {
            Ok(ModelInfo {
                dimension: 3,
                context_length: 8192,
            })
        }

        async fn embed_documents(
            &self,
            texts: &[String],
        ) -> noteseek_providers::Result<Vec<Vec<f32>>> {
            if self.fail {
                return Err(ProviderError::InvalidResponse("down".to_string()));
            }
            Ok(texts.iter().map(|t| axis_for(t)).collect())
        }

        async fn embed_query(&self, text: &str) -> noteseek_providers::Result<Vec<f32>> {
            if self.fail {
                return Err(ProviderError::InvalidResponse("down".to_string()));
            }
            Ok(axis_for(text))
        }
    }

    /// Reverses whatever shortlist it is given
    struct ReversingReranker;

    #[async_trait]
    impl RerankProvider for ReversingReranker {
        async fn rerank(
            &self,
            _query: &str,
            candidates: &[RerankCandidate],
            top_k: usize,
        ) -> Vec<usize> {
            (0..candidates.len()).rev().take(top_k).collect()
        }
    }

    /// Simulates a judge whose response could not be parsed: identity order
    struct IdentityReranker;

    #[async_trait]
    impl RerankProvider for IdentityReranker {
        async fn rerank(
            &self,
            _query: &str,
            candidates: &[RerankCandidate],
            top_k: usize,
        ) -> Vec<usize> {
            (0..candidates.len().min(top_k)).collect()
        }
    }

    fn engine(fail: bool) -> QueryEngine {
        QueryEngine::new(Arc::new(MockEmbedder { fail }), None, QueryOptions::default())
    }

    fn engine_with_reranker(reranker: Arc<dyn RerankProvider>) -> QueryEngine {
        QueryEngine::new(
            Arc::new(MockEmbedder { fail: false }),
            Some(reranker),
            QueryOptions::default(),
        )
    }

    fn insert_note(index: &mut SearchIndex, path: &str, contents: &[&str], tags: &[&str]) {
        let chunks: Vec<NoteChunk> = contents
            .iter()
            .enumerate()
            .map(|(ordinal, content)| NoteChunk {
                source_path: path.to_string(),
                heading_path: String::new(),
                content: (*content).to_string(),
                ordinal,
            })
            .collect();
        index.insert_document(
            path,
            chunks,
            100,
            tags.iter().map(|t| (*t).to_string()).collect(),
            path.rsplit_once('/').map_or("", |(dir, _)| dir),
        );
    }

    fn embed_all(index: &mut SearchIndex) {
        for path in index.paths() {
            let vectors: Vec<Vec<f32>> = index
                .chunks_for_document(&path)
                .unwrap()
                .iter()
                .map(|c| axis_for(&c.content))
                .collect();
            index.attach_embeddings(&path, vectors).unwrap();
        }
    }

    fn sample_index() -> SearchIndex {
        let mut index = SearchIndex::new("mock", 3);
        insert_note(
            &mut index,
            "notes/tea.md",
            &["tea brewing temperatures", "more tea tasting notes"],
            &["hobby"],
        );
        insert_note(
            &mut index,
            "notes/rust.md",
            &["rust ownership rules"],
            &["programming"],
        );
        insert_note(&mut index, "journal/monday.md", &["weather and errands"], &[]);
        index
    }

    #[tokio::test]
    async fn empty_query_is_rejected() {
        let index = sample_index();
        let err = engine(false)
            .search(&index, &SearchRequest::new("  ", SearchMode::Fulltext))
            .await
            .unwrap_err();
        assert!(matches!(err, SearchError::EmptyQuery));
    }

    #[tokio::test]
    async fn fulltext_works_without_embeddings_or_provider() {
        let index = sample_index();
        // Provider is failing, but fulltext never calls it.
        let hits = engine(true)
            .search(&index, &SearchRequest::new("tea brewing", SearchMode::Fulltext))
            .await
            .unwrap();
        assert!(!hits.is_empty());
        assert_eq!(hits[0].path, "notes/tea.md");
    }

    #[tokio::test]
    async fn vector_and_hybrid_surface_provider_failure() {
        let mut index = sample_index();
        embed_all(&mut index);

        let engine = engine(true);
        for mode in [SearchMode::Vector, SearchMode::Hybrid] {
            let err = engine
                .search(&index, &SearchRequest::new("tea", mode))
                .await
                .unwrap_err();
            assert!(matches!(err, SearchError::Embedding(_)));
        }
    }

    #[tokio::test]
    async fn duplicate_chunks_collapse_to_best_per_document() {
        let mut index = SearchIndex::new("mock", 3);
        insert_note(
            &mut index,
            "notes/tea.md",
            &["tea tea tea", "tea tea tea", "tea tea tea"],
            &[],
        );
        let hits = engine(false)
            .search(&index, &SearchRequest::new("tea", SearchMode::Fulltext))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].path, "notes/tea.md");
    }

    #[tokio::test]
    async fn vector_mode_ranks_by_similarity_and_honors_min_score() {
        let mut index = sample_index();
        embed_all(&mut index);

        let mut request = SearchRequest::new("tea", SearchMode::Vector);
        request.min_score = 0.5;
        let hits = engine(false).search(&index, &request).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].path, "notes/tea.md");
    }

    #[tokio::test]
    async fn hybrid_fuses_both_signals() {
        let mut index = sample_index();
        embed_all(&mut index);

        let hits = engine(false)
            .search(&index, &SearchRequest::new("tea", SearchMode::Hybrid))
            .await
            .unwrap();
        assert_eq!(hits[0].path, "notes/tea.md");
        // Scores are normalized into 0-1.
        assert!(hits.iter().all(|h| (0.0..=1.0).contains(&h.score)));
    }

    #[tokio::test]
    async fn quoted_phrase_partitions_without_discarding() {
        let mut index = SearchIndex::new("mock", 3);
        insert_note(&mut index, "a.md", &["morning pages with gong fu brewing"], &[]);
        insert_note(&mut index, "b.md", &["morning pages without the phrase"], &[]);
        insert_note(&mut index, "c.md", &["more gong fu brewing in the morning pages"], &[]);

        let hits = engine(false)
            .search(
                &index,
                &SearchRequest::new("morning pages \"gong fu\"", SearchMode::Fulltext),
            )
            .await
            .unwrap();

        assert_eq!(hits.len(), 3);
        let first_two: Vec<&str> = hits[..2].iter().map(|h| h.path.as_str()).collect();
        assert!(first_two.contains(&"a.md"));
        assert!(first_two.contains(&"c.md"));
        assert_eq!(hits[2].path, "b.md");
    }

    #[tokio::test]
    async fn path_and_tag_filters_are_exact_predicates() {
        let mut index = sample_index();
        embed_all(&mut index);

        let mut request = SearchRequest::new("tea rust weather errands", SearchMode::Fulltext);
        request.path_prefix = Some("notes/".to_string());
        let hits = engine(false).search(&index, &request).await.unwrap();
        assert!(hits.iter().all(|h| h.path.starts_with("notes/")));

        let mut request = SearchRequest::new("tea rust weather errands", SearchMode::Fulltext);
        request.tags = vec!["programming".to_string()];
        let hits = engine(false).search(&index, &request).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].path, "notes/rust.md");
    }

    #[tokio::test]
    async fn reranker_reorders_shortlist() {
        let mut index = sample_index();
        embed_all(&mut index);
        let engine = engine_with_reranker(Arc::new(ReversingReranker));

        let mut request = SearchRequest::new("tea rust weather errands", SearchMode::Fulltext);
        request.rerank = true;
        let reranked = engine.search(&index, &request).await.unwrap();

        let mut request_plain = request.clone();
        request_plain.rerank = false;
        let plain = engine.search(&index, &request_plain).await.unwrap();

        let plain_paths: Vec<&str> = plain.iter().map(|h| h.path.as_str()).collect();
        let reranked_paths: Vec<&str> = reranked.iter().map(|h| h.path.as_str()).collect();
        let mut reversed = plain_paths.clone();
        reversed.reverse();
        assert_eq!(reranked_paths, reversed);
    }

    #[tokio::test]
    async fn unparsable_rerank_keeps_pre_rerank_order_and_length() {
        let mut index = sample_index();
        embed_all(&mut index);
        let engine = engine_with_reranker(Arc::new(IdentityReranker));

        let mut request = SearchRequest::new("tea rust weather errands", SearchMode::Hybrid);
        request.rerank = true;
        let reranked = engine.search(&index, &request).await.unwrap();

        let mut plain_request = request.clone();
        plain_request.rerank = false;
        let plain = engine.search(&index, &plain_request).await.unwrap();

        assert_eq!(plain.len(), reranked.len());
        for (a, b) in plain.iter().zip(reranked.iter()) {
            assert_eq!(a.chunk_id, b.chunk_id);
        }
    }

    #[tokio::test]
    async fn hits_carry_heading_and_snippet_context() {
        let mut index = SearchIndex::new("mock", 3);
        let chunk = NoteChunk {
            source_path: "guide.md".to_string(),
            heading_path: "Brewing > Oolong".to_string(),
            content: "## Oolong\n\nRinse the leaves, then steep briefly.".to_string(),
            ordinal: 0,
        };
        index.insert_document("guide.md", vec![chunk], 1, vec![], "");

        let hits = engine(false)
            .search(&index, &SearchRequest::new("oolong steep", SearchMode::Fulltext))
            .await
            .unwrap();
        assert_eq!(hits[0].heading_path.as_deref(), Some("Brewing > Oolong"));
        assert_eq!(hits[0].chunk_id, "guide.md#0");
        assert!(hits[0].snippet.contains("steep"));
    }
}
