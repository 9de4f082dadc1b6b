//! # Noteseek Search
//!
//! The query engine: fulltext, vector, and hybrid search over a
//! [`noteseek_index::SearchIndex`], state-free per call.
//!
//! Hybrid mode fuses keyword and semantic rankings with weighted
//! reciprocal-rank fusion, boosts title matches, partitions quoted-phrase
//! hits to the front, collapses multiple chunks of one note to its best
//! chunk, and optionally runs a judge-model rerank pass that degrades to
//! the unreranked ordering on any provider failure.

mod error;
mod fulltext;
mod fusion;
mod phrase;
mod query;
mod snippet;

pub use error::{Result, SearchError};
pub use fusion::{RankFusion, TitleBooster};
pub use phrase::{partition_by_phrases, quoted_phrases};
pub use query::{QueryEngine, QueryOptions, SearchHit, SearchMode, SearchRequest};
pub use snippet::make_snippet;
