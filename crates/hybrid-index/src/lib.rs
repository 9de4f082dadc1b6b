//! # Noteseek Index
//!
//! The persistent hybrid store: per-chunk keyword postings plus optional
//! embedding vectors, addressable by note path and chunk ordinal.
//!
//! Writes follow a two-phase discipline. Phase 1 inserts chunks with
//! keyword-searchable content and metadata; phase 2 attaches embeddings
//! once the embedding provider succeeds. A document whose embeddings never
//! arrive stays keyword-searchable.
//!
//! ## Example
//!
//! ```
//! use noteseek_index::SearchIndex;
//! use noteseek_chunker::{Chunker, ChunkerConfig};
//!
//! let mut index = SearchIndex::new("nomic-embed-text", 768);
//! let chunks = Chunker::new(ChunkerConfig::default()).chunk("a note", "inbox/a.md");
//! index.insert_document("inbox/a.md", chunks, 1_700_000_000, vec![], "inbox");
//! assert_eq!(index.document_count(), 1);
//! ```

mod entry;
mod error;
mod index;
mod snapshot;

pub use entry::{note_title, tokenize, IndexedChunk};
pub use error::{IndexError, Result};
pub use index::{cosine_similarity, IndexStats, SearchIndex};
pub use noteseek_chunker::NoteChunk;
pub use snapshot::{load_snapshot, save_snapshot, LoadOutcome, INDEX_SCHEMA_VERSION};
