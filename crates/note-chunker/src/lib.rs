//! # Noteseek Chunker
//!
//! Heading-scoped chunking for markdown notes.
//!
//! ## Pipeline
//!
//! ```text
//! Note text
//!     │
//!     ├──> short note ──────────> single whole-note chunk
//!     │
//!     └──> section split (##)
//!            ├─> preamble chunk
//!            └─> oversized section
//!                  ├─> subsection split (###)
//!                  └─> fixed-size split with overlap
//! ```
//!
//! ## Example
//!
//! ```
//! use noteseek_chunker::{Chunker, ChunkerConfig};
//!
//! let chunker = Chunker::new(ChunkerConfig::default());
//! let chunks = chunker.chunk("# Title\n\nshort note", "inbox/idea.md");
//! assert_eq!(chunks.len(), 1);
//! ```

mod chunker;

pub use chunker::{Chunker, ChunkerConfig, NoteChunk};
