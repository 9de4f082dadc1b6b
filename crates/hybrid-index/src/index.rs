use crate::entry::{note_title, tokenize, IndexedChunk};
use crate::error::{IndexError, Result};
use ndarray::ArrayView1;
use noteseek_chunker::NoteChunk;
use std::collections::{BTreeMap, HashMap, HashSet};

type ChunkKey = (String, usize);

/// Aggregate counters for status reporting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexStats {
    pub documents: usize,
    pub chunks: usize,
    pub embedded_chunks: usize,
}

/// In-memory hybrid index over note chunks.
///
/// Holds exactly one live chunk set per document path. The embedding
/// dimension is fixed at creation; changing models requires a new index.
#[derive(Debug, Clone)]
pub struct SearchIndex {
    model_id: String,
    dimension: usize,
    documents: BTreeMap<String, Vec<IndexedChunk>>,
    postings: HashMap<String, HashSet<ChunkKey>>,
}

impl SearchIndex {
    #[must_use]
    pub fn new(model_id: impl Into<String>, dimension: usize) -> Self {
        Self {
            model_id: model_id.into(),
            dimension,
            documents: BTreeMap::new(),
            postings: HashMap::new(),
        }
    }

    #[must_use]
    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    #[must_use]
    pub const fn dimension(&self) -> usize {
        self.dimension
    }

    #[must_use]
    pub fn document_count(&self) -> usize {
        self.documents.len()
    }

    #[must_use]
    pub fn chunk_count(&self) -> usize {
        self.documents.values().map(Vec::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    #[must_use]
    pub fn stats(&self) -> IndexStats {
        IndexStats {
            documents: self.document_count(),
            chunks: self.chunk_count(),
            embedded_chunks: self
                .iter_chunks()
                .filter(|c| c.embedding.is_some())
                .count(),
        }
    }

    /// Phase 1: insert a document's chunks, keyword-searchable but without
    /// embeddings. Any previous chunk set for the path is removed first so
    /// no ghost chunks survive the swap.
    pub fn insert_document(
        &mut self,
        path: &str,
        chunks: Vec<NoteChunk>,
        mtime: u64,
        tags: Vec<String>,
        folder: impl Into<String>,
    ) {
        self.remove_document(path);

        let folder = folder.into();
        let entries: Vec<IndexedChunk> = chunks
            .into_iter()
            .map(|chunk| IndexedChunk {
                source_path: path.to_string(),
                heading_path: chunk.heading_path,
                content: chunk.content,
                ordinal: chunk.ordinal,
                document_mtime: mtime,
                tags: tags.clone(),
                folder: folder.clone(),
                embedding: None,
            })
            .collect();

        for entry in &entries {
            self.add_postings(entry);
        }
        log::debug!("Indexed {path}: {} chunks", entries.len());
        self.documents.insert(path.to_string(), entries);
    }

    /// Phase 2: attach embeddings to a previously inserted document. The
    /// vector count must match the chunk count and every vector must match
    /// the index dimension.
    pub fn attach_embeddings(&mut self, path: &str, vectors: Vec<Vec<f32>>) -> Result<()> {
        let chunks = self
            .documents
            .get_mut(path)
            .ok_or_else(|| IndexError::UnknownDocument(path.to_string()))?;

        if vectors.len() != chunks.len() {
            return Err(IndexError::EmbeddingCountMismatch {
                expected: chunks.len(),
                got: vectors.len(),
            });
        }
        for vector in &vectors {
            if vector.len() != self.dimension {
                return Err(IndexError::DimensionMismatch {
                    expected: self.dimension,
                    got: vector.len(),
                });
            }
        }

        for (chunk, vector) in chunks.iter_mut().zip(vectors) {
            chunk.embedding = Some(vector);
        }
        Ok(())
    }

    #[must_use]
    pub fn chunks_for_document(&self, path: &str) -> Option<&[IndexedChunk]> {
        self.documents.get(path).map(Vec::as_slice)
    }

    /// Remove a document's chunks. Idempotent: removing an absent path is
    /// a no-op returning `false`.
    pub fn remove_document(&mut self, path: &str) -> bool {
        let Some(chunks) = self.documents.remove(path) else {
            return false;
        };
        for chunk in &chunks {
            self.drop_postings(chunk);
        }
        true
    }

    /// Metadata-only move of a document's chunks to a new path, keeping
    /// embeddings intact. Returns `false` when the old path is unknown.
    pub fn rename_document(&mut self, old_path: &str, new_path: &str) -> bool {
        let Some(chunks) = self.documents.remove(old_path) else {
            return false;
        };
        for chunk in &chunks {
            self.drop_postings(chunk);
        }
        // A pre-existing target is overwritten, never merged.
        self.remove_document(new_path);

        let moved: Vec<IndexedChunk> = chunks
            .into_iter()
            .map(|mut chunk| {
                chunk.source_path = new_path.to_string();
                chunk
            })
            .collect();
        for chunk in &moved {
            self.add_postings(chunk);
        }
        self.documents.insert(new_path.to_string(), moved);
        true
    }

    #[must_use]
    pub fn document_mtime(&self, path: &str) -> Option<u64> {
        self.documents
            .get(path)
            .and_then(|chunks| chunks.first())
            .map(|chunk| chunk.document_mtime)
    }

    /// All indexed paths, for the reconciler's reverse scan
    #[must_use]
    pub fn paths(&self) -> Vec<String> {
        self.documents.keys().cloned().collect()
    }

    pub fn iter_chunks(&self) -> impl Iterator<Item = &IndexedChunk> {
        self.documents.values().flatten()
    }

    #[must_use]
    pub fn get(&self, path: &str, ordinal: usize) -> Option<&IndexedChunk> {
        self.documents
            .get(path)
            .and_then(|chunks| chunks.iter().find(|c| c.ordinal == ordinal))
    }

    /// Chunks whose postings contain at least one of the given tokens
    #[must_use]
    pub fn candidates(&self, tokens: &[String]) -> Vec<&IndexedChunk> {
        let mut keys: HashSet<&ChunkKey> = HashSet::new();
        for token in tokens {
            if let Some(matches) = self.postings.get(token) {
                keys.extend(matches.iter());
            }
        }
        keys.into_iter()
            .filter_map(|(path, ordinal)| self.get(path, *ordinal))
            .collect()
    }

    pub(crate) fn from_parts(
        model_id: String,
        dimension: usize,
        entries: Vec<IndexedChunk>,
    ) -> Self {
        let mut index = Self::new(model_id, dimension);
        for entry in &entries {
            index.add_postings(entry);
        }
        for entry in entries {
            index
                .documents
                .entry(entry.source_path.clone())
                .or_default()
                .push(entry);
        }
        for chunks in index.documents.values_mut() {
            chunks.sort_by_key(|c| c.ordinal);
        }
        index
    }

    pub(crate) fn entries(&self) -> Vec<IndexedChunk> {
        self.iter_chunks().cloned().collect()
    }

    fn chunk_tokens(chunk: &IndexedChunk) -> Vec<String> {
        let mut text = String::new();
        text.push_str(note_title(&chunk.source_path));
        text.push(' ');
        text.push_str(&chunk.heading_path);
        text.push(' ');
        text.push_str(&chunk.content);
        for tag in &chunk.tags {
            text.push(' ');
            text.push_str(tag);
        }
        tokenize(&text)
    }

    fn add_postings(&mut self, chunk: &IndexedChunk) {
        let key = (chunk.source_path.clone(), chunk.ordinal);
        for token in Self::chunk_tokens(chunk) {
            self.postings.entry(token).or_default().insert(key.clone());
        }
    }

    fn drop_postings(&mut self, chunk: &IndexedChunk) {
        let key = (chunk.source_path.clone(), chunk.ordinal);
        for token in Self::chunk_tokens(chunk) {
            if let Some(set) = self.postings.get_mut(&token) {
                set.remove(&key);
                if set.is_empty() {
                    self.postings.remove(&token);
                }
            }
        }
    }
}

/// Cosine similarity between two equal-length vectors
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let a = ArrayView1::from(a);
    let b = ArrayView1::from(b);
    let dot = a.dot(&b);
    let norm = a.dot(&a).sqrt() * b.dot(&b).sqrt();
    if norm <= f32::EPSILON {
        0.0
    } else {
        dot / norm
    }
}
