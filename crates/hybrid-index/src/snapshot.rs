use crate::entry::IndexedChunk;
use crate::error::{IndexError, Result};
use crate::index::SearchIndex;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// On-disk snapshot format version. Any mismatch discards the snapshot in
/// full and forces a re-index; snapshots are never partially migrated.
pub const INDEX_SCHEMA_VERSION: u32 = 2;

#[derive(Serialize, Deserialize)]
struct Snapshot {
    schema_version: u32,
    model_id: String,
    dimension: usize,
    entries: Vec<IndexedChunk>,
}

/// Result of loading a snapshot
#[derive(Debug)]
pub enum LoadOutcome {
    /// Snapshot accepted; index restored
    Loaded(SearchIndex),
    /// Snapshot missing, corrupt, or version-mismatched: start empty and
    /// re-index everything
    Rebuild(SearchIndex),
}

impl LoadOutcome {
    #[must_use]
    pub fn into_index(self) -> SearchIndex {
        match self {
            Self::Loaded(index) | Self::Rebuild(index) => index,
        }
    }

    #[must_use]
    pub const fn needs_rebuild(&self) -> bool {
        matches!(self, Self::Rebuild(_))
    }
}

/// Serialize the whole index atomically (write to a temp file, then
/// rename into place)
pub async fn save_snapshot(index: &SearchIndex, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let snapshot = Snapshot {
        schema_version: INDEX_SCHEMA_VERSION,
        model_id: index.model_id().to_string(),
        dimension: index.dimension(),
        entries: index.entries(),
    };
    let bytes = serde_json::to_vec(&snapshot)?;

    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await?;
    log::debug!(
        "Saved index snapshot to {} ({} chunks)",
        path.display(),
        index.chunk_count()
    );
    Ok(())
}

/// Load a snapshot for the configured model and dimension.
///
/// A missing file, unparsable payload, or schema-version mismatch yields
/// `Rebuild` with an empty index. A snapshot that parses but was built
/// for a different model or dimension is a configuration error and fails
/// initialization outright.
pub async fn load_snapshot(
    path: &Path,
    configured_model: &str,
    configured_dimension: usize,
) -> Result<LoadOutcome> {
    let empty = || SearchIndex::new(configured_model, configured_dimension);

    if !path.exists() {
        return Ok(LoadOutcome::Rebuild(empty()));
    }

    let bytes = tokio::fs::read(path).await?;
    let snapshot: Snapshot = match serde_json::from_slice(&bytes) {
        Ok(snapshot) => snapshot,
        Err(err) => {
            log::warn!("Discarding corrupt index snapshot {}: {err}", path.display());
            return Ok(LoadOutcome::Rebuild(empty()));
        }
    };

    if snapshot.schema_version != INDEX_SCHEMA_VERSION {
        log::warn!(
            "Discarding index snapshot with schema version {} (engine is at {INDEX_SCHEMA_VERSION})",
            snapshot.schema_version
        );
        return Ok(LoadOutcome::Rebuild(empty()));
    }

    if snapshot.model_id != configured_model {
        return Err(IndexError::ModelMismatch {
            snapshot: snapshot.model_id,
            configured: configured_model.to_string(),
        });
    }
    if snapshot.dimension != configured_dimension {
        return Err(IndexError::DimensionMismatch {
            expected: configured_dimension,
            got: snapshot.dimension,
        });
    }

    // A stored vector that disagrees with the declared dimension means the
    // payload itself is damaged; treat it like corruption.
    let damaged = snapshot.entries.iter().any(|entry| {
        entry
            .embedding
            .as_ref()
            .is_some_and(|v| v.len() != snapshot.dimension)
    });
    if damaged {
        log::warn!("Discarding index snapshot with inconsistent vector sizes");
        return Ok(LoadOutcome::Rebuild(empty()));
    }

    let index = SearchIndex::from_parts(snapshot.model_id, snapshot.dimension, snapshot.entries);
    log::info!(
        "Loaded index snapshot: {} documents, {} chunks",
        index.document_count(),
        index.chunk_count()
    );
    Ok(LoadOutcome::Loaded(index))
}

#[cfg(test)]
mod tests {
    use super::*;
    use noteseek_chunker::NoteChunk;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn sample_index() -> SearchIndex {
        let mut index = SearchIndex::new("test-model", 2);
        index.insert_document(
            "notes/a.md",
            vec![NoteChunk {
                source_path: "notes/a.md".to_string(),
                heading_path: "Section".to_string(),
                content: "hello snapshot".to_string(),
                ordinal: 0,
            }],
            42,
            vec!["tag".to_string()],
            "notes",
        );
        index.attach_embeddings("notes/a.md", vec![vec![0.6, 0.8]]).unwrap();
        index
    }

    #[tokio::test]
    async fn save_then_load_roundtrips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("index.json");

        let index = sample_index();
        save_snapshot(&index, &path).await.unwrap();

        let outcome = load_snapshot(&path, "test-model", 2).await.unwrap();
        assert!(!outcome.needs_rebuild());
        let loaded = outcome.into_index();
        assert_eq!(loaded.document_count(), 1);
        assert_eq!(loaded.entries(), index.entries());
        // Postings were rebuilt, not just entries.
        assert_eq!(loaded.candidates(&["snapshot".to_string()]).len(), 1);
        // No temp file left behind.
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn missing_file_rebuilds_empty() {
        let dir = TempDir::new().unwrap();
        let outcome = load_snapshot(&dir.path().join("nope.json"), "m", 2)
            .await
            .unwrap();
        assert!(outcome.needs_rebuild());
        assert_eq!(outcome.into_index().document_count(), 0);
    }

    #[tokio::test]
    async fn old_schema_version_is_discarded_entirely() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("index.json");

        let stale = serde_json::json!({
            "schema_version": INDEX_SCHEMA_VERSION - 1,
            "model_id": "test-model",
            "dimension": 2,
            "entries": [{
                "source_path": "a.md",
                "heading_path": "",
                "content": "old format",
                "ordinal": 0,
                "document_mtime": 1,
            }],
        });
        tokio::fs::write(&path, stale.to_string()).await.unwrap();

        let outcome = load_snapshot(&path, "test-model", 2).await.unwrap();
        assert!(outcome.needs_rebuild());
        assert_eq!(outcome.into_index().document_count(), 0);
    }

    #[tokio::test]
    async fn corrupt_payload_rebuilds_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("index.json");
        tokio::fs::write(&path, b"{not json").await.unwrap();

        let outcome = load_snapshot(&path, "m", 2).await.unwrap();
        assert!(outcome.needs_rebuild());
    }

    #[tokio::test]
    async fn model_or_dimension_mismatch_is_fatal() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("index.json");
        save_snapshot(&sample_index(), &path).await.unwrap();

        let err = load_snapshot(&path, "other-model", 2).await.unwrap_err();
        assert!(matches!(err, IndexError::ModelMismatch { .. }));

        let err = load_snapshot(&path, "test-model", 768).await.unwrap_err();
        assert!(matches!(err, IndexError::DimensionMismatch { expected: 768, got: 2 }));
    }
}
