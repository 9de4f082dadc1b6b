use crate::error::{EngineError, Result};
use async_trait::async_trait;
use ignore::WalkBuilder;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Note file extensions the vault store picks up
const NOTE_EXTENSIONS: &[&str] = &["md", "markdown", "txt"];

/// What the engine observes about a document. The document itself is
/// owned by the external store and only ever read here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentMeta {
    /// Vault-relative path with forward slashes; the unique key
    pub path: String,
    /// Unix mtime, seconds
    pub mtime: u64,
    pub tags: Vec<String>,
    pub folder: String,
}

/// Change notification from the store, bridged into engine commands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocEvent {
    Created(String),
    Modified(String),
    Deleted(String),
    Renamed { from: String, to: String },
}

/// The document store boundary: enumeration plus content reads.
/// Change notifications arrive separately; the periodic reconciliation
/// scan is the safety net when they are missed.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn list_documents(&self) -> Result<Vec<DocumentMeta>>;

    /// `Ok(None)` when the document no longer exists; deletion mid-read
    /// is an expected race, not an error
    async fn read_content(&self, path: &str) -> Result<Option<String>>;

    async fn metadata(&self, path: &str) -> Result<Option<DocumentMeta>>;
}

/// Filesystem store over a directory of markdown notes
pub struct VaultStore {
    root: PathBuf,
}

impl VaultStore {
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_dir() {
            return Err(EngineError::InvalidPath(format!(
                "vault directory does not exist: {}",
                root.display()
            )));
        }
        Ok(Self { root })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Vault-relative, forward-slash form of an absolute path; `None` for
    /// paths outside the vault or non-note files
    #[must_use]
    pub fn relative_note_path(&self, path: &Path) -> Option<String> {
        if !is_note_file(path) {
            return None;
        }
        let relative = path.strip_prefix(&self.root).ok()?;
        Some(normalize_path(relative))
    }

    fn absolute(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }

    fn meta_from_fs(&self, absolute: &Path, relative: String) -> Option<DocumentMeta> {
        let fs_meta = std::fs::metadata(absolute).ok()?;
        let mtime = fs_meta
            .modified()
            .ok()
            .and_then(|m| m.duration_since(SystemTime::UNIX_EPOCH).ok())
            .map_or(0, |d| d.as_secs());
        let folder = relative
            .rsplit_once('/')
            .map_or(String::new(), |(dir, _)| dir.to_string());
        let tags = std::fs::read_to_string(absolute)
            .map(|content| extract_tags(&content))
            .unwrap_or_default();
        Some(DocumentMeta {
            path: relative,
            mtime,
            tags,
            folder,
        })
    }
}

#[async_trait]
impl DocumentStore for VaultStore {
    async fn list_documents(&self) -> Result<Vec<DocumentMeta>> {
        let root = self.root.clone();
        let docs = tokio::task::spawn_blocking(move || {
            let store = VaultStore { root };
            let mut docs = Vec::new();
            let walker = WalkBuilder::new(&store.root).hidden(true).build();
            for entry in walker.flatten() {
                let path = entry.path();
                if !path.is_file() || !is_note_file(path) {
                    continue;
                }
                if let Some(relative) = store.relative_note_path(path) {
                    if let Some(meta) = store.meta_from_fs(path, relative) {
                        docs.push(meta);
                    }
                }
            }
            docs.sort_by(|a, b| a.path.cmp(&b.path));
            docs
        })
        .await
        .map_err(|e| EngineError::Other(format!("vault scan failed: {e}")))?;
        Ok(docs)
    }

    async fn read_content(&self, path: &str) -> Result<Option<String>> {
        match tokio::fs::read_to_string(self.absolute(path)).await {
            Ok(content) => Ok(Some(content)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn metadata(&self, path: &str) -> Result<Option<DocumentMeta>> {
        let absolute = self.absolute(path);
        if !absolute.exists() {
            return Ok(None);
        }
        Ok(self.meta_from_fs(&absolute, path.to_string()))
    }
}

fn is_note_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            NOTE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}

fn normalize_path(relative: &Path) -> String {
    let mut normalized = relative.to_string_lossy().to_string();
    if normalized.contains('\\') {
        normalized = normalized.replace('\\', "/");
    }
    normalized
}

/// Tags from a frontmatter `tags:` line plus inline `#tag` tokens
#[must_use]
pub fn extract_tags(content: &str) -> Vec<String> {
    let mut tags = Vec::new();

    if let Some(frontmatter) = frontmatter_block(content) {
        for line in frontmatter.lines() {
            let Some(value) = line.trim().strip_prefix("tags:") else {
                continue;
            };
            for raw in value.split([',', '[', ']', '"', '\'']) {
                let tag = raw.trim().trim_start_matches('#');
                if !tag.is_empty() {
                    tags.push(tag.to_lowercase());
                }
            }
        }
    }

    // Inline #tag tokens outside the frontmatter.
    let body = frontmatter_block(content)
        .map_or(content, |fm| &content[fm.len()..]);
    for word in body.split_whitespace() {
        let Some(tag) = word.strip_prefix('#') else {
            continue;
        };
        let clean: String = tag
            .chars()
            .take_while(|c| c.is_alphanumeric() || *c == '-' || *c == '_' || *c == '/')
            .collect();
        // A bare "#" or a markdown heading marker is not a tag.
        if !clean.is_empty() && !clean.chars().all(char::is_numeric) {
            tags.push(clean.to_lowercase());
        }
    }

    tags.sort();
    tags.dedup();
    tags
}

fn frontmatter_block(content: &str) -> Option<&str> {
    let rest = content.strip_prefix("---\n")?;
    let end = rest.find("\n---")?;
    Some(&content[..4 + end + 4])
}
