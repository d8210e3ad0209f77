//! On-disk cache of normalized documents.
//!
//! Two keying policies:
//!
//! * [`CacheKeyPolicy::BaseName`]: an entry is any `*.json` file directly in
//!   the cache directory whose name starts with the input's base name. New
//!   entries are written as `<base>-output_transformed.json`.
//! * [`CacheKeyPolicy::ContentHash`]: entries live under `by_hash/`, named
//!   after the SHA-256 of the input bytes and the page window, and are
//!   listed in `by_hash/cache_index.json` as `{key, created_at, path}`.
//!
//! All writes go through a temporary file and a rename.

use crate::config::CacheKeyPolicy;
use crate::error::DeckError;
use crate::model::Document;
use crate::pipeline::input::DeckInput;
use crate::pipeline::select::PageWindow;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

const HASH_DIR: &str = "by_hash";
const INDEX_FILE: &str = "cache_index.json";

/// Identifies one cache entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheKey {
    BaseName(String),
    ContentHash { base_name: String, digest: String },
}

impl CacheKey {
    pub fn base_name(&self) -> &str {
        match self {
            CacheKey::BaseName(b) => b,
            CacheKey::ContentHash { base_name, .. } => base_name,
        }
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheKey::BaseName(b) => write!(f, "name:{b}"),
            CacheKey::ContentHash { digest, .. } => write!(f, "sha256:{digest}"),
        }
    }
}

/// A cached document and where it was read from.
#[derive(Debug, Clone)]
pub struct CacheHit {
    pub document: Document,
    pub path: PathBuf,
}

/// One record of the content-hash index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    /// Seconds since the Unix epoch.
    pub created_at: u64,
    pub path: PathBuf,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheIndex {
    entries: Vec<CacheEntry>,
}

/// Normalized-document cache rooted at one directory.
#[derive(Debug, Clone)]
pub struct ExtractionCache {
    dir: PathBuf,
    policy: CacheKeyPolicy,
}

impl ExtractionCache {
    pub fn new(dir: impl Into<PathBuf>, policy: CacheKeyPolicy) -> Self {
        Self {
            dir: dir.into(),
            policy,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Derive the key for `input` under this cache's policy.
    ///
    /// `ContentHash` reads the whole input file.
    pub async fn key_for(&self, input: &DeckInput, window: PageWindow) -> Result<CacheKey, DeckError> {
        match self.policy {
            CacheKeyPolicy::BaseName => Ok(CacheKey::BaseName(input.base_name.clone())),
            CacheKeyPolicy::ContentHash => {
                let bytes = tokio::fs::read(&input.path)
                    .await
                    .map_err(|_| DeckError::FileNotFound {
                        path: input.path.clone(),
                    })?;
                Ok(CacheKey::ContentHash {
                    base_name: input.base_name.clone(),
                    digest: content_digest(&bytes, window),
                })
            }
        }
    }

    /// Find and load the entry for `key`.
    pub async fn lookup(&self, key: &CacheKey) -> Result<Option<CacheHit>, DeckError> {
        let path = match key {
            CacheKey::BaseName(base) => self.find_by_prefix(base).await?,
            CacheKey::ContentHash { digest, .. } => self.find_in_index(digest).await?,
        };
        let Some(path) = path else {
            debug!("Cache miss for {}", key);
            return Ok(None);
        };

        let bytes = tokio::fs::read(&path).await.map_err(|e| cache_error(&path, e))?;
        let document = Document::from_slice(&bytes).map_err(|e| cache_error(&path, e))?;
        info!(
            "Cache hit for {}: {} ({} elements)",
            key,
            path.display(),
            document.elements.len()
        );
        Ok(Some(CacheHit { document, path }))
    }

    /// Persist `document` under `key` and return the entry path.
    pub async fn store(&self, key: &CacheKey, document: &Document) -> Result<PathBuf, DeckError> {
        let path = self.entry_path(key);
        let json = serde_json::to_vec_pretty(document)
            .map_err(|e| DeckError::Internal(format!("serialise document: {e}")))?;
        write_atomic(&path, &json).await?;

        if let CacheKey::ContentHash { digest, .. } = key {
            self.record(digest, &path).await?;
        }
        debug!("Stored {} at {}", key, path.display());
        Ok(path)
    }

    /// Where the entry for `key` is written.
    pub fn entry_path(&self, key: &CacheKey) -> PathBuf {
        match key {
            CacheKey::BaseName(base) => self.dir.join(format!("{base}-output_transformed.json")),
            CacheKey::ContentHash { base_name, digest } => self
                .dir
                .join(HASH_DIR)
                .join(format!("{base_name}-{}_transformed.json", &digest[..16.min(digest.len())])),
        }
    }

    fn index_path(&self) -> PathBuf {
        self.dir.join(HASH_DIR).join(INDEX_FILE)
    }

    async fn find_by_prefix(&self, base: &str) -> Result<Option<PathBuf>, DeckError> {
        let mut dir = match tokio::fs::read_dir(&self.dir).await {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(cache_error(&self.dir, e)),
        };

        let mut matches = Vec::new();
        while let Some(entry) = dir.next_entry().await.map_err(|e| cache_error(&self.dir, e))? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with(base) && name.ends_with(".json") {
                matches.push(entry.path());
            }
        }
        matches.sort();
        Ok(matches.into_iter().next())
    }

    async fn find_in_index(&self, digest: &str) -> Result<Option<PathBuf>, DeckError> {
        let index = self.load_index().await?;
        let Some(entry) = index.entries.into_iter().find(|e| e.key == digest) else {
            return Ok(None);
        };
        if tokio::fs::try_exists(&entry.path).await.unwrap_or(false) {
            Ok(Some(entry.path))
        } else {
            debug!("Index entry {} points at a missing file", entry.key);
            Ok(None)
        }
    }

    async fn load_index(&self) -> Result<CacheIndex, DeckError> {
        let path = self.index_path();
        match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| cache_error(&path, e)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(CacheIndex::default()),
            Err(e) => Err(cache_error(&path, e)),
        }
    }

    async fn record(&self, digest: &str, entry_path: &Path) -> Result<(), DeckError> {
        let mut index = self.load_index().await?;
        index.entries.retain(|e| e.key != digest);
        index.entries.push(CacheEntry {
            key: digest.to_string(),
            created_at: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
            path: entry_path.to_path_buf(),
        });
        let json = serde_json::to_vec_pretty(&index)
            .map_err(|e| DeckError::Internal(format!("serialise cache index: {e}")))?;
        write_atomic(&self.index_path(), &json).await
    }

    /// Entries currently listed in the content-hash index.
    pub async fn index_entries(&self) -> Result<Vec<CacheEntry>, DeckError> {
        Ok(self.load_index().await?.entries)
    }
}

/// SHA-256 over the input bytes and the page window, hex encoded.
pub fn content_digest(bytes: &[u8], window: PageWindow) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.update(window.max_pages.to_le_bytes());
    hasher.update([u8::from(window.tail)]);
    format!("{:x}", hasher.finalize())
}

/// Write `bytes` to `path` via a sibling temporary file and a rename.
pub(crate) async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), DeckError> {
    let fail = |e: std::io::Error| DeckError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await.map_err(fail)?;
        }
    }
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, bytes).await.map_err(fail)?;
    tokio::fs::rename(&tmp, path).await.map_err(fail)
}

fn cache_error(path: &Path, e: impl std::fmt::Display) -> DeckError {
    DeckError::Cache {
        path: path.to_path_buf(),
        detail: e.to_string(),
    }
}
