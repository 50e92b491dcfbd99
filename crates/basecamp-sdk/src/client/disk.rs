//! Directory-backed storage for cached responses.
//!
//! Layout under the cache directory:
//!
//! ```text
//! etags.json              key -> { etag, url }
//! responses/<key>.body    raw response body
//! ```
//!
//! Directories are created owner-only (`0700` on Unix) and every file is
//! written to a temporary sibling and renamed into place, so a crash never
//! leaves a truncated body or index behind.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};
use url::Url;

use super::cache::{CacheKey, CachedResponse};
use crate::error::CacheError;

const INDEX_FILE: &str = "etags.json";
const RESPONSES_DIR: &str = "responses";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexEntry {
    etag: String,
    url: String,
}

type Index = BTreeMap<String, IndexEntry>;

/// Cached responses persisted in a directory.
#[derive(Debug)]
pub struct DiskStore {
    dir: PathBuf,
    // Serializes read-modify-write cycles on the index.
    lock: Mutex<()>,
}

impl DiskStore {
    /// Open (creating if needed) a store rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let dir = dir.into();
        create_private_dir(&dir.join(RESPONSES_DIR))?;
        debug!(dir = %dir.display(), "Opened persistent response cache");
        Ok(Self {
            dir,
            lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn get(&self, key: &CacheKey) -> Result<Option<CachedResponse>, CacheError> {
        Ok(self.get_with_url(key)?.map(|(_, response)| response))
    }

    /// Like [`get`](Self::get), also returning the URL the entry was cached for.
    pub fn get_with_url(&self, key: &CacheKey) -> Result<Option<(String, CachedResponse)>, CacheError> {
        let _guard = self.lock()?;

        let Some(entry) = self.read_index()?.remove(key.as_str()) else {
            return Ok(None);
        };

        let path = self.body_path(key);
        match fs::read(&path) {
            Ok(body) => Ok(Some((
                entry.url,
                CachedResponse {
                    etag: entry.etag,
                    body: Bytes::from(body),
                },
            ))),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(key = %key.as_str(), "Indexed response body is missing");
                Ok(None)
            }
            Err(e) => Err(io_error(&path, e)),
        }
    }

    /// Write the body, then record its ETag in the index.
    pub fn store(&self, key: &CacheKey, url: &Url, response: &CachedResponse) -> Result<(), CacheError> {
        let _guard = self.lock()?;

        create_private_dir(&self.dir.join(RESPONSES_DIR))?;
        write_atomic(&self.body_path(key), &response.body)?;

        let mut index = self.read_index()?;
        index.insert(
            key.as_str().to_string(),
            IndexEntry {
                etag: response.etag.clone(),
                url: url.as_str().to_string(),
            },
        );
        self.write_index(&index)
    }

    /// Remove one entry. Returns whether it was indexed.
    pub fn remove(&self, key: &CacheKey) -> Result<bool, CacheError> {
        let _guard = self.lock()?;

        let mut index = self.read_index()?;
        let removed = index.remove(key.as_str()).is_some();
        self.remove_body(key.as_str())?;
        if removed {
            self.write_index(&index)?;
        }
        Ok(removed)
    }

    /// Remove every entry cached for `url`.
    pub fn remove_url(&self, url: &Url) -> Result<usize, CacheError> {
        let _guard = self.lock()?;

        let mut index = self.read_index()?;
        let keys: Vec<String> = index
            .iter()
            .filter(|(_, entry)| entry.url == url.as_str())
            .map(|(key, _)| key.clone())
            .collect();
        if keys.is_empty() {
            return Ok(0);
        }

        for key in &keys {
            index.remove(key);
            self.remove_body(key)?;
        }
        self.write_index(&index)?;
        Ok(keys.len())
    }

    /// Remove every response and the index.
    pub fn clear(&self) -> Result<(), CacheError> {
        let _guard = self.lock()?;

        let responses = self.dir.join(RESPONSES_DIR);
        match fs::remove_dir_all(&responses) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(io_error(&responses, e)),
        }
        remove_if_present(&self.dir.join(INDEX_FILE))
    }

    /// Number of indexed entries.
    pub fn len(&self) -> Result<usize, CacheError> {
        let _guard = self.lock()?;
        Ok(self.read_index()?.len())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, ()>, CacheError> {
        self.lock.lock().map_err(|e| CacheError::OperationFailed {
            message: format!("Failed to acquire disk cache lock: {}", e),
        })
    }

    fn body_path(&self, key: &CacheKey) -> PathBuf {
        self.dir
            .join(RESPONSES_DIR)
            .join(format!("{}.body", key.as_str()))
    }

    fn remove_body(&self, key: &str) -> Result<(), CacheError> {
        remove_if_present(&self.dir.join(RESPONSES_DIR).join(format!("{}.body", key)))
    }

    /// A missing index is empty; an unreadable one is discarded.
    fn read_index(&self) -> Result<Index, CacheError> {
        let path = self.dir.join(INDEX_FILE);
        let raw = match fs::read(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Index::new()),
            Err(e) => return Err(io_error(&path, e)),
        };

        match serde_json::from_slice(&raw) {
            Ok(index) => Ok(index),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Discarding corrupt cache index");
                Ok(Index::new())
            }
        }
    }

    fn write_index(&self, index: &Index) -> Result<(), CacheError> {
        let raw = serde_json::to_vec_pretty(index).map_err(|e| CacheError::OperationFailed {
            message: format!("Failed to encode cache index: {}", e),
        })?;
        write_atomic(&self.dir.join(INDEX_FILE), &raw)
    }
}

fn create_private_dir(path: &Path) -> Result<(), CacheError> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    builder.create(path).map_err(|e| io_error(path, e))
}

/// Write through a temporary file in the same directory, then rename.
///
/// Temporary files are created `0600` on Unix.
fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), CacheError> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let mut file = tempfile::NamedTempFile::new_in(parent).map_err(|e| io_error(parent, e))?;
    file.write_all(contents).map_err(|e| io_error(path, e))?;
    file.as_file().sync_all().map_err(|e| io_error(path, e))?;
    file.persist(path).map_err(|e| io_error(path, e.error))?;
    Ok(())
}

fn remove_if_present(path: &Path) -> Result<(), CacheError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(io_error(path, e)),
    }
}

fn io_error(path: &Path, source: std::io::Error) -> CacheError {
    CacheError::Io {
        path: path.display().to_string(),
        source,
    }
}

#[cfg(test)]
#[path = "disk_tests.rs"]
mod tests;
