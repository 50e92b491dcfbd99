//! Credential-isolated ETag cache for conditional GET requests.
//!
//! Entries are keyed by request method, URL, and a fingerprint of the
//! credential the request was sent with. Two principals fetching the same URL
//! therefore never see each other's cached bodies.
//!
//! Fingerprints are resolved in two tiers: a per-client memo keyed by
//! [`ClientIdentity`], and a fallback that recomputes the fingerprint from
//! request headers. The memo remembers which `Authorization` value it was
//! computed from and is only used for that exact value, so both tiers always
//! agree for the same header.
//!
//! Responses live in memory and, when the cache is opened on a directory,
//! also on disk through [`DiskStore`] so conditional requests survive a
//! restart.

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Method;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use url::Url;

use super::disk::DiskStore;
use crate::error::CacheError;

/// Default number of responses kept by an [`EtagCache`].
pub const DEFAULT_CACHE_CAPACITY: usize = 1000;

const ANONYMOUS: &str = "anonymous";

/// Short, non-reversible digest of the credential a request carries.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CredentialFingerprint(String);

impl CredentialFingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_anonymous(&self) -> bool {
        self.0 == ANONYMOUS
    }
}

impl fmt::Display for CredentialFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fingerprint the credential in `headers`.
///
/// The fingerprint is the hex form of the first 8 bytes of the SHA-256 of the
/// `Authorization` header value, or `anonymous` when the header is absent.
pub fn credential_fingerprint(headers: &HeaderMap) -> CredentialFingerprint {
    match headers.get(AUTHORIZATION) {
        Some(value) => {
            let digest = Sha256::digest(value.as_bytes());
            CredentialFingerprint(hex::encode(&digest[..8]))
        }
        None => CredentialFingerprint(ANONYMOUS.to_string()),
    }
}

/// Opaque identity of one API client instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientIdentity(u64);

impl ClientIdentity {
    /// Allocate an identity no other client in this process holds.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Cache key: SHA-256 over method, URL, and credential fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(method: &Method, url: &Url, fingerprint: &CredentialFingerprint) -> Self {
        let material = format!("{} {}:{}", method.as_str(), url.as_str(), fingerprint.as_str());
        Self(hex::encode(Sha256::digest(material.as_bytes())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A cached response body and the validator it was served with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
    pub etag: String,
    pub body: Bytes,
}

#[derive(Debug)]
struct Entry {
    url: String,
    response: CachedResponse,
}

/// A memoized fingerprint and the header value it was derived from.
struct Memo {
    authorization: Option<HeaderValue>,
    fingerprint: CredentialFingerprint,
}

#[derive(Debug, Default)]
struct Entries {
    map: HashMap<CacheKey, Entry>,
    order: VecDeque<CacheKey>,
}

/// ETag cache with oldest-first eviction in memory and an optional
/// directory-backed store.
///
/// Shareable across clients; isolation comes from the key, not from separate
/// instances. `capacity` bounds the in-memory tier; the directory keeps every
/// entry until it is invalidated.
pub struct EtagCache {
    capacity: usize,
    entries: RwLock<Entries>,
    identities: RwLock<HashMap<ClientIdentity, Memo>>,
    disk: Option<DiskStore>,
}

impl EtagCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: RwLock::new(Entries::default()),
            identities: RwLock::new(HashMap::new()),
            disk: None,
        }
    }

    /// Open a cache whose responses are also persisted under `dir`.
    ///
    /// The directory is created if missing.
    pub fn persistent(capacity: usize, dir: impl Into<PathBuf>) -> Result<Self, CacheError> {
        Ok(Self {
            disk: Some(DiskStore::open(dir)?),
            ..Self::new(capacity)
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn disk(&self) -> Option<&DiskStore> {
        self.disk.as_ref()
    }

    /// Resolve the fingerprint for a request.
    ///
    /// With an identity, the memoized fingerprint is used when it was computed
    /// from the same `Authorization` value as `headers`; otherwise it is
    /// recomputed and the memo replaced. Without an identity it is always
    /// computed from `headers`.
    pub fn fingerprint_for(
        &self,
        identity: Option<ClientIdentity>,
        headers: &HeaderMap,
    ) -> Result<CredentialFingerprint, CacheError> {
        let Some(identity) = identity else {
            return Ok(credential_fingerprint(headers));
        };

        let authorization = headers.get(AUTHORIZATION);

        let known = self
            .identities
            .read()
            .map_err(|e| CacheError::OperationFailed {
                message: format!("Failed to acquire read lock: {}", e),
            })?
            .get(&identity)
            .filter(|memo| memo.authorization.as_ref() == authorization)
            .map(|memo| memo.fingerprint.clone());

        if let Some(fingerprint) = known {
            return Ok(fingerprint);
        }

        let fingerprint = credential_fingerprint(headers);
        self.identities
            .write()
            .map_err(|e| CacheError::OperationFailed {
                message: format!("Failed to acquire write lock: {}", e),
            })?
            .insert(
                identity,
                Memo {
                    authorization: authorization.cloned(),
                    fingerprint: fingerprint.clone(),
                },
            );
        Ok(fingerprint)
    }

    /// Drop the memoized fingerprint for `identity`.
    ///
    /// Called when a client is dropped. Cached responses are unaffected.
    pub fn forget_client(&self, identity: ClientIdentity) -> Result<(), CacheError> {
        self.identities
            .write()
            .map_err(|e| CacheError::OperationFailed {
                message: format!("Failed to acquire write lock: {}", e),
            })?
            .remove(&identity);
        Ok(())
    }

    /// Number of clients with a memoized fingerprint.
    pub fn known_clients(&self) -> Result<usize, CacheError> {
        Ok(self
            .identities
            .read()
            .map_err(|e| CacheError::OperationFailed {
                message: format!("Failed to acquire read lock: {}", e),
            })?
            .len())
    }

    /// Look up a response in memory, then on disk.
    ///
    /// A disk hit is promoted into memory.
    pub fn get(&self, key: &CacheKey) -> Result<Option<CachedResponse>, CacheError> {
        let cached = self
            .entries
            .read()
            .map_err(|e| CacheError::OperationFailed {
                message: format!("Failed to acquire read lock: {}", e),
            })?
            .map
            .get(key)
            .map(|entry| entry.response.clone());
        if cached.is_some() {
            return Ok(cached);
        }

        let Some(disk) = &self.disk else {
            return Ok(None);
        };
        let Some((url, response)) = disk.get_with_url(key)? else {
            return Ok(None);
        };
        if self.capacity > 0 {
            self.store_in_memory(key.clone(), url, response.clone())?;
        }
        Ok(Some(response))
    }

    pub fn etag(&self, key: &CacheKey) -> Result<Option<String>, CacheError> {
        Ok(self.get(key)?.map(|response| response.etag))
    }

    /// Store a response, evicting the oldest in-memory entries when at
    /// capacity.
    ///
    /// Replacing an existing key keeps its position in the eviction order.
    /// A zero-capacity cache stores nothing, on disk included.
    pub fn store(&self, key: CacheKey, url: &Url, response: CachedResponse) -> Result<(), CacheError> {
        if self.capacity == 0 {
            return Ok(());
        }

        if let Some(disk) = &self.disk {
            disk.store(&key, url, &response)?;
        }
        self.store_in_memory(key, url.as_str().to_string(), response)
    }

    fn store_in_memory(&self, key: CacheKey, url: String, response: CachedResponse) -> Result<(), CacheError> {
        let mut entries = self.entries.write().map_err(|e| CacheError::OperationFailed {
            message: format!("Failed to acquire write lock: {}", e),
        })?;

        let entry = Entry { url, response };

        if let Some(existing) = entries.map.get_mut(&key) {
            *existing = entry;
            return Ok(());
        }

        while entries.order.len() >= self.capacity {
            match entries.order.pop_front() {
                Some(oldest) => {
                    entries.map.remove(&oldest);
                }
                None => break,
            }
        }

        entries.order.push_back(key.clone());
        entries.map.insert(key, entry);
        Ok(())
    }

    /// Remove one entry. Returns whether it was present.
    pub fn invalidate(&self, key: &CacheKey) -> Result<bool, CacheError> {
        let mut entries = self.entries.write().map_err(|e| CacheError::OperationFailed {
            message: format!("Failed to acquire write lock: {}", e),
        })?;

        let mut removed = entries.map.remove(key).is_some();
        if removed {
            entries.order.retain(|k| k != key);
        }
        drop(entries);

        if let Some(disk) = &self.disk {
            removed |= disk.remove(key)?;
        }
        Ok(removed)
    }

    /// Remove every entry for `url`, whatever credential cached it.
    pub fn invalidate_url(&self, url: &Url) -> Result<usize, CacheError> {
        let mut entries = self.entries.write().map_err(|e| CacheError::OperationFailed {
            message: format!("Failed to acquire write lock: {}", e),
        })?;

        let before = entries.map.len();
        entries.map.retain(|_, entry| entry.url != url.as_str());
        let Entries { map, order } = &mut *entries;
        order.retain(|k| map.contains_key(k));
        let in_memory = before - map.len();
        drop(entries);

        // Disk holds a superset of the in-memory entries.
        match &self.disk {
            Some(disk) => Ok(disk.remove_url(url)?.max(in_memory)),
            None => Ok(in_memory),
        }
    }

    /// Remove every cached response.
    pub fn clear(&self) -> Result<(), CacheError> {
        let mut entries = self.entries.write().map_err(|e| CacheError::OperationFailed {
            message: format!("Failed to acquire write lock: {}", e),
        })?;
        entries.map.clear();
        entries.order.clear();
        drop(entries);

        if let Some(disk) = &self.disk {
            disk.clear()?;
        }
        Ok(())
    }

    /// Number of responses held in memory.
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.map.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for EtagCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

impl fmt::Debug for EtagCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EtagCache")
            .field("capacity", &self.capacity)
            .field("entries", &self.len())
            .field("dir", &self.disk.as_ref().map(|d| d.dir().display().to_string()))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[path = "cache_tests.rs"]
mod tests;
