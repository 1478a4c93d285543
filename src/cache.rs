//! Query result caching.
//!
//! The pipeline only needs get/put-with-expiry semantics; how entries
//! are backed is an implementation detail behind [`QueryCache`]. The
//! in-memory store backs tests and `--no-cache` runs; the disk store
//! persists immutable upstream data across CLI invocations.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

/// Key/value store with per-entry expiry.
pub trait QueryCache {
    /// Fetch a live entry; `None` when absent or expired.
    fn get(&self, key: &str) -> Option<Value>;

    /// Store a document for `ttl_minutes`.
    fn put(&self, key: &str, document: &Value, ttl_minutes: i64);
}

struct MemoryEntry {
    document: Value,
    expires_at: DateTime<Utc>,
}

/// Process-local cache. Entries die with the process.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, MemoryEntry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries, expired ones included until touched.
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.lock().expect("cache lock poisoned").len()
    }
}

impl QueryCache for MemoryCache {
    fn get(&self, key: &str) -> Option<Value> {
        let mut entries = self.entries.lock().expect("cache lock poisoned");

        let expired = match entries.get(key) {
            Some(entry) if entry.expires_at > Utc::now() => return Some(entry.document.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.remove(key);
        }
        None
    }

    fn put(&self, key: &str, document: &Value, ttl_minutes: i64) {
        let entry = MemoryEntry {
            document: document.clone(),
            expires_at: Utc::now() + Duration::minutes(ttl_minutes),
        };
        self.entries
            .lock()
            .expect("cache lock poisoned")
            .insert(key.to_string(), entry);
    }
}

/// Entry layout for the on-disk store.
#[derive(Serialize, Deserialize)]
struct DiskEntry {
    expires_at: DateTime<Utc>,
    document: Value,
}

/// File-per-key cache under a spill directory. Write failures degrade
/// to cache misses rather than report failures.
pub struct DiskCache {
    dir: PathBuf,
}

impl DiskCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        let stem: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .take(80)
            .collect();
        self.dir.join(format!("{stem}-{:016x}.json", digest(key)))
    }
}

/// FNV-1a; stable across runs so file names stay valid between
/// invocations.
fn digest(key: &str) -> u64 {
    key.bytes().fold(0xcbf2_9ce4_8422_2325_u64, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(0x0000_0100_0000_01b3)
    })
}

impl QueryCache for DiskCache {
    fn get(&self, key: &str) -> Option<Value> {
        let path = self.entry_path(key);
        let raw = fs::read(&path).ok()?;

        let entry: DiskEntry = match serde_json::from_slice(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                warn!("discarding unreadable cache entry {}: {}", path.display(), e);
                let _ = fs::remove_file(&path);
                return None;
            }
        };

        if entry.expires_at <= Utc::now() {
            debug!("cache entry for {} expired", key);
            let _ = fs::remove_file(&path);
            return None;
        }

        Some(entry.document)
    }

    fn put(&self, key: &str, document: &Value, ttl_minutes: i64) {
        if let Err(e) = fs::create_dir_all(&self.dir) {
            warn!("cannot create cache directory {}: {}", self.dir.display(), e);
            return;
        }

        let entry = DiskEntry {
            expires_at: Utc::now() + Duration::minutes(ttl_minutes),
            document: document.clone(),
        };

        match serde_json::to_vec(&entry) {
            Ok(bytes) => {
                if let Err(e) = fs::write(self.entry_path(key), bytes) {
                    warn!("cannot write cache entry for {}: {}", key, e);
                }
            }
            Err(e) => warn!("cannot serialize cache entry for {}: {}", key, e),
        }
    }
}
