//! In-process dataset cache
//!
//! Cache key: canonical source path. An entry is reused only when both the
//! content fingerprint (SHA-256 of the raw bytes) and the ingest options
//! match; otherwise the source is re-ingested in full.
//!
//! **Publish behavior:** a new dataset is built completely before it replaces
//! the entry, so a failed re-ingest leaves the previous entry untouched and
//! callers never observe a half-built dataset.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};

use crate::ingest::{self, Dataset, IngestOptions};

/// Hex SHA-256 of the source bytes
pub fn fingerprint(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[derive(Debug)]
struct CacheEntry {
    fingerprint: String,
    options: IngestOptions,
    dataset: Arc<Dataset>,
}

/// Outcome of a cache lookup, reported for logging and tests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    Hit,
    Miss,
}

#[derive(Debug, Default)]
pub struct DatasetCache {
    entries: HashMap<PathBuf, CacheEntry>,
}

impl DatasetCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a dataset, reusing the cached copy when the source is unchanged
    pub fn load(&mut self, path: &Path, options: &IngestOptions) -> Result<Arc<Dataset>> {
        self.load_with_outcome(path, options).map(|(dataset, _)| dataset)
    }

    /// Like `load`, also reporting whether the cache was hit
    pub fn load_with_outcome(
        &mut self,
        path: &Path,
        options: &IngestOptions,
    ) -> Result<(Arc<Dataset>, CacheOutcome)> {
        let key = cache_key(path);
        let bytes = std::fs::read(path)
            .with_context(|| format!("failed to read access log: {}", path.display()))?;
        let current = fingerprint(&bytes);

        if let Some(entry) = self.entries.get(&key) {
            if entry.fingerprint == current && &entry.options == options {
                log::info!("dataset cache hit: {}", path.display());
                return Ok((Arc::clone(&entry.dataset), CacheOutcome::Hit));
            }
        }

        log::info!("dataset cache miss: {}", path.display());
        let dataset = ingest::ingest_bytes(&bytes, options)
            .with_context(|| format!("failed to ingest access log: {}", path.display()))?;
        let dataset = Arc::new(dataset);
        self.entries.insert(
            key,
            CacheEntry {
                fingerprint: current,
                options: options.clone(),
                dataset: Arc::clone(&dataset),
            },
        );
        Ok((dataset, CacheOutcome::Miss))
    }

    /// Drop the entry for one source; returns whether one existed
    pub fn invalidate(&mut self, path: &Path) -> bool {
        self.entries.remove(&cache_key(path)).is_some()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn cache_key(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}
