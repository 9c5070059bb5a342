//! Content-addressed store of compiled artifacts.
//!
//! Bounded by entry count and total bytes; least recently used entries are
//! evicted first. Lookups take the read lock and promote the hit only when
//! the write lock is free, so concurrent readers never wait on each other.

use std::num::NonZeroUsize;
use std::sync::{Arc, PoisonError, RwLock};

use lru::LruCache;
use tracing::debug;

use crate::config::CacheConfig;
use crate::source::Digest;

/// Compiled wasm bytes. Cheap to clone, never mutated.
#[derive(Clone, PartialEq, Eq)]
pub struct CompiledArtifact(Arc<[u8]>);

impl CompiledArtifact {
    pub fn new(bytes: impl Into<Arc<[u8]>>) -> Self {
        Self(bytes.into())
    }

    pub fn bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for CompiledArtifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CompiledArtifact({} bytes)", self.0.len())
    }
}

impl From<Vec<u8>> for CompiledArtifact {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes.into())
    }
}

struct Inner {
    entries: LruCache<Digest, CompiledArtifact>,
    bytes: usize,
}

pub struct CompilationCache {
    inner: RwLock<Inner>,
    max_bytes: usize,
}

impl Default for CompilationCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl CompilationCache {
    pub fn new(config: CacheConfig) -> Self {
        let cap = NonZeroUsize::new(config.max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: RwLock::new(Inner {
                entries: LruCache::new(cap),
                bytes: 0,
            }),
            max_bytes: config.max_bytes,
        }
    }

    pub fn get(&self, digest: &Digest) -> Option<CompiledArtifact> {
        let hit = {
            let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
            inner.entries.peek(digest).cloned()
        };
        if hit.is_some() {
            if let Ok(mut inner) = self.inner.try_write() {
                inner.entries.promote(digest);
            }
        }
        hit
    }

    /// Insert an artifact. One larger than the whole byte budget is not
    /// cached at all.
    pub fn insert(&self, digest: Digest, artifact: CompiledArtifact) {
        if artifact.len() > self.max_bytes {
            debug!(digest = %digest.short(), size = artifact.len(), "artifact exceeds cache budget");
            return;
        }
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.bytes += artifact.len();
        if let Some((old_key, old)) = inner.entries.push(digest, artifact) {
            inner.bytes -= old.len();
            if old_key != digest {
                debug!(digest = %old_key.short(), "evicted artifact (entry cap)");
            }
        }
        while inner.bytes > self.max_bytes {
            let Some((old_key, old)) = inner.entries.pop_lru() else {
                break;
            };
            inner.bytes -= old.len();
            debug!(digest = %old_key.short(), "evicted artifact (byte cap)");
        }
    }

    pub fn contains(&self, digest: &Digest) -> bool {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .contains(digest)
    }

    /// Number of cached artifacts.
    pub fn size(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }

    pub fn total_bytes(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).bytes
    }

    pub fn clear(&self) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.entries.clear();
        inner.bytes = 0;
    }
}
