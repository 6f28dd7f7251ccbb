//! Decoded prototype cache keyed by chunk digest
//!
//! Loading the same bytes twice shares one prototype tree instead of
//! decoding it again. The cache holds at most `capacity` chunks and evicts
//! the oldest entry first.

use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use sha1::{Digest, Sha1};

use super::{undump, ChunkError, Prototype};

/// Default number of chunks kept by a cache
pub const DEFAULT_CHUNK_CACHE_SIZE: usize = 128;

/// Cache of decoded prototypes keyed by the SHA1 hex digest of the chunk
#[derive(Debug)]
pub struct ChunkCache {
    protos: HashMap<String, Rc<Prototype>>,

    /// Digests in insertion order
    order: VecDeque<String>,

    capacity: usize,
}

impl Default for ChunkCache {
    fn default() -> Self {
        ChunkCache::with_capacity(DEFAULT_CHUNK_CACHE_SIZE)
    }
}

impl ChunkCache {
    /// Create an empty cache
    pub fn new() -> Self {
        ChunkCache::default()
    }

    /// Create an empty cache keeping at most `capacity` chunks
    pub fn with_capacity(capacity: usize) -> Self {
        ChunkCache { protos: HashMap::new(), order: VecDeque::new(), capacity }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// SHA1 hex digest of a chunk
    pub fn digest(data: &[u8]) -> String {
        let mut hasher = Sha1::new();
        hasher.update(data);
        hex::encode(hasher.finalize())
    }

    /// Decode a chunk, reusing the cached prototype for identical bytes
    pub fn load(&mut self, data: &[u8]) -> Result<Rc<Prototype>, ChunkError> {
        let digest = Self::digest(data);
        if let Some(proto) = self.protos.get(&digest) {
            tracing::debug!(target: "luavm::chunk", %digest, "chunk cache hit");
            return Ok(Rc::clone(proto));
        }

        let proto = Rc::new(undump(data)?);
        tracing::debug!(target: "luavm::chunk", %digest, "chunk cache miss");
        if self.capacity == 0 {
            return Ok(proto);
        }
        while self.protos.len() >= self.capacity {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            tracing::debug!(target: "luavm::chunk", digest = %oldest, "chunk cache eviction");
            self.protos.remove(&oldest);
        }
        self.order.push_back(digest.clone());
        self.protos.insert(digest, Rc::clone(&proto));
        Ok(proto)
    }

    /// Get a cached prototype by digest
    pub fn get(&self, digest: &str) -> Option<Rc<Prototype>> {
        self.protos.get(digest).cloned()
    }

    /// Check if a digest is cached
    pub fn contains(&self, digest: &str) -> bool {
        self.protos.contains_key(digest)
    }

    pub fn len(&self) -> usize {
        self.protos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.protos.is_empty()
    }

    /// Drop every cached prototype
    pub fn clear(&mut self) {
        self.protos.clear();
        self.order.clear();
    }
}
