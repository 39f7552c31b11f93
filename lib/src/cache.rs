//! In-memory owner of every live page.
//!
//! The cache keeps at most `capacity` pages, evicting the least recently
//! used one first. Dirty pages are written before they leave memory; a page
//! whose write fails stays cached (the cache may then temporarily hold more
//! than `capacity` entries) and is retried on the next eviction or flush.

use crate::errors::{FragmentError, Result};
use crate::node::{Node, PageKey};
use crate::storage::PageStore;
use log::{debug, error, info, warn};
use lru::LruCache;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

struct CacheEntry {
    key: PageKey,
    node: Node,
}

pub struct Cache<S: PageStore> {
    store: S,
    capacity: usize,
    nodes: LruCache<PathBuf, CacheEntry>,
    // highest known page number per page directory
    last_pages: HashMap<PathBuf, Option<u64>>,
}

impl<S: PageStore> Cache<S> {
    pub fn new(store: S, capacity: usize) -> Self {
        Cache {
            store,
            capacity: capacity.max(1),
            nodes: LruCache::unbounded(),
            last_pages: HashMap::new(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, key: &PageKey) -> bool {
        self.nodes.contains(&key.path())
    }

    pub fn dirty_count(&self) -> usize {
        self.nodes.iter().filter(|(_, e)| e.node.is_dirty()).count()
    }

    /// Returns the page for `key`, loading it from storage on a miss. The
    /// page becomes the most recently used entry.
    pub fn get_node(&mut self, key: &PageKey) -> Result<&mut Node> {
        let path = key.path();
        if !self.nodes.contains(&path) {
            let triples = self.store.read_page(&path)?;
            let node = Node::from_triples(key.id.clone(), &triples)
                .map_err(|e| FragmentError::storage(&path, e))?;
            debug!("Loaded page {} from {}", key.id, path.display());
            self.nodes.put(
                path.clone(),
                CacheEntry {
                    key: key.clone(),
                    node,
                },
            );
            self.evict();
        }
        self.nodes
            .get_mut(&path)
            .map(|entry| &mut entry.node)
            .ok_or_else(|| FragmentError::internal(format!("page {} vanished from cache", key.id)))
    }

    /// Inserts or replaces the page for `key` and marks it dirty.
    pub fn add_node(&mut self, key: PageKey, mut node: Node) {
        node.mark_dirty();
        self.invalidate_last_page(&key.dir());
        self.nodes.put(key.path(), CacheEntry { key, node });
        self.evict();
    }

    /// Highest page number inside `dir`, counting pages that only exist in
    /// memory. `None` when the directory has no pages yet.
    pub fn get_last_page(&mut self, dir: &Path) -> Result<Option<u64>> {
        if let Some(last) = self.last_pages.get(dir) {
            return Ok(*last);
        }
        let on_disk = self.store.list_pages(dir)?.into_iter().max();
        let in_memory = self
            .nodes
            .iter()
            .filter(|(_, e)| e.key.dir() == dir)
            .map(|(_, e)| e.key.id.number())
            .max();
        let last = on_disk.max(in_memory);
        self.last_pages.insert(dir.to_path_buf(), last);
        Ok(last)
    }

    pub fn invalidate_last_page(&mut self, dir: &Path) {
        self.last_pages.remove(dir);
    }

    /// Writes every dirty page. A failed page stays dirty and does not stop
    /// the others; the first failure is returned once all were attempted.
    pub fn flush(&mut self) -> Result<usize> {
        let mut written = 0;
        let mut failures: Vec<FragmentError> = Vec::new();
        for (path, entry) in self.nodes.iter_mut() {
            if !entry.node.is_dirty() {
                continue;
            }
            match write_node(&self.store, path, &entry.node) {
                Ok(()) => {
                    entry.node.mark_clean();
                    written += 1;
                }
                Err(e) => {
                    error!("Failed to flush page {}: {}", path.display(), e);
                    failures.push(e);
                }
            }
        }
        info!(
            "Flushed {} pages ({} failed, {} cached)",
            written,
            failures.len(),
            self.nodes.len()
        );
        let failed = failures.len();
        match failures.into_iter().next() {
            None => Ok(written),
            Some(FragmentError::Storage { path, message }) => Err(FragmentError::Storage {
                path,
                message: format!(
                    "{message} ({failed} of {} dirty pages not flushed)",
                    written + failed
                ),
            }),
            Some(other) => Err(other),
        }
    }

    fn evict(&mut self) {
        while self.nodes.len() > self.capacity {
            let Some((path, entry)) = self.nodes.peek_lru() else {
                return;
            };
            if entry.node.is_dirty() {
                if let Err(e) = write_node(&self.store, path, &entry.node) {
                    warn!(
                        "Keeping page {} in memory, eviction write failed: {}",
                        path.display(),
                        e
                    );
                    return;
                }
            }
            if let Some((path, _)) = self.nodes.pop_lru() {
                debug!("Evicted page {}", path.display());
            }
        }
    }
}

fn write_node<S: PageStore>(store: &S, path: &Path, node: &Node) -> Result<()> {
    let triples = node.to_triples()?;
    store.write_page(path, &triples)
}
