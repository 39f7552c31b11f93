#![allow(dead_code)]

use ldes_fragmenter::errors::{FragmentError, Result};
use ldes_fragmenter::node::page_number_of;
use ldes_fragmenter::PageStore;
use oxigraph::model::Triple;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

/// In-memory page store that counts writes and can be told to fail reads or
/// writes.
#[derive(Default)]
pub struct MemoryStore {
    pub pages: Mutex<HashMap<PathBuf, Vec<Triple>>>,
    writes: AtomicUsize,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
}

impl MemoryStore {
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail_writes.store(failing, Ordering::SeqCst);
    }

    pub fn set_unreadable(&self, unreadable: bool) {
        self.fail_reads.store(unreadable, Ordering::SeqCst);
    }

    pub fn has_page(&self, path: &Path) -> bool {
        self.pages.lock().unwrap().contains_key(path)
    }

    pub fn page(&self, path: &Path) -> Option<Vec<Triple>> {
        self.pages.lock().unwrap().get(path).cloned()
    }
}

impl PageStore for MemoryStore {
    fn read_page(&self, path: &Path) -> Result<Vec<Triple>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(FragmentError::storage(path, "device unavailable"));
        }
        self.page(path).ok_or_else(|| FragmentError::storage(path, "no such page"))
    }

    fn write_page(&self, path: &Path, triples: &[Triple]) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(FragmentError::storage(path, "disk full"));
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.pages
            .lock()
            .unwrap()
            .insert(path.to_path_buf(), triples.to_vec());
        Ok(())
    }

    fn list_pages(&self, dir: &Path) -> Result<Vec<u64>> {
        Ok(self
            .pages
            .lock()
            .unwrap()
            .keys()
            .filter(|p| p.parent() == Some(dir))
            .filter_map(|p| page_number_of(p))
            .collect())
    }
}
