//! Defines the `PageStore` trait for reading and writing page files, the
//! Turtle-backed `FileStore`, and the folder lock that keeps one writer per
//! stream folder.

use crate::errors::{FragmentError, Result};
use crate::node::page_number_of;
use crate::util::{parse_triples, serialize_triples};
use fs2::FileExt;
use log::{debug, warn};
use oxigraph::io::RdfFormat;
use oxigraph::model::Triple;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Duration;
use uuid::Uuid;
use walkdir::WalkDir;

pub trait PageStore {
    /// Reads all triples of the page file at `path`.
    fn read_page(&self, path: &Path) -> Result<Vec<Triple>>;

    /// Replaces the page file at `path` with `triples`. Readers never see a
    /// partially written file.
    fn write_page(&self, path: &Path, triples: &[Triple]) -> Result<()>;

    /// Page numbers present directly inside `dir`; empty when `dir` is missing.
    fn list_pages(&self, dir: &Path) -> Result<Vec<u64>>;
}

/// Stores every page as a Turtle file. Each read and write is bounded by
/// `io_timeout` when one is set.
#[derive(Debug, Clone, Default)]
pub struct FileStore {
    io_timeout: Option<Duration>,
}

impl FileStore {
    pub fn new(io_timeout: Option<Duration>) -> Self {
        FileStore { io_timeout }
    }

    pub fn io_timeout(&self) -> Option<Duration> {
        self.io_timeout
    }

    /// Runs `work` on a helper thread and gives up after the timeout. A
    /// write calls [`IoTicket::commit`] right before it becomes visible; once
    /// the caller has given up, the commit is refused.
    fn bounded<T, F>(&self, path: &Path, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&IoTicket) -> Result<T> + Send + 'static,
    {
        let Some(timeout) = self.io_timeout else {
            return work(&IoTicket::default());
        };
        let ticket = Arc::new(IoTicket::default());
        let worker_ticket = ticket.clone();
        let (tx, rx) = mpsc::channel();
        std::thread::Builder::new()
            .name("page-io".to_string())
            .spawn(move || {
                let _ = tx.send(work(&worker_ticket));
            })
            .map_err(|e| FragmentError::storage(path, format!("cannot spawn I/O thread: {e}")))?;
        match rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(mpsc::RecvTimeoutError::Timeout) if ticket.abandon() => {
                warn!("I/O on {} exceeded {:?}", path.display(), timeout);
                Err(FragmentError::storage(
                    path,
                    format!("timed out after {timeout:?}"),
                ))
            }
            // committed just before the timeout; the rename decides the outcome
            Err(mpsc::RecvTimeoutError::Timeout) => rx.recv().unwrap_or_else(|_| {
                Err(FragmentError::storage(path, "I/O thread exited without a result"))
            }),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(FragmentError::storage(
                path,
                "I/O thread exited without a result",
            )),
        }
    }
}

const PENDING: u8 = 0;
const COMMITTED: u8 = 1;
const ABANDONED: u8 = 2;

/// Decides the race between a slow write and the caller's timeout: exactly
/// one of `commit` and `abandon` succeeds.
#[derive(Debug, Default)]
struct IoTicket(AtomicU8);

impl IoTicket {
    fn commit(&self) -> bool {
        self.0
            .compare_exchange(PENDING, COMMITTED, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    fn abandon(&self) -> bool {
        self.0
            .compare_exchange(PENDING, ABANDONED, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

impl PageStore for FileStore {
    fn read_page(&self, path: &Path) -> Result<Vec<Triple>> {
        debug!("Reading page: {}", path.display());
        let owned = path.to_path_buf();
        self.bounded(path, move |_| {
            let bytes = std::fs::read(&owned).map_err(|e| FragmentError::storage(&owned, e))?;
            parse_triples(&bytes, RdfFormat::Turtle).map_err(|e| FragmentError::storage(&owned, e))
        })
    }

    fn write_page(&self, path: &Path, triples: &[Triple]) -> Result<()> {
        debug!(
            "Writing page: {} with {} triples",
            path.display(),
            triples.len()
        );
        let bytes = serialize_triples(triples, RdfFormat::Turtle)?;
        let owned = path.to_path_buf();
        self.bounded(path, move |ticket| {
            if let Some(parent) = owned.parent() {
                std::fs::create_dir_all(parent).map_err(|e| FragmentError::storage(parent, e))?;
            }
            let tmp = tmp_path(&owned);
            if let Err(e) = std::fs::write(&tmp, &bytes) {
                let _ = std::fs::remove_file(&tmp);
                return Err(FragmentError::storage(&tmp, e));
            }
            // a later write may already own this page
            if !ticket.commit() {
                let _ = std::fs::remove_file(&tmp);
                return Err(FragmentError::storage(&owned, "write abandoned"));
            }
            std::fs::rename(&tmp, &owned).map_err(|e| FragmentError::storage(&owned, e))
        })
    }

    fn list_pages(&self, dir: &Path) -> Result<Vec<u64>> {
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut pages = Vec::new();
        for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
            let entry = entry.map_err(|e| FragmentError::storage(dir, e))?;
            if !entry.file_type().is_file() {
                continue;
            }
            if let Some(number) = page_number_of(entry.path()) {
                pages.push(number);
            }
        }
        Ok(pages)
    }
}

/// A temp file name of its own for every write.
fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(format!(".{}.tmp", Uuid::new_v4().simple()));
    path.with_file_name(name)
}

/// Exclusive, advisory lock on a stream folder held for the lifetime of the
/// value.
#[derive(Debug)]
pub struct FolderLock {
    _file: File,
    path: PathBuf,
}

impl FolderLock {
    pub fn acquire(folder: &Path) -> Result<Self> {
        std::fs::create_dir_all(folder).map_err(|e| FragmentError::storage(folder, e))?;
        let lock_path = folder.join(".ldes.lock");
        let file = std::fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&lock_path)
            .map_err(|e| FragmentError::storage(&lock_path, e))?;
        if let Err(e) = file.try_lock_exclusive() {
            return Err(FragmentError::validation(format!(
                "could not acquire exclusive lock on {}: {}. Another writer is using this folder.",
                lock_path.display(),
                e
            )));
        }
        Ok(FolderLock {
            _file: file,
            path: lock_path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
