//! Batch ingestion of a whole dataset file into a stream folder.
//!
//! Resources are produced lazily by a transformer and pushed through the
//! mutation queue one at a time: the producer waits for each submission to
//! settle before reading the next resource.

use crate::cache::Cache;
use crate::config::{DEFAULT_BASE_IRI, DEFAULT_CACHE_SIZE};
use crate::errors::{FragmentError, Result};
use crate::fragmenters::{
    AnyFragmenter, Fragmenter, FragmenterConfig, FragmenterKind, DEFAULT_FAN_OUT,
    DEFAULT_MAX_DEPTH,
};
use crate::queue::MutationQueue;
use crate::storage::{FileStore, FolderLock};
use crate::term::Term;
use crate::transform::{self, DatasetConfiguration, TransformerKind};
use log::{info, warn};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

pub const BATCH_PAGE_CAPACITY: usize = 50;
const PROGRESS_EVERY: usize = 10_000;

#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub dataset: PathBuf,
    pub config: DatasetConfiguration,
    /// Stream folder receiving the pages.
    pub output: PathBuf,
    pub fragmenter: FragmenterKind,
    /// Overrides the transformer named in `config`.
    pub transformer: Option<TransformerKind>,
    pub relation_path: Option<String>,
    pub cache_size: usize,
    pub page_capacity: usize,
    pub fan_out: usize,
    pub max_depth: usize,
    /// Page IRIs are `<base_iri><output folder name>/<page>`.
    pub base_iri: String,
    pub io_timeout: Option<Duration>,
}

impl BatchOptions {
    pub fn new(
        dataset: impl Into<PathBuf>,
        config: DatasetConfiguration,
        output: impl Into<PathBuf>,
    ) -> Self {
        BatchOptions {
            dataset: dataset.into(),
            config,
            output: output.into(),
            fragmenter: FragmenterKind::default(),
            transformer: None,
            relation_path: None,
            cache_size: DEFAULT_CACHE_SIZE,
            page_capacity: BATCH_PAGE_CAPACITY,
            fan_out: DEFAULT_FAN_OUT,
            max_depth: DEFAULT_MAX_DEPTH,
            base_iri: DEFAULT_BASE_IRI.to_string(),
            io_timeout: None,
        }
    }

    fn view_iri(&self) -> String {
        let name = self
            .output
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        format!("{}/{}", self.base_iri.trim_end_matches('/'), name)
    }

    fn relation_path(&self) -> String {
        self.relation_path
            .clone()
            .unwrap_or_else(|| self.fragmenter.default_path().as_str().to_string())
    }
}

#[derive(Serialize, Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchStats {
    /// Resources added to a page.
    pub ingested: usize,
    /// Resources whose queued task failed.
    pub failed: usize,
    /// Pages written by the final flush.
    pub pages_written: usize,
}

/// Fragments `options.dataset` into `options.output`.
///
/// A resource that cannot be added is logged and counted; the run goes on.
/// A dataset that cannot be read or parsed stops the run after the pages
/// built so far are flushed.
pub fn fragment_dataset(options: &BatchOptions) -> Result<BatchStats> {
    if options.cache_size == 0 {
        return Err(FragmentError::validation("cache size must be at least 1"));
    }
    let transformer = options.config.select_transformer(options.transformer);
    let fragmenter = Arc::new(AnyFragmenter::new(
        options.fragmenter,
        FragmenterConfig::new(
            options.output.clone(),
            options.view_iri(),
            Term::iri(options.config.stream.as_str()),
            Term::iri(options.relation_path()),
            options.page_capacity,
        )
        .with_trie(options.fan_out, options.max_depth),
    )?);
    let resources = transform::resources(transformer, &options.dataset, &options.config)?;
    let _lock = FolderLock::acquire(&options.output)?;
    let queue = MutationQueue::new(Cache::new(
        FileStore::new(options.io_timeout),
        options.cache_size,
    ))?;
    info!(
        "Fragmenting {} into {} with {} and {}",
        options.dataset.display(),
        options.output.display(),
        fragmenter.kind(),
        transformer
    );

    let mut stats = BatchStats::default();
    let mut outcome = Ok(());
    for item in resources {
        let resource = match item {
            Ok(resource) => resource,
            Err(e) => {
                outcome = Err(e);
                break;
            }
        };
        let id = resource.id().clone();
        let fragmenter = fragmenter.clone();
        let added = queue
            .submit(move |cache: &mut Cache<FileStore>| {
                fragmenter.add_resource(cache, &resource).map(|_| ())
            })
            .wait();
        match added {
            Ok(()) => stats.ingested += 1,
            Err(e) => {
                warn!("Skipping {}: {}", id, e);
                stats.failed += 1;
            }
        }
        let seen = stats.ingested + stats.failed;
        if seen % PROGRESS_EVERY == 0 {
            info!("Processed {} resources ({} failed)", seen, stats.failed);
        }
    }

    stats.pages_written = queue
        .submit(|cache: &mut Cache<FileStore>| cache.flush())
        .wait()?;
    queue.shutdown()?;
    outcome?;
    info!(
        "Fragmented {} resources ({} failed), {} pages written by final flush",
        stats.ingested, stats.failed, stats.pages_written
    );
    Ok(stats)
}
