//! Process-scoped engine state and the operations a network layer exposes:
//! ingestion, page retrieval, last page and member count.
//!
//! Requests are validated synchronously; only well-formed mutations reach
//! the mutation queue. Reads go straight to the page files through a
//! [`PageReader`], which needs no lock.

use crate::cache::Cache;
use crate::config::EngineConfig;
use crate::errors::{FragmentError, Result};
use crate::fragmenters::{AnyFragmenter, Fragmenter, FragmenterConfig, FragmenterKind};
use crate::node::{is_safe_segment, Node, PageId};
use crate::queue::{MutationQueue, TaskHandle};
use crate::resource::Resource;
use crate::storage::{FileStore, FolderLock, PageStore};
use crate::term::{named_node, Term};
use crate::util::{format_for_content_type, negotiate_format, parse_triples, serialize_triples};
use log::{debug, error, info};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub const IMMUTABLE_CACHE_CONTROL: &str = "public, immutable";

/// One resource to add to a stream.
#[derive(Debug, Clone, Default)]
pub struct IngestRequest {
    /// Stream folder relative to the data folder; may be nested (`a/b`).
    pub folder: String,
    pub resource: String,
    pub stream: String,
    pub relation_path: Option<String>,
    /// Strategy name; the configured strategy when unset.
    pub fragmenter: Option<String>,
    pub content_type: String,
    pub body: Vec<u8>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IngestResponse {
    pub message: String,
    /// Members in the page that received the resource.
    pub triples_in_page: usize,
}

#[derive(Debug, Clone)]
pub struct PageRequest {
    pub folder: String,
    pub page: PageId,
    pub accept: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PageResponse {
    pub content_type: &'static str,
    pub body: Vec<u8>,
    /// Closed pages never change again.
    pub cacheable: bool,
}

impl PageResponse {
    pub fn cache_control(&self) -> Option<&'static str> {
        self.cacheable.then_some(IMMUTABLE_CACHE_CONTROL)
    }
}

/// Read side of a data folder. Takes no lock and never touches the mutation
/// queue, so it can run next to a writer; it may see the open last page as
/// of the latest flush.
#[derive(Debug, Clone)]
pub struct PageReader {
    data_folder: PathBuf,
    store: FileStore,
}

impl PageReader {
    pub fn new(data_folder: impl Into<PathBuf>, io_timeout: Option<Duration>) -> Self {
        PageReader {
            data_folder: data_folder.into(),
            store: FileStore::new(io_timeout),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        PageReader::new(config.data_folder.clone(), config.io_timeout())
    }

    /// Serializes a stored page. Pages before the last one of their chain
    /// are marked cacheable.
    pub fn retrieve_page(&self, request: &PageRequest) -> Result<PageResponse> {
        let folder_path = self.folder_path(&request.folder)?;
        let format = negotiate_format(request.accept.as_deref())?;
        let not_found = || FragmentError::NotFound {
            folder: request.folder.clone(),
            page: request.page.to_string(),
        };
        let dir = folder_path.join(request.page.relative_dir());
        let last = self
            .store
            .list_pages(&dir)?
            .into_iter()
            .max()
            .ok_or_else(not_found)?;
        if request.page.number() > last {
            return Err(not_found());
        }
        let file = folder_path.join(request.page.relative_path());
        if !file.is_file() {
            return Err(not_found());
        }
        let triples = self.store.read_page(&file)?;
        Ok(PageResponse {
            content_type: format.media_type(),
            body: serialize_triples(&triples, format)?,
            cacheable: request.page.number() < last,
        })
    }

    /// Highest page number in the top level of `folder`.
    pub fn last_page(&self, folder: &str) -> Result<u64> {
        let folder_path = self.folder_path(folder)?;
        self.store
            .list_pages(&folder_path)?
            .into_iter()
            .max()
            .ok_or_else(|| FragmentError::NotFound {
                folder: folder.to_string(),
                page: "last".to_string(),
            })
    }

    /// Members in the last page of `folder`.
    pub fn count(&self, folder: &str) -> Result<usize> {
        let last = self.last_page(folder)?;
        let id = PageId::new(last);
        let file = self.folder_path(folder)?.join(id.relative_path());
        let triples = self.store.read_page(&file)?;
        let node =
            Node::from_triples(id, &triples).map_err(|e| FragmentError::storage(&file, e))?;
        Ok(node.member_count())
    }

    fn folder_path(&self, folder: &str) -> Result<PathBuf> {
        let trimmed = folder.trim_matches('/');
        if trimmed.is_empty() || !trimmed.split('/').all(is_safe_segment) {
            return Err(FragmentError::validation(format!("invalid folder {folder:?}")));
        }
        Ok(self.data_folder.join(trimmed))
    }
}

pub struct Engine {
    config: EngineConfig,
    queue: MutationQueue<Cache<FileStore>>,
    reader: PageReader,
    _lock: FolderLock,
}

impl Engine {
    /// Locks the data folder and starts the mutation queue.
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let lock = FolderLock::acquire(&config.data_folder)?;
        let store = FileStore::new(config.io_timeout());
        let cache = Cache::new(store, config.cache_size);
        let queue = MutationQueue::new(cache)?;
        info!(
            "Engine serving {} with {} (capacity {}, cache {})",
            config.data_folder.display(),
            config.fragmenter,
            config.page_capacity,
            config.cache_size
        );
        Ok(Engine {
            reader: PageReader::from_config(&config),
            config,
            queue,
            _lock: lock,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn reader(&self) -> &PageReader {
        &self.reader
    }

    /// Builds the strategy for one stream folder. `path` and `kind` fall
    /// back to the configured values.
    pub fn fragmenter(
        &self,
        folder: &str,
        stream: &str,
        path: Option<&str>,
        kind: Option<&str>,
    ) -> Result<AnyFragmenter> {
        let folder_path = self.folder_path(folder)?;
        let kind = match kind {
            Some(name) => name.parse::<FragmenterKind>()?,
            None => self.config.fragmenter,
        };
        let path = match path {
            Some(p) => p.to_string(),
            None if self.config.relation_path.is_some() => self.config.relation_path(),
            None => kind.default_path().as_str().to_string(),
        };
        let config = FragmenterConfig::new(
            folder_path,
            self.config.view_iri(folder),
            Term::iri(stream),
            Term::iri(path),
            self.config.page_capacity,
        )
        .with_trie(self.config.fan_out, self.config.max_depth);
        AnyFragmenter::new(kind, config)
    }

    /// Adds one resource, then flushes. Rejects malformed requests before
    /// anything is queued.
    pub fn ingest(&self, request: IngestRequest) -> Result<IngestResponse> {
        for (name, value) in [
            ("folder", &request.folder),
            ("resource", &request.resource),
            ("stream", &request.stream),
            ("content type", &request.content_type),
        ] {
            if value.trim().is_empty() {
                return Err(FragmentError::validation(format!("missing {name}")));
            }
        }
        named_node(&request.resource)?;
        let fragmenter = self.fragmenter(
            &request.folder,
            &request.stream,
            request.relation_path.as_deref(),
            request.fragmenter.as_deref(),
        )?;
        let format = format_for_content_type(&request.content_type)?;
        let triples = parse_triples(&request.body, format)
            .map_err(|e| FragmentError::validation(format!("cannot parse body: {e}")))?;
        let resource = Resource::from_triples(Term::iri(request.resource.as_str()), &triples)?;
        debug!(
            "Ingesting {} into {} ({} properties)",
            request.resource,
            request.folder,
            resource.properties().count()
        );

        let added = self.queue.submit(move |cache: &mut Cache<FileStore>| {
            fragmenter
                .add_resource(cache, &resource)
                .map(|node| node.member_count())
        });
        let flushed = self.queue.submit(|cache: &mut Cache<FileStore>| cache.flush());
        let count = added.wait()?;
        flushed.wait()?;
        Ok(IngestResponse {
            message: "ok".to_string(),
            triples_in_page: count,
        })
    }

    pub fn retrieve_page(&self, request: &PageRequest) -> Result<PageResponse> {
        self.reader.retrieve_page(request)
    }

    pub fn last_page(&self, folder: &str) -> Result<u64> {
        self.reader.last_page(folder)
    }

    pub fn count(&self, folder: &str) -> Result<usize> {
        self.reader.count(folder)
    }

    /// Queues an arbitrary mutation against the page cache.
    pub fn submit<T, F>(&self, task: F) -> TaskHandle<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Cache<FileStore>) -> Result<T> + Send + 'static,
    {
        self.queue.submit(task)
    }

    /// Runs the pending mutations and flushes every dirty page. Returns the
    /// number of pages written by the final flush.
    pub fn shutdown(self) -> Result<usize> {
        let written = self.submit(|cache: &mut Cache<FileStore>| cache.flush()).wait()?;
        info!("Engine stopped, {} pages written on shutdown", written);
        Ok(written)
    }

    fn folder_path(&self, folder: &str) -> Result<PathBuf> {
        self.reader.folder_path(folder)
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        let flushed = self.queue.submit(|cache: &mut Cache<FileStore>| cache.flush());
        if let Err(e) = flushed.wait() {
            error!("Final flush failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine(dir: &std::path::Path) -> Engine {
        let config = EngineConfig::builder()
            .data_folder(dir)
            .page_capacity(2)
            .build()
            .unwrap();
        Engine::new(config).unwrap()
    }

    #[test]
    fn test_invalid_requests_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        let valid = IngestRequest {
            folder: "stream".to_string(),
            resource: "http://example.org/a".to_string(),
            stream: "http://example.org/stream".to_string(),
            content_type: "text/turtle".to_string(),
            body: b"<http://example.org/a> <http://example.org/name> \"a\" .".to_vec(),
            ..Default::default()
        };

        let cases = [
            IngestRequest {
                stream: String::new(),
                ..valid.clone()
            },
            IngestRequest {
                fragmenter: Some("space-fragmenter".to_string()),
                ..valid.clone()
            },
            IngestRequest {
                content_type: "application/pdf".to_string(),
                ..valid.clone()
            },
            IngestRequest {
                folder: "../escape".to_string(),
                ..valid.clone()
            },
            IngestRequest {
                body: b"not turtle at all".to_vec(),
                ..valid.clone()
            },
        ];
        for request in cases {
            let err = engine.ingest(request).unwrap_err();
            assert_eq!(err.status(), 400, "{err}");
        }
        assert!(engine.last_page("stream").is_err());

        let response = engine.ingest(valid).unwrap();
        assert_eq!(response.triples_in_page, 1);
        assert_eq!(
            serde_json::to_string(&response).unwrap(),
            r#"{"message":"ok","triplesInPage":1}"#
        );
    }

    #[test]
    fn test_reader_runs_beside_a_writer() {
        let dir = tempfile::tempdir().unwrap();
        let writer = engine(dir.path());
        writer
            .ingest(IngestRequest {
                folder: "stream".to_string(),
                resource: "http://example.org/a".to_string(),
                stream: "http://example.org/stream".to_string(),
                content_type: "application/n-triples".to_string(),
                body: b"<http://example.org/a> <http://example.org/name> \"a\" .\n".to_vec(),
                ..Default::default()
            })
            .unwrap();

        let reader = PageReader::new(dir.path(), None);
        assert_eq!(reader.last_page("stream").unwrap(), 0);
        assert_eq!(reader.count("stream").unwrap(), 1);
        let page = reader
            .retrieve_page(&PageRequest {
                folder: "stream".to_string(),
                page: PageId::new(0),
                accept: None,
            })
            .unwrap();
        assert!(!page.cacheable);
        assert!(matches!(
            reader.last_page("../stream"),
            Err(FragmentError::Validation(_))
        ));
    }

    #[test]
    fn test_second_engine_on_same_folder_fails() {
        let dir = tempfile::tempdir().unwrap();
        let _first = engine(dir.path());
        let config = EngineConfig::builder().data_folder(dir.path()).build().unwrap();
        assert!(Engine::new(config).is_err());
    }
}
