//! Fragments Linked Data Event Streams into linked pages of bounded size.
//!
//! Resources are versioned and appended to the current page of a stream
//! folder by a [`Fragmenter`](fragmenters::Fragmenter). Pages live in a
//! write-back [`Cache`](cache::Cache) and every mutation runs through a
//! single-writer [`MutationQueue`](queue::MutationQueue).

pub mod batch;
pub mod cache;
pub mod config;
pub mod consts;
pub mod errors;
pub mod fragmenters;
pub mod node;
pub mod queue;
pub mod relation;
pub mod resource;
pub mod service;
pub mod storage;
pub mod term;
pub mod transform;
pub mod util;

pub use cache::Cache;
pub use config::EngineConfig;
pub use errors::{FragmentError, Result};
pub use fragmenters::{AnyFragmenter, Fragmenter, FragmenterConfig, FragmenterKind};
pub use node::{Node, PageId, PageKey};
pub use queue::{MutationQueue, TaskHandle};
pub use relation::{Relation, RelationKind};
pub use resource::Resource;
pub use service::{Engine, PageReader};
pub use storage::{FileStore, PageStore};
pub use term::Term;
