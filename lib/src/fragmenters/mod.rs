//! Fragmentation strategies: how a versioned resource is bucketed into a
//! page, when a page is full, and which relation closes it.

mod prefix;
mod time;

pub use prefix::PrefixTreeFragmenter;
pub use time::TimeFragmenter;

use crate::cache::Cache;
use crate::consts::{EXAMPLE_NAME, GENERATED_AT_TIME, IS_VERSION_OF};
use crate::errors::{FragmentError, Result};
use crate::node::{Node, PageId, PageKey};
use crate::resource::Resource;
use crate::storage::PageStore;
use crate::term::{named_node, Term};
use crate::util::generate_version;
use oxigraph::model::NamedNodeRef;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

pub const DEFAULT_FAN_OUT: usize = 20;
pub const DEFAULT_MAX_DEPTH: usize = 5;

/// The closed set of strategies, addressable by name.
#[derive(Serialize, Deserialize, Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub enum FragmenterKind {
    #[default]
    #[serde(rename = "time-fragmenter")]
    Time,
    #[serde(rename = "prefix-tree-fragmenter")]
    PrefixTree,
}

impl FragmenterKind {
    pub const ALL: [FragmenterKind; 2] = [FragmenterKind::Time, FragmenterKind::PrefixTree];

    pub fn name(&self) -> &'static str {
        match self {
            FragmenterKind::Time => "time-fragmenter",
            FragmenterKind::PrefixTree => "prefix-tree-fragmenter",
        }
    }

    /// Fragmentation path used when none is configured.
    pub fn default_path(&self) -> NamedNodeRef<'static> {
        match self {
            FragmenterKind::Time => GENERATED_AT_TIME,
            FragmenterKind::PrefixTree => EXAMPLE_NAME,
        }
    }
}

impl fmt::Display for FragmenterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FragmenterKind {
    type Err = FragmentError;

    fn from_str(name: &str) -> Result<Self> {
        FragmenterKind::ALL
            .into_iter()
            .find(|kind| kind.name() == name)
            .ok_or_else(|| {
                FragmentError::validation(format!(
                    "unknown fragmenter {name:?}, expected one of: {}",
                    FragmenterKind::ALL.map(|k| k.name()).join(", ")
                ))
            })
    }
}

/// Fixed settings of one fragmenter instance.
#[derive(Debug, Clone, PartialEq)]
pub struct FragmenterConfig {
    /// Folder holding the pages of this stream.
    pub folder: PathBuf,
    /// IRI under which the pages of `folder` are published.
    pub view: String,
    pub stream: Term,
    /// Predicate whose value drives bucketing.
    pub path: Term,
    /// Maximum members per page.
    pub capacity: usize,
    /// Maximum child trie nodes per trie node (prefix strategy).
    pub fan_out: usize,
    /// Maximum key prefix length (prefix strategy).
    pub max_depth: usize,
}

impl FragmenterConfig {
    pub fn new(
        folder: impl Into<PathBuf>,
        view: impl Into<String>,
        stream: Term,
        path: Term,
        capacity: usize,
    ) -> Self {
        FragmenterConfig {
            folder: folder.into(),
            view: view.into(),
            stream,
            path,
            capacity,
            fan_out: DEFAULT_FAN_OUT,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_trie(mut self, fan_out: usize, max_depth: usize) -> Self {
        self.fan_out = fan_out;
        self.max_depth = max_depth;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(FragmentError::validation("page capacity must be at least 1"));
        }
        if !self.stream.is_iri() || !self.path.is_iri() {
            return Err(FragmentError::validation(
                "stream and fragmentation path must be IRIs",
            ));
        }
        named_node(self.stream.value())?;
        named_node(self.path.value())?;
        named_node(&format!("{}/0", self.view.trim_end_matches('/')))?;
        Ok(())
    }
}

pub trait Fragmenter {
    fn config(&self) -> &FragmenterConfig;

    /// Builds the snapshot stored as a member: a copy of `resource` under a
    /// fresh IRI, linked back through `dct:isVersionOf`, carrying a value
    /// for the fragmentation path.
    fn construct_versioned_resource(&self, resource: &Resource) -> Result<Resource>;

    /// Versions `resource` and appends it to the current page, closing that
    /// page first when it is full. Must only run inside the mutation queue.
    /// Nothing is changed when an error is returned.
    fn add_resource<'c, S: PageStore>(
        &self,
        cache: &'c mut Cache<S>,
        resource: &Resource,
    ) -> Result<&'c Node>;

    fn should_create_new_page(&self, node: &Node) -> bool {
        node.member_count() >= self.config().capacity
    }

    fn new_node(&self, id: PageId) -> Node {
        let config = self.config();
        Node::new(id, config.view.clone(), config.stream.clone())
    }

    fn page_key(&self, id: PageId) -> PageKey {
        PageKey::new(self.config().folder.clone(), id)
    }
}

/// Copy of `resource` under a fresh version IRI, with `dct:isVersionOf`.
pub(crate) fn version_of(resource: &Resource) -> Result<Resource> {
    if !resource.id().is_iri() {
        return Err(FragmentError::internal(format!(
            "resource identifier {} is not an IRI",
            resource.id()
        )));
    }
    let mut versioned = resource.copy_as(generate_version());
    versioned.add_property(IS_VERSION_OF.as_str(), resource.id().clone());
    Ok(versioned)
}

/// A strategy picked at runtime from its name.
#[derive(Debug, Clone)]
pub enum AnyFragmenter {
    Time(TimeFragmenter),
    PrefixTree(PrefixTreeFragmenter),
}

impl AnyFragmenter {
    pub fn new(kind: FragmenterKind, config: FragmenterConfig) -> Result<Self> {
        config.validate()?;
        Ok(match kind {
            FragmenterKind::Time => AnyFragmenter::Time(TimeFragmenter::new(config)),
            FragmenterKind::PrefixTree => {
                AnyFragmenter::PrefixTree(PrefixTreeFragmenter::new(config))
            }
        })
    }

    pub fn kind(&self) -> FragmenterKind {
        match self {
            AnyFragmenter::Time(_) => FragmenterKind::Time,
            AnyFragmenter::PrefixTree(_) => FragmenterKind::PrefixTree,
        }
    }
}

impl Fragmenter for AnyFragmenter {
    fn config(&self) -> &FragmenterConfig {
        match self {
            AnyFragmenter::Time(f) => f.config(),
            AnyFragmenter::PrefixTree(f) => f.config(),
        }
    }

    fn construct_versioned_resource(&self, resource: &Resource) -> Result<Resource> {
        match self {
            AnyFragmenter::Time(f) => f.construct_versioned_resource(resource),
            AnyFragmenter::PrefixTree(f) => f.construct_versioned_resource(resource),
        }
    }

    fn add_resource<'c, S: PageStore>(
        &self,
        cache: &'c mut Cache<S>,
        resource: &Resource,
    ) -> Result<&'c Node> {
        match self {
            AnyFragmenter::Time(f) => f.add_resource(cache, resource),
            AnyFragmenter::PrefixTree(f) => f.add_resource(cache, resource),
        }
    }
}
