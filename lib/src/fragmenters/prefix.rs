use super::{version_of, Fragmenter, FragmenterConfig};
use crate::cache::Cache;
use crate::errors::{FragmentError, Result};
use crate::node::{encode_segment, Node, PageId, PageKey};
use crate::relation::{Relation, RelationKind};
use crate::resource::Resource;
use crate::storage::PageStore;
use crate::term::Term;
use crate::util::generate_tree_relation;
use log::{debug, info};

/// Groups members in a character trie over the fragmentation-path value.
///
/// Every trie node (a key prefix, stored as nested folders) owns a chain of
/// pages. When the last page of a trie node is full the member goes to a new
/// child for its next key character if depth and fan-out allow it, and to a
/// new page appended to the chain otherwise. Both kinds of
/// `tree:PrefixRelation` are recorded on the page that is last at that
/// moment, so a page that has a successor in its chain never changes again.
/// Members are never moved.
#[derive(Debug, Clone)]
pub struct PrefixTreeFragmenter {
    config: FragmenterConfig,
}

impl PrefixTreeFragmenter {
    pub fn new(config: FragmenterConfig) -> Self {
        PrefixTreeFragmenter { config }
    }

    fn key_of(&self, resource: &Resource) -> Result<String> {
        let path = self.config.path.value();
        resource
            .first_value(path)
            .map(|v| v.value().to_string())
            .ok_or_else(|| {
                FragmentError::internal(format!(
                    "resource {} has no value for fragmentation path {}",
                    resource.id(),
                    path
                ))
            })
    }

    /// Child trie nodes recorded anywhere along the chain `0..=last`, as
    /// `(prefix, target)` pairs.
    fn children<S: PageStore>(
        cache: &mut Cache<S>,
        head_key: &PageKey,
        last: u64,
        depth: usize,
    ) -> Result<Vec<(String, PageId)>> {
        let mut children = Vec::new();
        for n in 0..=last {
            let page = cache.get_node(&head_key.sibling(n))?;
            children.extend(
                page.relations()
                    .iter()
                    .filter(|r| {
                        r.kind == RelationKind::Prefix && r.target.path().len() == depth + 1
                    })
                    .map(|r| (r.value.value().to_string(), r.target.clone())),
            );
        }
        Ok(children)
    }

    fn relation(&self, value: String, target: PageId) -> Relation {
        Relation::new(
            generate_tree_relation(),
            RelationKind::Prefix,
            Term::literal(value),
            self.config.path.clone(),
            target,
        )
    }
}

impl Fragmenter for PrefixTreeFragmenter {
    fn config(&self) -> &FragmenterConfig {
        &self.config
    }

    /// The resource must already carry a key for the fragmentation path.
    fn construct_versioned_resource(&self, resource: &Resource) -> Result<Resource> {
        self.key_of(resource)?;
        version_of(resource)
    }

    fn add_resource<'c, S: PageStore>(
        &self,
        cache: &'c mut Cache<S>,
        resource: &Resource,
    ) -> Result<&'c Node> {
        let versioned = self.construct_versioned_resource(resource)?;
        let key: Vec<char> = self.key_of(&versioned)?.chars().collect();

        let mut prefix = String::new();
        let mut segments: Vec<String> = Vec::new();
        loop {
            let depth = segments.len();
            let head_key = self.page_key(PageId::nested(segments.clone(), 0));
            let Some(last) = cache.get_last_page(&head_key.dir())? else {
                let mut node = self.new_node(head_key.id.clone());
                node.add_member(versioned);
                info!("Opened trie node {:?} at {}", prefix, node.iri());
                cache.add_node(head_key.clone(), node);
                return cache.get_node(&head_key).map(|node| &*node);
            };

            let next_char = key.get(depth).copied();
            let children = Self::children(cache, &head_key, last, depth)?;
            if let Some(c) = next_char {
                let child_prefix = format!("{prefix}{c}");
                if let Some((_, target)) = children.iter().find(|(v, _)| *v == child_prefix) {
                    debug!("Descending from {:?} to {:?}", prefix, child_prefix);
                    segments = target.path().to_vec();
                    prefix = child_prefix;
                    continue;
                }
            }

            let last_key = head_key.sibling(last);
            let current = cache.get_node(&last_key)?;
            if !self.should_create_new_page(current) {
                current.add_member(versioned);
                return cache.get_node(&last_key).map(|node| &*node);
            }

            // the full page is still last in its chain; nothing below can fail
            let next_key = match next_char {
                Some(c)
                    if depth < self.config.max_depth && children.len() < self.config.fan_out =>
                {
                    let mut child_segments = segments.clone();
                    child_segments.push(encode_segment(c));
                    let child_key = self.page_key(PageId::nested(child_segments, 0));
                    let relation = self.relation(format!("{prefix}{c}"), child_key.id.clone());
                    current.add_relation(relation);
                    info!("Split trie node {:?} into {:?}", prefix, format!("{prefix}{c}"));
                    child_key
                }
                _ => {
                    let next_key = head_key.sibling(last + 1);
                    let relation = self.relation(prefix.clone(), next_key.id.clone());
                    current.add_relation(relation);
                    info!("Closed page {} and opened {}", last_key.id, next_key.id);
                    next_key
                }
            };
            let mut node = self.new_node(next_key.id.clone());
            node.add_member(versioned);
            cache.add_node(next_key.clone(), node);
            return cache.get_node(&next_key).map(|node| &*node);
        }
    }
}
