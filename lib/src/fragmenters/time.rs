use super::{version_of, Fragmenter, FragmenterConfig};
use crate::cache::Cache;
use crate::errors::{FragmentError, Result};
use crate::node::{Node, PageId};
use crate::relation::{Relation, RelationKind};
use crate::resource::Resource;
use crate::storage::PageStore;
use crate::util::{generate_tree_relation, now_literal};
use log::info;

/// Splits the stream into a linear chain of pages `0, 1, 2, …` ordered by
/// time. A full page is closed with a greater-than-or-equal relation whose
/// value is the timestamp of its last member.
#[derive(Debug, Clone)]
pub struct TimeFragmenter {
    config: FragmenterConfig,
}

impl TimeFragmenter {
    pub fn new(config: FragmenterConfig) -> Self {
        TimeFragmenter { config }
    }
}

impl Fragmenter for TimeFragmenter {
    fn config(&self) -> &FragmenterConfig {
        &self.config
    }

    /// Keeps a timestamp the resource already carries for the path,
    /// otherwise stamps the current time.
    fn construct_versioned_resource(&self, resource: &Resource) -> Result<Resource> {
        let mut versioned = version_of(resource)?;
        let path = self.config.path.value();
        if versioned.first_value(path).is_none() {
            versioned.add_property(path, now_literal());
        }
        Ok(versioned)
    }

    fn add_resource<'c, S: PageStore>(
        &self,
        cache: &'c mut Cache<S>,
        resource: &Resource,
    ) -> Result<&'c Node> {
        let versioned = self.construct_versioned_resource(resource)?;
        let path = self.config.path.value();

        let Some(last) = cache.get_last_page(&self.config.folder)? else {
            let key = self.page_key(PageId::new(0));
            let mut node = self.new_node(key.id.clone());
            node.add_member(versioned);
            info!("Opened first page {}", node.iri());
            cache.add_node(key.clone(), node);
            return cache.get_node(&key).map(|node| &*node);
        };

        let current_key = self.page_key(PageId::new(last));
        let current = cache.get_node(&current_key)?;
        if !self.should_create_new_page(current) {
            current.add_member(versioned);
            return cache.get_node(&current_key).map(|node| &*node);
        }

        let boundary = current.last_member_value(path).cloned().ok_or_else(|| {
            FragmentError::internal(format!(
                "last member of page {} has no value for {}",
                current_key.id, path
            ))
        })?;
        // close the full page; nothing below can fail
        let next_key = current_key.sibling(last + 1);
        current.add_relation(Relation::new(
            generate_tree_relation(),
            RelationKind::GreaterThanOrEqual,
            boundary,
            self.config.path.clone(),
            next_key.id.clone(),
        ));
        let mut next = self.new_node(next_key.id.clone());
        next.add_member(versioned);
        info!("Closed page {} and opened {}", current_key.id, next_key.id);
        cache.add_node(next_key.clone(), next);
        cache.get_node(&next_key).map(|node| &*node)
    }
}
