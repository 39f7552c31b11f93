mod common;

use common::MemoryStore;
use ldes_fragmenter::{Cache, Node, PageId, PageKey, Relation, RelationKind, Resource, Term};

const VIEW: &str = "http://localhost:8888/stream";
const NAME: &str = "http://example.org/name";

fn key(n: u64) -> PageKey {
    PageKey::new("/streams/a", PageId::new(n))
}

fn page(n: u64, members: u32) -> Node {
    let mut node = Node::new(PageId::new(n), VIEW, Term::iri("http://example.org/stream"));
    for m in 0..members {
        let mut r = Resource::new(Term::iri(format!("http://example.org/v/{n}-{m}")));
        r.add_property(NAME, Term::literal(format!("member {m}")));
        node.add_member(r);
    }
    node
}

#[test]
fn test_eviction_writes_dirty_page_and_reloads_it() {
    let mut cache = Cache::new(MemoryStore::default(), 2);
    let mut first = page(0, 2);
    first.add_relation(Relation::new(
        Term::iri("http://example.org/relations/0"),
        RelationKind::GreaterThanOrEqual,
        Term::literal("member 1"),
        Term::iri(NAME),
        PageId::new(1),
    ));
    cache.add_node(key(0), first.clone());
    cache.add_node(key(1), page(1, 1));
    assert_eq!(cache.store().writes(), 0);

    cache.add_node(key(2), page(2, 1));
    assert_eq!(cache.len(), 2);
    assert!(!cache.contains(&key(0)));
    assert_eq!(cache.store().writes(), 1);
    assert!(cache.store().has_page(&key(0).path()));

    let reloaded = cache.get_node(&key(0)).expect("reload evicted page");
    assert_eq!(reloaded.members(), first.members());
    assert_eq!(reloaded.relations(), first.relations());
    assert!(!reloaded.is_dirty());
}

#[test]
fn test_least_recently_used_page_goes_first() {
    let mut cache = Cache::new(MemoryStore::default(), 2);
    cache.add_node(key(0), page(0, 1));
    cache.add_node(key(1), page(1, 1));
    // touching page 0 makes page 1 the eviction candidate
    cache.get_node(&key(0)).unwrap();
    cache.add_node(key(2), page(2, 1));
    assert!(cache.contains(&key(0)));
    assert!(!cache.contains(&key(1)));
    assert!(cache.contains(&key(2)));
}

#[test]
fn test_flush_is_idempotent() {
    let mut cache = Cache::new(MemoryStore::default(), 10);
    cache.add_node(key(0), page(0, 2));
    cache.add_node(key(1), page(1, 1));
    assert_eq!(cache.dirty_count(), 2);

    assert_eq!(cache.flush().unwrap(), 2);
    assert_eq!(cache.dirty_count(), 0);
    assert_eq!(cache.flush().unwrap(), 0);
    assert_eq!(cache.store().writes(), 2);

    cache.get_node(&key(1)).unwrap().add_member(Resource::new(Term::iri("http://example.org/v/x")));
    assert_eq!(cache.flush().unwrap(), 1);
    assert_eq!(cache.store().writes(), 3);
}

#[test]
fn test_failed_flush_keeps_pages_dirty() {
    let mut cache = Cache::new(MemoryStore::default(), 10);
    cache.add_node(key(0), page(0, 1));
    cache.add_node(key(1), page(1, 1));

    cache.store().set_failing(true);
    let err = cache.flush().unwrap_err();
    assert_eq!(err.kind(), "storage");
    assert!(err.to_string().contains("2 of 2"), "{err}");
    assert_eq!(cache.dirty_count(), 2);

    cache.store().set_failing(false);
    assert_eq!(cache.flush().unwrap(), 2);
    assert_eq!(cache.dirty_count(), 0);
}

#[test]
fn test_failed_eviction_keeps_page_cached() {
    let mut cache = Cache::new(MemoryStore::default(), 1);
    cache.store().set_failing(true);
    cache.add_node(key(0), page(0, 1));
    cache.add_node(key(1), page(1, 1));
    assert_eq!(cache.len(), 2);
    assert!(cache.contains(&key(0)));

    cache.store().set_failing(false);
    cache.add_node(key(2), page(2, 1));
    assert_eq!(cache.len(), 1);
    assert!(cache.store().has_page(&key(0).path()));
    assert!(cache.store().has_page(&key(1).path()));
}

#[test]
fn test_last_page_counts_unflushed_pages() {
    let mut cache = Cache::new(MemoryStore::default(), 10);
    let dir = key(0).dir();
    assert_eq!(cache.get_last_page(&dir).unwrap(), None);

    cache.add_node(key(0), page(0, 1));
    assert_eq!(cache.get_last_page(&dir).unwrap(), Some(0));
    cache.add_node(key(1), page(1, 1));
    assert_eq!(cache.get_last_page(&dir).unwrap(), Some(1));

    cache.flush().unwrap();
    let mut fresh = Cache::new(MemoryStore::default(), 10);
    assert_eq!(fresh.get_last_page(&dir).unwrap(), None);
}

#[test]
fn test_unreadable_page_is_storage_error() {
    let store = MemoryStore::default();
    store
        .pages
        .lock()
        .unwrap()
        .insert(key(0).path(), Vec::new());
    let mut cache = Cache::new(store, 4);
    let err = cache.get_node(&key(0)).unwrap_err();
    assert_eq!(err.kind(), "storage");
    assert!(cache.is_empty());
    assert!(cache.get_node(&key(5)).is_err());
}
