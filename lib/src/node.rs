//! Pages of the event stream and how they map onto files and triples.

use crate::consts::*;
use crate::errors::{FragmentError, Result};
use crate::relation::{Relation, RelationKind};
use crate::resource::Resource;
use crate::term::{named_node, Term};
use oxigraph::model::{NamedOrBlankNode, Term as OxTerm, Triple};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const PAGE_EXTENSION: &str = "ttl";

/// Identifies a page inside a stream folder: an optional trie path of
/// encoded key segments followed by the page number.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageId {
    path: Vec<String>,
    number: u64,
}

impl PageId {
    pub fn new(number: u64) -> Self {
        PageId {
            path: Vec::new(),
            number,
        }
    }

    pub fn nested(path: Vec<String>, number: u64) -> Self {
        PageId { path, number }
    }

    pub fn number(&self) -> u64 {
        self.number
    }

    pub fn path(&self) -> &[String] {
        &self.path
    }

    /// Same trie location, different page number.
    pub fn with_number(&self, number: u64) -> Self {
        PageId {
            path: self.path.clone(),
            number,
        }
    }

    /// Directory of this page relative to the stream folder.
    pub fn relative_dir(&self) -> PathBuf {
        self.path.iter().collect()
    }

    pub fn relative_path(&self) -> PathBuf {
        self.relative_dir()
            .join(format!("{}.{}", self.number, PAGE_EXTENSION))
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.path {
            write!(f, "{}/", segment)?;
        }
        write!(f, "{}", self.number)
    }
}

impl FromStr for PageId {
    type Err = FragmentError;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts: Vec<&str> = s.split('/').collect();
        let number = parts
            .pop()
            .and_then(|n| n.parse::<u64>().ok())
            .ok_or_else(|| FragmentError::validation(format!("invalid page identifier {s:?}")))?;
        let mut path = Vec::with_capacity(parts.len());
        for part in parts {
            if !is_safe_segment(part) {
                return Err(FragmentError::validation(format!(
                    "invalid page identifier {s:?}"
                )));
            }
            path.push(part.to_string());
        }
        Ok(PageId { path, number })
    }
}

pub(crate) fn is_safe_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment != "."
        && segment != ".."
        && !segment.contains(['\\', '/', ':'])
}

/// Encodes one key character as a filesystem and IRI safe path segment.
pub fn encode_segment(c: char) -> String {
    let mut buf = [0u8; 4];
    url::form_urlencoded::byte_serialize(c.encode_utf8(&mut buf).as_bytes())
        .collect::<String>()
        .replace('.', "%2E")
        .replace('*', "%2A")
}

/// Builds the IRI of a page from the view IRI of its stream folder.
pub fn page_iri(view: &str, id: &PageId) -> String {
    format!("{}/{}", view.trim_end_matches('/'), id)
}

/// Storage location of a page: the stream folder plus the page identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PageKey {
    pub folder: PathBuf,
    pub id: PageId,
}

impl PageKey {
    pub fn new(folder: impl Into<PathBuf>, id: PageId) -> Self {
        PageKey {
            folder: folder.into(),
            id,
        }
    }

    /// Directory holding this page and its siblings in the chain.
    pub fn dir(&self) -> PathBuf {
        self.folder.join(self.id.relative_dir())
    }

    pub fn path(&self) -> PathBuf {
        self.folder.join(self.id.relative_path())
    }

    pub fn sibling(&self, number: u64) -> PageKey {
        PageKey::new(self.folder.clone(), self.id.with_number(number))
    }
}

/// A page: its members, its outgoing relations, and whether it changed
/// since it was last written.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    id: PageId,
    view: String,
    stream: Term,
    members: Vec<Resource>,
    relations: Vec<Relation>,
    dirty: bool,
}

impl Node {
    pub fn new(id: PageId, view: impl Into<String>, stream: Term) -> Self {
        Node {
            id,
            view: view.into(),
            stream,
            members: Vec::new(),
            relations: Vec::new(),
            dirty: true,
        }
    }

    pub fn id(&self) -> &PageId {
        &self.id
    }

    pub fn iri(&self) -> String {
        page_iri(&self.view, &self.id)
    }

    pub fn view(&self) -> &str {
        &self.view
    }

    pub fn stream(&self) -> &Term {
        &self.stream
    }

    pub fn members(&self) -> &[Resource] {
        &self.members
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn relations(&self) -> &[Relation] {
        &self.relations
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn add_member(&mut self, resource: Resource) {
        self.members.push(resource);
        self.dirty = true;
    }

    pub fn add_relation(&mut self, relation: Relation) {
        self.relations.push(relation);
        self.dirty = true;
    }

    /// Value of `path` on the most recently added member.
    pub fn last_member_value(&self, path: &str) -> Option<&Term> {
        self.members.last()?.first_value(path)
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub(crate) fn mark_clean(&mut self) {
        self.dirty = false;
    }

    /// Serializes the page: node and stream declarations, relations, then
    /// every member preceded by its `tree:member` triple.
    pub fn to_triples(&self) -> Result<Vec<Triple>> {
        let page = named_node(&self.iri())?;
        let stream = self.stream.to_subject()?;
        let mut triples = vec![
            Triple::new(page.clone(), TYPE.into_owned(), TREE_NODE.into_owned()),
            Triple::new(stream.clone(), TYPE.into_owned(), EVENT_STREAM.into_owned()),
        ];
        for relation in &self.relations {
            let rel = relation.id.to_subject()?;
            triples.push(Triple::new(
                page.clone(),
                TREE_RELATION.into_owned(),
                relation.id.to_oxigraph()?,
            ));
            triples.push(Triple::new(
                rel.clone(),
                TYPE.into_owned(),
                named_node(&relation.kind.iri())?,
            ));
            triples.push(Triple::new(
                rel.clone(),
                TREE_TARGET.into_owned(),
                named_node(&page_iri(&self.view, &relation.target))?,
            ));
            triples.push(Triple::new(
                rel.clone(),
                TREE_PATH.into_owned(),
                relation.path.to_oxigraph()?,
            ));
            triples.push(Triple::new(
                rel,
                TREE_VALUE.into_owned(),
                relation.value.to_oxigraph()?,
            ));
        }
        for member in &self.members {
            triples.push(Triple::new(
                stream.clone(),
                TREE_MEMBER.into_owned(),
                member.id().to_oxigraph()?,
            ));
            triples.extend(member.to_triples()?);
        }
        Ok(triples)
    }

    /// Rebuilds a page from the triples of its file. The result is clean.
    pub fn from_triples(id: PageId, triples: &[Triple]) -> Result<Self> {
        let malformed =
            |msg: String| FragmentError::validation(format!("malformed page {id}: {msg}"));

        let page = triples
            .iter()
            .find(|t| t.predicate.as_ref() == TYPE && object_iri(t) == Some(TREE_NODE.as_str()))
            .and_then(subject_iri)
            .ok_or_else(|| malformed("no tree:Node declaration".to_string()))?;
        let suffix = format!("/{id}");
        let view = page
            .strip_suffix(suffix.as_str())
            .ok_or_else(|| malformed(format!("page IRI <{page}> does not end in {suffix}")))?
            .to_string();

        let stream = triples
            .iter()
            .find(|t| {
                t.predicate.as_ref() == TYPE && object_iri(t) == Some(EVENT_STREAM.as_str())
            })
            .or_else(|| triples.iter().find(|t| t.predicate.as_ref() == TREE_MEMBER))
            .map(|t| Term::from(t.subject.clone()))
            .ok_or_else(|| malformed("no event stream declaration".to_string()))?;

        let mut member_ids: Vec<Term> = Vec::new();
        let mut relation_ids: Vec<Term> = Vec::new();
        for t in triples {
            let subject = Term::from(t.subject.clone());
            if subject == stream && t.predicate.as_ref() == TREE_MEMBER {
                member_ids.push(Term::try_from(t.object.clone())?);
            } else if subject_iri(t) == Some(page) && t.predicate.as_ref() == TREE_RELATION {
                relation_ids.push(Term::try_from(t.object.clone())?);
            }
        }

        let mut members: HashMap<Term, Resource> = member_ids
            .iter()
            .map(|m| (m.clone(), Resource::new(m.clone())))
            .collect();
        let mut parts: HashMap<Term, RelationParts> = relation_ids
            .iter()
            .map(|r| (r.clone(), RelationParts::default()))
            .collect();
        for t in triples {
            let subject = Term::from(t.subject.clone());
            if let Some(member) = members.get_mut(&subject) {
                member.add_property(t.predicate.as_str(), Term::try_from(t.object.clone())?);
            } else if let Some(rel) = parts.get_mut(&subject) {
                let object = Term::try_from(t.object.clone())?;
                match t.predicate.as_ref() {
                    p if p == TYPE => rel.kind = Some(object),
                    p if p == TREE_TARGET => rel.target = Some(object),
                    p if p == TREE_PATH => rel.path = Some(object),
                    p if p == TREE_VALUE => rel.value = Some(object),
                    _ => {}
                }
            }
        }

        let mut relations = Vec::with_capacity(relation_ids.len());
        for rel_id in relation_ids {
            let rel = parts.remove(&rel_id).unwrap_or_default();
            let incomplete = || malformed(format!("relation {rel_id} is incomplete"));
            let kind = rel
                .kind
                .ok_or_else(incomplete)?
                .value()
                .parse::<RelationKind>()
                .map_err(malformed)?;
            let target = rel.target.ok_or_else(incomplete)?;
            let target = target
                .value()
                .strip_prefix(view.as_str())
                .and_then(|rest| rest.strip_prefix('/'))
                .ok_or_else(|| malformed(format!("relation target {target} is outside the view")))?
                .parse::<PageId>()?;
            relations.push(Relation::new(
                rel_id.clone(),
                kind,
                rel.value.ok_or_else(incomplete)?,
                rel.path.ok_or_else(incomplete)?,
                target,
            ));
        }

        let members = member_ids
            .iter()
            .filter_map(|m| members.remove(m))
            .collect();

        Ok(Node {
            id,
            view,
            stream,
            members,
            relations,
            dirty: false,
        })
    }
}

#[derive(Default)]
struct RelationParts {
    kind: Option<Term>,
    target: Option<Term>,
    path: Option<Term>,
    value: Option<Term>,
}

fn subject_iri(t: &Triple) -> Option<&str> {
    match &t.subject {
        NamedOrBlankNode::NamedNode(n) => Some(n.as_str()),
        _ => None,
    }
}

fn object_iri(t: &Triple) -> Option<&str> {
    match &t.object {
        OxTerm::NamedNode(n) => Some(n.as_str()),
        _ => None,
    }
}

/// Whether `path` looks like a page file (`<number>.ttl`).
pub fn page_number_of(path: &Path) -> Option<u64> {
    if path.extension().and_then(|e| e.to_str()) != Some(PAGE_EXTENSION) {
        return None;
    }
    path.file_stem()?.to_str()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxigraph::model::vocab::xsd;

    const VIEW: &str = "http://localhost:8888/stream";
    const PATH: &str = "http://www.w3.org/ns/prov#generatedAtTime";

    fn member(n: u32) -> Resource {
        let mut r = Resource::new(Term::iri(format!("http://example.org/v/{n}")));
        r.add_property(
            PATH,
            Term::typed_literal(format!("2024-01-0{n}T00:00:00.000Z"), xsd::DATE_TIME.as_str()),
        );
        r.add_property(IS_VERSION_OF.as_str(), Term::iri(format!("http://example.org/{n}")));
        r
    }

    #[test]
    fn test_page_id_display_and_parse() {
        let id = PageId::nested(vec!["a".to_string(), "%2E".to_string()], 3);
        assert_eq!(id.to_string(), "a/%2E/3");
        assert_eq!("a/%2E/3".parse::<PageId>().unwrap(), id);
        assert_eq!("7".parse::<PageId>().unwrap(), PageId::new(7));
        assert!("a/../3".parse::<PageId>().is_err());
        assert!("a/b".parse::<PageId>().is_err());
        assert_eq!(id.relative_path(), PathBuf::from("a/%2E/3.ttl"));
    }

    #[test]
    fn test_encode_segment() {
        assert_eq!(encode_segment('a'), "a");
        assert_eq!(encode_segment('.'), "%2E");
        assert_eq!(encode_segment('/'), "%2F");
        assert_eq!(encode_segment('é'), "%C3%A9");
    }

    #[test]
    fn test_node_triples_round_trip() {
        let stream = Term::iri("http://example.org/stream");
        let mut node = Node::new(PageId::new(0), VIEW, stream.clone());
        node.add_member(member(1));
        node.add_member(member(2));
        node.add_relation(Relation::new(
            Term::iri("http://example.org/relations/1"),
            RelationKind::GreaterThanOrEqual,
            member(2).first_value(PATH).unwrap().clone(),
            Term::iri(PATH),
            PageId::new(1),
        ));

        let triples = node.to_triples().unwrap();
        let loaded = Node::from_triples(PageId::new(0), &triples).unwrap();
        assert_eq!(loaded.members(), node.members());
        assert_eq!(loaded.relations(), node.relations());
        assert_eq!(loaded.stream(), &stream);
        assert_eq!(loaded.iri(), "http://localhost:8888/stream/0");
        assert!(!loaded.is_dirty());
    }

    #[test]
    fn test_from_triples_rejects_foreign_page() {
        let node = Node::new(PageId::new(4), VIEW, Term::iri("http://example.org/stream"));
        let triples = node.to_triples().unwrap();
        assert!(Node::from_triples(PageId::new(5), &triples).is_err());
    }

    #[test]
    fn test_page_number_of() {
        assert_eq!(page_number_of(Path::new("/data/12.ttl")), Some(12));
        assert_eq!(page_number_of(Path::new("/data/12.ttl.tmp")), None);
        assert_eq!(page_number_of(Path::new("/data/.ldes.lock")), None);
    }
}
