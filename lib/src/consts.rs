//! Defines constant NamedNodeRefs for the vocabularies written into pages,
//! primarily from TREE, LDES, DCTERMS and PROV.

use oxigraph::model::NamedNodeRef;

pub const TREE_NS: &str = "https://w3id.org/tree#";
pub const LDES_NS: &str = "https://w3id.org/ldes#";

// namespace for versioned resources and relation identifiers minted by the fragmenter
pub const LDES_TIME_NS: &str = "http://mu.semte.ch/services/ldes-time-fragmenter/";

pub const TYPE: NamedNodeRef<'_> =
    NamedNodeRef::new_unchecked("http://www.w3.org/1999/02/22-rdf-syntax-ns#type");

// tree
pub const TREE_NODE: NamedNodeRef<'_> = NamedNodeRef::new_unchecked("https://w3id.org/tree#Node");
pub const TREE_MEMBER: NamedNodeRef<'_> =
    NamedNodeRef::new_unchecked("https://w3id.org/tree#member");
pub const TREE_RELATION: NamedNodeRef<'_> =
    NamedNodeRef::new_unchecked("https://w3id.org/tree#relation");
pub const TREE_TARGET: NamedNodeRef<'_> = NamedNodeRef::new_unchecked("https://w3id.org/tree#node");
pub const TREE_PATH: NamedNodeRef<'_> = NamedNodeRef::new_unchecked("https://w3id.org/tree#path");
pub const TREE_VALUE: NamedNodeRef<'_> =
    NamedNodeRef::new_unchecked("https://w3id.org/tree#value");

// ldes
pub const EVENT_STREAM: NamedNodeRef<'_> =
    NamedNodeRef::new_unchecked("https://w3id.org/ldes#EventStream");

// dcterms
pub const IS_VERSION_OF: NamedNodeRef<'_> =
    NamedNodeRef::new_unchecked("http://purl.org/dc/terms/isVersionOf");

// default fragmentation paths
pub const GENERATED_AT_TIME: NamedNodeRef<'_> =
    NamedNodeRef::new_unchecked("http://www.w3.org/ns/prov#generatedAtTime");
pub const EXAMPLE_NAME: NamedNodeRef<'_> = NamedNodeRef::new_unchecked("http://example.org/name");

/// Prefixes declared when pages are serialized to a format that supports them.
pub const PAGE_PREFIXES: [(&str, &str); 6] = [
    ("tree", TREE_NS),
    ("ldes", LDES_NS),
    ("dct", "http://purl.org/dc/terms/"),
    ("prov", "http://www.w3.org/ns/prov#"),
    ("xsd", "http://www.w3.org/2001/XMLSchema#"),
    ("rdf", "http://www.w3.org/1999/02/22-rdf-syntax-ns#"),
];
