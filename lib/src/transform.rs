//! Dataset transformers: turn an input RDF file into the resources fed to
//! batch ingestion.
//!
//! `default-transformer` streams the file and yields one resource per
//! contiguous block of triples sharing a subject, so memory stays bounded by
//! one resource. `rdf-transformer` reads the whole file, groups every triple
//! by subject IRI and can keep only resources of a configured type. Both
//! skip blank-node subjects.

use crate::consts::TYPE;
use crate::errors::{FragmentError, Result};
use crate::resource::Resource;
use crate::term::Term;
use crate::util::{format_for_path, parse_triples};
use log::{debug, info};
use oxigraph::io::RdfParser;
use oxigraph::model::{NamedOrBlankNode, Triple};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::str::FromStr;

#[derive(Serialize, Deserialize, Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum TransformerKind {
    #[default]
    #[serde(rename = "default-transformer")]
    Default,
    #[serde(rename = "rdf-transformer")]
    Rdf,
}

impl TransformerKind {
    pub const ALL: [TransformerKind; 2] = [TransformerKind::Default, TransformerKind::Rdf];

    pub fn name(&self) -> &'static str {
        match self {
            TransformerKind::Default => "default-transformer",
            TransformerKind::Rdf => "rdf-transformer",
        }
    }
}

impl fmt::Display for TransformerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TransformerKind {
    type Err = FragmentError;

    fn from_str(name: &str) -> Result<Self> {
        TransformerKind::ALL
            .into_iter()
            .find(|kind| kind.name() == name)
            .ok_or_else(|| {
                FragmentError::validation(format!(
                    "unknown transformer {name:?}, expected one of: {}",
                    TransformerKind::ALL.map(|k| k.name()).join(", ")
                ))
            })
    }
}

/// Describes how a dataset file is turned into stream members.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DatasetConfiguration {
    /// IRI of the event stream the members belong to.
    pub stream: String,
    /// Only resources with this `rdf:type` are kept (`rdf-transformer`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transformer: Option<TransformerKind>,
}

impl DatasetConfiguration {
    pub fn from_file(file: &Path) -> Result<Self> {
        let f = File::open(file).map_err(|e| FragmentError::storage(file, e))?;
        serde_json::from_reader(BufReader::new(f)).map_err(|e| {
            FragmentError::validation(format!(
                "invalid dataset configuration {}: {}",
                file.display(),
                e
            ))
        })
    }

    /// An explicit choice wins over the configured transformer.
    pub fn select_transformer(&self, explicit: Option<TransformerKind>) -> TransformerKind {
        explicit.or(self.transformer).unwrap_or_default()
    }
}

pub type Resources = Box<dyn Iterator<Item = Result<Resource>>>;

/// Opens `path` with the transformer `kind`. The RDF syntax is picked from
/// the file extension.
pub fn resources(
    kind: TransformerKind,
    path: &Path,
    config: &DatasetConfiguration,
) -> Result<Resources> {
    info!("Transforming {} with {}", path.display(), kind);
    match kind {
        TransformerKind::Default => Ok(Box::new(stream_resources(path)?)),
        TransformerKind::Rdf => Ok(Box::new(
            grouped_resources(path, config.resource_type.as_deref())?
                .into_iter()
                .map(Ok),
        )),
    }
}

/// Lazily parses `path`, yielding one resource per subject block.
pub fn stream_resources(
    path: &Path,
) -> Result<SubjectBlocks<impl Iterator<Item = Result<Triple>>>> {
    let file = File::open(path).map_err(|e| FragmentError::storage(path, e))?;
    let owned: PathBuf = path.to_path_buf();
    let triples = RdfParser::from_format(format_for_path(path))
        .for_reader(BufReader::new(file))
        .map(move |quad| {
            quad.map(|q| Triple::new(q.subject, q.predicate, q.object))
                .map_err(|e| {
                    FragmentError::validation(format!("cannot parse {}: {}", owned.display(), e))
                })
        });
    Ok(SubjectBlocks::new(triples))
}

/// Reads `path` completely and groups triples by subject IRI, in order of
/// first appearance.
pub fn grouped_resources(path: &Path, resource_type: Option<&str>) -> Result<Vec<Resource>> {
    let bytes = std::fs::read(path).map_err(|e| FragmentError::storage(path, e))?;
    let triples = parse_triples(&bytes, format_for_path(path)).map_err(|e| {
        FragmentError::validation(format!("cannot parse {}: {}", path.display(), e))
    })?;

    let mut order: Vec<Term> = Vec::new();
    let mut by_subject: HashMap<Term, Resource> = HashMap::new();
    for triple in triples {
        if matches!(triple.subject, NamedOrBlankNode::BlankNode(_)) {
            continue;
        }
        let subject = Term::from(triple.subject.clone());
        let resource = by_subject.entry(subject.clone()).or_insert_with(|| {
            order.push(subject.clone());
            Resource::new(subject)
        });
        add_triple(resource, triple)?;
    }

    let wanted = resource_type.map(Term::iri);
    let resources: Vec<Resource> = order
        .into_iter()
        .filter_map(|id| by_subject.remove(&id))
        .filter(|r| match &wanted {
            Some(t) => r.values(TYPE.as_str()).contains(t),
            None => true,
        })
        .collect();
    debug!("Grouped {} resources from {}", resources.len(), path.display());
    Ok(resources)
}

fn add_triple(resource: &mut Resource, triple: Triple) -> Result<()> {
    let value = Term::try_from(triple.object)?;
    resource.add_property(triple.predicate.as_str(), value);
    Ok(())
}

/// Folds a triple stream into resources, one per run of consecutive triples
/// with the same subject.
pub struct SubjectBlocks<I: Iterator<Item = Result<Triple>>> {
    triples: I,
    pending: Option<Result<Triple>>,
}

impl<I: Iterator<Item = Result<Triple>>> SubjectBlocks<I> {
    pub fn new(triples: I) -> Self {
        SubjectBlocks {
            triples,
            pending: None,
        }
    }
}

impl<I: Iterator<Item = Result<Triple>>> Iterator for SubjectBlocks<I> {
    type Item = Result<Resource>;

    fn next(&mut self) -> Option<Self::Item> {
        let first = loop {
            match self.pending.take().or_else(|| self.triples.next())? {
                Ok(t) if matches!(t.subject, NamedOrBlankNode::BlankNode(_)) => continue,
                Ok(t) => break t,
                Err(e) => return Some(Err(e)),
            }
        };
        let subject = first.subject.clone();
        let mut resource = Resource::new(Term::from(subject.clone()));
        if let Err(e) = add_triple(&mut resource, first) {
            return Some(Err(e));
        }
        loop {
            match self.triples.next() {
                Some(Ok(t)) if t.subject == subject => {
                    if let Err(e) = add_triple(&mut resource, t) {
                        return Some(Err(e));
                    }
                }
                Some(other) => {
                    self.pending = Some(other);
                    break;
                }
                None => break,
            }
        }
        Some(Ok(resource))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DATA: &str = r#"
@prefix ex: <http://example.org/> .
ex:a a ex:Person ; ex:name "alice" .
ex:b a ex:Dog ; ex:name "rex" .
_:x ex:name "anonymous" .
ex:a ex:knows ex:b .
"#;

    fn write_data(dir: &Path) -> PathBuf {
        let path = dir.join("data.ttl");
        std::fs::write(&path, DATA).unwrap();
        path
    }

    #[test]
    fn test_configuration_json() {
        let config: DatasetConfiguration = serde_json::from_str(
            r#"{"stream": "http://example.org/stream", "resourceType": "http://example.org/Person", "transformer": "rdf-transformer"}"#,
        )
        .unwrap();
        assert_eq!(config.resource_type.as_deref(), Some("http://example.org/Person"));
        assert_eq!(config.select_transformer(None), TransformerKind::Rdf);
        assert_eq!(
            config.select_transformer(Some(TransformerKind::Default)),
            TransformerKind::Default
        );
        let minimal: DatasetConfiguration =
            serde_json::from_str(r#"{"stream": "http://example.org/stream"}"#).unwrap();
        assert_eq!(minimal.select_transformer(None), TransformerKind::Default);
        assert!("csv-transformer".parse::<TransformerKind>().is_err());
    }

    #[test]
    fn test_stream_splits_on_subject_change() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_data(dir.path());
        let ids: Vec<String> = stream_resources(&path)
            .unwrap()
            .map(|r| r.unwrap().id().value().to_string())
            .collect();
        // ex:a shows up twice because its triples are not contiguous
        assert_eq!(
            ids,
            vec!["http://example.org/a", "http://example.org/b", "http://example.org/a"]
        );
    }

    #[test]
    fn test_grouped_resources_filter_by_type() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_data(dir.path());
        let all = grouped_resources(&path, None).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].values("http://example.org/knows").len(), 1);

        let people = grouped_resources(&path, Some("http://example.org/Person")).unwrap();
        assert_eq!(people.len(), 1);
        assert_eq!(people[0].id(), &Term::iri("http://example.org/a"));
    }

    #[test]
    fn test_parse_error_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.ttl");
        std::fs::write(&path, "<http://example.org/a> <http://example.org/p> .").unwrap();
        assert!(grouped_resources(&path, None).is_err());
    }
}
