//! A resource: an IRI plus its ordered predicate → values map.

use crate::errors::{FragmentError, Result};
use crate::term::{named_node, Term};
use log::warn;
use oxigraph::model::Triple;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    id: Term,
    // insertion ordered; predicates are unique
    properties: Vec<(String, Vec<Term>)>,
}

impl Resource {
    pub fn new(id: Term) -> Self {
        Resource {
            id,
            properties: Vec::new(),
        }
    }

    pub fn id(&self) -> &Term {
        &self.id
    }

    /// Appends a value for `predicate`, keeping first-seen predicate order.
    pub fn add_property(&mut self, predicate: impl Into<String>, value: Term) {
        let predicate = predicate.into();
        match self.properties.iter_mut().find(|(p, _)| *p == predicate) {
            Some((_, values)) => values.push(value),
            None => self.properties.push((predicate, vec![value])),
        }
    }

    pub fn properties(&self) -> impl Iterator<Item = (&str, &[Term])> {
        self.properties
            .iter()
            .map(|(p, values)| (p.as_str(), values.as_slice()))
    }

    pub fn values(&self, predicate: &str) -> &[Term] {
        self.properties
            .iter()
            .find(|(p, _)| p == predicate)
            .map(|(_, values)| values.as_slice())
            .unwrap_or(&[])
    }

    pub fn first_value(&self, predicate: &str) -> Option<&Term> {
        self.values(predicate).first()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// Copies this resource under a new identifier. Every occurrence of the
    /// old identifier, as predicate or as value, is rewritten to the new one.
    pub fn copy_as(&self, id: Term) -> Resource {
        let mut copy = Resource::new(id.clone());
        for (predicate, values) in &self.properties {
            let predicate = if self.id.is_iri() && self.id.value() == predicate {
                id.value().to_string()
            } else {
                predicate.clone()
            };
            for value in values {
                let value = if *value == self.id {
                    id.clone()
                } else {
                    value.clone()
                };
                copy.add_property(predicate.clone(), value);
            }
        }
        copy
    }

    pub fn to_triples(&self) -> Result<Vec<Triple>> {
        let subject = self.id.to_subject()?;
        let mut triples = Vec::new();
        for (predicate, values) in &self.properties {
            let predicate = named_node(predicate)?;
            for value in values {
                triples.push(Triple::new(
                    subject.clone(),
                    predicate.clone(),
                    value.to_oxigraph()?,
                ));
            }
        }
        Ok(triples)
    }

    /// Builds a resource from the triples whose subject is `id`, in order.
    /// Triples about other subjects are dropped with a warning.
    pub fn from_triples<'a>(
        id: Term,
        triples: impl IntoIterator<Item = &'a Triple>,
    ) -> Result<Self> {
        let mut resource = Resource::new(id);
        let mut dropped = 0;
        for triple in triples {
            if Term::from(triple.subject.clone()) != resource.id {
                dropped += 1;
                continue;
            }
            let value = Term::try_from(triple.object.clone())?;
            resource.add_property(triple.predicate.as_str(), value);
        }
        if !resource.id.is_iri() {
            return Err(FragmentError::validation(format!(
                "resource identifier {} is not an IRI",
                resource.id
            )));
        }
        if dropped > 0 {
            warn!(
                "Dropped {} triples not about {} (nested descriptions are not kept)",
                dropped, resource.id
            );
        }
        Ok(resource)
    }
}
