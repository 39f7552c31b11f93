//! RDF values as stored in resources and relations.

use crate::errors::{FragmentError, Result};
use oxigraph::model::vocab::{rdf, xsd};
use oxigraph::model::{BlankNode, Literal, NamedNode, NamedOrBlankNode, Term as OxTerm};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single RDF value. Equality is structural over every field, so two terms
/// compare equal exactly when they denote the same IRI, blank node label or
/// literal (lexical form, datatype and language).
///
/// Plain `xsd:string` literals are normalized to `datatype: None`, and
/// language-tagged literals carry their tag in `language` instead of an
/// `rdf:langString` datatype.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub enum Term {
    Iri(String),
    BlankNode(String),
    Literal {
        value: String,
        datatype: Option<String>,
        language: Option<String>,
    },
}

impl Term {
    pub fn iri(value: impl Into<String>) -> Self {
        Term::Iri(value.into())
    }

    pub fn literal(value: impl Into<String>) -> Self {
        Term::Literal {
            value: value.into(),
            datatype: None,
            language: None,
        }
    }

    pub fn typed_literal(value: impl Into<String>, datatype: impl Into<String>) -> Self {
        let datatype = datatype.into();
        let datatype = if datatype == xsd::STRING.as_str() {
            None
        } else {
            Some(datatype)
        };
        Term::Literal {
            value: value.into(),
            datatype,
            language: None,
        }
    }

    pub fn lang_literal(value: impl Into<String>, language: impl Into<String>) -> Self {
        Term::Literal {
            value: value.into(),
            datatype: None,
            language: Some(language.into()),
        }
    }

    /// Lexical value: the IRI, blank node label or literal lexical form.
    pub fn value(&self) -> &str {
        match self {
            Term::Iri(v) | Term::BlankNode(v) => v,
            Term::Literal { value, .. } => value,
        }
    }

    pub fn datatype(&self) -> Option<&str> {
        match self {
            Term::Literal { datatype, .. } => datatype.as_deref(),
            _ => None,
        }
    }

    pub fn is_iri(&self) -> bool {
        matches!(self, Term::Iri(_))
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, Term::Literal { .. })
    }

    pub fn to_oxigraph(&self) -> Result<OxTerm> {
        Ok(match self {
            Term::Iri(iri) => named_node(iri)?.into(),
            Term::BlankNode(id) => BlankNode::new(id.as_str())
                .map_err(|e| FragmentError::validation(format!("invalid blank node {id}: {e}")))?
                .into(),
            Term::Literal {
                value,
                datatype,
                language,
            } => match (language, datatype) {
                (Some(lang), _) => {
                    Literal::new_language_tagged_literal(value.as_str(), lang.as_str())
                        .map_err(|e| {
                            FragmentError::validation(format!("invalid language tag {lang}: {e}"))
                        })?
                        .into()
                }
                (None, Some(dt)) => {
                    Literal::new_typed_literal(value.as_str(), named_node(dt)?).into()
                }
                (None, None) => Literal::new_simple_literal(value.as_str()).into(),
            },
        })
    }

    /// Converts a subject position term; literals are rejected.
    pub fn to_subject(&self) -> Result<NamedOrBlankNode> {
        match self.to_oxigraph()? {
            OxTerm::NamedNode(n) => Ok(n.into()),
            OxTerm::BlankNode(b) => Ok(b.into()),
            _ => Err(FragmentError::validation(format!(
                "{self} cannot be used as a subject"
            ))),
        }
    }
}

pub(crate) fn named_node(iri: &str) -> Result<NamedNode> {
    NamedNode::new(iri).map_err(|e| FragmentError::validation(format!("invalid IRI <{iri}>: {e}")))
}

impl From<NamedNode> for Term {
    fn from(node: NamedNode) -> Self {
        Term::Iri(node.into_string())
    }
}

impl From<Literal> for Term {
    fn from(literal: Literal) -> Self {
        if let Some(lang) = literal.language() {
            return Term::lang_literal(literal.value(), lang);
        }
        if literal.datatype() == xsd::STRING || literal.datatype() == rdf::LANG_STRING {
            Term::literal(literal.value())
        } else {
            Term::typed_literal(literal.value(), literal.datatype().as_str())
        }
    }
}

impl From<NamedOrBlankNode> for Term {
    fn from(node: NamedOrBlankNode) -> Self {
        match node {
            NamedOrBlankNode::NamedNode(n) => n.into(),
            NamedOrBlankNode::BlankNode(b) => Term::BlankNode(b.as_str().to_string()),
        }
    }
}

impl TryFrom<OxTerm> for Term {
    type Error = FragmentError;

    fn try_from(term: OxTerm) -> Result<Self> {
        match term {
            OxTerm::NamedNode(n) => Ok(n.into()),
            OxTerm::BlankNode(b) => Ok(Term::BlankNode(b.as_str().to_string())),
            OxTerm::Literal(l) => Ok(l.into()),
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Iri(iri) => write!(f, "<{iri}>"),
            Term::BlankNode(id) => write!(f, "_:{id}"),
            Term::Literal {
                value,
                datatype,
                language,
            } => {
                write!(f, "{value:?}")?;
                if let Some(lang) = language {
                    write!(f, "@{lang}")
                } else if let Some(dt) = datatype {
                    write!(f, "^^<{dt}>")
                } else {
                    Ok(())
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structural_equality() {
        let a = Term::typed_literal("2024-01-01T00:00:00.000Z", xsd::DATE_TIME.as_str());
        let b = Term::typed_literal("2024-01-01T00:00:00.000Z", xsd::DATE_TIME.as_str());
        assert_eq!(a, b);
        assert_ne!(a, Term::literal("2024-01-01T00:00:00.000Z"));
        assert_ne!(Term::iri("http://example.org/a"), Term::literal("http://example.org/a"));
        // xsd:string is the implicit datatype of plain literals
        assert_eq!(Term::typed_literal("x", xsd::STRING.as_str()), Term::literal("x"));
    }

    #[test]
    fn test_oxigraph_conversion() {
        let terms = vec![
            Term::iri("http://example.org/a"),
            Term::literal("plain"),
            Term::lang_literal("hallo", "nl"),
            Term::typed_literal("42", xsd::INTEGER.as_str()),
        ];
        for term in terms {
            let converted = Term::try_from(term.to_oxigraph().unwrap()).unwrap();
            assert_eq!(converted, term);
        }
    }

    #[test]
    fn test_invalid_iri_is_rejected() {
        assert!(Term::iri("not an iri").to_oxigraph().is_err());
        assert!(Term::literal("x").to_subject().is_err());
    }
}
