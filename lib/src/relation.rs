//! Directed edges between pages.

use crate::consts::TREE_NS;
use crate::node::PageId;
use crate::term::Term;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The TREE relation types a page can point through.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum RelationKind {
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    Equal,
    Prefix,
    Substring,
}

impl RelationKind {
    fn local_name(&self) -> &'static str {
        match self {
            RelationKind::GreaterThan => "GreaterThanRelation",
            RelationKind::GreaterThanOrEqual => "GreaterThanOrEqualToRelation",
            RelationKind::LessThan => "LessThanRelation",
            RelationKind::LessThanOrEqual => "LessThanOrEqualToRelation",
            RelationKind::Equal => "EqualToRelation",
            RelationKind::Prefix => "PrefixRelation",
            RelationKind::Substring => "SubstringRelation",
        }
    }

    pub fn iri(&self) -> String {
        format!("{}{}", TREE_NS, self.local_name())
    }
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tree:{}", self.local_name())
    }
}

impl FromStr for RelationKind {
    type Err = String;

    /// Parses a relation type IRI.
    fn from_str(iri: &str) -> Result<Self, Self::Err> {
        let local = iri
            .strip_prefix(TREE_NS)
            .ok_or_else(|| format!("{iri} is not a TREE relation type"))?;
        match local {
            "GreaterThanRelation" => Ok(RelationKind::GreaterThan),
            // older pages used the pre-standard name
            "GreaterThanOrEqualToRelation" | "GreaterThanOrEqualRelation" => {
                Ok(RelationKind::GreaterThanOrEqual)
            }
            "LessThanRelation" => Ok(RelationKind::LessThan),
            "LessThanOrEqualToRelation" | "LessThanOrEqualRelation" => {
                Ok(RelationKind::LessThanOrEqual)
            }
            "EqualToRelation" => Ok(RelationKind::Equal),
            "PrefixRelation" => Ok(RelationKind::Prefix),
            "SubstringRelation" => Ok(RelationKind::Substring),
            other => Err(format!("unknown relation type tree:{other}")),
        }
    }
}

/// An edge owned by its source page: readers follow it to `target` when a
/// value of `path` satisfies `kind` against `value`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Relation {
    pub id: Term,
    pub kind: RelationKind,
    pub value: Term,
    pub path: Term,
    pub target: PageId,
}

impl Relation {
    pub fn new(id: Term, kind: RelationKind, value: Term, path: Term, target: PageId) -> Self {
        Relation {
            id,
            kind,
            value,
            path,
            target,
        }
    }
}
