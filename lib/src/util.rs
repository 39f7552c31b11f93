use crate::consts::{LDES_TIME_NS, PAGE_PREFIXES};
use crate::errors::{FragmentError, Result};
use crate::term::Term;

use chrono::prelude::*;
use log::debug;
use oxigraph::io::{RdfFormat, RdfParser, RdfSerializer};
use oxigraph::model::vocab::xsd;
use oxigraph::model::Triple;
use std::io::Cursor;
use uuid::Uuid;

/// Initializes logging for the fragmenter.
///
/// If `LDES_LOG` is set, it is copied into `RUST_LOG` so that it takes
/// precedence. The logger itself (`env_logger::init()` or similar) must be
/// initialized after this call.
pub fn init_logging() {
    if let Ok(log_level) = std::env::var("LDES_LOG") {
        std::env::set_var("RUST_LOG", log_level);
    }
}

pub fn generate_version() -> Term {
    Term::iri(format!("{}versioned/{}", LDES_TIME_NS, Uuid::new_v4()))
}

pub fn generate_tree_relation() -> Term {
    Term::iri(format!("{}relations/{}", LDES_TIME_NS, Uuid::new_v4()))
}

/// Current time as an `xsd:dateTime` literal, millisecond precision, UTC.
pub fn now_literal() -> Term {
    let now = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
    Term::typed_literal(now, xsd::DATE_TIME.as_str())
}

/// Parses RDF content into triples. Quads in named graphs are flattened
/// into the default graph.
pub fn parse_triples(bytes: &[u8], format: RdfFormat) -> std::result::Result<Vec<Triple>, String> {
    let parser = RdfParser::from_format(format).for_reader(Cursor::new(bytes));
    let mut triples = Vec::new();
    for quad in parser {
        let quad = quad.map_err(|e| e.to_string())?;
        triples.push(Triple::new(quad.subject, quad.predicate, quad.object));
    }
    debug!("Parsed {} triples as {}", triples.len(), format.name());
    Ok(triples)
}

pub fn serialize_triples(triples: &[Triple], format: RdfFormat) -> Result<Vec<u8>> {
    let mut serializer = RdfSerializer::from_format(format);
    for (prefix, iri) in PAGE_PREFIXES {
        serializer = serializer
            .with_prefix(prefix, iri)
            .map_err(|e| FragmentError::internal(format!("invalid prefix {prefix}: {e}")))?;
    }
    let mut writer = serializer.for_writer(Vec::new());
    for triple in triples {
        writer
            .serialize_triple(triple.as_ref())
            .map_err(|e| FragmentError::internal(format!("serialization failed: {e}")))?;
    }
    writer
        .finish()
        .map_err(|e| FragmentError::internal(format!("serialization failed: {e}")))
}

/// Resolves the `Content-Type` of an inbound body to a parser format.
pub fn format_for_content_type(content_type: &str) -> Result<RdfFormat> {
    let media_type = content_type.split(';').next().unwrap_or_default().trim();
    RdfFormat::from_media_type(media_type).ok_or_else(|| {
        FragmentError::validation(format!("unsupported content type {content_type:?}"))
    })
}

/// Picks the response format from an `Accept` header: the first supported
/// media type wins, a wildcard or missing header means Turtle.
pub fn negotiate_format(accept: Option<&str>) -> Result<RdfFormat> {
    let Some(accept) = accept.filter(|a| !a.trim().is_empty()) else {
        return Ok(RdfFormat::Turtle);
    };
    for candidate in accept.split(',') {
        let media_type = candidate.split(';').next().unwrap_or_default().trim();
        if media_type == "*/*" || media_type == "text/*" || media_type == "application/*" {
            return Ok(RdfFormat::Turtle);
        }
        if let Some(format) = RdfFormat::from_media_type(media_type) {
            return Ok(format);
        }
    }
    Err(FragmentError::validation(format!(
        "none of the accepted media types {accept:?} can be produced"
    )))
}

/// Picks a parser from a file extension, defaulting to Turtle.
pub fn format_for_path(path: &std::path::Path) -> RdfFormat {
    path.extension()
        .and_then(|ext| ext.to_str())
        .and_then(|ext| match ext {
            "n3" => Some(RdfFormat::Turtle),
            "xml" => Some(RdfFormat::RdfXml),
            other => RdfFormat::from_extension(other),
        })
        .unwrap_or(RdfFormat::Turtle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negotiate_format() {
        assert_eq!(negotiate_format(None).unwrap(), RdfFormat::Turtle);
        assert_eq!(negotiate_format(Some("*/*")).unwrap(), RdfFormat::Turtle);
        assert_eq!(
            negotiate_format(Some("text/html, application/n-triples;q=0.9")).unwrap(),
            RdfFormat::NTriples
        );
        assert!(negotiate_format(Some("text/html")).is_err());
    }

    #[test]
    fn test_content_type() {
        assert_eq!(
            format_for_content_type("text/turtle; charset=utf-8").unwrap(),
            RdfFormat::Turtle
        );
        assert!(matches!(
            format_for_content_type("application/pdf"),
            Err(FragmentError::Validation(_))
        ));
    }

    #[test]
    fn test_now_literal_is_datetime() {
        let now = now_literal();
        assert_eq!(now.datatype(), Some(xsd::DATE_TIME.as_str()));
        assert!(now.value().ends_with('Z'));
    }

    #[test]
    fn test_generated_iris_are_unique() {
        assert_ne!(generate_version(), generate_version());
        assert!(generate_tree_relation().value().starts_with(LDES_TIME_NS));
    }
}
