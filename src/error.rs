//! Error types for xsdsynth
//!
//! This module defines all error types used throughout the library. Schema
//! problems (malformed input, duplicate or dangling names, mandatory
//! recursion) are raised while loading; only [`Error::Generation`] can occur
//! once a run has started.

use std::fmt;
use thiserror::Error;

use crate::namespaces::QName;
use crate::schema::DeclarationKind;

/// Result type alias using the xsdsynth Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for xsdsynth operations
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed or unsupported schema content
    #[error("schema parse error: {0}")]
    Parse(#[from] ParseError),

    /// Markup that is not well-formed XML
    #[error("XML error: {0}")]
    Xml(String),

    /// Two global declarations of the same kind share a name
    #[error("duplicate {kind} declaration '{name}'")]
    DuplicateDeclaration {
        /// Symbol table the name collided in
        kind: DeclarationKind,
        /// The repeated name
        name: QName,
    },

    /// A `ref`, `type`, `base`, `itemType` or `memberTypes` name has no declaration
    #[error("unresolved {kind} reference '{name}' in {site}")]
    MissingReference {
        /// Symbol table the name was looked up in
        kind: DeclarationKind,
        /// The unresolved name
        name: QName,
        /// Description of the declaration holding the reference
        site: String,
    },

    /// A reference cycle with no optional edge
    #[error("unbounded recursion: {}", .cycle.join(" -> "))]
    UnboundedRecursion {
        /// Symbols on the cycle, first symbol repeated at the end
        cycle: Vec<String>,
    },

    /// A value or tree could not be synthesized
    #[error("generation error: {0}")]
    Generation(String),

    /// No usable document root
    #[error("root element error: {0}")]
    RootElement(String),

    /// Generation options out of range
    #[error("invalid options: {0}")]
    InvalidOptions(String),

    /// Input limit exceeded
    #[error("limit exceeded: {0}")]
    LimitExceeded(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Build a generation error
    pub fn generation(message: impl Into<String>) -> Self {
        Error::Generation(message.into())
    }

    /// Check whether the error was raised while loading a schema
    pub fn is_schema_error(&self) -> bool {
        matches!(
            self,
            Error::Parse(_)
                | Error::Xml(_)
                | Error::DuplicateDeclaration { .. }
                | Error::MissingReference { .. }
                | Error::UnboundedRecursion { .. }
                | Error::LimitExceeded(_)
        )
    }
}

/// XML Schema parsing error
#[derive(Debug, Clone)]
pub struct ParseError {
    /// Error message
    pub message: String,
    /// Location in the schema (element path)
    pub location: Option<String>,
    /// Schema source that caused the error
    pub source: Option<String>,
}

impl ParseError {
    /// Create a new parse error
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            location: None,
            source: None,
        }
    }

    /// Set the location
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Set the source
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;

        if let Some(ref loc) = self.location {
            write!(f, "\n\nLocation: {}", loc)?;
        }

        if let Some(ref src) = self.source {
            write!(f, "\n\nSource:\n{}", src)?;
        }

        Ok(())
    }
}

impl std::error::Error for ParseError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_display() {
        let err = ParseError::new("Invalid schema syntax")
            .with_location("/schema/element[2]")
            .with_source("<xs:element name='invalid'/>");

        let msg = format!("{}", err);
        assert!(msg.contains("Invalid schema syntax"));
        assert!(msg.contains("Location:"));
        assert!(msg.contains("Source:"));
    }

    #[test]
    fn test_error_conversion() {
        let err: Error = ParseError::new("test").into();
        assert!(matches!(err, Error::Parse(_)));
        assert!(err.is_schema_error());
    }

    #[test]
    fn test_recursion_error_lists_cycle() {
        let err = Error::UnboundedRecursion {
            cycle: vec!["element a".into(), "type b".into(), "element a".into()],
        };
        assert_eq!(
            err.to_string(),
            "unbounded recursion: element a -> type b -> element a"
        );
        assert!(err.is_schema_error());
    }

    #[test]
    fn test_missing_reference_display() {
        let err = Error::MissingReference {
            kind: DeclarationKind::Type,
            name: QName::local("addressType"),
            site: "element 'customer'".into(),
        };
        assert_eq!(
            err.to_string(),
            "unresolved type reference 'addressType' in element 'customer'"
        );
        assert!(!Error::generation("x").is_schema_error());
    }
}
