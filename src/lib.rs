//! # xsdsynth
//!
//! Generate synthetic XML instance documents that validate against an XML
//! Schema (XSD 1.0).
//!
//! Useful for test fixtures and schema-driven fuzzing or mocking.
//!
//! ## Features
//!
//! - Order-independent resolution of elements, types, groups, attributes and
//!   attribute groups
//! - Rejection of schemas whose recursion admits no finite instance
//! - Facet-aware values: patterns, enumerations, ranges, digits and lengths
//! - Reproducible output from a seeded rng
//! - Protection against oversized and deeply nested schema input
//! - RELAX NG grammars in the XML syntax, detected from the document root
//!
//! ## Example
//!
//! ```rust,ignore
//! use rand::SeedableRng;
//! use rand_xorshift::XorShiftRng;
//! use xsdsynth::{generate_instance, load_schema, serialize, GenerationOptions};
//!
//! let graph = load_schema(&std::fs::read("order.xsd")?)?;
//! let mut rng = XorShiftRng::seed_from_u64(42);
//! let root = generate_instance(&graph, "order", &mut rng, &GenerationOptions::default())?;
//! println!("{}", serialize(&root)?);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

// Foundation
pub mod error;
pub mod limits;
pub mod namespaces;

// Schema input
pub mod documents;
pub mod schema;

// Generation
pub mod generator;
pub mod instance;
pub mod options;
pub mod serializer;
pub mod values;

use tracing::debug;

// Re-exports for convenience
pub use error::{Error, ParseError, Result};
pub use generator::{generate_instance, Generator};
pub use instance::Node;
pub use limits::Limits;
pub use options::GenerationOptions;
pub use schema::{ElementId, RecursionClass, SchemaGraph, Symbol};
pub use serializer::{serialize, serialize_into};
pub use values::{DefaultValueProvider, ValueProvider};

/// Version of the xsdsynth library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Parse, resolve and analyze a schema with default limits
pub fn load_schema(source: &[u8]) -> Result<SchemaGraph> {
    load_schema_with_limits(source, &Limits::default())
}

/// Parse, resolve and analyze a schema under the given input limits
pub fn load_schema_with_limits(source: &[u8], limits: &Limits) -> Result<SchemaGraph> {
    let document = schema::parsing::load_with_limits(source, limits)?;
    let graph = SchemaGraph::from_document(&document)?;
    debug!(symbols = graph.symbol_count(), "schema loaded");
    Ok(graph)
}
