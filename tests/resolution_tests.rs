//! Schema loading and resolution tests
//!
//! These tests load whole schemas through the public API and check that
//! references resolve the same way regardless of declaration order.

use std::io::Write;
use std::path::PathBuf;

use xsdsynth::namespaces::QName;
use xsdsynth::schema::{DeclarationKind, ResolvedType, Term, TypeRef};
use xsdsynth::{load_schema, Error, SchemaGraph, Symbol};

fn fixture(name: &str) -> PathBuf {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path.push(name);
    path
}

fn load_fixture(name: &str) -> SchemaGraph {
    load_schema(&std::fs::read(fixture(name)).unwrap()).unwrap()
}

const FORWARD: &str = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <xs:element name="library" type="LibraryType"/>
  <xs:complexType name="LibraryType">
    <xs:sequence>
      <xs:element ref="book" maxOccurs="unbounded"/>
    </xs:sequence>
  </xs:complexType>
  <xs:element name="book" type="BookType"/>
  <xs:complexType name="BookType">
    <xs:sequence>
      <xs:element name="title" type="xs:string"/>
      <xs:element name="isbn" type="Isbn"/>
    </xs:sequence>
  </xs:complexType>
  <xs:simpleType name="Isbn">
    <xs:restriction base="xs:string">
      <xs:pattern value="\d{13}"/>
    </xs:restriction>
  </xs:simpleType>
</xs:schema>"#;

const BACKWARD: &str = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <xs:simpleType name="Isbn">
    <xs:restriction base="xs:string">
      <xs:pattern value="\d{13}"/>
    </xs:restriction>
  </xs:simpleType>
  <xs:complexType name="BookType">
    <xs:sequence>
      <xs:element name="title" type="xs:string"/>
      <xs:element name="isbn" type="Isbn"/>
    </xs:sequence>
  </xs:complexType>
  <xs:element name="book" type="BookType"/>
  <xs:complexType name="LibraryType">
    <xs:sequence>
      <xs:element ref="book" maxOccurs="unbounded"/>
    </xs:sequence>
  </xs:complexType>
  <xs:element name="library" type="LibraryType"/>
</xs:schema>"#;

/// Shape of a resolved complex type: particle names and their types
fn book_shape(graph: &SchemaGraph) -> Vec<(String, String)> {
    let book_type = graph.find_type(&QName::local("BookType")).unwrap();
    let ResolvedType::Complex(complex) = graph.resolve_type(book_type) else {
        panic!("BookType should be complex");
    };
    let mut shape = Vec::new();
    for particle in graph.content_particles(complex) {
        let Term::Group(model) = &particle.term else {
            panic!("expected a sequence");
        };
        for inner in &model.particles {
            if let Term::Element(element) = &inner.term {
                let type_name = match &element.type_ref {
                    TypeRef::Named(id) => graph
                        .symbol_name(Symbol::Type(*id))
                        .map(|q| q.local_name.clone())
                        .unwrap_or_default(),
                    TypeRef::Simple(simple) => simple.to_string(),
                    other => format!("{:?}", other),
                };
                shape.push((element.name.local_name.clone(), type_name));
            }
        }
    }
    shape
}

#[test]
fn test_order_independence() {
    let forward = load_schema(FORWARD.as_bytes()).unwrap();
    let backward = load_schema(BACKWARD.as_bytes()).unwrap();

    assert_eq!(book_shape(&forward), book_shape(&backward));
    assert_eq!(forward.root_element().unwrap(), forward.element_by_name("library").unwrap());
    assert_eq!(backward.root_element().unwrap(), backward.element_by_name("library").unwrap());
}

#[test]
fn test_named_type_is_shared() {
    let graph = load_schema(FORWARD.as_bytes()).unwrap();
    let book = graph.element(graph.element_by_name("book").unwrap());
    let TypeRef::Named(id) = book.type_ref else {
        panic!("book should reference a named type");
    };
    let by_element = graph.resolve_type(id);
    let by_name = graph.resolve_type(graph.find_type(&QName::local("BookType")).unwrap());
    assert!(std::ptr::eq(by_element, by_name));
}

#[test]
fn test_duplicate_declaration() {
    let source = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
      <xs:complexType name="thing"/>
      <xs:simpleType name="thing">
        <xs:restriction base="xs:string"/>
      </xs:simpleType>
    </xs:schema>"#;
    match load_schema(source.as_bytes()) {
        Err(Error::DuplicateDeclaration { kind, name }) => {
            assert_eq!(kind, DeclarationKind::Type);
            assert_eq!(name.local_name, "thing");
        }
        other => panic!("unexpected result: {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_missing_reference_names_site() {
    let source = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
      <xs:element name="shelf">
        <xs:complexType>
          <xs:sequence>
            <xs:element ref="volume"/>
          </xs:sequence>
        </xs:complexType>
      </xs:element>
    </xs:schema>"#;
    let err = load_schema(source.as_bytes()).unwrap_err();
    assert!(err.is_schema_error());
    match err {
        Error::MissingReference { kind, name, site } => {
            assert_eq!(kind, DeclarationKind::Element);
            assert_eq!(name.local_name, "volume");
            assert_eq!(site, "element 'shelf'");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_include_is_rejected() {
    let source = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
      <xs:include schemaLocation="other.xsd"/>
    </xs:schema>"#;
    assert!(matches!(load_schema(source.as_bytes()), Err(Error::Parse(_))));
}

#[test]
fn test_invalid_occurrence_bounds() {
    let source = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
      <xs:element name="a">
        <xs:complexType>
          <xs:sequence>
            <xs:element name="b" type="xs:string" minOccurs="3" maxOccurs="2"/>
          </xs:sequence>
        </xs:complexType>
      </xs:element>
    </xs:schema>"#;
    assert!(matches!(load_schema(source.as_bytes()), Err(Error::Parse(_))));
}

#[test]
fn test_fixture_resolves() {
    let graph = load_fixture("purchase_order.xsd");
    assert_eq!(graph.target_namespace(), Some("urn:example:po"));
    let root = graph.root_element().unwrap();
    assert_eq!(
        graph.element(root).name,
        QName::namespaced("urn:example:po", "purchaseOrder")
    );

    let us_address = graph
        .find_type(&QName::namespaced("urn:example:po", "USAddress"))
        .unwrap();
    let ResolvedType::Complex(complex) = graph.resolve_type(us_address) else {
        panic!("USAddress should be complex");
    };
    // Base particles first, then the extension's own
    assert_eq!(graph.content_particles(complex).len(), 2);
    let attributes = graph.effective_attributes(complex);
    assert_eq!(attributes.len(), 1);
    assert_eq!(attributes[0].fixed, Some("US"));
}

#[test]
fn test_load_from_temp_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(FORWARD.as_bytes()).unwrap();
    file.flush().unwrap();

    let source = std::fs::read(file.path()).unwrap();
    let graph = load_schema(&source).unwrap();
    assert_eq!(graph.element_names().count(), 2);
}
