//! Recursion analysis and termination tests

use std::path::PathBuf;

use proptest::prelude::*;
use rand::SeedableRng;
use rand_xorshift::XorShiftRng;

use xsdsynth::{
    generate_instance, load_schema, Error, GenerationOptions, Node, RecursionClass, SchemaGraph,
    Symbol,
};

fn fixture(name: &str) -> Vec<u8> {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path.push(name);
    std::fs::read(path).unwrap()
}

fn expression_schema() -> SchemaGraph {
    load_schema(&fixture("expression.xsd")).unwrap()
}

/// Longest chain of nested `negate`/`binary` elements
fn nesting(node: &Node) -> usize {
    let inner = node
        .children
        .iter()
        .map(nesting)
        .max()
        .unwrap_or(0);
    match node.name.as_str() {
        "negate" | "binary" => inner + 1,
        _ => inner,
    }
}

#[test]
fn test_mandatory_cycle_rejected() {
    let err = load_schema(&fixture("mandatory_cycle.xsd")).unwrap_err();
    assert!(err.is_schema_error());
    match err {
        Error::UnboundedRecursion { cycle } => {
            assert_eq!(cycle.first(), cycle.last());
            assert!(cycle.iter().any(|s| s == "element 'chicken'"));
            assert!(cycle.iter().any(|s| s == "element 'egg'"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_mandatory_cycle_through_named_group() {
    let source = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
      <xs:group name="body">
        <xs:sequence>
          <xs:element name="section" type="SectionType"/>
        </xs:sequence>
      </xs:group>
      <xs:complexType name="SectionType">
        <xs:group ref="body" minOccurs="1"/>
      </xs:complexType>
      <xs:element name="doc" type="SectionType"/>
    </xs:schema>"#;
    assert!(matches!(
        load_schema(source.as_bytes()),
        Err(Error::UnboundedRecursion { .. })
    ));
}

#[test]
fn test_relaxng_mandatory_cycle_rejected() {
    let source = r#"<grammar xmlns="http://relaxng.org/ns/structure/1.0">
      <start><ref name="chicken"/></start>
      <define name="chicken">
        <element name="chicken"><ref name="egg"/></element>
      </define>
      <define name="egg">
        <element name="egg"><ref name="chicken"/></element>
      </define>
    </grammar>"#;
    match load_schema(source.as_bytes()).unwrap_err() {
        Error::UnboundedRecursion { cycle } => {
            assert_eq!(cycle.first(), cycle.last());
            assert!(cycle.iter().any(|s| s == "group 'chicken'"));
            assert!(cycle.iter().any(|s| s == "group 'egg'"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_relaxng_recursive_define_respects_ceiling() {
    let source = r#"<grammar xmlns="http://relaxng.org/ns/structure/1.0">
      <start><ref name="node"/></start>
      <define name="node">
        <element name="node">
          <attribute name="label"/>
          <zeroOrMore><ref name="node"/></zeroOrMore>
        </element>
      </define>
    </grammar>"#;
    let graph = load_schema(source.as_bytes()).unwrap();
    let options = GenerationOptions::new()
        .with_recursion_ceiling(2)
        .with_max_repeat(3);
    let mut deepest = 0;
    for seed in 0..20 {
        let mut rng = XorShiftRng::seed_from_u64(seed);
        let root = generate_instance(&graph, "node", &mut rng, &options).unwrap();
        assert!(root.descendants().iter().all(|n| n.attribute("label").is_some()));
        // The root element plus two active entries of the `node` group
        assert!(root.depth() <= 3, "seed {seed}: depth {}", root.depth());
        deepest = deepest.max(root.depth());
    }
    assert_eq!(deepest, 3);
}

#[test]
fn test_optional_edge_makes_cycle_bounded() {
    let source = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
      <xs:element name="chicken">
        <xs:complexType>
          <xs:sequence>
            <xs:element ref="egg" minOccurs="0"/>
          </xs:sequence>
        </xs:complexType>
      </xs:element>
      <xs:element name="egg">
        <xs:complexType>
          <xs:sequence>
            <xs:element ref="chicken"/>
          </xs:sequence>
        </xs:complexType>
      </xs:element>
    </xs:schema>"#;
    let graph = load_schema(source.as_bytes()).unwrap();
    let chicken = Symbol::Element(graph.element_by_name("chicken").unwrap());
    let egg = Symbol::Element(graph.element_by_name("egg").unwrap());
    assert_eq!(graph.recursion().class(chicken), RecursionClass::Bounded);
    assert_eq!(graph.recursion().class(egg), RecursionClass::Bounded);
    // Both are reachable from each other, so neither is a root
    assert!(matches!(graph.root_element(), Err(Error::RootElement(_))));
}

#[test]
fn test_expression_classes() {
    let graph = expression_schema();
    let recursion = graph.recursion();
    let program = Symbol::Element(graph.element_by_name("program").unwrap());
    let expr = Symbol::Element(graph.element_by_name("expr").unwrap());
    assert_eq!(recursion.class(program), RecursionClass::NonRecursive);
    assert_eq!(recursion.class(expr), RecursionClass::Bounded);
    assert!(recursion.rank(program) > recursion.rank(expr));
    assert_eq!(graph.root_element().unwrap(), graph.element_by_name("program").unwrap());
}

#[test]
fn test_ceiling_zero_is_minimal() {
    let graph = expression_schema();
    let options = GenerationOptions::new().with_recursion_ceiling(0);
    for seed in 0..20 {
        let mut rng = XorShiftRng::seed_from_u64(seed);
        let root = generate_instance(&graph, "program", &mut rng, &options).unwrap();
        assert_eq!(nesting(&root), 0, "seed {seed}");
        for expr in &root.children {
            assert_eq!(expr.children.len(), 1);
            assert_eq!(expr.children[0].name, "literal");
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_bounded_recursion_terminates(seed in any::<u64>(), ceiling in 0u32..5, repeat in 0u32..4) {
        let graph = expression_schema();
        let options = GenerationOptions::new()
            .with_recursion_ceiling(ceiling)
            .with_max_repeat(repeat);
        let mut rng = XorShiftRng::seed_from_u64(seed);
        let root = generate_instance(&graph, "program", &mut rng, &options).unwrap();
        // Each recursive step passes through ExprType once
        prop_assert!(nesting(&root) <= ceiling as usize);
    }
}
