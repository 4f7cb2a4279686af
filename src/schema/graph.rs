//! Resolved schema graph
//!
//! Every reference of the parsed declarations is replaced by an arena id
//! into one of the graph's symbol tables. Cyclic type structures therefore
//! need no shared ownership: a recursive type simply holds the id of a
//! table entry that (eventually) refers back to it.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use super::builtins::{BuiltinType, XSD_NAMESPACE};
use super::facets::{Facets, WhiteSpace};
use super::model::{AttributeUseKind, Compositor, Derivation, Form};
use super::particles::Occurs;
use super::recursion::{RecursionInfo, Symbol};
use crate::error::{Error, Result};
use crate::namespaces::QName;

macro_rules! arena_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub(crate) usize);

        impl $name {
            /// Position in the owning table
            pub fn index(self) -> usize {
                self.0
            }
        }
    };
}

arena_id!(
    /// Id of a global element declaration
    ElementId
);
arena_id!(
    /// Id of a global simple or complex type
    TypeId
);
arena_id!(
    /// Id of a named model group
    GroupId
);
arena_id!(
    /// Id of a global attribute declaration
    AttributeId
);
arena_id!(
    /// Id of a named attribute group
    AttributeGroupId
);

/// Element table - global elements by name, indexed by [`ElementId`]
pub type ElementMap = IndexMap<QName, Element>;
/// Type table - global types by name, indexed by [`TypeId`]
pub type TypeMap = IndexMap<QName, ResolvedType>;
/// Group table - named model groups by name, indexed by [`GroupId`]
pub type GroupMap = IndexMap<QName, ModelGroup>;
/// Attribute table - global attributes by name, indexed by [`AttributeId`]
pub type AttributeMap = IndexMap<QName, Attribute>;
/// Attribute group table - attribute groups by name, indexed by [`AttributeGroupId`]
pub type AttributeGroupMap = IndexMap<QName, Vec<AttributeItem>>;

/// Variety of a flattened simple type
#[derive(Debug, Clone)]
pub enum Variety {
    /// Values of one built-in type
    Atomic(BuiltinType),
    /// Whitespace separated items of the item type
    List(Arc<SimpleValueType>),
    /// Values of any member type
    Union(Vec<Arc<SimpleValueType>>),
}

/// A simple type with its derivation chain flattened
///
/// The facets are the combination of every restriction step down from the
/// built-in base, so generation and checking never walk base types.
#[derive(Debug, Clone)]
pub struct SimpleValueType {
    /// Name for global definitions and built-ins
    pub name: Option<QName>,
    /// Atomic, list or union
    pub variety: Variety,
    /// Combined facets of the derivation chain
    pub facets: Facets,
}

impl SimpleValueType {
    /// The simple type of a built-in
    ///
    /// `IDREFS`, `ENTITIES` and `NMTOKENS` become non-empty lists of their
    /// item type.
    pub fn builtin(builtin: BuiltinType) -> Self {
        let name = Some(QName::namespaced(XSD_NAMESPACE, builtin.name()));
        match builtin.list_item() {
            Some(item) => SimpleValueType {
                name,
                variety: Variety::List(Arc::new(SimpleValueType::builtin(item))),
                facets: Facets {
                    min_length: Some(1),
                    ..Facets::default()
                },
            },
            None => SimpleValueType {
                name,
                variety: Variety::Atomic(builtin),
                facets: Facets::default(),
            },
        }
    }

    /// The built-in primitive chain of an atomic type
    pub fn atomic_base(&self) -> Option<BuiltinType> {
        match self.variety {
            Variety::Atomic(builtin) => Some(builtin),
            _ => None,
        }
    }

    /// Effective white space handling of values
    pub fn white_space(&self) -> WhiteSpace {
        match (&self.facets.white_space, &self.variety) {
            (Some(ws), _) => *ws,
            (None, Variety::Atomic(builtin)) => builtin.white_space(),
            (None, _) => WhiteSpace::Collapse,
        }
    }

    /// Check that a value satisfies the type and all of its facets
    pub fn check(&self, value: &str) -> Result<()> {
        match &self.variety {
            Variety::Atomic(builtin) => self.facets.check(*builtin, value),
            Variety::List(item) => {
                self.facets.check_list(value)?;
                value.split_whitespace().try_for_each(|v| item.check(v))
            }
            Variety::Union(members) => {
                self.facets.check_lexical(value)?;
                if members.iter().any(|m| m.check(value).is_ok()) {
                    Ok(())
                } else {
                    Err(Error::generation(format!(
                        "value '{}' matches no member of union {}",
                        value, self
                    )))
                }
            }
        }
    }
}

impl fmt::Display for SimpleValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.name, &self.variety) {
            (Some(name), Variety::Atomic(b)) if name.is_in(XSD_NAMESPACE) => write!(f, "{}", b),
            (Some(name), _) => write!(f, "'{}'", name.local_name),
            (None, Variety::Atomic(b)) => write!(f, "anonymous restriction of {}", b),
            (None, Variety::List(item)) => write!(f, "anonymous list of {}", item),
            (None, Variety::Union(_)) => f.write_str("anonymous union"),
        }
    }
}

/// Reference from an element to its type
#[derive(Debug, Clone)]
pub enum TypeRef {
    /// `xs:anyType`; generates an empty element
    AnyType,
    /// A global type
    Named(TypeId),
    /// A built-in or anonymous simple type
    Simple(Arc<SimpleValueType>),
    /// An anonymous complex type
    Complex(Box<ComplexType>),
}

/// Entry of the type table
#[derive(Debug, Clone)]
pub enum ResolvedType {
    /// A complex type
    Complex(ComplexType),
    /// A simple type
    Simple(Arc<SimpleValueType>),
}

/// Borrowed view of whatever a [`TypeRef`] denotes
#[derive(Debug, Clone, Copy)]
pub enum TypeView<'g> {
    /// `xs:anyType`
    Any,
    /// Complex content
    Complex(&'g ComplexType),
    /// Simple value
    Simple(&'g Arc<SimpleValueType>),
}

/// Base of a derived complex type
#[derive(Debug, Clone)]
pub struct TypeBase {
    /// Extension or restriction
    pub derivation: Derivation,
    /// The base type
    pub type_ref: TypeRef,
}

/// What a complex type contains
#[derive(Debug, Clone)]
pub enum Content {
    /// Nothing
    Empty,
    /// Child elements placed by a particle
    Elements(Particle),
    /// Text of a simple type
    Simple(Arc<SimpleValueType>),
}

/// A resolved complex type
///
/// Only the type's own particle and attributes are stored. Inherited parts
/// are reached through [`SchemaGraph::content_particles`] and
/// [`SchemaGraph::effective_attributes`].
#[derive(Debug, Clone)]
pub struct ComplexType {
    /// Name for global definitions
    pub name: Option<QName>,
    /// Derivation base, if derived
    pub base: Option<TypeBase>,
    /// Own content
    pub content: Content,
    /// Own attribute uses and group references
    pub attributes: Vec<AttributeItem>,
    /// `mixed="true"`
    pub mixed: bool,
    /// `abstract="true"`
    pub is_abstract: bool,
}

/// A particle with its reference resolved
#[derive(Debug, Clone)]
pub struct Particle {
    /// Occurrence bounds
    pub occurs: Occurs,
    /// What is placed
    pub term: Term,
}

/// The thing a particle places
#[derive(Debug, Clone)]
pub enum Term {
    /// A global element
    ElementRef(ElementId),
    /// A local element declaration
    Element(Box<Element>),
    /// A nested compositor
    Group(ModelGroup),
    /// A named model group
    GroupRef(GroupId),
}

/// A compositor and its particles
#[derive(Debug, Clone)]
pub struct ModelGroup {
    /// Sequence, choice or all
    pub compositor: Compositor,
    /// Particles in declaration order
    pub particles: Vec<Particle>,
}

/// A resolved element declaration
#[derive(Debug, Clone)]
pub struct Element {
    /// Element name; unqualified names have no namespace
    pub name: QName,
    /// The element's type
    pub type_ref: TypeRef,
    /// `nillable="true"`
    pub nillable: bool,
    /// `abstract="true"`
    pub is_abstract: bool,
    /// `default` value
    pub default: Option<String>,
    /// `fixed` value
    pub fixed: Option<String>,
}

/// A resolved attribute declaration
#[derive(Debug, Clone)]
pub struct Attribute {
    /// Attribute name; unqualified names have no namespace
    pub name: QName,
    /// Value type
    pub value_type: Arc<SimpleValueType>,
    /// `default` value
    pub default: Option<String>,
    /// `fixed` value
    pub fixed: Option<String>,
}

/// The declaration an attribute use points at
#[derive(Debug, Clone)]
pub enum AttributeTarget {
    /// A global attribute
    Global(AttributeId),
    /// A local declaration
    Local(Box<Attribute>),
}

/// An attribute as used by a complex type
#[derive(Debug, Clone)]
pub struct AttributeUse {
    /// The declaration
    pub target: AttributeTarget,
    /// `use`
    pub use_kind: AttributeUseKind,
    /// `default` at the use site
    pub default: Option<String>,
    /// `fixed` at the use site
    pub fixed: Option<String>,
}

/// One entry of a resolved attribute list
#[derive(Debug, Clone)]
pub enum AttributeItem {
    /// An attribute use
    Use(AttributeUse),
    /// A named attribute group
    Group(AttributeGroupId),
}

/// An attribute use flattened out of groups and base types
#[derive(Debug, Clone, Copy)]
pub struct EffectiveAttribute<'g> {
    /// The declaration
    pub attribute: &'g Attribute,
    /// `use`
    pub use_kind: AttributeUseKind,
    /// Fixed value of the use site, else of the declaration
    pub fixed: Option<&'g str>,
}

/// A resolved schema
///
/// Built by [`SchemaGraph::from_document`]; immutable afterwards and safe to
/// share between threads.
#[derive(Debug)]
pub struct SchemaGraph {
    pub(crate) target_namespace: Option<String>,
    pub(crate) element_form_default: Form,
    pub(crate) elements: ElementMap,
    pub(crate) types: TypeMap,
    pub(crate) groups: GroupMap,
    pub(crate) attributes: AttributeMap,
    pub(crate) attribute_groups: AttributeGroupMap,
    pub(crate) recursion: RecursionInfo,
}

impl SchemaGraph {
    /// Resolve a parsed schema and analyze its recursion
    pub fn from_document(document: &super::SchemaDocument) -> Result<Self> {
        let mut graph = super::resolver::resolve(document)?;
        graph.recursion = super::recursion::analyze(&graph)?;
        Ok(graph)
    }

    /// `targetNamespace` of the schema
    pub fn target_namespace(&self) -> Option<&str> {
        self.target_namespace.as_deref()
    }

    /// `elementFormDefault` of the schema
    pub fn element_form_default(&self) -> Form {
        self.element_form_default
    }

    /// Recursion classes and productivity ranks
    pub fn recursion(&self) -> &RecursionInfo {
        &self.recursion
    }

    /// Global element by id
    pub fn element(&self, id: ElementId) -> &Element {
        &self.elements[id.0]
    }

    /// Global type by id
    pub fn resolve_type(&self, id: TypeId) -> &ResolvedType {
        &self.types[id.0]
    }

    /// Named model group by id
    pub fn group(&self, id: GroupId) -> &ModelGroup {
        &self.groups[id.0]
    }

    /// Global attribute by id
    pub fn attribute(&self, id: AttributeId) -> &Attribute {
        &self.attributes[id.0]
    }

    /// Attribute group items by id
    pub fn attribute_group(&self, id: AttributeGroupId) -> &[AttributeItem] {
        &self.attribute_groups[id.0]
    }

    /// Look up a global element by qualified name
    pub fn find_element(&self, name: &QName) -> Option<ElementId> {
        self.elements.get_index_of(name).map(ElementId)
    }

    /// Look up a global type by qualified name
    pub fn find_type(&self, name: &QName) -> Option<TypeId> {
        self.types.get_index_of(name).map(TypeId)
    }

    /// Look up a named model group by qualified name
    pub fn find_group(&self, name: &QName) -> Option<GroupId> {
        self.groups.get_index_of(name).map(GroupId)
    }

    /// Look up a global element by `local` or `{namespace}local` name
    pub fn element_by_name(&self, name: &str) -> Option<ElementId> {
        if let Some(rest) = name.strip_prefix('{') {
            let (namespace, local) = rest.split_once('}')?;
            let namespace = (!namespace.is_empty()).then_some(namespace);
            return self.find_element(&QName::new(namespace, local));
        }
        let candidate = QName::new(self.target_namespace.as_deref(), name);
        self.find_element(&candidate).or_else(|| {
            self.elements
                .keys()
                .position(|q| q.local_name == name)
                .map(ElementId)
        })
    }

    /// Global element names in declaration order
    pub fn element_names(&self) -> impl Iterator<Item = (ElementId, &QName)> {
        self.elements.keys().enumerate().map(|(i, q)| (ElementId(i), q))
    }

    /// Number of global symbols across all tables
    pub fn symbol_count(&self) -> usize {
        self.elements.len()
            + self.types.len()
            + self.groups.len()
            + self.attributes.len()
            + self.attribute_groups.len()
    }

    /// Every global symbol, table by table in declaration order
    pub fn symbols(&self) -> impl Iterator<Item = Symbol> + '_ {
        (0..self.elements.len())
            .map(|i| Symbol::Element(ElementId(i)))
            .chain((0..self.types.len()).map(|i| Symbol::Type(TypeId(i))))
            .chain((0..self.groups.len()).map(|i| Symbol::Group(GroupId(i))))
            .chain((0..self.attributes.len()).map(|i| Symbol::Attribute(AttributeId(i))))
            .chain(
                (0..self.attribute_groups.len()).map(|i| Symbol::AttributeGroup(AttributeGroupId(i))),
            )
    }

    /// Name of a global symbol
    pub fn symbol_name(&self, symbol: Symbol) -> Option<&QName> {
        match symbol {
            Symbol::Element(id) => self.elements.get_index(id.0).map(|(k, _)| k),
            Symbol::Type(id) => self.types.get_index(id.0).map(|(k, _)| k),
            Symbol::Group(id) => self.groups.get_index(id.0).map(|(k, _)| k),
            Symbol::Attribute(id) => self.attributes.get_index(id.0).map(|(k, _)| k),
            Symbol::AttributeGroup(id) => self.attribute_groups.get_index(id.0).map(|(k, _)| k),
        }
    }

    /// Human-readable description such as `element 'a'`
    pub fn describe(&self, symbol: Symbol) -> String {
        match self.symbol_name(symbol) {
            Some(name) => format!("{} '{}'", symbol.kind(), name.local_name),
            None => symbol.kind().to_string(),
        }
    }

    /// Borrow what a type reference denotes
    pub fn view<'g>(&'g self, type_ref: &'g TypeRef) -> TypeView<'g> {
        match type_ref {
            TypeRef::AnyType => TypeView::Any,
            TypeRef::Simple(simple) => TypeView::Simple(simple),
            TypeRef::Complex(complex) => TypeView::Complex(complex),
            TypeRef::Named(id) => match self.resolve_type(*id) {
                ResolvedType::Complex(complex) => TypeView::Complex(complex),
                ResolvedType::Simple(simple) => TypeView::Simple(simple),
            },
        }
    }

    /// Particles making up the element content of a complex type
    ///
    /// An extension contributes its base type's particles first, followed by
    /// its own. A restriction replaces the base content entirely.
    pub fn content_particles<'g>(&'g self, complex: &'g ComplexType) -> Vec<&'g Particle> {
        let mut particles = Vec::new();
        self.collect_particles(complex, &mut particles);
        particles
    }

    fn collect_particles<'g>(&'g self, complex: &'g ComplexType, out: &mut Vec<&'g Particle>) {
        if let Some(TypeBase {
            derivation: Derivation::Extension,
            type_ref,
        }) = &complex.base
        {
            if let TypeView::Complex(base) = self.view(type_ref) {
                self.collect_particles(base, out);
            }
        }
        if let Content::Elements(particle) = &complex.content {
            out.push(particle);
        }
    }

    /// Attributes of a complex type including inherited ones
    ///
    /// Base attributes come first. An own use with the same name replaces
    /// the inherited one in place; a prohibited use removes it.
    pub fn effective_attributes<'g>(&'g self, complex: &'g ComplexType) -> Vec<EffectiveAttribute<'g>> {
        let mut attributes: IndexMap<&'g QName, EffectiveAttribute<'g>> = IndexMap::new();
        self.collect_attributes(complex, &mut attributes);
        attributes.into_values().collect()
    }

    fn collect_attributes<'g>(
        &'g self,
        complex: &'g ComplexType,
        out: &mut IndexMap<&'g QName, EffectiveAttribute<'g>>,
    ) {
        if let Some(base) = &complex.base {
            if let TypeView::Complex(base) = self.view(&base.type_ref) {
                self.collect_attributes(base, out);
            }
        }
        self.collect_items(&complex.attributes, out);
    }

    fn collect_items<'g>(
        &'g self,
        items: &'g [AttributeItem],
        out: &mut IndexMap<&'g QName, EffectiveAttribute<'g>>,
    ) {
        for item in items {
            match item {
                AttributeItem::Group(id) => self.collect_items(self.attribute_group(*id), out),
                AttributeItem::Use(attribute_use) => {
                    let attribute = match &attribute_use.target {
                        AttributeTarget::Global(id) => self.attribute(*id),
                        AttributeTarget::Local(local) => local,
                    };
                    if attribute_use.use_kind == AttributeUseKind::Prohibited {
                        out.shift_remove(&attribute.name);
                        continue;
                    }
                    let fixed = attribute_use
                        .fixed
                        .as_deref()
                        .or(attribute.fixed.as_deref());
                    out.insert(
                        &attribute.name,
                        EffectiveAttribute {
                            attribute,
                            use_kind: attribute_use.use_kind,
                            fixed,
                        },
                    );
                }
            }
        }
    }

    /// Check whether any attribute carries a namespace
    pub fn has_qualified_attributes(&self) -> bool {
        self.attributes.values().any(|a| a.name.namespace.is_some())
            || self.types.values().any(|t| match t {
                ResolvedType::Complex(c) => complex_has_qualified_attributes(c),
                ResolvedType::Simple(_) => false,
            })
            || self.elements.values().any(|e| type_has_qualified_attributes(&e.type_ref))
            || self
                .attribute_groups
                .values()
                .any(|items| items_have_qualified_attributes(items))
            || self.groups.values().any(model_has_qualified_attributes)
    }

    /// Find the document root: the one global element no other global
    /// element can reach
    pub fn root_element(&self) -> Result<ElementId> {
        let candidates: Vec<ElementId> = (0..self.elements.len())
            .map(ElementId)
            .filter(|id| !self.recursion.reached_from_other_element(*id))
            .collect();
        match candidates.as_slice() {
            [root] => Ok(*root),
            [] => Err(Error::RootElement(
                "every global element is reachable from another; name the root explicitly"
                    .to_string(),
            )),
            many => {
                let names: Vec<&str> = many
                    .iter()
                    .filter_map(|id| self.symbol_name(Symbol::Element(*id)))
                    .map(|name| name.local_name.as_str())
                    .collect();
                Err(Error::RootElement(format!(
                    "ambiguous root, candidates are: {}",
                    names.join(", ")
                )))
            }
        }
    }
}

fn type_has_qualified_attributes(type_ref: &TypeRef) -> bool {
    match type_ref {
        TypeRef::Complex(complex) => complex_has_qualified_attributes(complex),
        _ => false,
    }
}

fn complex_has_qualified_attributes(complex: &ComplexType) -> bool {
    items_have_qualified_attributes(&complex.attributes)
        || match &complex.content {
            Content::Elements(particle) => particle_has_qualified_attributes(particle),
            _ => false,
        }
}

fn items_have_qualified_attributes(items: &[AttributeItem]) -> bool {
    items.iter().any(|item| match item {
        AttributeItem::Use(AttributeUse {
            target: AttributeTarget::Local(local),
            ..
        }) => local.name.namespace.is_some(),
        _ => false,
    })
}

fn model_has_qualified_attributes(model: &ModelGroup) -> bool {
    model.particles.iter().any(particle_has_qualified_attributes)
}

fn particle_has_qualified_attributes(particle: &Particle) -> bool {
    match &particle.term {
        Term::Element(local) => type_has_qualified_attributes(&local.type_ref),
        Term::Group(model) => model_has_qualified_attributes(model),
        Term::ElementRef(_) | Term::GroupRef(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::parsing;

    fn graph(source: &str) -> SchemaGraph {
        let document = parsing::load(source.as_bytes()).unwrap();
        SchemaGraph::from_document(&document).unwrap()
    }

    #[test]
    fn test_builtin_list_types() {
        let idrefs = SimpleValueType::builtin(BuiltinType::IdRefs);
        assert!(matches!(idrefs.variety, Variety::List(_)));
        assert!(idrefs.check("a b c").is_ok());
        assert!(idrefs.check("").is_err());
        assert!(idrefs.check("1a").is_err());
    }

    #[test]
    fn test_union_check() {
        let union = SimpleValueType {
            name: None,
            variety: Variety::Union(vec![
                Arc::new(SimpleValueType::builtin(BuiltinType::Int)),
                Arc::new(SimpleValueType::builtin(BuiltinType::Boolean)),
            ]),
            facets: Facets::default(),
        };
        assert!(union.check("42").is_ok());
        assert!(union.check("true").is_ok());
        assert!(union.check("maybe").is_err());
    }

    #[test]
    fn test_element_by_name() {
        let g = graph(
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"
                         targetNamespace="urn:t" elementFormDefault="qualified">
                 <xs:element name="a" type="xs:string"/>
               </xs:schema>"#,
        );
        let id = g.element_by_name("a").unwrap();
        assert_eq!(g.element_by_name("{urn:t}a"), Some(id));
        assert_eq!(g.element_by_name("{urn:other}a"), None);
        assert_eq!(g.element_by_name("b"), None);
    }

    #[test]
    fn test_extension_particles_and_attributes() {
        let g = graph(
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
                 <xs:complexType name="base">
                   <xs:sequence><xs:element name="first" type="xs:string"/></xs:sequence>
                   <xs:attribute name="id" type="xs:ID" use="required"/>
                   <xs:attribute name="lang" type="xs:language"/>
                 </xs:complexType>
                 <xs:complexType name="derived">
                   <xs:complexContent>
                     <xs:extension base="base">
                       <xs:sequence><xs:element name="second" type="xs:int"/></xs:sequence>
                       <xs:attribute name="lang" use="prohibited"/>
                       <xs:attribute name="extra" type="xs:boolean"/>
                     </xs:extension>
                   </xs:complexContent>
                 </xs:complexType>
                 <xs:element name="root" type="derived"/>
               </xs:schema>"#,
        );
        let id = g.find_type(&QName::local("derived")).unwrap();
        let ResolvedType::Complex(derived) = g.resolve_type(id) else {
            panic!("expected complex type");
        };
        assert_eq!(g.content_particles(derived).len(), 2);

        let names: Vec<&str> = g
            .effective_attributes(derived)
            .iter()
            .map(|a| a.attribute.name.local_name.as_str())
            .collect();
        assert_eq!(names, vec!["id", "extra"]);
    }

    #[test]
    fn test_named_type_identity() {
        let g = graph(
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
                 <xs:complexType name="shared"><xs:sequence/></xs:complexType>
                 <xs:element name="a" type="shared"/>
                 <xs:element name="b" type="shared"/>
               </xs:schema>"#,
        );
        let a = g.element(g.element_by_name("a").unwrap());
        let b = g.element(g.element_by_name("b").unwrap());
        let (TypeRef::Named(ta), TypeRef::Named(tb)) = (&a.type_ref, &b.type_ref) else {
            panic!("expected named types");
        };
        assert!(std::ptr::eq(g.resolve_type(*ta), g.resolve_type(*tb)));
    }
}
