//! Parsed schema declarations
//!
//! These types mirror the schema source with references still held as
//! names. They are immutable once [`super::parsing::load`] returns and are
//! consumed by the resolver to build a [`super::SchemaGraph`].

use std::fmt;

use super::facets::Facets;
use super::particles::Occurs;
use crate::namespaces::QName;

/// The symbol table a named declaration lives in
///
/// Simple and complex types share the `Type` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeclarationKind {
    /// Global element
    Element,
    /// Global simple or complex type
    Type,
    /// Named model group
    Group,
    /// Global attribute
    Attribute,
    /// Named attribute group
    AttributeGroup,
}

impl fmt::Display for DeclarationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DeclarationKind::Element => "element",
            DeclarationKind::Type => "type",
            DeclarationKind::Group => "group",
            DeclarationKind::Attribute => "attribute",
            DeclarationKind::AttributeGroup => "attribute group",
        };
        f.write_str(s)
    }
}

/// Whether local names take the target namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Form {
    /// Names are in the target namespace
    Qualified,
    /// Names have no namespace
    #[default]
    Unqualified,
}

impl Form {
    /// Parse a `form`/`elementFormDefault` attribute value
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "qualified" => Some(Form::Qualified),
            "unqualified" => Some(Form::Unqualified),
            _ => None,
        }
    }
}

/// A whole schema document: its global declarations and defaults
#[derive(Debug, Clone, Default)]
pub struct SchemaDocument {
    /// `targetNamespace` of the schema
    pub target_namespace: Option<String>,
    /// `elementFormDefault` of the schema
    pub element_form_default: Form,
    /// `attributeFormDefault` of the schema
    pub attribute_form_default: Form,
    /// Global declarations in source order
    pub declarations: Vec<Declaration>,
}

impl SchemaDocument {
    /// Iterate over declarations of one kind
    pub fn declarations_of(&self, kind: DeclarationKind) -> impl Iterator<Item = &Declaration> {
        self.declarations.iter().filter(move |d| d.kind() == kind)
    }
}

/// A global declaration
#[derive(Debug, Clone)]
pub enum Declaration {
    /// `xs:element`
    Element(ElementDecl),
    /// `xs:complexType`
    ComplexType(ComplexTypeDef),
    /// `xs:simpleType`
    SimpleType(SimpleTypeDef),
    /// `xs:attribute`
    Attribute(AttributeDecl),
    /// `xs:group`
    Group(GroupDef),
    /// `xs:attributeGroup`
    AttributeGroup(AttributeGroupDef),
}

impl Declaration {
    /// The symbol table this declaration belongs to
    pub fn kind(&self) -> DeclarationKind {
        match self {
            Declaration::Element(_) => DeclarationKind::Element,
            Declaration::ComplexType(_) | Declaration::SimpleType(_) => DeclarationKind::Type,
            Declaration::Attribute(_) => DeclarationKind::Attribute,
            Declaration::Group(_) => DeclarationKind::Group,
            Declaration::AttributeGroup(_) => DeclarationKind::AttributeGroup,
        }
    }

    /// The declared name
    ///
    /// Global types always carry a name; the parser rejects anonymous ones.
    pub fn name(&self) -> Option<&QName> {
        match self {
            Declaration::Element(e) => Some(&e.name),
            Declaration::ComplexType(t) => t.name.as_ref(),
            Declaration::SimpleType(t) => t.name.as_ref(),
            Declaration::Attribute(a) => Some(&a.name),
            Declaration::Group(g) => Some(&g.name),
            Declaration::AttributeGroup(g) => Some(&g.name),
        }
    }
}

/// Where an element or attribute gets its type from
#[derive(Debug, Clone)]
pub enum TypeSource {
    /// `type="..."`
    Named(QName),
    /// Inline `xs:complexType`
    Complex(Box<ComplexTypeDef>),
    /// Inline `xs:simpleType`
    Simple(Box<SimpleTypeDef>),
    /// Neither; the element has `xs:anyType`
    Unspecified,
}

/// An element declaration, global or local
#[derive(Debug, Clone)]
pub struct ElementDecl {
    /// Element name; local unqualified elements have no namespace
    pub name: QName,
    /// Type of the element
    pub type_source: TypeSource,
    /// `nillable="true"`
    pub nillable: bool,
    /// `abstract="true"`
    pub is_abstract: bool,
    /// `default` value
    pub default: Option<String>,
    /// `fixed` value
    pub fixed: Option<String>,
}

/// Complex type derivation method
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Derivation {
    /// `xs:extension`
    Extension,
    /// `xs:restriction`
    Restriction,
}

/// Content of a complex type definition
#[derive(Debug, Clone)]
pub enum ContentDef {
    /// No child elements and no text
    Empty,
    /// Direct compositor or group reference
    Particle(ParticleDef),
    /// `xs:complexContent`
    Complex {
        /// Extension or restriction
        derivation: Derivation,
        /// The base type name
        base: QName,
        /// Own content
        particle: Option<ParticleDef>,
    },
    /// `xs:simpleContent`
    Simple {
        /// Extension or restriction
        derivation: Derivation,
        /// The base type name
        base: QName,
        /// Facets added by a restriction
        facets: Facets,
    },
}

/// A complex type definition, global or inline
#[derive(Debug, Clone)]
pub struct ComplexTypeDef {
    /// Name for global definitions
    pub name: Option<QName>,
    /// `mixed="true"`
    pub mixed: bool,
    /// `abstract="true"`
    pub is_abstract: bool,
    /// Element or text content
    pub content: ContentDef,
    /// Own attribute uses and attribute group references
    pub attributes: Vec<AttributeItemDef>,
}

/// Simple type variety with its textual references
#[derive(Debug, Clone)]
pub enum SimpleDerivationDef {
    /// `xs:restriction` of a base type
    Restriction {
        /// Base type
        base: SimpleTypeSource,
        /// Facets of this step
        facets: Facets,
    },
    /// `xs:list`
    List {
        /// Item type
        item: SimpleTypeSource,
    },
    /// `xs:union`
    Union {
        /// Member types in declaration order
        members: Vec<SimpleTypeSource>,
    },
}

/// A named or inline simple type
#[derive(Debug, Clone)]
pub enum SimpleTypeSource {
    /// `base`/`itemType`/`memberTypes` name
    Named(QName),
    /// Inline `xs:simpleType`
    Inline(Box<SimpleTypeDef>),
}

/// A simple type definition, global or inline
#[derive(Debug, Clone)]
pub struct SimpleTypeDef {
    /// Name for global definitions
    pub name: Option<QName>,
    /// How the type is derived
    pub derivation: SimpleDerivationDef,
}

/// `use` of an attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AttributeUseKind {
    /// May be omitted
    #[default]
    Optional,
    /// Must be present
    Required,
    /// Must not be present
    Prohibited,
}

impl AttributeUseKind {
    /// Parse a `use` attribute value
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "optional" => Some(AttributeUseKind::Optional),
            "required" => Some(AttributeUseKind::Required),
            "prohibited" => Some(AttributeUseKind::Prohibited),
            _ => None,
        }
    }
}

/// An attribute declaration, global or local
#[derive(Debug, Clone)]
pub struct AttributeDecl {
    /// Attribute name
    pub name: QName,
    /// Simple type of the value, `None` for `xs:anySimpleType`
    pub type_source: Option<SimpleTypeSource>,
    /// `default` value
    pub default: Option<String>,
    /// `fixed` value
    pub fixed: Option<String>,
}

/// One entry of an attribute list
#[derive(Debug, Clone)]
pub enum AttributeItemDef {
    /// Local declaration
    Local {
        /// The declaration
        decl: AttributeDecl,
        /// `use`
        use_kind: AttributeUseKind,
    },
    /// `ref` to a global attribute
    Ref {
        /// Referenced name
        name: QName,
        /// `use`
        use_kind: AttributeUseKind,
        /// `default` at the use site
        default: Option<String>,
        /// `fixed` at the use site
        fixed: Option<String>,
    },
    /// `xs:attributeGroup ref`
    GroupRef(QName),
}

/// A named `xs:attributeGroup`
#[derive(Debug, Clone)]
pub struct AttributeGroupDef {
    /// Group name
    pub name: QName,
    /// Attribute uses and nested group references
    pub attributes: Vec<AttributeItemDef>,
}

/// Content model compositor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compositor {
    /// `xs:sequence`
    Sequence,
    /// `xs:choice`
    Choice,
    /// `xs:all`
    All,
}

impl fmt::Display for Compositor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Compositor::Sequence => "sequence",
            Compositor::Choice => "choice",
            Compositor::All => "all",
        })
    }
}

/// A compositor with its particles
#[derive(Debug, Clone)]
pub struct ModelGroupDef {
    /// Sequence, choice or all
    pub compositor: Compositor,
    /// Particles in declaration order
    pub particles: Vec<ParticleDef>,
}

/// The thing a particle places
#[derive(Debug, Clone)]
pub enum TermDef {
    /// Local element declaration
    Element(Box<ElementDecl>),
    /// `xs:element ref`
    ElementRef(QName),
    /// Nested compositor
    Group(ModelGroupDef),
    /// `xs:group ref`
    GroupRef(QName),
}

/// One slot in a content model
#[derive(Debug, Clone)]
pub struct ParticleDef {
    /// `minOccurs`/`maxOccurs`
    pub occurs: Occurs,
    /// What is placed
    pub term: TermDef,
}

/// A named `xs:group`
#[derive(Debug, Clone)]
pub struct GroupDef {
    /// Group name
    pub name: QName,
    /// The group's compositor
    pub model: ModelGroupDef,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_display() {
        assert_eq!(DeclarationKind::Type.to_string(), "type");
        assert_eq!(DeclarationKind::AttributeGroup.to_string(), "attribute group");
    }

    #[test]
    fn test_simple_and_complex_share_type_table() {
        let simple = Declaration::SimpleType(SimpleTypeDef {
            name: Some(QName::local("code")),
            derivation: SimpleDerivationDef::List {
                item: SimpleTypeSource::Named(QName::local("int")),
            },
        });
        let complex = Declaration::ComplexType(ComplexTypeDef {
            name: Some(QName::local("code")),
            mixed: false,
            is_abstract: false,
            content: ContentDef::Empty,
            attributes: Vec::new(),
        });
        assert_eq!(simple.kind(), complex.kind());
        assert_eq!(simple.name(), complex.name());
    }

    #[test]
    fn test_form_parse() {
        assert_eq!(Form::parse("qualified"), Some(Form::Qualified));
        assert_eq!(Form::parse("bogus"), None);
        assert_eq!(Form::default(), Form::Unqualified);
    }
}
