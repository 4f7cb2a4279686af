//! XML Schema model
//!
//! Loading a schema runs in three stages: [`parsing`] reads schema markup
//! into a [`SchemaDocument`] of declarations with textual references,
//! [`resolver`] links those references into a [`SchemaGraph`], and
//! [`recursion`] rejects reference cycles that admit no finite instance.
//! RELAX NG grammars enter the same pipeline through [`relaxng`], which
//! lowers them into a [`SchemaDocument`].

pub mod builtins;
pub mod facets;
pub mod graph;
pub mod model;
pub mod parsing;
pub mod particles;
pub mod recursion;
pub mod relaxng;
pub mod resolver;

pub use builtins::{BuiltinType, Primitive, XSD_NAMESPACE};
pub use facets::{Facets, Pattern, WhiteSpace};
pub use graph::{
    Attribute, AttributeGroupId, AttributeId, AttributeItem, AttributeTarget, AttributeUse,
    ComplexType, Content, EffectiveAttribute, Element, ElementId, GroupId, ModelGroup, Particle,
    ResolvedType, SchemaGraph, SimpleValueType, Term, TypeBase, TypeId, TypeRef, TypeView,
    Variety,
};
pub use model::{
    AttributeUseKind, Compositor, Declaration, DeclarationKind, Derivation, Form, SchemaDocument,
};
pub use parsing::SchemaFormat;
pub use particles::Occurs;
pub use recursion::{Edge, RecursionClass, RecursionInfo, Symbol};
