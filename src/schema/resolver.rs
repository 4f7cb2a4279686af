//! Reference resolution
//!
//! Turns a [`SchemaDocument`] into a [`SchemaGraph`] in two passes. The
//! first registers every global declaration in its symbol table and rejects
//! duplicates; the second links each textual reference to a table id or a
//! built-in type. Simple types are flattened along their derivation chain
//! on first use and memoized, so shared bases are only built once.

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::{debug, trace};

use super::builtins::{BuiltinType, XSD_NAMESPACE};
use super::graph::{
    Attribute, AttributeGroupId, AttributeId, AttributeItem, AttributeTarget, AttributeUse,
    ComplexType, Content, Element, ElementId, GroupId, ModelGroup, Particle, ResolvedType,
    SchemaGraph, SimpleValueType, Term, TypeBase, TypeId, TypeRef, Variety,
};
use super::model::{
    AttributeDecl, AttributeGroupDef, AttributeItemDef, ComplexTypeDef, ContentDef, Declaration,
    DeclarationKind, Derivation, ElementDecl, GroupDef, ModelGroupDef, ParticleDef,
    SchemaDocument, SimpleDerivationDef, SimpleTypeDef, SimpleTypeSource, TermDef, TypeSource,
};
use super::recursion::RecursionInfo;
use crate::error::{Error, ParseError, Result};
use crate::namespaces::QName;

/// A global type declaration of either kind
#[derive(Clone, Copy)]
enum TypeDecl<'d> {
    Complex(&'d ComplexTypeDef),
    Simple(&'d SimpleTypeDef),
}

/// Pass one: every global declaration by name
#[derive(Default)]
struct SymbolTables<'d> {
    elements: IndexMap<QName, &'d ElementDecl>,
    types: IndexMap<QName, TypeDecl<'d>>,
    groups: IndexMap<QName, &'d GroupDef>,
    attributes: IndexMap<QName, &'d AttributeDecl>,
    attribute_groups: IndexMap<QName, &'d AttributeGroupDef>,
}

fn insert<T>(
    table: &mut IndexMap<QName, T>,
    kind: DeclarationKind,
    name: &QName,
    value: T,
) -> Result<()> {
    if table.contains_key(name) {
        return Err(Error::DuplicateDeclaration {
            kind,
            name: name.clone(),
        });
    }
    table.insert(name.clone(), value);
    Ok(())
}

impl<'d> SymbolTables<'d> {
    fn collect(document: &'d SchemaDocument) -> Result<Self> {
        let mut tables = SymbolTables::default();
        for declaration in &document.declarations {
            let kind = declaration.kind();
            let name = declaration.name().ok_or_else(|| {
                ParseError::new(format!("global {} declaration without a name", kind))
            })?;
            match declaration {
                Declaration::Element(e) => insert(&mut tables.elements, kind, name, e)?,
                Declaration::ComplexType(t) => {
                    insert(&mut tables.types, kind, name, TypeDecl::Complex(t))?
                }
                Declaration::SimpleType(t) => {
                    insert(&mut tables.types, kind, name, TypeDecl::Simple(t))?
                }
                Declaration::Group(g) => insert(&mut tables.groups, kind, name, g)?,
                Declaration::Attribute(a) => insert(&mut tables.attributes, kind, name, a)?,
                Declaration::AttributeGroup(g) => {
                    insert(&mut tables.attribute_groups, kind, name, g)?
                }
            }
        }
        Ok(tables)
    }
}

/// Resolve every reference of a parsed schema
///
/// The returned graph carries no recursion analysis yet; see
/// [`SchemaGraph::from_document`].
pub fn resolve(document: &SchemaDocument) -> Result<SchemaGraph> {
    let tables = SymbolTables::collect(document)?;
    debug!(
        elements = tables.elements.len(),
        types = tables.types.len(),
        groups = tables.groups.len(),
        attributes = tables.attributes.len(),
        attribute_groups = tables.attribute_groups.len(),
        "collected global declarations"
    );

    let mut linker = Linker::new(&tables);

    for index in 0..tables.types.len() {
        linker.ensure_type(index)?;
    }
    let types = tables
        .types
        .keys()
        .cloned()
        .zip(linker.types.iter_mut().map(Option::take))
        .map(|(name, resolved)| {
            resolved
                .map(|t| (name.clone(), t))
                .ok_or_else(|| ParseError::new(format!("type '{}' was not resolved", name)).into())
        })
        .collect::<Result<IndexMap<_, _>>>()?;

    let mut elements = IndexMap::with_capacity(tables.elements.len());
    for (name, decl) in &tables.elements {
        linker.site = site(DeclarationKind::Element, name);
        elements.insert(name.clone(), linker.element(decl)?);
    }

    let mut groups = IndexMap::with_capacity(tables.groups.len());
    for (name, group) in &tables.groups {
        linker.site = site(DeclarationKind::Group, name);
        groups.insert(name.clone(), linker.model_group(&group.model)?);
    }

    let mut attributes = IndexMap::with_capacity(tables.attributes.len());
    for (name, decl) in &tables.attributes {
        linker.site = site(DeclarationKind::Attribute, name);
        attributes.insert(name.clone(), linker.attribute(decl)?);
    }

    let mut attribute_groups = IndexMap::with_capacity(tables.attribute_groups.len());
    for (name, group) in &tables.attribute_groups {
        linker.site = site(DeclarationKind::AttributeGroup, name);
        attribute_groups.insert(name.clone(), linker.attribute_items(&group.attributes)?);
    }

    Ok(SchemaGraph {
        target_namespace: document.target_namespace.clone(),
        element_form_default: document.element_form_default,
        elements,
        types,
        groups,
        attributes,
        attribute_groups,
        recursion: RecursionInfo::default(),
    })
}

fn site(kind: DeclarationKind, name: &QName) -> String {
    format!("{} '{}'", kind, name.local_name)
}

/// Pass two: links references against the symbol tables
struct Linker<'t, 'd> {
    tables: &'t SymbolTables<'d>,
    /// Resolved global types, filled on first use
    types: Vec<Option<ResolvedType>>,
    /// Global types currently being resolved, outermost first
    in_progress: Vec<usize>,
    /// Shared built-in simple types
    builtins: HashMap<BuiltinType, Arc<SimpleValueType>>,
    /// Declaration holding the references being linked
    site: String,
}

impl<'t, 'd> Linker<'t, 'd> {
    fn new(tables: &'t SymbolTables<'d>) -> Self {
        Self {
            tables,
            types: vec![None; tables.types.len()],
            in_progress: Vec::new(),
            builtins: HashMap::new(),
            site: String::new(),
        }
    }

    fn missing(&self, kind: DeclarationKind, name: &QName) -> Error {
        Error::MissingReference {
            kind,
            name: name.clone(),
            site: self.site.clone(),
        }
    }

    fn builtin(&mut self, builtin: BuiltinType) -> Arc<SimpleValueType> {
        self.builtins
            .entry(builtin)
            .or_insert_with(|| Arc::new(SimpleValueType::builtin(builtin)))
            .clone()
    }

    /// Look up a built-in type name, `Ok(None)` for names outside the XSD
    /// namespace
    fn builtin_name(&self, name: &QName) -> Result<Option<BuiltinType>> {
        if !name.is_in(XSD_NAMESPACE) {
            return Ok(None);
        }
        BuiltinType::from_name(&name.local_name)
            .map(Some)
            .ok_or_else(|| self.missing(DeclarationKind::Type, name))
    }

    fn type_index(&self, name: &QName) -> Result<usize> {
        self.tables
            .types
            .get_index_of(name)
            .ok_or_else(|| self.missing(DeclarationKind::Type, name))
    }

    /// Resolve the global type at `index` unless already done
    fn ensure_type(&mut self, index: usize) -> Result<()> {
        if self.types[index].is_some() {
            return Ok(());
        }
        let tables = self.tables;
        let Some((name, decl)) = tables.types.get_index(index) else {
            return Ok(());
        };
        if let Some(start) = self.in_progress.iter().position(|i| *i == index) {
            let mut cycle: Vec<String> = self.in_progress[start..]
                .iter()
                .filter_map(|i| tables.types.get_index(*i))
                .map(|(n, _)| site(DeclarationKind::Type, n))
                .collect();
            cycle.push(site(DeclarationKind::Type, name));
            return Err(Error::UnboundedRecursion { cycle });
        }

        trace!(name = %name, "resolving type");
        self.in_progress.push(index);
        let saved = std::mem::replace(&mut self.site, site(DeclarationKind::Type, name));
        let resolved = match *decl {
            TypeDecl::Complex(def) => self.complex_type(def).map(ResolvedType::Complex),
            TypeDecl::Simple(def) => self.simple_type(def).map(ResolvedType::Simple),
        };
        self.site = saved;
        self.in_progress.pop();
        self.types[index] = Some(resolved?);
        Ok(())
    }

    fn type_ref(&mut self, source: &TypeSource) -> Result<TypeRef> {
        Ok(match source {
            TypeSource::Unspecified => TypeRef::AnyType,
            TypeSource::Named(name) => match self.builtin_name(name)? {
                Some(BuiltinType::AnyType) => TypeRef::AnyType,
                Some(builtin) => TypeRef::Simple(self.builtin(builtin)),
                None => TypeRef::Named(TypeId(self.type_index(name)?)),
            },
            TypeSource::Complex(def) => TypeRef::Complex(Box::new(self.complex_type(def)?)),
            TypeSource::Simple(def) => TypeRef::Simple(self.simple_type(def)?),
        })
    }

    fn element(&mut self, decl: &ElementDecl) -> Result<Element> {
        Ok(Element {
            name: decl.name.clone(),
            type_ref: self.type_ref(&decl.type_source)?,
            nillable: decl.nillable,
            is_abstract: decl.is_abstract,
            default: decl.default.clone(),
            fixed: decl.fixed.clone(),
        })
    }

    fn complex_type(&mut self, def: &ComplexTypeDef) -> Result<ComplexType> {
        let (base, content) = match &def.content {
            ContentDef::Empty => (None, Content::Empty),
            ContentDef::Particle(particle) => (None, Content::Elements(self.particle(particle)?)),
            ContentDef::Complex {
                derivation,
                base,
                particle,
            } => {
                let type_ref = match self.builtin_name(base)? {
                    Some(BuiltinType::AnyType) => TypeRef::AnyType,
                    Some(builtin) => {
                        return Err(ParseError::new(format!(
                            "complex content of {} cannot derive from simple type {}",
                            self.site, builtin
                        ))
                        .into())
                    }
                    None => {
                        let index = self.type_index(base)?;
                        if let Some((_, TypeDecl::Simple(_))) = self.tables.types.get_index(index) {
                            return Err(ParseError::new(format!(
                                "complex content of {} cannot derive from simple type '{}'",
                                self.site, base.local_name
                            ))
                            .into());
                        }
                        TypeRef::Named(TypeId(index))
                    }
                };
                let content = match particle {
                    Some(particle) => Content::Elements(self.particle(particle)?),
                    None => Content::Empty,
                };
                (
                    Some(TypeBase {
                        derivation: *derivation,
                        type_ref,
                    }),
                    content,
                )
            }
            ContentDef::Simple {
                derivation,
                base,
                facets,
            } => {
                let (type_ref, text) = self.simple_content_base(base)?;
                let text = match derivation {
                    Derivation::Extension => text,
                    Derivation::Restriction => restricted(&text, facets)?,
                };
                (
                    Some(TypeBase {
                        derivation: *derivation,
                        type_ref,
                    }),
                    Content::Simple(text),
                )
            }
        };

        Ok(ComplexType {
            name: def.name.clone(),
            base,
            content,
            attributes: self.attribute_items(&def.attributes)?,
            mixed: def.mixed,
            is_abstract: def.is_abstract,
        })
    }

    /// Base of `xs:simpleContent` and the text type it provides
    fn simple_content_base(&mut self, base: &QName) -> Result<(TypeRef, Arc<SimpleValueType>)> {
        if let Some(builtin) = self.builtin_name(base)? {
            if builtin == BuiltinType::AnyType {
                return Err(ParseError::new(format!(
                    "simple content of {} needs a simple base type",
                    self.site
                ))
                .into());
            }
            let simple = self.builtin(builtin);
            return Ok((TypeRef::Simple(simple.clone()), simple));
        }
        let index = self.type_index(base)?;
        self.ensure_type(index)?;
        let text = match &self.types[index] {
            Some(ResolvedType::Simple(simple)) => simple.clone(),
            Some(ResolvedType::Complex(ComplexType {
                content: Content::Simple(simple),
                ..
            })) => simple.clone(),
            _ => {
                return Err(ParseError::new(format!(
                    "simple content of {} derives from '{}' which has no simple content",
                    self.site, base.local_name
                ))
                .into())
            }
        };
        Ok((TypeRef::Named(TypeId(index)), text))
    }

    fn simple_type(&mut self, def: &SimpleTypeDef) -> Result<Arc<SimpleValueType>> {
        let simple = match &def.derivation {
            SimpleDerivationDef::Restriction { base, facets } => {
                let base = self.simple_source(base)?;
                let mut simple = (*restricted(&base, facets)?).clone();
                simple.name = def.name.clone();
                simple
            }
            SimpleDerivationDef::List { item } => {
                let item = self.simple_source(item)?;
                if matches!(item.variety, Variety::List(_)) {
                    return Err(ParseError::new(format!(
                        "list item type {} of {} is itself a list",
                        item, self.site
                    ))
                    .into());
                }
                SimpleValueType {
                    name: def.name.clone(),
                    variety: Variety::List(item),
                    facets: Default::default(),
                }
            }
            SimpleDerivationDef::Union { members } => {
                let members = members
                    .iter()
                    .map(|m| self.simple_source(m))
                    .collect::<Result<Vec<_>>>()?;
                SimpleValueType {
                    name: def.name.clone(),
                    variety: Variety::Union(members),
                    facets: Default::default(),
                }
            }
        };
        Ok(Arc::new(simple))
    }

    fn simple_source(&mut self, source: &SimpleTypeSource) -> Result<Arc<SimpleValueType>> {
        let name = match source {
            SimpleTypeSource::Inline(def) => return self.simple_type(def),
            SimpleTypeSource::Named(name) => name,
        };
        match self.builtin_name(name)? {
            Some(BuiltinType::AnyType) => Err(ParseError::new(format!(
                "{} uses xs:anyType where a simple type is required",
                self.site
            ))
            .into()),
            Some(builtin) => Ok(self.builtin(builtin)),
            None => {
                let index = self.type_index(name)?;
                self.ensure_type(index)?;
                match &self.types[index] {
                    Some(ResolvedType::Simple(simple)) => Ok(simple.clone()),
                    _ => Err(ParseError::new(format!(
                        "{} references '{}' which is not a simple type",
                        self.site, name.local_name
                    ))
                    .into()),
                }
            }
        }
    }

    fn particle(&mut self, def: &ParticleDef) -> Result<Particle> {
        let term = match &def.term {
            TermDef::Element(decl) => Term::Element(Box::new(self.element(decl)?)),
            TermDef::ElementRef(name) => Term::ElementRef(ElementId(
                self.tables
                    .elements
                    .get_index_of(name)
                    .ok_or_else(|| self.missing(DeclarationKind::Element, name))?,
            )),
            TermDef::Group(model) => Term::Group(self.model_group(model)?),
            TermDef::GroupRef(name) => Term::GroupRef(GroupId(
                self.tables
                    .groups
                    .get_index_of(name)
                    .ok_or_else(|| self.missing(DeclarationKind::Group, name))?,
            )),
        };
        Ok(Particle {
            occurs: def.occurs,
            term,
        })
    }

    fn model_group(&mut self, def: &ModelGroupDef) -> Result<ModelGroup> {
        Ok(ModelGroup {
            compositor: def.compositor,
            particles: def
                .particles
                .iter()
                .map(|p| self.particle(p))
                .collect::<Result<_>>()?,
        })
    }

    fn attribute(&mut self, decl: &AttributeDecl) -> Result<Attribute> {
        let value_type = match &decl.type_source {
            Some(source) => self.simple_source(source)?,
            None => self.builtin(BuiltinType::AnySimpleType),
        };
        Ok(Attribute {
            name: decl.name.clone(),
            value_type,
            default: decl.default.clone(),
            fixed: decl.fixed.clone(),
        })
    }

    fn attribute_items(&mut self, items: &[AttributeItemDef]) -> Result<Vec<AttributeItem>> {
        items
            .iter()
            .map(|item| {
                Ok(match item {
                    AttributeItemDef::Local { decl, use_kind } => AttributeItem::Use(AttributeUse {
                        target: AttributeTarget::Local(Box::new(self.attribute(decl)?)),
                        use_kind: *use_kind,
                        default: None,
                        fixed: None,
                    }),
                    AttributeItemDef::Ref {
                        name,
                        use_kind,
                        default,
                        fixed,
                    } => AttributeItem::Use(AttributeUse {
                        target: AttributeTarget::Global(AttributeId(
                            self.tables
                                .attributes
                                .get_index_of(name)
                                .ok_or_else(|| self.missing(DeclarationKind::Attribute, name))?,
                        )),
                        use_kind: *use_kind,
                        default: default.clone(),
                        fixed: fixed.clone(),
                    }),
                    AttributeItemDef::GroupRef(name) => {
                        AttributeItem::Group(AttributeGroupId(
                            self.tables
                                .attribute_groups
                                .get_index_of(name)
                                .ok_or_else(|| {
                                    self.missing(DeclarationKind::AttributeGroup, name)
                                })?,
                        ))
                    }
                })
            })
            .collect()
    }
}

/// Apply a restriction step to a flattened simple type
fn restricted(
    base: &Arc<SimpleValueType>,
    facets: &super::facets::Facets,
) -> Result<Arc<SimpleValueType>> {
    if facets.is_empty() {
        return Ok(base.clone());
    }
    let combined = base.facets.restrict(facets);
    if let Variety::Atomic(builtin) = base.variety {
        combined.validate(builtin)?;
    }
    Ok(Arc::new(SimpleValueType {
        name: None,
        variety: base.variety.clone(),
        facets: combined,
    }))
}
