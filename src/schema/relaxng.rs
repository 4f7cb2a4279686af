//! RELAX NG grammar input
//!
//! Grammars in the XML syntax are lowered into the same [`SchemaDocument`]
//! the XSD parser produces, so resolution, recursion analysis and generation
//! are shared by both inputs. Each named pattern (`define`) becomes a model
//! group, an attribute group or a simple type depending on what it holds,
//! and the `start` pattern provides the global elements.
//!
//! Name classes other than a plain name, `except`, `notAllowed`, external
//! references and nested grammars are rejected.

use std::collections::HashSet;

use indexmap::IndexMap;
use tracing::debug;

use super::builtins::XSD_NAMESPACE;
use super::facets::{Facets, Pattern};
use super::model::*;
use super::parsing::set_facet;
use super::particles::Occurs;
use crate::documents::{Document, Element};
use crate::error::{Error, ParseError, Result};
use crate::namespaces::{NamespaceContext, QName};

/// RELAX NG structure namespace
pub const RELAXNG_NAMESPACE: &str = "http://relaxng.org/ns/structure/1.0";

/// Datatype library holding the XSD builtin types
pub const XSD_DATATYPES: &str = "http://www.w3.org/2001/XMLSchema-datatypes";

/// Namespace of `a:defaultValue`
const ANNOTATIONS_NAMESPACE: &str = "http://relaxng.org/ns/compatibility/annotations/1.0";

mod rng_elements {
    pub const GRAMMAR: &str = "grammar";
    pub const START: &str = "start";
    pub const DEFINE: &str = "define";
    pub const DIV: &str = "div";
    pub const ELEMENT: &str = "element";
    pub const ATTRIBUTE: &str = "attribute";
    pub const GROUP: &str = "group";
    pub const INTERLEAVE: &str = "interleave";
    pub const CHOICE: &str = "choice";
    pub const OPTIONAL: &str = "optional";
    pub const ZERO_OR_MORE: &str = "zeroOrMore";
    pub const ONE_OR_MORE: &str = "oneOrMore";
    pub const LIST: &str = "list";
    pub const MIXED: &str = "mixed";
    pub const REF: &str = "ref";
    pub const EMPTY: &str = "empty";
    pub const TEXT: &str = "text";
    pub const VALUE: &str = "value";
    pub const DATA: &str = "data";
    pub const PARAM: &str = "param";
    pub const NAME: &str = "name";
}

mod rng_attrs {
    pub const NAME: &str = "name";
    pub const NS: &str = "ns";
    pub const DATATYPE_LIBRARY: &str = "datatypeLibrary";
    pub const TYPE: &str = "type";
    pub const COMBINE: &str = "combine";
}

use rng_elements as el;

/// Whether `root` is a RELAX NG grammar or a standalone element pattern
pub fn is_relaxng(root: &Element) -> bool {
    root.namespace() == Some(RELAXNG_NAMESPACE)
        && matches!(root.local_name(), el::GRAMMAR | el::ELEMENT)
}

/// Lower a RELAX NG grammar into schema declarations
pub fn from_document(doc: &Document) -> Result<SchemaDocument> {
    let root = doc
        .root()
        .ok_or_else(|| ParseError::new("Empty document: no grammar element"))?;
    if !is_relaxng(root) {
        return Err(ParseError::new(format!(
            "Root element must be rng:grammar or rng:element, found '{}'",
            root.qname
        ))
        .into());
    }

    let scope = Scope::default().enter(root);
    let target_namespace = Some(scope.ns.clone()).filter(|ns| !ns.is_empty());

    let mut grammar = Grammar::default();
    if root.local_name() == el::GRAMMAR {
        grammar.collect(root, &scope)?;
    } else {
        grammar
            .starts
            .push((None, capture(&scope, &root.namespaces, vec![root.clone()])));
    }

    let defines = grammar
        .defines
        .into_iter()
        .map(|(name, entries)| {
            let body = combine(entries, || Error::DuplicateDeclaration {
                kind: DeclarationKind::Group,
                name: QName::local(name.as_str()),
            })?;
            Ok((name, body))
        })
        .collect::<Result<IndexMap<_, _>>>()?;
    if grammar.starts.is_empty() {
        return Err(ParseError::new("Grammar has no rng:start").into());
    }
    let start = combine(grammar.starts, || {
        ParseError::new("Grammar has more than one rng:start without 'combine'").into()
    })?;

    let shapes = shapes(&defines)?;
    let mut lowerer = Lowerer {
        defines: &defines,
        shapes: &shapes,
        target_namespace: target_namespace.clone(),
        hoisted: Vec::new(),
    };

    let mut roots = Vec::new();
    let scope = Scope::default().enter(&start);
    lowerer.start(&start, &scope, &mut roots, &mut HashSet::new())?;
    let mut declarations: Vec<Declaration> =
        roots.into_iter().map(Declaration::Element).collect();
    for (name, body) in &defines {
        declarations.extend(lowerer.define(name, body)?);
    }
    declarations.append(&mut lowerer.hoisted);

    debug!(
        defines = defines.len(),
        declarations = declarations.len(),
        "lowered RELAX NG grammar"
    );

    Ok(SchemaDocument {
        element_form_default: if target_namespace.is_some() {
            Form::Qualified
        } else {
            Form::Unqualified
        },
        attribute_form_default: Form::Unqualified,
        target_namespace,
        declarations,
    })
}

/// Inherited `ns` and `datatypeLibrary`
#[derive(Debug, Clone, Default)]
struct Scope {
    ns: String,
    datatype_library: String,
}

impl Scope {
    fn enter(&self, elem: &Element) -> Scope {
        Scope {
            ns: elem.get_attribute(rng_attrs::NS).unwrap_or(&self.ns).to_string(),
            datatype_library: elem
                .get_attribute(rng_attrs::DATATYPE_LIBRARY)
                .unwrap_or(&self.datatype_library)
                .to_string(),
        }
    }
}

/// Children in the RELAX NG namespace; annotations are skipped
fn rng_children(elem: &Element) -> impl Iterator<Item = &Element> {
    elem.children
        .iter()
        .filter(|c| c.namespace() == Some(RELAXNG_NAMESPACE))
}

fn describe(elem: &Element) -> String {
    match elem.get_attribute(rng_attrs::NAME) {
        Some(name) => format!("rng:{} '{}'", elem.local_name(), name),
        None => format!("rng:{}", elem.local_name()),
    }
}

fn error(elem: &Element, message: impl Into<String>) -> Error {
    ParseError::new(message).with_location(describe(elem)).into()
}

fn required_name(elem: &Element) -> Result<&str> {
    elem.get_attribute(rng_attrs::NAME)
        .map(str::trim)
        .ok_or_else(|| error(elem, "Missing 'name' attribute"))
}

fn missing(name: &str, site: &Element) -> Error {
    Error::MissingReference {
        kind: DeclarationKind::Group,
        name: QName::local(name),
        site: describe(site),
    }
}

/// Detach `children` under a synthetic group that records the scope they
/// were written in
fn capture(scope: &Scope, namespaces: &NamespaceContext, children: Vec<Element>) -> Element {
    let mut body = Element::new(QName::namespaced(RELAXNG_NAMESPACE, el::GROUP));
    body.attributes
        .insert(rng_attrs::NS.to_string(), scope.ns.clone());
    body.attributes.insert(
        rng_attrs::DATATYPE_LIBRARY.to_string(),
        scope.datatype_library.clone(),
    );
    body.namespaces = namespaces.clone();
    body.children = children;
    body
}

/// Merge same-named definitions according to their `combine` method
fn combine(
    mut entries: Vec<(Option<String>, Element)>,
    duplicate: impl FnOnce() -> Error,
) -> Result<Element> {
    if entries.len() == 1 {
        if let Some((_, body)) = entries.pop() {
            return Ok(body);
        }
    }
    if entries.iter().filter(|(method, _)| method.is_none()).count() > 1 {
        return Err(duplicate());
    }
    let mut methods = entries.iter().filter_map(|(method, _)| method.as_deref());
    let method = methods.next().unwrap_or(el::CHOICE);
    if methods.any(|m| m != method) {
        return Err(ParseError::new("Conflicting 'combine' methods").into());
    }
    if method != el::CHOICE && method != el::INTERLEAVE {
        return Err(ParseError::new(format!("Invalid combine method '{}'", method)).into());
    }
    let mut merged = Element::new(QName::namespaced(RELAXNG_NAMESPACE, method));
    merged.children = entries.into_iter().map(|(_, body)| body).collect();
    Ok(merged)
}

/// `start` and `define` bodies, before merging
#[derive(Default)]
struct Grammar {
    starts: Vec<(Option<String>, Element)>,
    defines: IndexMap<String, Vec<(Option<String>, Element)>>,
}

impl Grammar {
    fn collect(&mut self, container: &Element, scope: &Scope) -> Result<()> {
        for child in rng_children(container) {
            let scope = scope.enter(child);
            let method = child.get_attribute(rng_attrs::COMBINE).map(str::to_string);
            match child.local_name() {
                el::START => self.starts.push((
                    method,
                    capture(&scope, &child.namespaces, child.children.clone()),
                )),
                el::DEFINE => {
                    let name = required_name(child)?.to_string();
                    self.defines.entry(name).or_default().push((
                        method,
                        capture(&scope, &child.namespaces, child.children.clone()),
                    ));
                }
                el::DIV => self.collect(child, &scope)?,
                other => {
                    return Err(error(
                        child,
                        format!("rng:{} is not supported in a grammar", other),
                    ))
                }
            }
        }
        Ok(())
    }
}

/// What a named pattern contributes where it is referenced
///
/// The scan stops at `element` boundaries, so it only sees the content the
/// pattern adds to the element referencing it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Shape {
    elements: bool,
    attributes: bool,
    text: bool,
    value: bool,
}

impl Shape {
    fn merge(&mut self, other: Shape) {
        self.elements |= other.elements;
        self.attributes |= other.attributes;
        self.text |= other.text;
        self.value |= other.value;
    }
}

fn shapes(defines: &IndexMap<String, Element>) -> Result<IndexMap<String, Shape>> {
    let mut memo = IndexMap::with_capacity(defines.len());
    for (name, body) in defines {
        define_shape(defines, &mut memo, &mut Vec::new(), name, body)?;
    }
    Ok(memo)
}

fn define_shape(
    defines: &IndexMap<String, Element>,
    memo: &mut IndexMap<String, Shape>,
    visiting: &mut Vec<String>,
    name: &str,
    site: &Element,
) -> Result<Shape> {
    if let Some(shape) = memo.get(name) {
        return Ok(*shape);
    }
    let body = defines.get(name).ok_or_else(|| missing(name, site))?;
    if visiting.iter().any(|v| v == name) {
        return Err(error(
            site,
            format!("Reference cycle through '{}' is not inside an element", name),
        ));
    }
    visiting.push(name.to_string());
    let mut shape = Shape::default();
    scan(defines, memo, visiting, body, &mut shape)?;
    visiting.pop();
    memo.insert(name.to_string(), shape);
    Ok(shape)
}

fn scan(
    defines: &IndexMap<String, Element>,
    memo: &mut IndexMap<String, Shape>,
    visiting: &mut Vec<String>,
    elem: &Element,
    shape: &mut Shape,
) -> Result<()> {
    for child in rng_children(elem) {
        match child.local_name() {
            el::ELEMENT => shape.elements = true,
            el::ATTRIBUTE => shape.attributes = true,
            el::TEXT => shape.text = true,
            el::MIXED => {
                shape.text = true;
                scan(defines, memo, visiting, child, shape)?;
            }
            el::DATA | el::VALUE | el::LIST => shape.value = true,
            el::REF => {
                let name = required_name(child)?;
                shape.merge(define_shape(defines, memo, visiting, name, child)?);
            }
            _ => scan(defines, memo, visiting, child, shape)?,
        }
    }
    Ok(())
}

/// Content of one pattern in terms of the schema model
#[derive(Debug, Default)]
struct Lowered {
    particles: Vec<ParticleDef>,
    attributes: Vec<AttributeItemDef>,
    value: Option<SimpleTypeSource>,
    text: bool,
    mixed: bool,
}

impl Lowered {
    fn append(&mut self, other: Lowered, site: &Element) -> Result<()> {
        self.particles.extend(other.particles);
        self.attributes.extend(other.attributes);
        if let Some(value) = other.value {
            if self.value.is_some() {
                return Err(error(site, "A group can hold only one data pattern"));
            }
            self.value = Some(value);
        }
        self.text |= other.text;
        self.mixed |= other.mixed;
        Ok(())
    }
}

fn sequence(particles: Vec<ParticleDef>, occurs: Occurs) -> ParticleDef {
    ParticleDef {
        occurs,
        term: TermDef::Group(ModelGroupDef {
            compositor: Compositor::Sequence,
            particles,
        }),
    }
}

fn xsd_type(local_name: &str) -> QName {
    QName::namespaced(XSD_NAMESPACE, local_name)
}

fn enumerated(base: QName, values: Vec<String>) -> SimpleTypeSource {
    SimpleTypeSource::Inline(Box::new(SimpleTypeDef {
        name: None,
        derivation: SimpleDerivationDef::Restriction {
            base: SimpleTypeSource::Named(base),
            facets: Facets {
                enumeration: values,
                ..Facets::default()
            },
        },
    }))
}

fn annotated_default(elem: &Element) -> Option<String> {
    elem.attributes.iter().find_map(|(raw, value)| {
        let (prefix, local) = raw.split_once(':')?;
        (local == "defaultValue"
            && elem.namespaces.get_namespace(prefix) == Some(ANNOTATIONS_NAMESPACE))
        .then(|| value.clone())
    })
}

fn qualify(elem: &Element, name: &str, ns: &str) -> Result<QName> {
    let name = name.trim();
    match name.split_once(':') {
        Some((prefix, local)) => {
            let namespace = elem.namespaces.get_namespace(prefix).ok_or_else(|| {
                error(
                    elem,
                    format!("Unknown namespace prefix '{}' in '{}'", prefix, name),
                )
            })?;
            Ok(QName::namespaced(namespace, local))
        }
        None => Ok(QName::new(
            Some(ns).filter(|ns| !ns.is_empty()),
            name,
        )),
    }
}

struct Lowerer<'g> {
    defines: &'g IndexMap<String, Element>,
    shapes: &'g IndexMap<String, Shape>,
    target_namespace: Option<String>,
    /// Named simple types lifted out of elements with attributes and data
    hoisted: Vec<Declaration>,
}

impl Lowerer<'_> {
    /// Collect the global elements a start pattern allows
    fn start(
        &mut self,
        pattern: &Element,
        scope: &Scope,
        roots: &mut Vec<ElementDecl>,
        seen: &mut HashSet<String>,
    ) -> Result<()> {
        match pattern.local_name() {
            el::ELEMENT => roots.push(self.element(pattern, scope)?),
            el::CHOICE | el::GROUP => {
                for child in rng_children(pattern) {
                    self.start(child, &scope.enter(child), roots, seen)?;
                }
            }
            el::REF => {
                let name = required_name(pattern)?;
                let defines = self.defines;
                if seen.insert(name.to_string()) {
                    let body = defines.get(name).ok_or_else(|| missing(name, pattern))?;
                    self.start(body, &Scope::default().enter(body), roots, seen)?;
                }
            }
            other => {
                return Err(error(
                    pattern,
                    format!("rng:{} cannot be a document root", other),
                ))
            }
        }
        Ok(())
    }

    /// Declarations for one named pattern
    fn define(&mut self, name: &str, body: &Element) -> Result<Vec<Declaration>> {
        let shape = self.shapes.get(name).copied().unwrap_or_default();
        if shape.elements && shape.value {
            return Err(ParseError::new(format!(
                "define '{}' mixes data with child elements",
                name
            ))
            .into());
        }
        let lowered = self.lower(body, &Scope::default().enter(body), false)?;
        let qname = QName::local(name);

        let mut declarations = Vec::new();
        if shape.elements {
            declarations.push(Declaration::Group(GroupDef {
                name: qname.clone(),
                model: ModelGroupDef {
                    compositor: Compositor::Sequence,
                    particles: lowered.particles,
                },
            }));
        }
        if shape.attributes {
            declarations.push(Declaration::AttributeGroup(AttributeGroupDef {
                name: qname.clone(),
                attributes: lowered.attributes,
            }));
        }
        if shape.value && !shape.elements {
            let derivation = match lowered.value {
                Some(SimpleTypeSource::Inline(def)) => def.derivation,
                Some(base @ SimpleTypeSource::Named(_)) => SimpleDerivationDef::Restriction {
                    base,
                    facets: Facets::default(),
                },
                None => {
                    return Err(ParseError::new(format!(
                        "define '{}' holds no data pattern",
                        name
                    ))
                    .into())
                }
            };
            declarations.push(Declaration::SimpleType(SimpleTypeDef {
                name: Some(qname),
                derivation,
            }));
        }
        Ok(declarations)
    }

    fn lower_all<'e>(
        &mut self,
        children: impl Iterator<Item = &'e Element>,
        scope: &Scope,
        optional: bool,
    ) -> Result<Lowered> {
        let mut lowered = Lowered::default();
        for child in children {
            let part = self.lower(child, &scope.enter(child), optional)?;
            lowered.append(part, child)?;
        }
        Ok(lowered)
    }

    /// Lower one pattern; `scope` already includes the pattern's own attributes
    fn lower(&mut self, pattern: &Element, scope: &Scope, optional: bool) -> Result<Lowered> {
        let mut lowered = Lowered::default();
        match pattern.local_name() {
            el::ELEMENT => lowered.particles.push(ParticleDef {
                occurs: Occurs::once(),
                term: TermDef::Element(Box::new(self.element(pattern, scope)?)),
            }),
            el::ATTRIBUTE => lowered
                .attributes
                .push(self.attribute(pattern, scope, optional)?),
            el::GROUP | el::INTERLEAVE => {
                return self.lower_all(rng_children(pattern), scope, optional)
            }
            el::CHOICE => return self.choice(pattern, scope, optional),
            el::OPTIONAL => return self.repeat(pattern, scope, Occurs::optional(), true),
            el::ZERO_OR_MORE => {
                return self.repeat(pattern, scope, Occurs::zero_or_more(), true)
            }
            el::ONE_OR_MORE => {
                return self.repeat(pattern, scope, Occurs::one_or_more(), optional)
            }
            el::MIXED => {
                lowered = self.lower_all(rng_children(pattern), scope, optional)?;
                lowered.mixed = true;
            }
            el::TEXT => lowered.text = true,
            el::EMPTY => {}
            el::REF => return self.reference(pattern, optional),
            el::DATA | el::VALUE | el::LIST => lowered.value = Some(self.value(pattern, scope)?),
            other => {
                return Err(error(pattern, format!("rng:{} is not supported", other)))
            }
        }
        Ok(lowered)
    }

    fn repeat(
        &mut self,
        pattern: &Element,
        scope: &Scope,
        bounds: Occurs,
        optional: bool,
    ) -> Result<Lowered> {
        let mut lowered = self.lower_all(rng_children(pattern), scope, optional)?;
        if lowered.particles.len() == 1 {
            for particle in &mut lowered.particles {
                particle.occurs = particle.occurs.multiply(bounds);
            }
        } else if !lowered.particles.is_empty() {
            let particles = std::mem::take(&mut lowered.particles);
            lowered.particles.push(sequence(particles, bounds));
        }
        Ok(lowered)
    }

    fn choice(&mut self, pattern: &Element, scope: &Scope, optional: bool) -> Result<Lowered> {
        let branches = rng_children(pattern)
            .map(|child| self.lower(child, &scope.enter(child), optional))
            .collect::<Result<Vec<_>>>()?;
        if branches.iter().any(|b| !b.attributes.is_empty()) {
            return Err(error(
                pattern,
                "Attributes inside rng:choice are not supported",
            ));
        }

        let values_only = !branches.is_empty()
            && branches
                .iter()
                .all(|b| b.particles.is_empty() && !b.mixed && (b.value.is_some() || b.text));
        if values_only {
            return Ok(Lowered {
                value: Some(self.value(pattern, scope)?),
                ..Lowered::default()
            });
        }

        let mut lowered = Lowered::default();
        let mut occurs = Occurs::once();
        let mut particles = Vec::with_capacity(branches.len());
        for branch in branches {
            if branch.value.is_some() {
                return Err(error(
                    pattern,
                    "Data and elements in one rng:choice are not supported",
                ));
            }
            lowered.text |= branch.text;
            lowered.mixed |= branch.mixed;
            match branch.particles.len() {
                0 => occurs = Occurs::optional(),
                1 => particles.extend(branch.particles),
                _ => particles.push(sequence(branch.particles, Occurs::once())),
            }
        }
        if particles.len() == 1 {
            for mut particle in particles {
                particle.occurs = particle.occurs.multiply(occurs);
                lowered.particles.push(particle);
            }
        } else if !particles.is_empty() {
            lowered.particles.push(ParticleDef {
                occurs,
                term: TermDef::Group(ModelGroupDef {
                    compositor: Compositor::Choice,
                    particles,
                }),
            });
        }
        Ok(lowered)
    }

    fn reference(&mut self, pattern: &Element, optional: bool) -> Result<Lowered> {
        let name = required_name(pattern)?;
        let shape = self
            .shapes
            .get(name)
            .copied()
            .ok_or_else(|| missing(name, pattern))?;
        let qname = QName::local(name);

        let mut lowered = Lowered::default();
        if shape.elements {
            lowered.particles.push(ParticleDef {
                occurs: Occurs::once(),
                term: TermDef::GroupRef(qname.clone()),
            });
            lowered.mixed = shape.text;
        } else if shape.value {
            lowered.value = Some(SimpleTypeSource::Named(qname.clone()));
        } else {
            lowered.text = shape.text;
        }
        if shape.attributes {
            if optional {
                return Err(error(
                    pattern,
                    "Optional references to patterns with attributes are not supported",
                ));
            }
            lowered.attributes.push(AttributeItemDef::GroupRef(qname));
        }
        Ok(lowered)
    }

    /// The name of an element or attribute pattern and how many leading
    /// children its name class takes
    fn name_of(
        &self,
        pattern: &Element,
        scope: &Scope,
        attribute: bool,
    ) -> Result<(QName, usize)> {
        // Unprefixed attribute names take no namespace unless `ns` is set on the attribute itself
        let ns = if attribute {
            pattern.get_attribute(rng_attrs::NS).unwrap_or("")
        } else {
            scope.ns.as_str()
        };
        if let Some(name) = pattern.get_attribute(rng_attrs::NAME) {
            return Ok((qualify(pattern, name, ns)?, 0));
        }
        match rng_children(pattern).next() {
            Some(class) if class.local_name() == el::NAME => {
                let ns = class.get_attribute(rng_attrs::NS).unwrap_or(ns);
                let name = class
                    .text
                    .as_deref()
                    .ok_or_else(|| error(class, "Empty rng:name"))?;
                Ok((qualify(class, name, ns)?, 1))
            }
            Some(class) => Err(error(
                class,
                format!("Name class rng:{} is not supported", class.local_name()),
            )),
            None => Err(error(pattern, "Missing 'name' attribute")),
        }
    }

    fn element(&mut self, pattern: &Element, scope: &Scope) -> Result<ElementDecl> {
        let (name, skip) = self.name_of(pattern, scope, false)?;
        if name.namespace != self.target_namespace {
            return Err(error(
                pattern,
                format!(
                    "Element '{}' is outside the grammar namespace '{}'",
                    name,
                    self.target_namespace.as_deref().unwrap_or("")
                ),
            ));
        }
        let lowered = self.lower_all(rng_children(pattern).skip(skip), scope, false)?;
        let type_source = self.content_type(&name, lowered, pattern)?;
        Ok(ElementDecl {
            name,
            type_source,
            nillable: false,
            is_abstract: false,
            default: None,
            fixed: None,
        })
    }

    fn content_type(
        &mut self,
        name: &QName,
        lowered: Lowered,
        site: &Element,
    ) -> Result<TypeSource> {
        let Lowered {
            particles,
            attributes,
            value,
            text,
            mixed,
        } = lowered;
        if value.is_some() && (text || mixed || !particles.is_empty()) {
            return Err(error(
                site,
                "Data patterns cannot be combined with text or child elements",
            ));
        }

        let complex = |content, mixed, attributes| {
            TypeSource::Complex(Box::new(ComplexTypeDef {
                name: None,
                mixed,
                is_abstract: false,
                content,
                attributes,
            }))
        };

        if particles.is_empty() {
            let value = value
                .or_else(|| (text || mixed).then(|| SimpleTypeSource::Named(xsd_type("string"))));
            return Ok(match value {
                Some(SimpleTypeSource::Named(name)) if attributes.is_empty() => {
                    TypeSource::Named(name)
                }
                Some(SimpleTypeSource::Inline(def)) if attributes.is_empty() => {
                    TypeSource::Simple(def)
                }
                Some(source) => {
                    let base = self.hoist(name, source);
                    complex(
                        ContentDef::Simple {
                            derivation: Derivation::Extension,
                            base,
                            facets: Facets::default(),
                        },
                        false,
                        attributes,
                    )
                }
                None => complex(ContentDef::Empty, false, attributes),
            });
        }

        Ok(complex(
            ContentDef::Particle(sequence(particles, Occurs::once())),
            text || mixed,
            attributes,
        ))
    }

    /// Name an inline simple type so simple content can extend it
    fn hoist(&mut self, owner: &QName, source: SimpleTypeSource) -> QName {
        match source {
            SimpleTypeSource::Named(name) => name,
            SimpleTypeSource::Inline(def) => {
                let name = QName::local(format!("{}#{}", owner.local_name, self.hoisted.len() + 1));
                self.hoisted.push(Declaration::SimpleType(SimpleTypeDef {
                    name: Some(name.clone()),
                    derivation: def.derivation,
                }));
                name
            }
        }
    }

    fn attribute(
        &mut self,
        pattern: &Element,
        scope: &Scope,
        optional: bool,
    ) -> Result<AttributeItemDef> {
        let (name, skip) = self.name_of(pattern, scope, true)?;
        let content: Vec<&Element> = rng_children(pattern).skip(skip).collect();
        let type_source = match content.as_slice() {
            [] => SimpleTypeSource::Named(xsd_type("string")),
            [single] => self.value(single, &scope.enter(single))?,
            _ => {
                return Err(error(
                    pattern,
                    "rng:attribute must hold a single data pattern",
                ))
            }
        };
        Ok(AttributeItemDef::Local {
            decl: AttributeDecl {
                name,
                type_source: Some(type_source),
                default: annotated_default(pattern),
                fixed: None,
            },
            use_kind: if optional {
                AttributeUseKind::Optional
            } else {
                AttributeUseKind::Required
            },
        })
    }

    /// Resolve a datatype name against the datatype library in scope
    fn datatype(
        &self,
        pattern: &Element,
        scope: &Scope,
        default: Option<&str>,
    ) -> Result<QName> {
        let Some(local) = pattern.get_attribute(rng_attrs::TYPE).map(str::trim) else {
            return default
                .map(xsd_type)
                .ok_or_else(|| error(pattern, "Missing 'type' attribute"));
        };
        match scope.datatype_library.as_str() {
            XSD_DATATYPES => Ok(xsd_type(local)),
            "" => match local {
                "string" | "token" => Ok(xsd_type(local)),
                other => Err(error(
                    pattern,
                    format!("Unknown built-in datatype '{}'", other),
                )),
            },
            other => Err(error(
                pattern,
                format!("Unsupported datatype library '{}'", other),
            )),
        }
    }

    /// Lower a pattern that must describe text only
    fn value(&mut self, pattern: &Element, scope: &Scope) -> Result<SimpleTypeSource> {
        match pattern.local_name() {
            el::TEXT => Ok(SimpleTypeSource::Named(xsd_type("string"))),
            el::DATA => self.data(pattern, scope),
            el::VALUE => {
                let base = self.datatype(pattern, scope, Some("token"))?;
                Ok(enumerated(base, vec![pattern.text.clone().unwrap_or_default()]))
            }
            el::LIST => self.list(pattern, scope),
            el::REF => {
                let name = required_name(pattern)?;
                let shape = self
                    .shapes
                    .get(name)
                    .copied()
                    .ok_or_else(|| missing(name, pattern))?;
                if shape.elements || shape.attributes {
                    Err(error(pattern, format!("'{}' does not describe text", name)))
                } else if shape.value {
                    Ok(SimpleTypeSource::Named(QName::local(name)))
                } else {
                    Ok(SimpleTypeSource::Named(xsd_type("string")))
                }
            }
            el::CHOICE => {
                let children: Vec<&Element> = rng_children(pattern).collect();
                if !children.is_empty() && children.iter().all(|c| c.local_name() == el::VALUE) {
                    let mut base: Option<QName> = None;
                    let mut same = true;
                    let mut values = Vec::with_capacity(children.len());
                    for child in &children {
                        let datatype = self.datatype(child, &scope.enter(child), Some("token"))?;
                        same &= *base.get_or_insert_with(|| datatype.clone()) == datatype;
                        values.push(child.text.clone().unwrap_or_default());
                    }
                    if let (true, Some(base)) = (same, base) {
                        return Ok(enumerated(base, values));
                    }
                }
                let members = children
                    .iter()
                    .map(|child| self.value(child, &scope.enter(child)))
                    .collect::<Result<Vec<_>>>()?;
                Ok(SimpleTypeSource::Inline(Box::new(SimpleTypeDef {
                    name: None,
                    derivation: SimpleDerivationDef::Union { members },
                })))
            }
            el::GROUP | el::INTERLEAVE | el::OPTIONAL | el::ZERO_OR_MORE | el::ONE_OR_MORE => {
                let inner: Vec<&Element> = rng_children(pattern)
                    .filter(|c| c.local_name() != el::EMPTY)
                    .collect();
                match inner.as_slice() {
                    [single] => self.value(single, &scope.enter(single)),
                    _ => Err(error(pattern, "Expected a single data pattern")),
                }
            }
            other => Err(error(
                pattern,
                format!("rng:{} does not describe text", other),
            )),
        }
    }

    fn data(&mut self, pattern: &Element, scope: &Scope) -> Result<SimpleTypeSource> {
        let base = self.datatype(pattern, scope, None)?;
        let mut facets = Facets::default();
        let mut restricted = false;
        for param in rng_children(pattern) {
            if param.local_name() != el::PARAM {
                return Err(error(
                    param,
                    format!("rng:{} inside rng:data is not supported", param.local_name()),
                ));
            }
            let name = required_name(param)?;
            let value = param.text.as_deref().unwrap_or("");
            // Each pattern param constrains independently
            let mut patterns = Vec::new();
            set_facet(&mut facets, &mut patterns, name, value).map_err(|m| error(param, m))?;
            for source in patterns {
                facets.patterns.push(Pattern::new(&source)?);
            }
            restricted = true;
        }
        if !restricted {
            return Ok(SimpleTypeSource::Named(base));
        }
        Ok(SimpleTypeSource::Inline(Box::new(SimpleTypeDef {
            name: None,
            derivation: SimpleDerivationDef::Restriction {
                base: SimpleTypeSource::Named(base),
                facets,
            },
        })))
    }

    fn list(&mut self, pattern: &Element, scope: &Scope) -> Result<SimpleTypeSource> {
        let items: Vec<&Element> = rng_children(pattern).collect();
        let [item] = items.as_slice() else {
            return Err(error(
                pattern,
                "rng:list must hold a single repeated data pattern",
            ));
        };
        let scope = scope.enter(item);
        let (item_type, facets) = match item.local_name() {
            el::ONE_OR_MORE | el::ZERO_OR_MORE => {
                let facets = Facets {
                    min_length: (item.local_name() == el::ONE_OR_MORE).then_some(1),
                    ..Facets::default()
                };
                (self.value(item, &scope)?, facets)
            }
            _ => (
                self.value(item, &scope)?,
                Facets {
                    length: Some(1),
                    ..Facets::default()
                },
            ),
        };
        let list = SimpleTypeSource::Inline(Box::new(SimpleTypeDef {
            name: None,
            derivation: SimpleDerivationDef::List { item: item_type },
        }));
        if facets.min_length.is_none() && facets.length.is_none() {
            return Ok(list);
        }
        Ok(SimpleTypeSource::Inline(Box::new(SimpleTypeDef {
            name: None,
            derivation: SimpleDerivationDef::Restriction { base: list, facets },
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn lower(source: &str) -> Result<SchemaDocument> {
        from_document(&Document::from_string(source)?)
    }

    const LIBRARY: &str = r#"
        <grammar xmlns="http://relaxng.org/ns/structure/1.0"
                 xmlns:a="http://relaxng.org/ns/compatibility/annotations/1.0"
                 ns="urn:example:library"
                 datatypeLibrary="http://www.w3.org/2001/XMLSchema-datatypes">
          <start><ref name="library"/></start>
          <define name="library">
            <element name="library">
              <oneOrMore><ref name="book"/></oneOrMore>
            </element>
          </define>
          <define name="book">
            <element name="book">
              <attribute name="isbn"><data type="string"><param name="pattern">\d{10}</param></data></attribute>
              <optional><attribute name="lang" a:defaultValue="en"><choice><value>en</value><value>fr</value></choice></attribute></optional>
              <element name="title"><text/></element>
              <zeroOrMore><element name="author"><text/></element></zeroOrMore>
              <element name="year"><ref name="year"/></element>
            </element>
          </define>
          <define name="year">
            <data type="gYear"/>
          </define>
        </grammar>"#;

    #[test]
    fn test_is_relaxng() {
        let grammar = Document::from_string(LIBRARY).unwrap();
        assert!(is_relaxng(grammar.root().unwrap()));
        let schema = Document::from_string(
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"/>"#,
        )
        .unwrap();
        assert!(!is_relaxng(schema.root().unwrap()));
    }

    #[test]
    fn test_defines_become_groups_and_types() {
        let document = lower(LIBRARY).unwrap();
        assert_eq!(document.target_namespace.as_deref(), Some("urn:example:library"));
        assert_eq!(document.element_form_default, Form::Qualified);

        let roots: Vec<&QName> = document
            .declarations_of(DeclarationKind::Element)
            .filter_map(Declaration::name)
            .collect();
        assert_eq!(roots, vec![&QName::namespaced("urn:example:library", "library")]);

        let groups: Vec<&str> = document
            .declarations_of(DeclarationKind::Group)
            .filter_map(Declaration::name)
            .map(|n| n.local_name.as_str())
            .collect();
        assert_eq!(groups, vec!["library", "book"]);

        let year = document
            .declarations_of(DeclarationKind::Type)
            .find_map(|d| match d {
                Declaration::SimpleType(t) => Some(t),
                _ => None,
            })
            .unwrap();
        assert_eq!(year.name, Some(QName::local("year")));
    }

    #[test]
    fn test_attribute_uses() {
        let document = lower(LIBRARY).unwrap();
        let book = document
            .declarations
            .iter()
            .find_map(|d| match d {
                Declaration::Group(g) if g.name.local_name == "book" => Some(g),
                _ => None,
            })
            .unwrap();
        let TermDef::Element(decl) = &book.model.particles[0].term else {
            panic!("expected a local element");
        };
        let TypeSource::Complex(def) = &decl.type_source else {
            panic!("expected a complex type");
        };
        assert!(!def.mixed);
        let uses: Vec<(String, AttributeUseKind, Option<String>)> = def
            .attributes
            .iter()
            .filter_map(|a| match a {
                AttributeItemDef::Local { decl, use_kind } => Some((
                    decl.name.local_name.clone(),
                    *use_kind,
                    decl.default.clone(),
                )),
                _ => None,
            })
            .collect();
        assert_eq!(
            uses,
            vec![
                ("isbn".to_string(), AttributeUseKind::Required, None),
                ("lang".to_string(), AttributeUseKind::Optional, Some("en".to_string())),
            ]
        );
    }

    #[test]
    fn test_repetition_bounds() {
        let document = lower(LIBRARY).unwrap();
        let library = document
            .declarations
            .iter()
            .find_map(|d| match d {
                Declaration::Group(g) if g.name.local_name == "library" => Some(g),
                _ => None,
            })
            .unwrap();
        let TermDef::Element(decl) = &library.model.particles[0].term else {
            panic!("expected a local element");
        };
        let TypeSource::Complex(def) = &decl.type_source else {
            panic!("expected a complex type");
        };
        let ContentDef::Particle(content) = &def.content else {
            panic!("expected element content");
        };
        let TermDef::Group(model) = &content.term else {
            panic!("expected a sequence");
        };
        assert_eq!(model.particles[0].occurs, Occurs::one_or_more());
        assert!(matches!(
            &model.particles[0].term,
            TermDef::GroupRef(name) if name.local_name == "book"
        ));
    }

    #[test]
    fn test_standalone_element_pattern() {
        let document = lower(
            r#"<element name="note" xmlns="http://relaxng.org/ns/structure/1.0">
                 <attribute name="id"/>
                 <text/>
               </element>"#,
        )
        .unwrap();
        assert_eq!(document.target_namespace, None);
        let Some(Declaration::Element(note)) = document.declarations.first() else {
            panic!("expected a global element");
        };
        assert_eq!(note.name, QName::local("note"));
        let TypeSource::Complex(def) = &note.type_source else {
            panic!("expected a complex type");
        };
        assert!(matches!(
            &def.content,
            ContentDef::Simple { derivation: Derivation::Extension, base, .. } if base.is_in(XSD_NAMESPACE)
        ));
    }

    #[test]
    fn test_inline_data_with_attributes_is_hoisted() {
        let document = lower(
            r#"<element name="price" xmlns="http://relaxng.org/ns/structure/1.0"
                        datatypeLibrary="http://www.w3.org/2001/XMLSchema-datatypes">
                 <attribute name="currency"/>
                 <data type="decimal"><param name="minInclusive">0</param></data>
               </element>"#,
        )
        .unwrap();
        let hoisted = document
            .declarations
            .iter()
            .find_map(|d| match d {
                Declaration::SimpleType(t) => t.name.clone(),
                _ => None,
            })
            .unwrap();
        assert_eq!(hoisted, QName::local("price#1"));
    }

    #[test]
    fn test_combine_choice_merges_defines() {
        let document = lower(
            r#"<grammar xmlns="http://relaxng.org/ns/structure/1.0">
                 <start><element name="doc"><ref name="block"/></element></start>
                 <define name="block"><element name="para"><text/></element></define>
                 <define name="block" combine="choice"><element name="list"><empty/></element></define>
               </grammar>"#,
        )
        .unwrap();
        let block = document
            .declarations
            .iter()
            .find_map(|d| match d {
                Declaration::Group(g) => Some(g),
                _ => None,
            })
            .unwrap();
        let TermDef::Group(choice) = &block.model.particles[0].term else {
            panic!("expected a choice");
        };
        assert_eq!(choice.compositor, Compositor::Choice);
        assert_eq!(choice.particles.len(), 2);
    }

    #[test]
    fn test_duplicate_define_without_combine() {
        let err = lower(
            r#"<grammar xmlns="http://relaxng.org/ns/structure/1.0">
                 <start><element name="doc"><ref name="x"/></element></start>
                 <define name="x"><element name="a"><empty/></element></define>
                 <define name="x"><element name="b"><empty/></element></define>
               </grammar>"#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            Error::DuplicateDeclaration {
                kind: DeclarationKind::Group,
                ..
            }
        ));
    }

    #[test]
    fn test_value_choice_becomes_enumeration() {
        let document = lower(
            r#"<grammar xmlns="http://relaxng.org/ns/structure/1.0">
                 <start><element name="status"><ref name="status"/></element></start>
                 <define name="status">
                   <choice><value>open</value><value>closed</value></choice>
                 </define>
               </grammar>"#,
        )
        .unwrap();
        let status = document
            .declarations
            .iter()
            .find_map(|d| match d {
                Declaration::SimpleType(t) => Some(t),
                _ => None,
            })
            .unwrap();
        let SimpleDerivationDef::Restriction { base, facets } = &status.derivation else {
            panic!("expected a restriction");
        };
        assert!(matches!(base, SimpleTypeSource::Named(name) if *name == xsd_type("token")));
        assert_eq!(facets.enumeration, vec!["open", "closed"]);
    }

    #[test]
    fn test_one_or_more_list() {
        let document = lower(
            r#"<element name="sizes" xmlns="http://relaxng.org/ns/structure/1.0"
                        datatypeLibrary="http://www.w3.org/2001/XMLSchema-datatypes">
                 <list><oneOrMore><data type="int"/></oneOrMore></list>
               </element>"#,
        )
        .unwrap();
        let Some(Declaration::Element(sizes)) = document.declarations.first() else {
            panic!("expected a global element");
        };
        let TypeSource::Simple(def) = &sizes.type_source else {
            panic!("expected an inline simple type");
        };
        let SimpleDerivationDef::Restriction { base, facets } = &def.derivation else {
            panic!("expected a restriction of the list");
        };
        assert_eq!(facets.min_length, Some(1));
        assert!(matches!(
            base,
            SimpleTypeSource::Inline(list) if matches!(list.derivation, SimpleDerivationDef::List { .. })
        ));
    }

    #[test]
    fn test_mixed_content() {
        let document = lower(
            r#"<element name="para" xmlns="http://relaxng.org/ns/structure/1.0">
                 <mixed><zeroOrMore><element name="em"><text/></element></zeroOrMore></mixed>
               </element>"#,
        )
        .unwrap();
        let Some(Declaration::Element(para)) = document.declarations.first() else {
            panic!("expected a global element");
        };
        let TypeSource::Complex(def) = &para.type_source else {
            panic!("expected a complex type");
        };
        assert!(def.mixed);
    }

    #[test]
    fn test_unsupported_patterns() {
        for pattern in [
            "<element><anyName/><empty/></element>",
            "<element name='a'><notAllowed/></element>",
            "<element name='a'><externalRef href='b.rng'/></element>",
            "<element name='a'><data type='string'><except><value>x</value></except></data></element>",
            "<element name='a'><choice><attribute name='b'/><attribute name='c'/></choice></element>",
        ] {
            let source = pattern.replacen(
                "<element",
                "<element xmlns='http://relaxng.org/ns/structure/1.0'",
                1,
            );
            assert!(matches!(lower(&source), Err(Error::Parse(_))), "{pattern}");
        }
    }

    #[test]
    fn test_missing_define() {
        let err = lower(
            r#"<grammar xmlns="http://relaxng.org/ns/structure/1.0">
                 <start><element name="doc"><ref name="nowhere"/></element></start>
               </grammar>"#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::MissingReference { .. }));
    }

    #[test]
    fn test_unguarded_reference_cycle() {
        let err = lower(
            r#"<grammar xmlns="http://relaxng.org/ns/structure/1.0">
                 <start><element name="doc"><ref name="a"/></element></start>
                 <define name="a"><optional><ref name="b"/></optional></define>
                 <define name="b"><ref name="a"/></define>
               </grammar>"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("not inside an element"), "{err}");
    }

    #[test]
    fn test_elements_outside_grammar_namespace() {
        let err = lower(
            r#"<grammar xmlns="http://relaxng.org/ns/structure/1.0" ns="urn:a">
                 <start><element name="doc"><element name="x" ns="urn:b"><empty/></element></element></start>
               </grammar>"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("outside the grammar namespace"), "{err}");
    }
}
