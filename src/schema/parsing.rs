//! XSD Document Parsing
//!
//! This module turns the element tree of a schema source into a
//! [`SchemaDocument`]. References stay textual here; linking them is the
//! resolver's job.

use tracing::debug;

use super::builtins::XSD_NAMESPACE;
use super::facets::{Facets, Pattern, WhiteSpace};
use super::model::*;
use super::particles::{parse_occurs, Occurs};
use super::relaxng;
use crate::documents::{Document, Element};
use crate::error::{ParseError, Result};
use crate::limits::Limits;
use crate::namespaces::QName;

/// XSD element local names
mod xsd_elements {
    pub const SCHEMA: &str = "schema";
    pub const ELEMENT: &str = "element";
    pub const COMPLEX_TYPE: &str = "complexType";
    pub const SIMPLE_TYPE: &str = "simpleType";
    pub const ATTRIBUTE: &str = "attribute";
    pub const ATTRIBUTE_GROUP: &str = "attributeGroup";
    pub const GROUP: &str = "group";
    pub const SEQUENCE: &str = "sequence";
    pub const CHOICE: &str = "choice";
    pub const ALL: &str = "all";
    pub const ANNOTATION: &str = "annotation";
    pub const IMPORT: &str = "import";
    pub const INCLUDE: &str = "include";
    pub const REDEFINE: &str = "redefine";
    pub const OVERRIDE: &str = "override";
    pub const RESTRICTION: &str = "restriction";
    pub const EXTENSION: &str = "extension";
    pub const LIST: &str = "list";
    pub const UNION: &str = "union";
    pub const COMPLEX_CONTENT: &str = "complexContent";
    pub const SIMPLE_CONTENT: &str = "simpleContent";
    pub const ANY: &str = "any";
    pub const ANY_ATTRIBUTE: &str = "anyAttribute";
    pub const NOTATION: &str = "notation";
    // Facets
    pub const PATTERN: &str = "pattern";
    pub const ENUMERATION: &str = "enumeration";
    pub const MIN_LENGTH: &str = "minLength";
    pub const MAX_LENGTH: &str = "maxLength";
    pub const LENGTH: &str = "length";
    pub const MIN_INCLUSIVE: &str = "minInclusive";
    pub const MAX_INCLUSIVE: &str = "maxInclusive";
    pub const MIN_EXCLUSIVE: &str = "minExclusive";
    pub const MAX_EXCLUSIVE: &str = "maxExclusive";
    pub const TOTAL_DIGITS: &str = "totalDigits";
    pub const FRACTION_DIGITS: &str = "fractionDigits";
    pub const WHITE_SPACE: &str = "whiteSpace";
}

/// XSD attribute names
mod xsd_attrs {
    pub const NAME: &str = "name";
    pub const TYPE: &str = "type";
    pub const REF: &str = "ref";
    pub const TARGET_NAMESPACE: &str = "targetNamespace";
    pub const ELEMENT_FORM_DEFAULT: &str = "elementFormDefault";
    pub const ATTRIBUTE_FORM_DEFAULT: &str = "attributeFormDefault";
    pub const FORM: &str = "form";
    pub const NILLABLE: &str = "nillable";
    pub const DEFAULT: &str = "default";
    pub const FIXED: &str = "fixed";
    pub const BASE: &str = "base";
    pub const VALUE: &str = "value";
    pub const MIXED: &str = "mixed";
    pub const ABSTRACT: &str = "abstract";
    pub const ITEM_TYPE: &str = "itemType";
    pub const MEMBER_TYPES: &str = "memberTypes";
    pub const MIN_OCCURS: &str = "minOccurs";
    pub const MAX_OCCURS: &str = "maxOccurs";
    pub const USE: &str = "use";
}

/// Schema-wide settings that shape declaration names
struct ParseContext {
    target_namespace: Option<String>,
    element_form_default: Form,
    attribute_form_default: Form,
}

impl ParseContext {
    fn global_name(&self, local_name: &str) -> QName {
        QName::new(self.target_namespace.clone(), local_name)
    }

    fn local_name(&self, local_name: &str, form: Form) -> QName {
        match form {
            Form::Qualified => self.global_name(local_name),
            Form::Unqualified => QName::local(local_name),
        }
    }
}

/// Parse schema source bytes with default limits
pub fn load(source: &[u8]) -> Result<SchemaDocument> {
    load_with_limits(source, &Limits::default())
}

/// Schema languages accepted as input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaFormat {
    /// W3C XML Schema
    Xsd,
    /// RELAX NG in the XML syntax
    RelaxNg,
}

impl SchemaFormat {
    /// Detect the schema language from the document root
    ///
    /// Anything that is not a RELAX NG pattern is read as XSD, which reports
    /// unexpected roots.
    pub fn detect(doc: &Document) -> Self {
        match doc.root() {
            Some(root) if relaxng::is_relaxng(root) => SchemaFormat::RelaxNg,
            _ => SchemaFormat::Xsd,
        }
    }
}

/// Parse schema source bytes, enforcing the given limits
pub fn load_with_limits(source: &[u8], limits: &Limits) -> Result<SchemaDocument> {
    let doc = Document::parse_with_limits(source, limits)?;
    let format = SchemaFormat::detect(&doc);
    let schema = match format {
        SchemaFormat::Xsd => from_document(&doc)?,
        SchemaFormat::RelaxNg => relaxng::from_document(&doc)?,
    };
    limits.check_schema_components(schema.declarations.len())?;
    debug!(
        ?format,
        declarations = schema.declarations.len(),
        target_namespace = schema.target_namespace.as_deref().unwrap_or(""),
        "parsed schema document"
    );
    Ok(schema)
}

/// Build a schema document from a parsed element tree
pub fn from_document(doc: &Document) -> Result<SchemaDocument> {
    let root = doc
        .root()
        .ok_or_else(|| ParseError::new("Empty document: no schema element"))?;

    if root.local_name() != xsd_elements::SCHEMA || root.namespace() != Some(XSD_NAMESPACE) {
        return Err(ParseError::new(format!(
            "Root element must be xs:schema, found '{}'",
            root.qname
        ))
        .into());
    }

    let form_attr = |name: &str| -> Result<Form> {
        match root.get_attribute(name) {
            Some(value) => Form::parse(value).ok_or_else(|| {
                ParseError::new(format!("Invalid {} value '{}'", name, value)).into()
            }),
            None => Ok(Form::Unqualified),
        }
    };

    let ctx = ParseContext {
        target_namespace: root
            .get_attribute(xsd_attrs::TARGET_NAMESPACE)
            .filter(|ns| !ns.is_empty())
            .map(str::to_string),
        element_form_default: form_attr(xsd_attrs::ELEMENT_FORM_DEFAULT)?,
        attribute_form_default: form_attr(xsd_attrs::ATTRIBUTE_FORM_DEFAULT)?,
    };

    let mut declarations = Vec::new();
    for child in xsd_children(root)? {
        if let Some(declaration) = parse_schema_child(&ctx, child)? {
            declarations.push(declaration);
        }
    }

    Ok(SchemaDocument {
        target_namespace: ctx.target_namespace,
        element_form_default: ctx.element_form_default,
        attribute_form_default: ctx.attribute_form_default,
        declarations,
    })
}

/// Describe an element for error locations
fn describe(elem: &Element) -> String {
    match elem.get_attribute(xsd_attrs::NAME) {
        Some(name) => format!("xs:{} '{}'", elem.local_name(), name),
        None => match elem.get_attribute(xsd_attrs::REF) {
            Some(r) => format!("xs:{} ref '{}'", elem.local_name(), r),
            None => format!("xs:{}", elem.local_name()),
        },
    }
}

fn error(elem: &Element, message: impl Into<String>) -> crate::error::Error {
    ParseError::new(message).with_location(describe(elem)).into()
}

/// Children in the XSD namespace, annotations skipped
fn xsd_children(elem: &Element) -> Result<Vec<&Element>> {
    let mut children = Vec::with_capacity(elem.children.len());
    for child in &elem.children {
        if child.namespace() != Some(XSD_NAMESPACE) {
            return Err(error(
                elem,
                format!("Unexpected non-schema element '{}'", child.qname),
            ));
        }
        if child.local_name() != xsd_elements::ANNOTATION {
            children.push(child);
        }
    }
    Ok(children)
}

fn required_name<'a>(elem: &'a Element) -> Result<&'a str> {
    elem.get_attribute(xsd_attrs::NAME)
        .ok_or_else(|| error(elem, "Missing 'name' attribute"))
}

fn required_qname(elem: &Element, attr: &str) -> Result<QName> {
    elem.get_qname_attribute(attr)?
        .ok_or_else(|| error(elem, format!("Missing '{}' attribute", attr)))
}

fn bool_attr(elem: &Element, attr: &str) -> Result<bool> {
    match elem.get_attribute(attr) {
        None | Some("false") | Some("0") => Ok(false),
        Some("true") | Some("1") => Ok(true),
        Some(other) => Err(error(
            elem,
            format!("Invalid boolean '{}' for '{}'", other, attr),
        )),
    }
}

fn occurs_of(elem: &Element) -> Result<Occurs> {
    parse_occurs(
        elem.get_attribute(xsd_attrs::MIN_OCCURS),
        elem.get_attribute(xsd_attrs::MAX_OCCURS),
    )
    .map_err(|e| match e {
        crate::error::Error::Parse(pe) => pe.with_location(describe(elem)).into(),
        other => other,
    })
}

/// Parse a child element of xs:schema
fn parse_schema_child(ctx: &ParseContext, elem: &Element) -> Result<Option<Declaration>> {
    let declaration = match elem.local_name() {
        xsd_elements::ELEMENT => Declaration::Element(parse_element(ctx, elem, true)?),
        xsd_elements::COMPLEX_TYPE => {
            let name = ctx.global_name(required_name(elem)?);
            Declaration::ComplexType(parse_complex_type(ctx, elem, Some(name))?)
        }
        xsd_elements::SIMPLE_TYPE => {
            let name = ctx.global_name(required_name(elem)?);
            Declaration::SimpleType(parse_simple_type(ctx, elem, Some(name))?)
        }
        xsd_elements::ATTRIBUTE => Declaration::Attribute(parse_attribute(ctx, elem, true)?),
        xsd_elements::GROUP => Declaration::Group(parse_group(ctx, elem)?),
        xsd_elements::ATTRIBUTE_GROUP => Declaration::AttributeGroup(AttributeGroupDef {
            name: ctx.global_name(required_name(elem)?),
            attributes: parse_attribute_items(ctx, &xsd_children(elem)?)?,
        }),
        xsd_elements::NOTATION => return Ok(None),
        xsd_elements::IMPORT
        | xsd_elements::INCLUDE
        | xsd_elements::REDEFINE
        | xsd_elements::OVERRIDE => {
            return Err(error(
                elem,
                "Multi-document schemas are not supported; merge the schema first",
            ))
        }
        other => return Err(error(elem, format!("Unsupported schema component xs:{}", other))),
    };
    Ok(Some(declaration))
}

/// Parse an element declaration; `global` selects top-level rules
fn parse_element(ctx: &ParseContext, elem: &Element, global: bool) -> Result<ElementDecl> {
    let local = required_name(elem)?;
    let name = if global {
        if elem.get_attribute(xsd_attrs::REF).is_some() {
            return Err(error(elem, "Global element cannot use 'ref'"));
        }
        ctx.global_name(local)
    } else {
        let form = match elem.get_attribute(xsd_attrs::FORM) {
            Some(value) => {
                Form::parse(value).ok_or_else(|| error(elem, format!("Invalid form '{}'", value)))?
            }
            None => ctx.element_form_default,
        };
        ctx.local_name(local, form)
    };

    let inline = xsd_children(elem)?
        .into_iter()
        .filter(|c| {
            matches!(
                c.local_name(),
                xsd_elements::COMPLEX_TYPE | xsd_elements::SIMPLE_TYPE
            )
        })
        .collect::<Vec<_>>();

    let type_source = match (elem.get_qname_attribute(xsd_attrs::TYPE)?, inline.as_slice()) {
        (Some(_), [_, ..]) => {
            return Err(error(elem, "Element has both a 'type' attribute and an inline type"))
        }
        (Some(type_name), []) => TypeSource::Named(type_name),
        (None, []) => TypeSource::Unspecified,
        (None, [inline]) if inline.local_name() == xsd_elements::COMPLEX_TYPE => {
            TypeSource::Complex(Box::new(parse_complex_type(ctx, inline, None)?))
        }
        (None, [inline]) => TypeSource::Simple(Box::new(parse_simple_type(ctx, inline, None)?)),
        (None, _) => return Err(error(elem, "Element has more than one inline type")),
    };

    if let Some(child) = xsd_children(elem)?.into_iter().find(|c| {
        !matches!(
            c.local_name(),
            xsd_elements::COMPLEX_TYPE | xsd_elements::SIMPLE_TYPE
        )
    }) {
        // key, keyref, unique, alternative
        return Err(error(
            elem,
            format!("Unsupported element content xs:{}", child.local_name()),
        ));
    }

    let default = elem.get_attribute(xsd_attrs::DEFAULT).map(str::to_string);
    let fixed = elem.get_attribute(xsd_attrs::FIXED).map(str::to_string);
    if default.is_some() && fixed.is_some() {
        return Err(error(elem, "Element cannot have both 'default' and 'fixed'"));
    }

    Ok(ElementDecl {
        name,
        type_source,
        nillable: bool_attr(elem, xsd_attrs::NILLABLE)?,
        is_abstract: bool_attr(elem, xsd_attrs::ABSTRACT)?,
        default,
        fixed,
    })
}

/// Parse a complex type definition, named or anonymous
fn parse_complex_type(
    ctx: &ParseContext,
    elem: &Element,
    name: Option<QName>,
) -> Result<ComplexTypeDef> {
    let children = xsd_children(elem)?;
    let mixed = bool_attr(elem, xsd_attrs::MIXED)?;
    let is_abstract = bool_attr(elem, xsd_attrs::ABSTRACT)?;

    let (content, attributes) = match children.first().map(|c| c.local_name()) {
        Some(xsd_elements::SIMPLE_CONTENT) => {
            expect_single(elem, &children)?;
            parse_simple_content(ctx, children[0])?
        }
        Some(xsd_elements::COMPLEX_CONTENT) => {
            expect_single(elem, &children)?;
            let mixed_override = bool_attr(children[0], xsd_attrs::MIXED)?;
            let (content, attributes) = parse_complex_content(ctx, children[0])?;
            return Ok(ComplexTypeDef {
                name,
                mixed: mixed || mixed_override,
                is_abstract,
                content,
                attributes,
            });
        }
        _ => {
            let (particle, rest) = split_particle(ctx, &children)?;
            let content = particle.map_or(ContentDef::Empty, ContentDef::Particle);
            (content, parse_attribute_items(ctx, rest)?)
        }
    };

    Ok(ComplexTypeDef {
        name,
        mixed,
        is_abstract,
        content,
        attributes,
    })
}

fn expect_single(elem: &Element, children: &[&Element]) -> Result<()> {
    if children.len() > 1 {
        return Err(error(
            elem,
            format!(
                "xs:{} must be the only child",
                children[0].local_name()
            ),
        ));
    }
    Ok(())
}

/// Split a leading content-model particle from the attribute declarations
fn split_particle<'a, 'e>(
    ctx: &ParseContext,
    children: &'a [&'e Element],
) -> Result<(Option<ParticleDef>, &'a [&'e Element])> {
    match children.first() {
        Some(first)
            if matches!(
                first.local_name(),
                xsd_elements::SEQUENCE
                    | xsd_elements::CHOICE
                    | xsd_elements::ALL
                    | xsd_elements::GROUP
            ) =>
        {
            Ok((parse_particle(ctx, first)?, &children[1..]))
        }
        _ => Ok((None, children)),
    }
}

/// Parse `xs:complexContent`
fn parse_complex_content(
    ctx: &ParseContext,
    elem: &Element,
) -> Result<(ContentDef, Vec<AttributeItemDef>)> {
    let children = xsd_children(elem)?;
    let derivation_elem = match children.as_slice() {
        [single] => *single,
        _ => return Err(error(elem, "Expected exactly one xs:extension or xs:restriction")),
    };
    let derivation = derivation_of(derivation_elem)?;
    let base = required_qname(derivation_elem, xsd_attrs::BASE)?;

    let inner = xsd_children(derivation_elem)?;
    let (particle, rest) = split_particle(ctx, &inner)?;
    let attributes = parse_attribute_items(ctx, rest)?;

    Ok((
        ContentDef::Complex {
            derivation,
            base,
            particle,
        },
        attributes,
    ))
}

/// Parse `xs:simpleContent`
fn parse_simple_content(
    ctx: &ParseContext,
    elem: &Element,
) -> Result<(ContentDef, Vec<AttributeItemDef>)> {
    let children = xsd_children(elem)?;
    let derivation_elem = match children.as_slice() {
        [single] => *single,
        _ => return Err(error(elem, "Expected exactly one xs:extension or xs:restriction")),
    };
    let derivation = derivation_of(derivation_elem)?;
    let base = required_qname(derivation_elem, xsd_attrs::BASE)?;

    let inner = xsd_children(derivation_elem)?;
    let (facet_elems, attribute_elems): (Vec<&Element>, Vec<&Element>) =
        inner.into_iter().partition(|c| is_facet(c.local_name()));
    if derivation == Derivation::Extension && !facet_elems.is_empty() {
        return Err(error(derivation_elem, "Facets are only allowed in a restriction"));
    }
    if let Some(inline) = attribute_elems
        .iter()
        .find(|c| c.local_name() == xsd_elements::SIMPLE_TYPE)
    {
        return Err(error(
            inline,
            "Inline simple types in simpleContent restrictions are not supported",
        ));
    }

    Ok((
        ContentDef::Simple {
            derivation,
            base,
            facets: parse_facets(&facet_elems)?,
        },
        parse_attribute_items(ctx, &attribute_elems)?,
    ))
}

fn derivation_of(elem: &Element) -> Result<Derivation> {
    match elem.local_name() {
        xsd_elements::EXTENSION => Ok(Derivation::Extension),
        xsd_elements::RESTRICTION => Ok(Derivation::Restriction),
        other => Err(error(
            elem,
            format!("Expected xs:extension or xs:restriction, found xs:{}", other),
        )),
    }
}

/// Parse a particle; `None` for an optional wildcard that is left out
fn parse_particle(ctx: &ParseContext, elem: &Element) -> Result<Option<ParticleDef>> {
    let occurs = occurs_of(elem)?;
    let term = match elem.local_name() {
        xsd_elements::ELEMENT => match elem.get_qname_attribute(xsd_attrs::REF)? {
            Some(name) => TermDef::ElementRef(name),
            None => TermDef::Element(Box::new(parse_element(ctx, elem, false)?)),
        },
        xsd_elements::SEQUENCE | xsd_elements::CHOICE | xsd_elements::ALL => {
            TermDef::Group(parse_model_group(ctx, elem)?)
        }
        xsd_elements::GROUP => TermDef::GroupRef(required_qname(elem, xsd_attrs::REF)?),
        xsd_elements::ANY => {
            if occurs.is_mandatory() {
                return Err(error(elem, "Required xs:any wildcards are not supported"));
            }
            return Ok(None);
        }
        other => {
            return Err(error(
                elem,
                format!("Unsupported content model particle xs:{}", other),
            ))
        }
    };
    Ok(Some(ParticleDef { occurs, term }))
}

/// Parse a sequence, choice or all with its particles
fn parse_model_group(ctx: &ParseContext, elem: &Element) -> Result<ModelGroupDef> {
    let compositor = match elem.local_name() {
        xsd_elements::SEQUENCE => Compositor::Sequence,
        xsd_elements::CHOICE => Compositor::Choice,
        xsd_elements::ALL => Compositor::All,
        other => return Err(error(elem, format!("Expected a compositor, found xs:{}", other))),
    };
    let mut particles = Vec::new();
    for child in xsd_children(elem)? {
        if let Some(particle) = parse_particle(ctx, child)? {
            particles.push(particle);
        }
    }
    Ok(ModelGroupDef {
        compositor,
        particles,
    })
}

/// Parse a named `xs:group`
fn parse_group(ctx: &ParseContext, elem: &Element) -> Result<GroupDef> {
    let name = ctx.global_name(required_name(elem)?);
    let children = xsd_children(elem)?;
    let model = match children.as_slice() {
        [single] => parse_model_group(ctx, single)?,
        _ => return Err(error(elem, "Named group must contain exactly one compositor")),
    };
    Ok(GroupDef { name, model })
}

/// Parse a run of attribute, attributeGroup and anyAttribute declarations
fn parse_attribute_items(ctx: &ParseContext, elems: &[&Element]) -> Result<Vec<AttributeItemDef>> {
    let mut items = Vec::new();
    for elem in elems {
        match elem.local_name() {
            xsd_elements::ATTRIBUTE => {
                let use_kind = match elem.get_attribute(xsd_attrs::USE) {
                    Some(value) => AttributeUseKind::parse(value)
                        .ok_or_else(|| error(elem, format!("Invalid use '{}'", value)))?,
                    None => AttributeUseKind::Optional,
                };
                match elem.get_qname_attribute(xsd_attrs::REF)? {
                    Some(name) => items.push(AttributeItemDef::Ref {
                        name,
                        use_kind,
                        default: elem.get_attribute(xsd_attrs::DEFAULT).map(str::to_string),
                        fixed: elem.get_attribute(xsd_attrs::FIXED).map(str::to_string),
                    }),
                    None => items.push(AttributeItemDef::Local {
                        decl: parse_attribute(ctx, elem, false)?,
                        use_kind,
                    }),
                }
            }
            xsd_elements::ATTRIBUTE_GROUP => {
                items.push(AttributeItemDef::GroupRef(required_qname(elem, xsd_attrs::REF)?))
            }
            // Wildcard attributes are never required
            xsd_elements::ANY_ATTRIBUTE => {}
            other => {
                return Err(error(
                    elem,
                    format!("Unexpected xs:{} among attribute declarations", other),
                ))
            }
        }
    }
    Ok(items)
}

/// Parse an attribute declaration
fn parse_attribute(ctx: &ParseContext, elem: &Element, global: bool) -> Result<AttributeDecl> {
    let local = required_name(elem)?;
    let name = if global {
        ctx.global_name(local)
    } else {
        let form = match elem.get_attribute(xsd_attrs::FORM) {
            Some(value) => {
                Form::parse(value).ok_or_else(|| error(elem, format!("Invalid form '{}'", value)))?
            }
            None => ctx.attribute_form_default,
        };
        ctx.local_name(local, form)
    };

    let inline = xsd_children(elem)?;
    let type_source = match (elem.get_qname_attribute(xsd_attrs::TYPE)?, inline.as_slice()) {
        (Some(_), [_, ..]) => {
            return Err(error(elem, "Attribute has both a 'type' attribute and an inline type"))
        }
        (Some(type_name), []) => Some(SimpleTypeSource::Named(type_name)),
        (None, []) => None,
        (None, [inline]) if inline.local_name() == xsd_elements::SIMPLE_TYPE => Some(
            SimpleTypeSource::Inline(Box::new(parse_simple_type(ctx, inline, None)?)),
        ),
        (None, _) => return Err(error(elem, "Attribute content must be one xs:simpleType")),
    };

    let default = elem.get_attribute(xsd_attrs::DEFAULT).map(str::to_string);
    let fixed = elem.get_attribute(xsd_attrs::FIXED).map(str::to_string);
    if default.is_some() && fixed.is_some() {
        return Err(error(elem, "Attribute cannot have both 'default' and 'fixed'"));
    }

    Ok(AttributeDecl {
        name,
        type_source,
        default,
        fixed,
    })
}

/// Parse a simple type definition, named or anonymous
fn parse_simple_type(
    ctx: &ParseContext,
    elem: &Element,
    name: Option<QName>,
) -> Result<SimpleTypeDef> {
    let children = xsd_children(elem)?;
    let variety = match children.as_slice() {
        [single] => *single,
        _ => return Err(error(elem, "Expected exactly one xs:restriction, xs:list or xs:union")),
    };
    let inner = xsd_children(variety)?;

    let derivation = match variety.local_name() {
        xsd_elements::RESTRICTION => {
            let (inline_types, facet_elems): (Vec<&Element>, Vec<&Element>) = inner
                .into_iter()
                .partition(|c| c.local_name() == xsd_elements::SIMPLE_TYPE);
            let base = simple_type_source(ctx, variety, xsd_attrs::BASE, &inline_types)?;
            SimpleDerivationDef::Restriction {
                base,
                facets: parse_facets(&facet_elems)?,
            }
        }
        xsd_elements::LIST => SimpleDerivationDef::List {
            item: simple_type_source(ctx, variety, xsd_attrs::ITEM_TYPE, &inner)?,
        },
        xsd_elements::UNION => {
            let mut members = Vec::new();
            if let Some(names) = variety.get_attribute(xsd_attrs::MEMBER_TYPES) {
                for name in names.split_whitespace() {
                    members.push(SimpleTypeSource::Named(variety.namespaces.resolve(name)?));
                }
            }
            for inline in inner {
                if inline.local_name() != xsd_elements::SIMPLE_TYPE {
                    return Err(error(inline, "Union members must be xs:simpleType"));
                }
                members.push(SimpleTypeSource::Inline(Box::new(parse_simple_type(
                    ctx, inline, None,
                )?)));
            }
            if members.is_empty() {
                return Err(error(variety, "Union has no member types"));
            }
            SimpleDerivationDef::Union { members }
        }
        other => {
            return Err(error(
                variety,
                format!("Unsupported simple type derivation xs:{}", other),
            ))
        }
    };

    Ok(SimpleTypeDef { name, derivation })
}

/// The base or item type: a named reference or exactly one inline simpleType
fn simple_type_source(
    ctx: &ParseContext,
    elem: &Element,
    attr: &str,
    inline: &[&Element],
) -> Result<SimpleTypeSource> {
    match (elem.get_qname_attribute(attr)?, inline) {
        (Some(name), []) => Ok(SimpleTypeSource::Named(name)),
        (None, [single]) if single.local_name() == xsd_elements::SIMPLE_TYPE => Ok(
            SimpleTypeSource::Inline(Box::new(parse_simple_type(ctx, single, None)?)),
        ),
        (Some(_), _) => Err(error(
            elem,
            format!("Both '{}' and an inline simple type given", attr),
        )),
        (None, _) => Err(error(
            elem,
            format!("Expected '{}' or one inline xs:simpleType", attr),
        )),
    }
}

fn is_facet(local_name: &str) -> bool {
    matches!(
        local_name,
        xsd_elements::PATTERN
            | xsd_elements::ENUMERATION
            | xsd_elements::MIN_LENGTH
            | xsd_elements::MAX_LENGTH
            | xsd_elements::LENGTH
            | xsd_elements::MIN_INCLUSIVE
            | xsd_elements::MAX_INCLUSIVE
            | xsd_elements::MIN_EXCLUSIVE
            | xsd_elements::MAX_EXCLUSIVE
            | xsd_elements::TOTAL_DIGITS
            | xsd_elements::FRACTION_DIGITS
            | xsd_elements::WHITE_SPACE
    )
}

/// Parse the facets of one restriction step
fn parse_facets(elems: &[&Element]) -> Result<Facets> {
    let mut facets = Facets::default();
    let mut patterns = Vec::new();

    for elem in elems {
        let value = elem
            .get_attribute(xsd_attrs::VALUE)
            .ok_or_else(|| error(elem, "Facet missing 'value' attribute"))?;
        set_facet(&mut facets, &mut patterns, elem.local_name(), value)
            .map_err(|message| error(elem, message))?;
    }

    if !patterns.is_empty() {
        facets.patterns.push(Pattern::union(&patterns)?);
    }
    Ok(facets)
}

/// Record the facet `name` with `value`; patterns are collected separately
/// since XSD and RELAX NG combine repeated patterns differently
pub(super) fn set_facet(
    facets: &mut Facets,
    patterns: &mut Vec<String>,
    name: &str,
    value: &str,
) -> std::result::Result<(), String> {
    let number = || {
        value
            .trim()
            .parse::<usize>()
            .map_err(|_| format!("Facet value '{}' is not a non-negative integer", value))
    };

    match name {
        xsd_elements::PATTERN => patterns.push(value.to_string()),
        xsd_elements::ENUMERATION => facets.enumeration.push(value.to_string()),
        xsd_elements::LENGTH => facets.length = Some(number()?),
        xsd_elements::MIN_LENGTH => facets.min_length = Some(number()?),
        xsd_elements::MAX_LENGTH => facets.max_length = Some(number()?),
        xsd_elements::TOTAL_DIGITS => facets.total_digits = Some(number()? as u32),
        xsd_elements::FRACTION_DIGITS => facets.fraction_digits = Some(number()? as u32),
        xsd_elements::MIN_INCLUSIVE => facets.min_inclusive = Some(value.trim().to_string()),
        xsd_elements::MAX_INCLUSIVE => facets.max_inclusive = Some(value.trim().to_string()),
        xsd_elements::MIN_EXCLUSIVE => facets.min_exclusive = Some(value.trim().to_string()),
        xsd_elements::MAX_EXCLUSIVE => facets.max_exclusive = Some(value.trim().to_string()),
        xsd_elements::WHITE_SPACE => {
            facets.white_space =
                Some(WhiteSpace::parse(value).ok_or_else(|| format!("Invalid whiteSpace '{}'", value))?)
        }
        other => return Err(format!("Unsupported facet xs:{}", other)),
    }
    Ok(())
}
