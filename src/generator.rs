//! Instance generation
//!
//! A [`Generator`] walks the resolved graph depth first from a root element
//! and builds a [`Node`] tree. Occurrence counts, choice branches and optional
//! attributes are drawn from the caller's rng, so a seeded rng reproduces the
//! same document.
//!
//! Recursion is cut by counting the global symbols on the current ancestry
//! path. Once a recursive symbol has been entered `recursion_ceiling` times,
//! the particle leading to it takes its minimum count and everything below is
//! generated in *minimal mode*: minimum counts, no optional attributes, and
//! choices take the branch with the smallest realization. Recursion analysis
//! guarantees that this always terminates.

use std::collections::HashMap;

use rand::{Rng, RngCore};
use tracing::{debug, info, trace};

use crate::error::{Error, Result};
use crate::instance::Node;
use crate::options::GenerationOptions;
use crate::schema::{
    AttributeUseKind, Compositor, Content, ComplexType, Element, ElementId, Form, ModelGroup,
    Occurs, Particle, SchemaGraph, SimpleValueType, Symbol, Term, TypeRef, TypeView,
};
use crate::values::{DefaultValueProvider, ValueProvider};
use crate::namespaces::QName;

/// Prefix bound to the target namespace when names need one
pub const TARGET_PREFIX: &str = "ns0";

/// Probability of emitting a declared default instead of a fresh value
const DEFAULT_VALUE_PROBABILITY: f64 = 0.5;

/// Generates instances of one schema
pub struct Generator<'g> {
    graph: &'g SchemaGraph,
    options: GenerationOptions,
    provider: Box<dyn ValueProvider + 'g>,
}

impl<'g> Generator<'g> {
    /// Create a generator with the default value provider
    ///
    /// Fails with [`Error::InvalidOptions`] if the options are out of range.
    pub fn new(graph: &'g SchemaGraph, options: GenerationOptions) -> Result<Self> {
        options.validate()?;
        let provider = Box::new(DefaultValueProvider::new(&options));
        Ok(Self {
            graph,
            options,
            provider,
        })
    }

    /// Replace the value provider
    pub fn with_provider(mut self, provider: impl ValueProvider + 'g) -> Self {
        self.provider = Box::new(provider);
        self
    }

    /// Options of this generator
    pub fn options(&self) -> &GenerationOptions {
        &self.options
    }

    /// Generate one instance rooted at a global element
    pub fn generate<R: RngCore>(&self, root: ElementId, rng: &mut R) -> Result<Node> {
        let element = self.graph.element(root);
        info!(root = %element.name, "generating instance");

        let scheme = Scheme::of(self.graph);
        let mut run = Run {
            graph: self.graph,
            options: &self.options,
            provider: self.provider.as_ref(),
            rng,
            scheme,
            active: HashMap::new(),
        };

        let symbol = Symbol::Element(root);
        let minimal = run.at_ceiling(symbol);
        run.enter(symbol);
        let mut node = run.element(element, None, minimal)?;
        run.leave(symbol);
        run.declare_prefix(&mut node);

        debug!(
            elements = node.element_count(),
            depth = node.depth(),
            "instance generated"
        );
        Ok(node)
    }
}

/// How qualified names are written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scheme {
    /// No target namespace
    Plain,
    /// Qualified elements live in the default namespace
    Default,
    /// Qualified elements carry the `ns0` prefix
    Prefixed,
}

impl Scheme {
    fn of(graph: &SchemaGraph) -> Self {
        match (graph.target_namespace(), graph.element_form_default()) {
            (None, _) => Scheme::Plain,
            (Some(_), Form::Qualified) => Scheme::Default,
            (Some(_), Form::Unqualified) => Scheme::Prefixed,
        }
    }
}

/// State of a single generation run
struct Run<'a, 'g> {
    graph: &'g SchemaGraph,
    options: &'a GenerationOptions,
    provider: &'a dyn ValueProvider,
    rng: &'a mut dyn RngCore,
    scheme: Scheme,
    /// Global symbols on the ancestry path with their multiplicity
    active: HashMap<Symbol, u32>,
}

impl<'a, 'g> Run<'a, 'g> {
    fn enter(&mut self, symbol: Symbol) {
        *self.active.entry(symbol).or_insert(0) += 1;
    }

    fn leave(&mut self, symbol: Symbol) {
        if let Some(count) = self.active.get_mut(&symbol) {
            *count = count.saturating_sub(1);
        }
    }

    fn at_ceiling(&self, symbol: Symbol) -> bool {
        self.graph.recursion().is_bounded(symbol)
            && self.active.get(&symbol).copied().unwrap_or(0) >= self.options.recursion_ceiling
    }

    /// Written element name, the default namespace in scope below it and
    /// the `xmlns` declaration it needs
    fn element_name(
        &self,
        name: &QName,
        in_scope: Option<&'g str>,
    ) -> (String, Option<&'g str>, Option<(String, String)>) {
        match (self.scheme, name.namespace.as_deref()) {
            (Scheme::Prefixed, Some(_)) => (
                format!("{}:{}", TARGET_PREFIX, name.local_name),
                in_scope,
                None,
            ),
            (Scheme::Default, namespace) if namespace != in_scope => {
                let target = namespace.and(self.graph.target_namespace());
                let declaration = ("xmlns".to_string(), target.unwrap_or("").to_string());
                (name.local_name.clone(), target, Some(declaration))
            }
            _ => (name.local_name.clone(), in_scope, None),
        }
    }

    fn attribute_name(&self, name: &QName) -> String {
        match name.namespace {
            Some(_) => format!("{}:{}", TARGET_PREFIX, name.local_name),
            None => name.local_name.clone(),
        }
    }

    /// Bind the target prefix on the root if any name uses it
    fn declare_prefix(&self, root: &mut Node) {
        let Some(target) = self.graph.target_namespace() else {
            return;
        };
        if self.scheme == Scheme::Prefixed || self.graph.has_qualified_attributes() {
            let at = usize::from(root.attributes.first().is_some_and(|(n, _)| n == "xmlns"));
            root.attributes
                .insert(at, (format!("xmlns:{}", TARGET_PREFIX), target.to_string()));
        }
    }

    fn element(
        &mut self,
        element: &'g Element,
        in_scope: Option<&'g str>,
        minimal: bool,
    ) -> Result<Node> {
        let (name, in_scope, declaration) = self.element_name(&element.name, in_scope);
        let mut node = Node::new(name);
        if let Some((name, value)) = declaration {
            node.push_attribute(name, value);
        }

        let type_symbol = match element.type_ref {
            TypeRef::Named(id) => Some(Symbol::Type(id)),
            _ => None,
        };
        let minimal = minimal || type_symbol.is_some_and(|s| self.at_ceiling(s));
        if let Some(symbol) = type_symbol {
            self.enter(symbol);
        }
        let result = self.content(element, &mut node, in_scope, minimal);
        if let Some(symbol) = type_symbol {
            self.leave(symbol);
        }
        result?;
        Ok(node)
    }

    fn content(
        &mut self,
        element: &'g Element,
        node: &mut Node,
        in_scope: Option<&'g str>,
        minimal: bool,
    ) -> Result<()> {
        match self.graph.view(&element.type_ref) {
            TypeView::Any => {}
            TypeView::Simple(simple) => {
                let text = self.value(simple, element.fixed.as_deref(), element.default.as_deref())?;
                node.text = Some(text);
            }
            TypeView::Complex(complex) => {
                self.attributes(complex, node, minimal)?;
                match &complex.content {
                    Content::Simple(simple) => {
                        let text = self.value(
                            simple,
                            element.fixed.as_deref(),
                            element.default.as_deref(),
                        )?;
                        node.text = Some(text);
                    }
                    Content::Elements(_) | Content::Empty => {
                        for particle in self.graph.content_particles(complex) {
                            self.particle(particle, in_scope, minimal, &mut node.children)?;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn attributes(&mut self, complex: &'g ComplexType, node: &mut Node, minimal: bool) -> Result<()> {
        for effective in self.graph.effective_attributes(complex) {
            let include = match effective.use_kind {
                AttributeUseKind::Required => true,
                AttributeUseKind::Prohibited => false,
                AttributeUseKind::Optional => {
                    !minimal
                        && self
                            .rng
                            .random_bool(self.options.attribute_inclusion_probability)
                }
            };
            if !include {
                continue;
            }
            let attribute = effective.attribute;
            let value = self.value(
                &attribute.value_type,
                effective.fixed,
                attribute.default.as_deref(),
            )?;
            node.push_attribute(self.attribute_name(&attribute.name), value);
        }
        Ok(())
    }

    /// Text of a leaf or attribute
    fn value(
        &mut self,
        value_type: &SimpleValueType,
        fixed: Option<&str>,
        default: Option<&str>,
    ) -> Result<String> {
        if let Some(fixed) = fixed {
            return Ok(fixed.to_string());
        }
        if let Some(default) = default {
            if self.rng.random_bool(DEFAULT_VALUE_PROBABILITY) {
                return Ok(default.to_string());
            }
        }
        self.provider.generate(value_type, &mut *self.rng)
    }

    /// Global symbol entered by a particle's term, if any
    fn entry_symbol(term: &Term) -> Option<Symbol> {
        match term {
            Term::ElementRef(id) => Some(Symbol::Element(*id)),
            Term::GroupRef(id) => Some(Symbol::Group(*id)),
            Term::Element(local) => match local.type_ref {
                TypeRef::Named(id) => Some(Symbol::Type(id)),
                _ => None,
            },
            Term::Group(_) => None,
        }
    }

    fn occurrences(&mut self, occurs: Occurs) -> u32 {
        match occurs.max {
            None => occurs
                .min
                .saturating_add(self.rng.random_range(0..=self.options.max_repeat)),
            Some(max) if max <= occurs.min => occurs.min,
            Some(max) => self.rng.random_range(occurs.min..=max),
        }
    }

    fn particle(
        &mut self,
        particle: &'g Particle,
        in_scope: Option<&'g str>,
        minimal: bool,
        out: &mut Vec<Node>,
    ) -> Result<()> {
        if particle.occurs.is_empty() {
            return Ok(());
        }
        let forced = Self::entry_symbol(&particle.term).is_some_and(|s| self.at_ceiling(s));
        if forced {
            trace!(occurs = %particle.occurs, "recursion ceiling reached, generating minimally");
        }
        let minimal = minimal || forced;
        let count = if minimal {
            particle.occurs.min
        } else {
            self.occurrences(particle.occurs)
        };
        for _ in 0..count {
            self.term(&particle.term, in_scope, minimal, out)?;
        }
        Ok(())
    }

    fn term(
        &mut self,
        term: &'g Term,
        in_scope: Option<&'g str>,
        minimal: bool,
        out: &mut Vec<Node>,
    ) -> Result<()> {
        match term {
            Term::ElementRef(id) => {
                let symbol = Symbol::Element(*id);
                self.enter(symbol);
                let node = self.element(self.graph.element(*id), in_scope, minimal);
                self.leave(symbol);
                out.push(node?);
            }
            Term::Element(local) => {
                let node = self.element(local, in_scope, minimal)?;
                out.push(node);
            }
            Term::GroupRef(id) => {
                let symbol = Symbol::Group(*id);
                self.enter(symbol);
                let result = self.model(self.graph.group(*id), in_scope, minimal, out);
                self.leave(symbol);
                result?;
            }
            Term::Group(model) => self.model(model, in_scope, minimal, out)?,
        }
        Ok(())
    }

    fn model(
        &mut self,
        model: &'g ModelGroup,
        in_scope: Option<&'g str>,
        minimal: bool,
        out: &mut Vec<Node>,
    ) -> Result<()> {
        match model.compositor {
            Compositor::Sequence | Compositor::All => {
                for particle in &model.particles {
                    self.particle(particle, in_scope, minimal, out)?;
                }
            }
            Compositor::Choice => {
                let branches: Vec<&'g Particle> = model
                    .particles
                    .iter()
                    .filter(|p| !p.occurs.is_empty())
                    .collect();
                let branch = if minimal {
                    let graph = self.graph;
                    branches
                        .iter()
                        .copied()
                        .min_by_key(|p| graph.recursion().particle_cost(graph, p))
                } else if branches.is_empty() {
                    None
                } else {
                    Some(branches[self.rng.random_range(0..branches.len())])
                };
                if let Some(branch) = branch {
                    self.particle(branch, in_scope, minimal, out)?;
                }
            }
        }
        Ok(())
    }
}

/// Generate an instance rooted at the global element named `root_name`
///
/// `root_name` is a local name, resolved in the target namespace first, or
/// a `{namespace}local` name.
pub fn generate_instance<R: RngCore>(
    graph: &SchemaGraph,
    root_name: &str,
    rng: &mut R,
    options: &GenerationOptions,
) -> Result<Node> {
    let root = graph
        .element_by_name(root_name)
        .ok_or_else(|| Error::RootElement(format!("no global element named '{}'", root_name)))?;
    Generator::new(graph, options.clone())?.generate(root, rng)
}
