//! Recursion analysis
//!
//! Builds the reference graph between global symbols and classifies each
//! symbol. An edge is *mandatory* when every instance of its source must
//! contain an instance of its target: every particle on the way has
//! `minOccurs >= 1` and no choice with more than one branch lies between
//! them. Derivation edges are always mandatory.
//!
//! A symbol is rejected as unboundedly recursive if it sits on a cycle of
//! mandatory edges, or more generally if no finite instance of it exists.
//! Finiteness is decided by a productivity fixpoint that also yields the
//! rank used to steer generation towards termination.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;

use tracing::debug;

use super::graph::{
    AttributeGroupId, AttributeId, AttributeItem, AttributeTarget, ComplexType, Content,
    ElementId, GroupId, ModelGroup, Particle, ResolvedType, SchemaGraph, Term, TypeId, TypeRef,
};
use super::model::{AttributeUseKind, Compositor, DeclarationKind};
use super::particles::Occurs;
use crate::error::{Error, Result};

/// A global, named schema component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Symbol {
    /// Global element
    Element(ElementId),
    /// Global type
    Type(TypeId),
    /// Named model group
    Group(GroupId),
    /// Global attribute
    Attribute(AttributeId),
    /// Named attribute group
    AttributeGroup(AttributeGroupId),
}

impl Symbol {
    /// Symbol table of the symbol
    pub fn kind(self) -> DeclarationKind {
        match self {
            Symbol::Element(_) => DeclarationKind::Element,
            Symbol::Type(_) => DeclarationKind::Type,
            Symbol::Group(_) => DeclarationKind::Group,
            Symbol::Attribute(_) => DeclarationKind::Attribute,
            Symbol::AttributeGroup(_) => DeclarationKind::AttributeGroup,
        }
    }
}

/// Recursion class of a symbol that passed analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecursionClass {
    /// Not on any reference cycle
    #[default]
    NonRecursive,
    /// On a cycle that can always be left through an optional edge
    Bounded,
}

impl fmt::Display for RecursionClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RecursionClass::NonRecursive => "non-recursive",
            RecursionClass::Bounded => "bounded",
        })
    }
}

/// A reference from one symbol's definition to another symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    /// The referenced symbol
    pub target: Symbol,
    /// Whether every instance of the source contains the target
    pub mandatory: bool,
}

/// Result of recursion analysis, stored in the [`SchemaGraph`]
#[derive(Debug, Default)]
pub struct RecursionInfo {
    edges: HashMap<Symbol, Vec<Edge>>,
    ranks: HashMap<Symbol, u32>,
    classes: HashMap<Symbol, RecursionClass>,
    reached_elements: HashSet<ElementId>,
}

impl RecursionInfo {
    /// Outgoing references of a symbol
    pub fn edges(&self, symbol: Symbol) -> &[Edge] {
        self.edges.get(&symbol).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Recursion class of a symbol
    pub fn class(&self, symbol: Symbol) -> RecursionClass {
        self.classes.get(&symbol).copied().unwrap_or_default()
    }

    /// Check whether a symbol is on a reference cycle
    pub fn is_bounded(&self, symbol: Symbol) -> bool {
        self.class(symbol) == RecursionClass::Bounded
    }

    /// Productivity rank: a bound on the nesting depth of the smallest
    /// instance of the symbol
    pub fn rank(&self, symbol: Symbol) -> Option<u32> {
        self.ranks.get(&symbol).copied()
    }

    /// Nesting depth of the smallest content a particle can produce
    ///
    /// Zero for particles with `minOccurs = 0`.
    pub fn particle_cost(&self, graph: &SchemaGraph, particle: &Particle) -> u32 {
        Cost {
            graph,
            ranks: &self.ranks,
        }
        .particle(particle)
        .unwrap_or(u32::MAX)
    }

    /// Check whether another global element can contain the element
    pub(crate) fn reached_from_other_element(&self, id: ElementId) -> bool {
        self.reached_elements.contains(&id)
    }
}

/// Analyze every global symbol of a resolved graph
///
/// Fails with [`Error::UnboundedRecursion`] naming the offending cycle.
pub fn analyze(graph: &SchemaGraph) -> Result<RecursionInfo> {
    let symbols: Vec<Symbol> = graph.symbols().collect();
    let edges: HashMap<Symbol, Vec<Edge>> = symbols
        .iter()
        .map(|s| (*s, EdgeCollector::collect(graph, *s)))
        .collect();

    if let Some(cycle) = find_mandatory_cycle(&symbols, &edges) {
        return Err(unbounded(graph, &cycle));
    }

    let ranks = productivity_ranks(graph, &symbols);
    if let Some(start) = symbols.iter().find(|s| !ranks.contains_key(*s)) {
        let cycle = unproductive_cycle(*start, &edges, &ranks);
        return Err(unbounded(graph, &cycle));
    }

    let mut classes = HashMap::new();
    for component in strongly_connected(&symbols, &edges) {
        let recursive = component.len() > 1
            || component.iter().any(|s| {
                edges
                    .get(s)
                    .is_some_and(|out| out.iter().any(|e| e.target == *s))
            });
        if recursive {
            for symbol in component {
                classes.insert(symbol, RecursionClass::Bounded);
            }
        }
    }

    let mut reached_elements = HashSet::new();
    for symbol in &symbols {
        if let Symbol::Element(id) = symbol {
            for found in reachable_elements(*symbol, &edges) {
                if found != *id {
                    reached_elements.insert(found);
                }
            }
        }
    }

    debug!(
        symbols = symbols.len(),
        recursive = classes.len(),
        "recursion analysis complete"
    );

    Ok(RecursionInfo {
        edges,
        ranks,
        classes,
        reached_elements,
    })
}

fn unbounded(graph: &SchemaGraph, cycle: &[Symbol]) -> Error {
    Error::UnboundedRecursion {
        cycle: cycle.iter().map(|s| graph.describe(*s)).collect(),
    }
}

/// Collects the outgoing edges of one symbol's definition
struct EdgeCollector {
    edges: Vec<Edge>,
}

impl EdgeCollector {
    fn collect(graph: &SchemaGraph, symbol: Symbol) -> Vec<Edge> {
        let mut collector = EdgeCollector { edges: Vec::new() };
        let path = Occurs::once();
        match symbol {
            Symbol::Element(id) => collector.type_ref(&graph.element(id).type_ref, path),
            Symbol::Type(id) => {
                if let ResolvedType::Complex(complex) = graph.resolve_type(id) {
                    collector.complex(complex, path);
                }
            }
            Symbol::Group(id) => collector.model(graph.group(id), path),
            Symbol::Attribute(_) => {}
            Symbol::AttributeGroup(id) => collector.attributes(graph.attribute_group(id), path),
        }
        collector.edges
    }

    /// Record an edge reached through particles whose bounds compose to `path`
    fn push(&mut self, target: Symbol, path: Occurs) {
        self.edges.push(Edge {
            target,
            mandatory: path.is_mandatory(),
        });
    }

    fn type_ref(&mut self, type_ref: &TypeRef, path: Occurs) {
        match type_ref {
            TypeRef::AnyType | TypeRef::Simple(_) => {}
            TypeRef::Named(id) => self.push(Symbol::Type(*id), path),
            TypeRef::Complex(complex) => self.complex(complex, path),
        }
    }

    fn complex(&mut self, complex: &ComplexType, path: Occurs) {
        if let Some(base) = &complex.base {
            self.type_ref(&base.type_ref, path);
        }
        if let Content::Elements(particle) = &complex.content {
            self.particle(particle, path);
        }
        self.attributes(&complex.attributes, path);
    }

    fn attributes(&mut self, items: &[AttributeItem], path: Occurs) {
        for item in items {
            match item {
                AttributeItem::Group(id) => self.push(Symbol::AttributeGroup(*id), path),
                AttributeItem::Use(attribute_use) => {
                    if let AttributeTarget::Global(id) = attribute_use.target {
                        let path = if attribute_use.use_kind == AttributeUseKind::Required {
                            path
                        } else {
                            path.multiply(Occurs::optional())
                        };
                        self.push(Symbol::Attribute(id), path);
                    }
                }
            }
        }
    }

    fn particle(&mut self, particle: &Particle, path: Occurs) {
        let path = particle.occurs.multiply(path);
        if path.is_empty() {
            return;
        }
        match &particle.term {
            Term::ElementRef(id) => self.push(Symbol::Element(*id), path),
            Term::Element(local) => self.type_ref(&local.type_ref, path),
            Term::Group(model) => self.model(model, path),
            Term::GroupRef(id) => self.push(Symbol::Group(*id), path),
        }
    }

    fn model(&mut self, model: &ModelGroup, path: Occurs) {
        let branches = model.particles.iter().filter(|p| !p.occurs.is_empty()).count();
        // Any one branch of a real choice may be skipped
        let path = if model.compositor == Compositor::Choice && branches > 1 {
            path.multiply(Occurs::optional())
        } else {
            path
        };
        for particle in &model.particles {
            self.particle(particle, path);
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

fn find_mandatory_cycle(
    symbols: &[Symbol],
    edges: &HashMap<Symbol, Vec<Edge>>,
) -> Option<Vec<Symbol>> {
    fn visit(
        symbol: Symbol,
        edges: &HashMap<Symbol, Vec<Edge>>,
        marks: &mut HashMap<Symbol, Mark>,
        stack: &mut Vec<Symbol>,
    ) -> Option<Vec<Symbol>> {
        marks.insert(symbol, Mark::Visiting);
        stack.push(symbol);
        for edge in edges.get(&symbol).into_iter().flatten() {
            if !edge.mandatory {
                continue;
            }
            match marks.get(&edge.target) {
                Some(Mark::Visiting) => {
                    let start = stack.iter().position(|s| *s == edge.target)?;
                    let mut cycle = stack[start..].to_vec();
                    cycle.push(edge.target);
                    return Some(cycle);
                }
                Some(Mark::Done) => {}
                None => {
                    if let Some(cycle) = visit(edge.target, edges, marks, stack) {
                        return Some(cycle);
                    }
                }
            }
        }
        stack.pop();
        marks.insert(symbol, Mark::Done);
        None
    }

    let mut marks = HashMap::new();
    let mut stack = Vec::new();
    for symbol in symbols {
        if !marks.contains_key(symbol) {
            if let Some(cycle) = visit(*symbol, edges, &mut marks, &mut stack) {
                return Some(cycle);
            }
        }
    }
    None
}

/// Minimal-instance depth under the current rank estimates; `None` is
/// infinity
struct Cost<'a> {
    graph: &'a SchemaGraph,
    ranks: &'a HashMap<Symbol, u32>,
}

impl Cost<'_> {
    fn rank(&self, symbol: Symbol) -> Option<u32> {
        self.ranks.get(&symbol).copied()
    }

    fn symbol(&self, symbol: Symbol) -> Option<u32> {
        let definition = match symbol {
            Symbol::Element(id) => self.type_ref(&self.graph.element(id).type_ref),
            Symbol::Type(id) => match self.graph.resolve_type(id) {
                ResolvedType::Complex(complex) => self.complex(complex),
                ResolvedType::Simple(_) => Some(0),
            },
            Symbol::Group(id) => self.model(self.graph.group(id)),
            Symbol::Attribute(_) => Some(0),
            Symbol::AttributeGroup(id) => self.attributes(self.graph.attribute_group(id)),
        }?;
        Some(definition.saturating_add(1))
    }

    fn type_ref(&self, type_ref: &TypeRef) -> Option<u32> {
        match type_ref {
            TypeRef::AnyType | TypeRef::Simple(_) => Some(0),
            TypeRef::Named(id) => self.rank(Symbol::Type(*id)),
            TypeRef::Complex(complex) => self.complex(complex),
        }
    }

    fn complex(&self, complex: &ComplexType) -> Option<u32> {
        let base = match &complex.base {
            Some(base) => self.type_ref(&base.type_ref)?,
            None => 0,
        };
        let content = match &complex.content {
            Content::Elements(particle) => self.particle(particle)?,
            Content::Empty | Content::Simple(_) => 0,
        };
        let attributes = self.attributes(&complex.attributes)?;
        Some(base.max(content).max(attributes))
    }

    fn attributes(&self, items: &[AttributeItem]) -> Option<u32> {
        items.iter().try_fold(0, |acc, item| match item {
            AttributeItem::Group(id) => Some(acc.max(self.rank(Symbol::AttributeGroup(*id))?)),
            AttributeItem::Use(_) => Some(acc),
        })
    }

    fn particle(&self, particle: &Particle) -> Option<u32> {
        if particle.occurs.is_emptiable() {
            return Some(0);
        }
        match &particle.term {
            Term::ElementRef(id) => self.rank(Symbol::Element(*id)),
            Term::Element(local) => self.type_ref(&local.type_ref),
            Term::Group(model) => self.model(model),
            Term::GroupRef(id) => self.rank(Symbol::Group(*id)),
        }
    }

    fn model(&self, model: &ModelGroup) -> Option<u32> {
        let mut costs = model
            .particles
            .iter()
            .filter(|p| !p.occurs.is_empty())
            .map(|p| self.particle(p));
        match model.compositor {
            Compositor::Sequence | Compositor::All => {
                costs.try_fold(0, |acc, cost| Some(acc.max(cost?)))
            }
            Compositor::Choice => {
                let branches: Vec<Option<u32>> = costs.collect();
                if branches.is_empty() {
                    Some(0)
                } else {
                    branches.into_iter().flatten().min()
                }
            }
        }
    }
}

/// Least fixpoint of symbol ranks; symbols missing from the result have no
/// finite instance
fn productivity_ranks(graph: &SchemaGraph, symbols: &[Symbol]) -> HashMap<Symbol, u32> {
    let mut ranks: HashMap<Symbol, u32> = HashMap::with_capacity(symbols.len());
    loop {
        let mut changed = false;
        for symbol in symbols {
            let estimate = Cost {
                graph,
                ranks: &ranks,
            }
            .symbol(*symbol);
            if let Some(estimate) = estimate {
                if ranks.get(symbol).map_or(true, |r| estimate < *r) {
                    ranks.insert(*symbol, estimate);
                    changed = true;
                }
            }
        }
        if !changed {
            return ranks;
        }
    }
}

/// Follow references between unproductive symbols until one repeats
fn unproductive_cycle(
    start: Symbol,
    edges: &HashMap<Symbol, Vec<Edge>>,
    ranks: &HashMap<Symbol, u32>,
) -> Vec<Symbol> {
    let mut path = vec![start];
    let mut current = start;
    loop {
        let next = edges
            .get(&current)
            .into_iter()
            .flatten()
            .map(|e| e.target)
            .find(|t| !ranks.contains_key(t));
        let Some(next) = next else {
            return path;
        };
        if let Some(position) = path.iter().position(|s| *s == next) {
            let mut cycle = path.split_off(position);
            cycle.push(next);
            return cycle;
        }
        path.push(next);
        current = next;
    }
}

/// Tarjan's strongly connected components over all edges
fn strongly_connected(symbols: &[Symbol], edges: &HashMap<Symbol, Vec<Edge>>) -> Vec<Vec<Symbol>> {
    struct State<'a> {
        edges: &'a HashMap<Symbol, Vec<Edge>>,
        next_index: usize,
        indices: HashMap<Symbol, usize>,
        lowlinks: HashMap<Symbol, usize>,
        stack: Vec<Symbol>,
        on_stack: HashSet<Symbol>,
        components: Vec<Vec<Symbol>>,
    }

    fn connect(state: &mut State<'_>, symbol: Symbol) {
        state.indices.insert(symbol, state.next_index);
        state.lowlinks.insert(symbol, state.next_index);
        state.next_index += 1;
        state.stack.push(symbol);
        state.on_stack.insert(symbol);

        let edges = state.edges;
        for edge in edges.get(&symbol).into_iter().flatten() {
            let target = edge.target;
            if !state.indices.contains_key(&target) {
                connect(state, target);
                let low = state.lowlinks[&symbol].min(state.lowlinks[&target]);
                state.lowlinks.insert(symbol, low);
            } else if state.on_stack.contains(&target) {
                let low = state.lowlinks[&symbol].min(state.indices[&target]);
                state.lowlinks.insert(symbol, low);
            }
        }

        if state.lowlinks[&symbol] == state.indices[&symbol] {
            let mut component = Vec::new();
            while let Some(member) = state.stack.pop() {
                state.on_stack.remove(&member);
                component.push(member);
                if member == symbol {
                    break;
                }
            }
            state.components.push(component);
        }
    }

    let mut state = State {
        edges,
        next_index: 0,
        indices: HashMap::new(),
        lowlinks: HashMap::new(),
        stack: Vec::new(),
        on_stack: HashSet::new(),
        components: Vec::new(),
    };
    for symbol in symbols {
        if !state.indices.contains_key(symbol) {
            connect(&mut state, *symbol);
        }
    }
    state.components
}

/// Global elements reachable from `start` through one or more edges
fn reachable_elements(start: Symbol, edges: &HashMap<Symbol, Vec<Edge>>) -> Vec<ElementId> {
    let mut seen = HashSet::new();
    let mut queue: VecDeque<Symbol> = edges
        .get(&start)
        .into_iter()
        .flatten()
        .map(|e| e.target)
        .collect();
    let mut found = Vec::new();
    while let Some(symbol) = queue.pop_front() {
        if !seen.insert(symbol) {
            continue;
        }
        if let Symbol::Element(id) = symbol {
            found.push(id);
        }
        queue.extend(edges.get(&symbol).into_iter().flatten().map(|e| e.target));
    }
    found
}
