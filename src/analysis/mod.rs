//! # Program Analyses
//!
//! Whole-program analyses consumed by the translator: the relation
//! dependency graph and its strongly-connected components (Tarjan's
//! algorithm), a topological evaluation order over the SCCs, the recursive
//! clause set, the relation expiry schedule, the type environment, and the
//! auxiliary-arity map driven by the provenance mode.
//!
//! A relation depends on every relation referenced by the bodies of its
//! clauses, through positive atoms, negations and aggregate sub-clauses
//! alike. Recursive relations lie in an SCC containing a cycle through
//! themselves.

use crate::ast::{Argument, Clause, Literal, Program, TypeKind};
use crate::config::{Config, ProvenanceMode};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

// ============================================================================
// Type environment
// ============================================================================

/// Resolved type declarations, primitive types included
#[derive(Debug, Clone)]
pub struct TypeEnvironment {
    kinds: BTreeMap<String, TypeKind>,
}

impl TypeEnvironment {
    /// Build the environment from a program's type declarations
    pub fn compute(program: &Program) -> Self {
        let mut kinds = BTreeMap::new();
        kinds.insert("number".to_string(), TypeKind::Signed);
        kinds.insert("unsigned".to_string(), TypeKind::Unsigned);
        kinds.insert("float".to_string(), TypeKind::Float);
        kinds.insert("symbol".to_string(), TypeKind::Symbol);
        for decl in &program.types {
            kinds.insert(decl.name.clone(), decl.kind);
        }
        TypeEnvironment { kinds }
    }

    /// Get the kind of a type name
    pub fn kind_of(&self, type_name: &str) -> Option<TypeKind> {
        self.kinds.get(type_name).copied()
    }

    /// Attribute type qualifier: kind character plus the type name
    pub fn qualifier(&self, type_name: &str) -> String {
        let kind = match self.kind_of(type_name) {
            Some(TypeKind::Unsigned) => 'u',
            Some(TypeKind::Float) => 'f',
            Some(TypeKind::Symbol) => 's',
            // unresolved names behave as signed numbers
            Some(TypeKind::Signed) | None => 'i',
        };
        format!("{kind}:{type_name}")
    }
}

// ============================================================================
// SCC graph
// ============================================================================

/// One strongly-connected component of the relation dependency graph
#[derive(Debug, Clone)]
pub struct SccNode {
    /// Relations inside this component
    pub relations: Vec<String>,
    /// True if the component contains a dependency cycle
    pub recursive: bool,
    /// Internal relations loaded from input
    pub inputs: Vec<String>,
    /// Internal relations stored as output
    pub outputs: Vec<String>,
}

/// The condensed relation dependency graph
#[derive(Debug, Clone)]
pub struct SccGraph {
    sccs: Vec<SccNode>,
    scc_of: HashMap<String, usize>,
    /// For each SCC, the set of SCCs it depends on
    dependencies: Vec<BTreeSet<usize>>,
}

impl SccGraph {
    /// Build the SCC graph for a program
    pub fn compute(program: &Program) -> Self {
        let names: Vec<&str> = program.relations.iter().map(|r| r.name.as_str()).collect();
        let index_of: HashMap<&str, usize> =
            names.iter().enumerate().map(|(i, n)| (*n, i)).collect();

        // relation-level dependency edges: head -> referenced body relation
        let mut edges: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); names.len()];
        for clause in &program.clauses {
            let Some(&head) = index_of.get(clause.head.name.as_str()) else {
                continue;
            };
            for referenced in referenced_relations(clause) {
                if let Some(&dep) = index_of.get(referenced) {
                    edges[head].insert(dep);
                }
            }
        }

        let components = tarjan(names.len(), &edges);

        let mut scc_of = HashMap::new();
        let mut sccs = Vec::with_capacity(components.len());
        for (scc_index, members) in components.iter().enumerate() {
            let recursive = members.len() > 1
                || members
                    .iter()
                    .any(|&rel| edges[rel].contains(&rel));
            let mut relations = Vec::new();
            let mut inputs = Vec::new();
            let mut outputs = Vec::new();
            for &rel_index in members {
                let rel = &program.relations[rel_index];
                scc_of.insert(rel.name.clone(), scc_index);
                relations.push(rel.name.clone());
                if rel.is_input() {
                    inputs.push(rel.name.clone());
                }
                if rel.is_output() {
                    outputs.push(rel.name.clone());
                }
            }
            sccs.push(SccNode {
                relations,
                recursive,
                inputs,
                outputs,
            });
        }

        // condense relation edges onto the SCCs
        let mut dependencies: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); sccs.len()];
        for (scc_index, members) in components.iter().enumerate() {
            for &rel in members {
                for &dep in &edges[rel] {
                    let dep_scc = scc_of[&program.relations[dep].name];
                    if dep_scc != scc_index {
                        dependencies[scc_index].insert(dep_scc);
                    }
                }
            }
        }

        SccGraph {
            sccs,
            scc_of,
            dependencies,
        }
    }

    /// Number of SCCs
    pub fn len(&self) -> usize {
        self.sccs.len()
    }

    /// True when the program declares no relations
    pub fn is_empty(&self) -> bool {
        self.sccs.is_empty()
    }

    /// The component a relation belongs to
    pub fn scc_of(&self, relation: &str) -> Option<usize> {
        self.scc_of.get(relation).copied()
    }

    /// True if both relations lie in the same SCC
    pub fn same_scc(&self, a: &str, b: &str) -> bool {
        match (self.scc_of(a), self.scc_of(b)) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        }
    }

    /// Access a component by index
    pub fn node(&self, scc: usize) -> &SccNode {
        &self.sccs[scc]
    }

    /// The SCCs a component depends on
    pub fn dependencies(&self, scc: usize) -> &BTreeSet<usize> {
        &self.dependencies[scc]
    }
}

/// Relations referenced by a clause body, aggregate sub-clauses included
fn referenced_relations(clause: &Clause) -> Vec<&str> {
    let mut result = Vec::new();
    for arg in &clause.head.args {
        collect_aggregate_relations(arg, &mut result);
    }
    for lit in &clause.body {
        if let Some(atom) = lit.atom() {
            result.push(atom.name.as_str());
        }
        for arg in lit.arguments() {
            collect_aggregate_relations(arg, &mut result);
        }
    }
    result
}

fn collect_aggregate_relations<'a>(arg: &'a Argument, out: &mut Vec<&'a str>) {
    match arg {
        Argument::Record(args)
        | Argument::Intrinsic { args, .. }
        | Argument::UserDefined { args, .. } => {
            for a in args {
                collect_aggregate_relations(a, out);
            }
        }
        Argument::Aggregator(agg) => {
            if let Some(target) = &agg.target {
                collect_aggregate_relations(target, out);
            }
            for lit in &agg.body {
                if let Some(atom) = lit.atom() {
                    out.push(atom.name.as_str());
                }
                for a in lit.arguments() {
                    collect_aggregate_relations(a, out);
                }
            }
        }
        _ => {}
    }
}

/// Tarjan's strongly-connected-components algorithm. Components are
/// returned dependencies-first.
fn tarjan(n: usize, edges: &[BTreeSet<usize>]) -> Vec<Vec<usize>> {
    struct State<'g> {
        edges: &'g [BTreeSet<usize>],
        index: usize,
        indices: Vec<Option<usize>>,
        lowlink: Vec<usize>,
        on_stack: Vec<bool>,
        stack: Vec<usize>,
        components: Vec<Vec<usize>>,
    }

    fn visit(state: &mut State<'_>, v: usize) {
        state.indices[v] = Some(state.index);
        state.lowlink[v] = state.index;
        state.index += 1;
        state.stack.push(v);
        state.on_stack[v] = true;

        for &w in &state.edges[v].clone() {
            if state.indices[w].is_none() {
                visit(state, w);
                state.lowlink[v] = state.lowlink[v].min(state.lowlink[w]);
            } else if state.on_stack[w] {
                state.lowlink[v] = state.lowlink[v].min(state.indices[w].unwrap_or(0));
            }
        }

        if Some(state.lowlink[v]) == state.indices[v] {
            let mut component = Vec::new();
            while let Some(w) = state.stack.pop() {
                state.on_stack[w] = false;
                component.push(w);
                if w == v {
                    break;
                }
            }
            component.sort_unstable();
            state.components.push(component);
        }
    }

    let mut state = State {
        edges,
        index: 0,
        indices: vec![None; n],
        lowlink: vec![0; n],
        on_stack: vec![false; n],
        stack: Vec::new(),
        components: Vec::new(),
    };
    for v in 0..n {
        if state.indices[v].is_none() {
            visit(&mut state, v);
        }
    }
    state.components
}

// ============================================================================
// Topological order
// ============================================================================

/// A topological evaluation order over the SCC graph
#[derive(Debug, Clone)]
pub struct TopologicalOrder {
    order: Vec<usize>,
}

impl TopologicalOrder {
    /// Compute a deterministic topological order (Kahn's algorithm)
    pub fn compute(graph: &SccGraph) -> Self {
        let n = graph.len();
        let mut remaining: Vec<usize> = (0..n)
            .map(|scc| graph.dependencies(scc).len())
            .collect();
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
        for scc in 0..n {
            for &dep in graph.dependencies(scc) {
                dependents[dep].push(scc);
            }
        }

        let mut ready: BTreeSet<usize> = (0..n).filter(|&s| remaining[s] == 0).collect();
        let mut order = Vec::with_capacity(n);
        while let Some(&next) = ready.iter().next() {
            ready.remove(&next);
            order.push(next);
            for &dependent in &dependents[next] {
                remaining[dependent] -= 1;
                if remaining[dependent] == 0 {
                    ready.insert(dependent);
                }
            }
        }
        debug_assert_eq!(order.len(), n, "dependency graph contains a cycle");
        TopologicalOrder { order }
    }

    /// SCC indices in evaluation order
    pub fn order(&self) -> &[usize] {
        &self.order
    }
}

// ============================================================================
// Recursive clauses
// ============================================================================

/// The set of clauses participating in a recursive computation
#[derive(Debug, Clone)]
pub struct RecursiveClauses {
    recursive: HashSet<usize>,
}

impl RecursiveClauses {
    /// A clause is recursive when some positive body atom's relation lies
    /// in the same SCC as its head.
    pub fn compute(program: &Program, graph: &SccGraph) -> Self {
        let mut recursive = HashSet::new();
        for (index, clause) in program.clauses.iter().enumerate() {
            let head = clause.head.name.as_str();
            let is_recursive = clause.body.iter().any(|lit| match lit {
                Literal::Atom(atom) => graph.same_scc(head, &atom.name),
                _ => false,
            });
            if is_recursive {
                recursive.insert(index);
            }
        }
        RecursiveClauses { recursive }
    }

    /// Check whether the clause at the given program index is recursive
    pub fn is_recursive(&self, clause_index: usize) -> bool {
        self.recursive.contains(&clause_index)
    }
}

// ============================================================================
// Relation expiry schedule
// ============================================================================

/// For each step of the topological order, the relations whose last use is
/// that step and which may be cleared afterwards.
#[derive(Debug, Clone)]
pub struct RelationSchedule {
    expired: Vec<Vec<String>>,
}

impl RelationSchedule {
    /// Compute the expiry schedule over the topological order
    pub fn compute(program: &Program, graph: &SccGraph, order: &TopologicalOrder) -> Self {
        let mut last_use: BTreeMap<&str, usize> = BTreeMap::new();
        for (position, &scc) in order.order().iter().enumerate() {
            for rel in &graph.node(scc).relations {
                last_use.insert(rel.as_str(), position);
                for (_, clause) in program.clauses_of(rel) {
                    for referenced in referenced_relations(clause) {
                        last_use.insert(referenced, position);
                    }
                }
            }
        }

        let mut expired = vec![Vec::new(); order.order().len()];
        for (rel, position) in last_use {
            expired[position].push(rel.to_string());
        }
        RelationSchedule { expired }
    }

    /// Relations expiring at the given step of the topological order
    pub fn expired_at(&self, position: usize) -> &[String] {
        &self.expired[position]
    }
}

// ============================================================================
// Auxiliary arity
// ============================================================================

/// Number of trailing annotation columns per relation, as dictated by the
/// provenance mode.
#[derive(Debug, Clone, Copy)]
pub struct AuxArity {
    aux: usize,
}

impl AuxArity {
    /// Compute the auxiliary arity for the configured provenance mode
    pub fn compute(program: &Program, config: &Config) -> Self {
        let aux = match config.provenance {
            None => 0,
            // rule number + level annotation
            Some(ProvenanceMode::Explain) => 2,
            // rule number + one height column per body atom position
            Some(ProvenanceMode::SubtreeHeights) => {
                let max_atoms = program
                    .clauses
                    .iter()
                    .map(|c| c.positive_atom_positions().len())
                    .max()
                    .unwrap_or(0);
                1 + max_atoms
            }
        };
        AuxArity { aux }
    }

    /// Auxiliary arity of a relation
    pub fn arity_of(&self, relation: &str) -> usize {
        if relation.starts_with("@info_") {
            0
        } else {
            self.aux
        }
    }

    /// Auxiliary arity used when evaluating an atom: `@delta_X` and
    /// `@new_X` resolve through the original relation `X`; `@info_`
    /// relations evaluate with no annotation columns.
    pub fn evaluation_arity(&self, atom_name: &str) -> usize {
        if let Some(original) = atom_name.strip_prefix("@delta_") {
            self.arity_of(original)
        } else if let Some(original) = atom_name.strip_prefix("@new_") {
            self.arity_of(original)
        } else {
            self.arity_of(atom_name)
        }
    }
}

// ============================================================================
// Bundle
// ============================================================================

/// All analyses the translator consumes, computed once per program
#[derive(Debug, Clone)]
pub struct Analyses {
    pub type_env: TypeEnvironment,
    pub scc_graph: SccGraph,
    pub topological_order: TopologicalOrder,
    pub recursive_clauses: RecursiveClauses,
    pub schedule: RelationSchedule,
    pub aux_arity: AuxArity,
}

impl Analyses {
    /// Run every analysis over the program
    pub fn compute(program: &Program, config: &Config) -> Self {
        let type_env = TypeEnvironment::compute(program);
        let scc_graph = SccGraph::compute(program);
        let topological_order = TopologicalOrder::compute(&scc_graph);
        let recursive_clauses = RecursiveClauses::compute(program, &scc_graph);
        let schedule = RelationSchedule::compute(program, &scc_graph, &topological_order);
        let aux_arity = AuxArity::compute(program, config);
        Analyses {
            type_env,
            scc_graph,
            topological_order,
            recursive_clauses,
            schedule,
            aux_arity,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
