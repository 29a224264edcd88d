//! Builder Patterns for AST Construction
//!
//! Provides fluent APIs for constructing AST nodes, particularly useful for
//! tests and embedders that assemble programs without a parser.
//!
//! ## Example
//!
//! ```rust
//! use rampart::ast::builders::{ClauseBuilder, RelationBuilder};
//!
//! // Declare a relation: .decl edge(a:number, b:number) with input facts
//! let edge = RelationBuilder::new("edge")
//!     .attr("a", "number")
//!     .attr("b", "number")
//!     .input()
//!     .build();
//!
//! // Build a rule: path(x, y) :- edge(x, y).
//! let rule = ClauseBuilder::new("path")
//!     .head_vars(["x", "y"])
//!     .body_atom("edge", ["x", "y"])
//!     .build();
//!
//! // Build a recursive rule: path(x, z) :- path(x, y), edge(y, z).
//! let recursive = ClauseBuilder::new("path")
//!     .head_vars(["x", "z"])
//!     .body_atom("path", ["x", "y"])
//!     .body_atom("edge", ["y", "z"])
//!     .build();
//! # let _ = (edge, rule, recursive);
//! ```

use super::{
    Argument, Atom, Attribute, Clause, ConstraintOp, ExecutionPlan, Literal, LoadDirective,
    Relation, Representation, StoreDirective,
};

// ============================================================================
// AtomBuilder
// ============================================================================

/// Builder for constructing [`Atom`] instances
#[derive(Debug, Clone)]
pub struct AtomBuilder {
    name: String,
    args: Vec<Argument>,
}

impl AtomBuilder {
    /// Start a new atom for the given relation
    pub fn new(name: impl Into<String>) -> Self {
        AtomBuilder {
            name: name.into(),
            args: Vec::new(),
        }
    }

    /// Add a variable argument
    pub fn var(mut self, name: impl Into<String>) -> Self {
        self.args.push(Argument::Variable(name.into()));
        self
    }

    /// Add a signed constant argument
    pub fn num(mut self, value: i64) -> Self {
        self.args.push(Argument::Signed(value));
        self
    }

    /// Add an unnamed (wildcard) argument
    pub fn wildcard(mut self) -> Self {
        self.args.push(Argument::Unnamed);
        self
    }

    /// Add an arbitrary argument
    pub fn arg(mut self, arg: Argument) -> Self {
        self.args.push(arg);
        self
    }

    /// Finish building the atom
    pub fn build(self) -> Atom {
        Atom::new(self.name, self.args)
    }
}

// ============================================================================
// ClauseBuilder
// ============================================================================

/// Builder for constructing [`Clause`] instances
#[derive(Debug, Clone)]
pub struct ClauseBuilder {
    head: Atom,
    body: Vec<Literal>,
    plan: Option<ExecutionPlan>,
}

impl ClauseBuilder {
    /// Start a new clause with the given head relation
    pub fn new(head: impl Into<String>) -> Self {
        ClauseBuilder {
            head: Atom::new(head, Vec::new()),
            body: Vec::new(),
            plan: None,
        }
    }

    /// Set the head arguments to the given variables
    pub fn head_vars<S: Into<String>>(mut self, vars: impl IntoIterator<Item = S>) -> Self {
        self.head.args = vars
            .into_iter()
            .map(|v| Argument::Variable(v.into()))
            .collect();
        self
    }

    /// Add an arbitrary head argument
    pub fn head_arg(mut self, arg: Argument) -> Self {
        self.head.args.push(arg);
        self
    }

    /// Add a positive body atom over the given variables
    pub fn body_atom<S: Into<String>>(
        mut self,
        relation: impl Into<String>,
        vars: impl IntoIterator<Item = S>,
    ) -> Self {
        let args = vars
            .into_iter()
            .map(|v| Argument::Variable(v.into()))
            .collect();
        self.body.push(Literal::Atom(Atom::new(relation, args)));
        self
    }

    /// Add an arbitrary body literal
    pub fn literal(mut self, literal: Literal) -> Self {
        self.body.push(literal);
        self
    }

    /// Add a negated body atom over the given variables
    pub fn negation<S: Into<String>>(
        mut self,
        relation: impl Into<String>,
        vars: impl IntoIterator<Item = S>,
    ) -> Self {
        let args = vars
            .into_iter()
            .map(|v| Argument::Variable(v.into()))
            .collect();
        self.body.push(Literal::Negation(Atom::new(relation, args)));
        self
    }

    /// Add a binary constraint literal
    pub fn constraint(mut self, op: ConstraintOp, lhs: Argument, rhs: Argument) -> Self {
        self.body.push(Literal::Constraint { op, lhs, rhs });
        self
    }

    /// Attach an execution-plan order (1-based atom positions) for a version
    pub fn plan_order(mut self, version: usize, order: Vec<usize>) -> Self {
        self.plan
            .get_or_insert_with(ExecutionPlan::default)
            .orders
            .insert(version, order);
        self
    }

    /// Finish building the clause
    pub fn build(self) -> Clause {
        Clause {
            head: self.head,
            body: self.body,
            plan: self.plan,
        }
    }
}

// ============================================================================
// RelationBuilder
// ============================================================================

/// Builder for constructing [`Relation`] declarations
#[derive(Debug, Clone)]
pub struct RelationBuilder {
    name: String,
    attributes: Vec<Attribute>,
    representation: Representation,
    loads: Vec<LoadDirective>,
    stores: Vec<StoreDirective>,
}

impl RelationBuilder {
    /// Start a new relation declaration
    pub fn new(name: impl Into<String>) -> Self {
        RelationBuilder {
            name: name.into(),
            attributes: Vec::new(),
            representation: Representation::Default,
            loads: Vec::new(),
            stores: Vec::new(),
        }
    }

    /// Add a typed attribute
    pub fn attr(mut self, name: impl Into<String>, type_name: impl Into<String>) -> Self {
        self.attributes.push(Attribute {
            name: name.into(),
            type_name: type_name.into(),
        });
        self
    }

    /// Set the physical representation
    pub fn representation(mut self, representation: Representation) -> Self {
        self.representation = representation;
        self
    }

    /// Mark as input with a default load directive
    pub fn input(mut self) -> Self {
        self.loads.push(LoadDirective::default());
        self
    }

    /// Add a load directive with explicit key-value pairs
    pub fn load(mut self, directive: LoadDirective) -> Self {
        self.loads.push(directive);
        self
    }

    /// Mark as output with a default store directive
    pub fn output(mut self) -> Self {
        self.stores.push(StoreDirective::default());
        self
    }

    /// Add a print-size store directive
    pub fn print_size(mut self) -> Self {
        self.stores.push(StoreDirective {
            kvs: Default::default(),
            print_size: true,
        });
        self
    }

    /// Add a store directive with explicit key-value pairs
    pub fn store(mut self, directive: StoreDirective) -> Self {
        self.stores.push(directive);
        self
    }

    /// Finish building the relation
    pub fn build(self) -> Relation {
        Relation {
            name: self.name,
            attributes: self.attributes,
            representation: self.representation,
            loads: self.loads,
            stores: self.stores,
        }
    }
}
