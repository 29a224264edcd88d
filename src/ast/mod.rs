//! # Rule AST
//!
//! Abstract syntax tree for typed, semantically-analysed Datalog programs.
//! This is the input of the translator: parsing, name resolution and type
//! checking all happen upstream, so the types here carry resolved names and
//! pre-computed constant representations only.
//!
//! ## Builders
//!
//! For programmatic construction of AST nodes, see the [`builders`] module
//! which provides fluent APIs like `ClauseBuilder` and `RelationBuilder`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub mod builders;

// ============================================================================
// Operators
// ============================================================================

/// Aggregation operators supported in rule bodies and heads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AggregateOp {
    Min,
    Max,
    Count,
    Sum,
}

impl AggregateOp {
    /// Parse an aggregate operator name
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "min" => Some(AggregateOp::Min),
            "max" => Some(AggregateOp::Max),
            "count" => Some(AggregateOp::Count),
            "sum" => Some(AggregateOp::Sum),
            _ => None,
        }
    }

    /// Get the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregateOp::Min => "min",
            AggregateOp::Max => "max",
            AggregateOp::Count => "count",
            AggregateOp::Sum => "sum",
        }
    }
}

/// Binary constraint operators for body literals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConstraintOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl ConstraintOp {
    /// Parse a constraint operator from its surface syntax
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "=" => Some(ConstraintOp::Eq),
            "!=" => Some(ConstraintOp::Ne),
            "<" => Some(ConstraintOp::Lt),
            "<=" => Some(ConstraintOp::Le),
            ">" => Some(ConstraintOp::Gt),
            ">=" => Some(ConstraintOp::Ge),
            _ => None,
        }
    }

    /// Get the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            ConstraintOp::Eq => "=",
            ConstraintOp::Ne => "!=",
            ConstraintOp::Lt => "<",
            ConstraintOp::Le => "<=",
            ConstraintOp::Gt => ">",
            ConstraintOp::Ge => ">=",
        }
    }
}

/// Intrinsic functor operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FunctorOp {
    /// Addition (+)
    Add,
    /// Subtraction (-)
    Sub,
    /// Multiplication (*)
    Mul,
    /// Division (/)
    Div,
    /// Modulo (%)
    Mod,
    /// Exponentiation (^)
    Exp,
    /// Unary negation
    Neg,
    /// Bitwise and
    BitAnd,
    /// Bitwise or
    BitOr,
    /// Bitwise xor
    BitXor,
    /// String concatenation
    Cat,
    /// Ordinal of a symbol
    Ord,
    /// String length
    StrLen,
    /// Symbol to number conversion
    ToNumber,
    /// Number to symbol conversion
    ToString,
}

impl FunctorOp {
    /// Get the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            FunctorOp::Add => "+",
            FunctorOp::Sub => "-",
            FunctorOp::Mul => "*",
            FunctorOp::Div => "/",
            FunctorOp::Mod => "%",
            FunctorOp::Exp => "^",
            FunctorOp::Neg => "-",
            FunctorOp::BitAnd => "band",
            FunctorOp::BitOr => "bor",
            FunctorOp::BitXor => "bxor",
            FunctorOp::Cat => "cat",
            FunctorOp::Ord => "ord",
            FunctorOp::StrLen => "strlen",
            FunctorOp::ToNumber => "to_number",
            FunctorOp::ToString => "to_string",
        }
    }

    /// True for operators written infix between two arguments
    pub fn is_infix(&self) -> bool {
        matches!(
            self,
            FunctorOp::Add
                | FunctorOp::Sub
                | FunctorOp::Mul
                | FunctorOp::Div
                | FunctorOp::Mod
                | FunctorOp::Exp
        )
    }
}

// ============================================================================
// Arguments
// ============================================================================

/// An aggregation sub-clause: operator, optional target expression, and a
/// body restricted to at most one atom plus constraints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aggregator {
    pub op: AggregateOp,
    pub target: Option<Box<Argument>>,
    pub body: Vec<Literal>,
}

impl Aggregator {
    /// The first positive atom of the aggregate body, if any
    pub fn first_atom(&self) -> Option<&Atom> {
        self.body.iter().find_map(|lit| match lit {
            Literal::Atom(atom) => Some(atom),
            _ => None,
        })
    }

    /// Number of positive atoms in the aggregate body
    pub fn atom_count(&self) -> usize {
        self.body
            .iter()
            .filter(|lit| matches!(lit, Literal::Atom(_)))
            .count()
    }
}

/// An argument position inside an atom, record or functor.
///
/// Constants carry their pre-computed numeric representation: string
/// constants store the symbol-table index assigned at construction time,
/// nil lowers to the signed constant 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Argument {
    /// A named variable
    Variable(String),
    /// An unnamed variable (`_`)
    Unnamed,
    /// Signed integer constant
    Signed(i64),
    /// Unsigned integer constant
    Unsigned(u64),
    /// Floating point constant
    Float(f64),
    /// String constant with its interned symbol index
    Str { text: String, index: usize },
    /// The nil record constant
    Nil,
    /// Record initialiser
    Record(Vec<Argument>),
    /// Intrinsic functor application
    Intrinsic { op: FunctorOp, args: Vec<Argument> },
    /// User-defined functor application
    UserDefined { name: String, args: Vec<Argument> },
    /// Auto-incrementing counter (`$`)
    Counter,
    /// Aggregation
    Aggregator(Aggregator),
    /// Subroutine argument (provenance subroutines only)
    SubroutineArg(usize),
}

impl Argument {
    /// Check if this argument is a named variable
    pub fn is_variable(&self) -> bool {
        matches!(self, Argument::Variable(_))
    }

    /// Check if this argument is a constant of any flavour
    pub fn is_constant(&self) -> bool {
        matches!(
            self,
            Argument::Signed(_)
                | Argument::Unsigned(_)
                | Argument::Float(_)
                | Argument::Str { .. }
                | Argument::Nil
        )
    }

    /// Check if this argument is a functor application
    pub fn is_functor(&self) -> bool {
        matches!(
            self,
            Argument::Intrinsic { .. } | Argument::UserDefined { .. }
        )
    }

    /// Get the variable name if this is a variable
    pub fn as_variable(&self) -> Option<&str> {
        if let Argument::Variable(name) = self {
            Some(name)
        } else {
            None
        }
    }

    /// Check whether a counter occurs anywhere below this argument
    pub fn contains_counter(&self) -> bool {
        match self {
            Argument::Counter => true,
            Argument::Record(args)
            | Argument::Intrinsic { args, .. }
            | Argument::UserDefined { args, .. } => args.iter().any(Argument::contains_counter),
            Argument::Aggregator(agg) => {
                agg.target.as_deref().is_some_and(Argument::contains_counter)
                    || agg
                        .body
                        .iter()
                        .any(|lit| lit.arguments().iter().any(|a| a.contains_counter()))
            }
            _ => false,
        }
    }

    /// Visit every named variable below this argument, depth-first
    pub fn for_each_variable<'a>(&'a self, f: &mut impl FnMut(&'a str)) {
        match self {
            Argument::Variable(name) => f(name),
            Argument::Record(args)
            | Argument::Intrinsic { args, .. }
            | Argument::UserDefined { args, .. } => {
                for arg in args {
                    arg.for_each_variable(f);
                }
            }
            Argument::Aggregator(agg) => {
                if let Some(target) = &agg.target {
                    target.for_each_variable(f);
                }
                for lit in &agg.body {
                    lit.for_each_variable(f);
                }
            }
            _ => {}
        }
    }
}

impl fmt::Display for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Argument::Variable(name) => write!(f, "{name}"),
            Argument::Unnamed => write!(f, "_"),
            Argument::Signed(v) => write!(f, "{v}"),
            Argument::Unsigned(v) => write!(f, "{v}"),
            Argument::Float(v) => write!(f, "{v}"),
            Argument::Str { text, .. } => write!(f, "\"{text}\""),
            Argument::Nil => write!(f, "nil"),
            Argument::Record(args) => {
                write!(f, "[")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, "]")
            }
            Argument::Intrinsic { op, args } => {
                if op.is_infix() && args.len() == 2 {
                    write!(f, "({} {} {})", args[0], op.as_str(), args[1])
                } else {
                    write!(f, "{}(", op.as_str())?;
                    for (i, arg) in args.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{arg}")?;
                    }
                    write!(f, ")")
                }
            }
            Argument::UserDefined { name, args } => {
                write!(f, "@{name}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ")")
            }
            Argument::Counter => write!(f, "$"),
            Argument::Aggregator(agg) => {
                write!(f, "{}", agg.op.as_str())?;
                if let Some(target) = &agg.target {
                    write!(f, " {target}")?;
                }
                write!(f, " : {{ ")?;
                for (i, lit) in agg.body.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{lit}")?;
                }
                write!(f, " }}")
            }
            Argument::SubroutineArg(i) => write!(f, "arg_{i}"),
        }
    }
}

// ============================================================================
// Atoms and literals
// ============================================================================

/// A relation applied to an ordered argument list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Atom {
    pub name: String,
    pub args: Vec<Argument>,
}

impl Atom {
    /// Create a new atom
    pub fn new(name: impl Into<String>, args: Vec<Argument>) -> Self {
        Atom {
            name: name.into(),
            args,
        }
    }

    /// Get the arity (number of arguments) of this atom
    pub fn arity(&self) -> usize {
        self.args.len()
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{arg}")?;
        }
        write!(f, ")")
    }
}

/// A body literal: a positive atom, a (provenance) negation, or a binary
/// constraint between two argument expressions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Atom(Atom),
    Negation(Atom),
    ProvenanceNegation(Atom),
    Constraint {
        op: ConstraintOp,
        lhs: Argument,
        rhs: Argument,
    },
}

impl Literal {
    /// Get the underlying atom for atom-shaped literals
    pub fn atom(&self) -> Option<&Atom> {
        match self {
            Literal::Atom(atom) | Literal::Negation(atom) | Literal::ProvenanceNegation(atom) => {
                Some(atom)
            }
            Literal::Constraint { .. } => None,
        }
    }

    /// Check if this is a positive atom
    pub fn is_positive(&self) -> bool {
        matches!(self, Literal::Atom(_))
    }

    /// All argument expressions of this literal, in order
    pub fn arguments(&self) -> Vec<&Argument> {
        match self {
            Literal::Atom(atom) | Literal::Negation(atom) | Literal::ProvenanceNegation(atom) => {
                atom.args.iter().collect()
            }
            Literal::Constraint { lhs, rhs, .. } => vec![lhs, rhs],
        }
    }

    /// Visit every named variable below this literal, depth-first
    pub fn for_each_variable<'a>(&'a self, f: &mut impl FnMut(&'a str)) {
        for arg in self.arguments() {
            arg.for_each_variable(f);
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Atom(atom) => write!(f, "{atom}"),
            Literal::Negation(atom) => write!(f, "!{atom}"),
            Literal::ProvenanceNegation(atom) => write!(f, "prov!{atom}"),
            Literal::Constraint { op, lhs, rhs } => {
                write!(f, "{lhs} {} {rhs}", op.as_str())
            }
        }
    }
}

// ============================================================================
// Clauses
// ============================================================================

/// A user-supplied execution plan: for each semi-naive version, a 1-based
/// permutation of the clause's positive body atoms.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub orders: BTreeMap<usize, Vec<usize>>,
}

/// A single rule: head atom, ordered body literals, optional execution plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clause {
    pub head: Atom,
    pub body: Vec<Literal>,
    pub plan: Option<ExecutionPlan>,
}

impl Clause {
    /// Create a new clause
    pub fn new(head: Atom, body: Vec<Literal>) -> Self {
        Clause {
            head,
            body,
            plan: None,
        }
    }

    /// Check if this clause is a fact (no body literals)
    pub fn is_fact(&self) -> bool {
        self.body.is_empty()
    }

    /// Body positions (literal indices) of the positive atoms, in order
    pub fn positive_atom_positions(&self) -> Vec<usize> {
        self.body
            .iter()
            .enumerate()
            .filter_map(|(i, lit)| lit.is_positive().then_some(i))
            .collect()
    }

    /// Reorder the positive body atoms: the atom at position `order[i]` of
    /// the current atom list moves to atom position `i`. Non-atom literals
    /// keep their places in the body.
    pub fn reorder_atoms(&mut self, order: &[usize]) {
        let positions = self.positive_atom_positions();
        assert_eq!(order.len(), positions.len(), "invalid atom permutation");
        let atoms: Vec<Literal> = positions
            .iter()
            .map(|&pos| self.body[pos].clone())
            .collect();
        for (slot, &src) in positions.iter().zip(order.iter()) {
            self.body[*slot] = atoms[src].clone();
        }
    }

    /// Visit every named variable in head and body, depth-first
    pub fn for_each_variable<'a>(&'a self, f: &mut impl FnMut(&'a str)) {
        for arg in &self.head.args {
            arg.for_each_variable(f);
        }
        for lit in &self.body {
            lit.for_each_variable(f);
        }
    }
}

impl fmt::Display for Clause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.head)?;
        if self.body.is_empty() {
            return write!(f, ".");
        }
        write!(f, " :- ")?;
        for (i, lit) in self.body.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{lit}")?;
        }
        write!(f, ".")
    }
}

// ============================================================================
// Relations and declarations
// ============================================================================

/// Physical representation of a relation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Representation {
    #[default]
    Default,
    Btree,
    Brie,
    /// Union-find backed equivalence relation
    EqRel,
    /// Provenance info relation (not evaluated)
    Info,
}

/// A named, typed attribute of a relation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    pub type_name: String,
}

/// A load declaration with its key-value directive map
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LoadDirective {
    pub kvs: BTreeMap<String, String>,
}

/// A store declaration with its key-value directive map.
///
/// `print_size` stores report the relation's cardinality instead of its
/// tuples.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StoreDirective {
    pub kvs: BTreeMap<String, String>,
    pub print_size: bool,
}

/// A relation declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    pub name: String,
    pub attributes: Vec<Attribute>,
    pub representation: Representation,
    pub loads: Vec<LoadDirective>,
    pub stores: Vec<StoreDirective>,
}

impl Relation {
    /// Get the arity (total attribute count, auxiliary columns included)
    pub fn arity(&self) -> usize {
        self.attributes.len()
    }

    /// Check if this relation is loaded from input
    pub fn is_input(&self) -> bool {
        !self.loads.is_empty()
    }

    /// Check if this relation is stored as output
    pub fn is_output(&self) -> bool {
        !self.stores.is_empty()
    }
}

/// Kinds of declared types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeKind {
    Signed,
    Unsigned,
    Float,
    Symbol,
}

/// A type declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDecl {
    pub name: String,
    pub kind: TypeKind,
}

/// A user-defined functor declaration with its type signature
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctorDecl {
    pub name: String,
    pub signature: String,
}

// ============================================================================
// Programs
// ============================================================================

/// A complete analysed program: type declarations, functor declarations,
/// relation declarations and clauses.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Program {
    pub types: Vec<TypeDecl>,
    pub functors: Vec<FunctorDecl>,
    pub relations: Vec<Relation>,
    pub clauses: Vec<Clause>,
}

impl Program {
    /// Create a new empty program
    pub fn new() -> Self {
        Program::default()
    }

    /// Look up a relation declaration by name
    pub fn relation(&self, name: &str) -> Option<&Relation> {
        self.relations.iter().find(|r| r.name == name)
    }

    /// Look up a functor declaration by name
    pub fn functor(&self, name: &str) -> Option<&FunctorDecl> {
        self.functors.iter().find(|f| f.name == name)
    }

    /// Clauses whose head is the given relation, with their global indices
    pub fn clauses_of<'a>(
        &'a self,
        relation: &'a str,
    ) -> impl Iterator<Item = (usize, &'a Clause)> + 'a {
        self.clauses
            .iter()
            .enumerate()
            .filter(move |(_, c)| c.head.name == relation)
    }
}

// ============================================================================
// Tests
// ============================================================================
