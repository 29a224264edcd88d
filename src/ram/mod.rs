//! # RAM IR
//!
//! Relational algebra machine types: the translator's output. A RAM program
//! is an imperative schedule of relational statements (load, query, loop,
//! store, clear) whose queries are trees of nested operations (scan, filter,
//! unpack, aggregate, project).
//!
//! The IR is a strict ownership tree: every node owns its children and
//! relations are referenced by name through the program's relation list.
//! Tuple elements address the enclosing scan levels as `t<level>.<column>`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ============================================================================
// Relations
// ============================================================================

/// Physical representation of a RAM relation
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

impl Representation {
    /// Get the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Representation::Default => "default",
            Representation::Btree => "btree",
            Representation::Brie => "brie",
            Representation::EqRel => "eqrel",
            Representation::Info => "info",
        }
    }
}

/// A RAM relation: name, shape and representation.
///
/// For a relation of arity `arity` with auxiliary arity `aux_arity`, the
/// user-visible columns are `[0, arity - aux_arity)`; the trailing columns
/// carry provenance annotations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    pub name: String,
    pub arity: usize,
    pub aux_arity: usize,
    pub attributes: Vec<String>,
    pub attribute_types: Vec<String>,
    pub representation: Representation,
}

// ============================================================================
// Expressions
// ============================================================================

/// Intrinsic operators of RAM expressions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IntrinsicOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Exp,
    Neg,
    BitAnd,
    BitOr,
    BitXor,
    Cat,
    Ord,
    StrLen,
    ToNumber,
    ToString,
}

impl IntrinsicOp {
    /// Get the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            IntrinsicOp::Add => "+",
            IntrinsicOp::Sub => "-",
            IntrinsicOp::Mul => "*",
            IntrinsicOp::Div => "/",
            IntrinsicOp::Mod => "%",
            IntrinsicOp::Exp => "^",
            IntrinsicOp::Neg => "-",
            IntrinsicOp::BitAnd => "band",
            IntrinsicOp::BitOr => "bor",
            IntrinsicOp::BitXor => "bxor",
            IntrinsicOp::Cat => "cat",
            IntrinsicOp::Ord => "ord",
            IntrinsicOp::StrLen => "strlen",
            IntrinsicOp::ToNumber => "to_number",
            IntrinsicOp::ToString => "to_string",
        }
    }
}

/// A RAM value expression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expression {
    /// Column `element` of the tuple bound at scan level `level`
    TupleElement { level: usize, element: usize },
    /// Signed integer constant
    Signed(i64),
    /// Unsigned integer constant
    Unsigned(u64),
    /// Floating point constant
    Float(f64),
    /// The undefined value (wildcard slot in existence checks)
    Undefined,
    /// Auto-incrementing counter
    AutoIncrement,
    /// Intrinsic operator application
    Intrinsic {
        op: IntrinsicOp,
        args: Vec<Expression>,
    },
    /// User-defined operator application with its type signature
    UserDefined {
        name: String,
        signature: String,
        args: Vec<Expression>,
    },
    /// Pack arguments into a record reference
    PackRecord(Vec<Expression>),
    /// Subroutine argument by index
    SubroutineArg(usize),
}

impl Expression {
    /// Check if this is the undefined value
    pub fn is_undefined(&self) -> bool {
        matches!(self, Expression::Undefined)
    }

    /// Shorthand for a tuple-element expression
    pub fn tuple(level: usize, element: usize) -> Self {
        Expression::TupleElement { level, element }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::TupleElement { level, element } => write!(f, "t{level}.{element}"),
            Expression::Signed(v) => write!(f, "{v}"),
            Expression::Unsigned(v) => write!(f, "{v}u"),
            Expression::Float(v) => write!(f, "{v}f"),
            Expression::Undefined => write!(f, "_"),
            Expression::AutoIncrement => write!(f, "autoinc()"),
            Expression::Intrinsic { op, args } => {
                write!(f, "({}", op.as_str())?;
                for arg in args {
                    write!(f, " {arg}")?;
                }
                write!(f, ")")
            }
            Expression::UserDefined { name, args, .. } => {
                write!(f, "@{name}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ")")
            }
            Expression::PackRecord(args) => {
                write!(f, "[")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, "]")
            }
            Expression::SubroutineArg(i) => write!(f, "arg({i})"),
        }
    }
}

// ============================================================================
// Conditions
// ============================================================================

/// Comparison operators of RAM constraints
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

/// A RAM condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Condition {
    /// Always holds
    True,
    /// Binary comparison between two expressions
    Constraint {
        op: ConstraintOp,
        lhs: Expression,
        rhs: Expression,
    },
    /// Both conditions hold
    Conjunction(Box<Condition>, Box<Condition>),
    /// The condition does not hold
    Negation(Box<Condition>),
    /// The tuple exists in the relation; undefined slots are wildcards
    ExistenceCheck {
        relation: String,
        tuple: Vec<Expression>,
    },
    /// Existence check ignoring provenance columns
    ProvenanceExistenceCheck {
        relation: String,
        tuple: Vec<Expression>,
    },
    /// The relation holds no tuples
    EmptinessCheck { relation: String },
}

impl Condition {
    /// Conjoin a new condition onto an optional accumulator
    pub fn conjoin(acc: Option<Condition>, next: Condition) -> Condition {
        match acc {
            Some(prev) => Condition::Conjunction(Box::new(prev), Box::new(next)),
            None => next,
        }
    }

    /// Wrap this condition in a negation
    pub fn negated(self) -> Condition {
        Condition::Negation(Box::new(self))
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::True => write!(f, "true"),
            Condition::Constraint { op, lhs, rhs } => {
                write!(f, "({lhs} {} {rhs})", op.as_str())
            }
            Condition::Conjunction(lhs, rhs) => write!(f, "({lhs} AND {rhs})"),
            Condition::Negation(inner) => write!(f, "NOT {inner}"),
            Condition::ExistenceCheck { relation, tuple } => {
                write!(f, "(")?;
                for (i, value) in tuple.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{value}")?;
                }
                write!(f, ") IN {relation}")
            }
            Condition::ProvenanceExistenceCheck { relation, tuple } => {
                write!(f, "PROV (")?;
                for (i, value) in tuple.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{value}")?;
                }
                write!(f, ") IN {relation}")
            }
            Condition::EmptinessCheck { relation } => write!(f, "ISEMPTY({relation})"),
        }
    }
}

// ============================================================================
// Operations
// ============================================================================

/// Aggregate functions of RAM aggregate operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AggregateFunction {
    Min,
    Max,
    Count,
    Sum,
}

impl AggregateFunction {
    /// Get the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregateFunction::Min => "MIN",
            AggregateFunction::Max => "MAX",
            AggregateFunction::Count => "COUNT",
            AggregateFunction::Sum => "SUM",
        }
    }
}

/// A tuple-at-a-time RAM operation; operations nest into loop trees
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operation {
    /// Iterate the relation's tuples, binding them at `level`
    Scan {
        relation: String,
        level: usize,
        inner: Box<Operation>,
        /// Frequency annotation emitted under profiling
        profile_text: Option<String>,
    },
    /// Unpack a record reference into a tuple at `level`
    UnpackRecord {
        inner: Box<Operation>,
        level: usize,
        expression: Expression,
        arity: usize,
    },
    /// Compute an aggregate over a relation, binding the result at
    /// `(level, 0)`
    Aggregate {
        inner: Box<Operation>,
        function: AggregateFunction,
        relation: String,
        expression: Expression,
        condition: Condition,
        level: usize,
    },
    /// Run the inner operation only when the condition holds
    Filter {
        condition: Condition,
        inner: Box<Operation>,
    },
    /// Abort the enclosing scan when the condition holds
    Break {
        condition: Condition,
        inner: Box<Operation>,
    },
    /// Insert a tuple into a relation
    Project {
        relation: String,
        values: Vec<Expression>,
    },
    /// Return values from a subroutine invocation
    SubroutineReturn(Vec<Expression>),
}

impl Operation {
    /// Pretty print the operation tree
    pub fn pretty_print(&self, indent: usize) -> String {
        let prefix = "  ".repeat(indent);
        match self {
            Operation::Scan {
                relation,
                level,
                inner,
                profile_text,
            } => {
                let freq = profile_text
                    .as_ref()
                    .map(|t| format!(" ({t})"))
                    .unwrap_or_default();
                format!(
                    "{prefix}FOR t{level} IN {relation}{freq}\n{}",
                    inner.pretty_print(indent + 1)
                )
            }
            Operation::UnpackRecord {
                inner,
                level,
                expression,
                arity,
            } => format!(
                "{prefix}UNPACK t{level} ARITY {arity} FROM {expression}\n{}",
                inner.pretty_print(indent + 1)
            ),
            Operation::Aggregate {
                inner,
                function,
                relation,
                expression,
                condition,
                level,
            } => format!(
                "{prefix}t{level}.0 = {} {expression} FOR ALL t{level} IN {relation} WHERE {condition}\n{}",
                function.as_str(),
                inner.pretty_print(indent + 1)
            ),
            Operation::Filter { condition, inner } => format!(
                "{prefix}IF {condition}\n{}",
                inner.pretty_print(indent + 1)
            ),
            Operation::Break { condition, inner } => format!(
                "{prefix}IF {condition} BREAK\n{}",
                inner.pretty_print(indent + 1)
            ),
            Operation::Project { relation, values } => {
                let values: Vec<String> = values.iter().map(ToString::to_string).collect();
                format!("{prefix}INSERT ({}) INTO {relation}", values.join(", "))
            }
            Operation::SubroutineReturn(values) => {
                let values: Vec<String> = values.iter().map(ToString::to_string).collect();
                format!("{prefix}RETURN ({})", values.join(", "))
            }
        }
    }
}

// ============================================================================
// I/O directives
// ============================================================================

/// Key-value directive map attached to load and store statements
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IoDirectives {
    kvs: BTreeMap<String, String>,
}

impl IoDirectives {
    /// Create an empty directive map
    pub fn new() -> Self {
        IoDirectives::default()
    }

    /// Create from existing key-value pairs
    pub fn from_map(kvs: BTreeMap<String, String>) -> Self {
        IoDirectives { kvs }
    }

    /// Check if a key is present
    pub fn has(&self, key: &str) -> bool {
        self.kvs.contains_key(key)
    }

    /// Get a directive value
    pub fn get(&self, key: &str) -> Option<&str> {
        self.kvs.get(key).map(String::as_str)
    }

    /// Set a directive value
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.kvs.insert(key.into(), value.into());
    }

    /// Get the IO type, if set
    pub fn io_type(&self) -> Option<&str> {
        self.get("IO")
    }
}

impl fmt::Display for IoDirectives {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (key, value)) in self.kvs.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{key}={value}")?;
        }
        write!(f, "}}")
    }
}

// ============================================================================
// Statements
// ============================================================================

/// An imperative RAM statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Statement {
    /// Execute one operation tree
    Query(Operation),
    /// Execute statements in order
    Sequence(Vec<Statement>),
    /// Execute statements concurrently; arms share no mutable relations
    Parallel(Vec<Statement>),
    /// Fixpoint loop: run `body`, then `update`, until `exit` holds
    Loop {
        body: Box<Statement>,
        exit: Condition,
        update: Box<Statement>,
    },
    /// Swap the contents of two relations
    Swap { first: String, second: String },
    /// Remove all tuples from a relation
    Clear(String),
    /// Union the equivalence classes of `source` into `target`
    Extend { target: String, source: String },
    /// Load a relation from its input directives
    Load {
        relation: String,
        directives: Vec<IoDirectives>,
    },
    /// Store a relation to its output directives
    Store {
        relation: String,
        directives: Vec<IoDirectives>,
    },
    /// Time the inner statement under the given log message
    LogTimer {
        inner: Box<Statement>,
        message: String,
    },
    /// Time the inner statement and log the relation's size
    LogRelationTimer {
        inner: Box<Statement>,
        message: String,
        relation: String,
    },
    /// Log the size of a relation
    LogSize { relation: String, message: String },
    /// Attach diagnostic text to the inner statement
    DebugInfo {
        inner: Box<Statement>,
        message: String,
    },
}

impl Statement {
    /// Pretty print the statement tree
    pub fn pretty_print(&self, indent: usize) -> String {
        let prefix = "  ".repeat(indent);
        match self {
            Statement::Query(op) => {
                format!("{prefix}QUERY\n{}", op.pretty_print(indent + 1))
            }
            Statement::Sequence(stmts) => stmts
                .iter()
                .map(|s| s.pretty_print(indent))
                .collect::<Vec<_>>()
                .join("\n"),
            Statement::Parallel(stmts) => {
                let body = stmts
                    .iter()
                    .map(|s| s.pretty_print(indent + 1))
                    .collect::<Vec<_>>()
                    .join("\n");
                format!("{prefix}PARALLEL\n{body}\n{prefix}END PARALLEL")
            }
            Statement::Loop { body, exit, update } => format!(
                "{prefix}LOOP\n{}\n{prefix}UPDATE\n{}\n{prefix}EXIT {exit}\n{prefix}END LOOP",
                body.pretty_print(indent + 1),
                update.pretty_print(indent + 1)
            ),
            Statement::Swap { first, second } => format!("{prefix}SWAP ({first}, {second})"),
            Statement::Clear(relation) => format!("{prefix}CLEAR {relation}"),
            Statement::Extend { target, source } => {
                format!("{prefix}EXTEND {target} WITH {source}")
            }
            Statement::Load {
                relation,
                directives,
            } => {
                let dirs: Vec<String> = directives.iter().map(ToString::to_string).collect();
                format!("{prefix}LOAD {relation} FROM {}", dirs.join(", "))
            }
            Statement::Store {
                relation,
                directives,
            } => {
                let dirs: Vec<String> = directives.iter().map(ToString::to_string).collect();
                format!("{prefix}STORE {relation} TO {}", dirs.join(", "))
            }
            Statement::LogTimer { inner, message } => format!(
                "{prefix}LOGTIMER \"{message}\"\n{}",
                inner.pretty_print(indent + 1)
            ),
            Statement::LogRelationTimer {
                inner,
                message,
                relation,
            } => format!(
                "{prefix}LOGTIMER \"{message}\" FOR {relation}\n{}",
                inner.pretty_print(indent + 1)
            ),
            Statement::LogSize { relation, message } => {
                format!("{prefix}LOGSIZE {relation} \"{message}\"")
            }
            Statement::DebugInfo { inner, message } => {
                let text = message.replace('\n', " ");
                format!("{prefix}DEBUG \"{text}\"\n{}", inner.pretty_print(indent + 1))
            }
        }
    }
}

// ============================================================================
// Programs
// ============================================================================

/// A complete RAM program: relation declarations, a main statement and
/// named provenance subroutines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub relations: Vec<Relation>,
    pub main: Statement,
    pub subroutines: BTreeMap<String, Statement>,
}

impl Program {
    /// Look up a relation by name
    pub fn relation(&self, name: &str) -> Option<&Relation> {
        self.relations.iter().find(|r| r.name == name)
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "PROGRAM")?;
        writeln!(f, " DECLARATION")?;
        for rel in &self.relations {
            let attrs: Vec<String> = rel
                .attributes
                .iter()
                .zip(rel.attribute_types.iter())
                .map(|(name, ty)| format!("{name}:{ty}"))
                .collect();
            writeln!(
                f,
                "  {}({}) {}",
                rel.name,
                attrs.join(", "),
                rel.representation.as_str()
            )?;
        }
        writeln!(f, " END DECLARATION")?;
        writeln!(f, " BEGIN MAIN")?;
        writeln!(f, "{}", self.main.pretty_print(2))?;
        writeln!(f, " END MAIN")?;
        for (name, body) in &self.subroutines {
            writeln!(f, " SUBROUTINE {name}")?;
            writeln!(f, "{}", body.pretty_print(2))?;
            writeln!(f, " END SUBROUTINE")?;
        }
        write!(f, "END PROGRAM")
    }
}

// ============================================================================
// Tests
// ============================================================================
