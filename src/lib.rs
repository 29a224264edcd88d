//! # Rampart
//!
//! A Datalog compiler core: lowers a typed, semantically-analysed rule AST
//! into a RAM (relational algebra machine) program — an imperative schedule
//! of loads, scans, filters, projections, existence checks and semi-naive
//! fixpoint loops ready for a downstream evaluator or code generator.
//!
//! ## Pipeline Architecture
//!
//! ```text
//! Datalog Source Code
//!     ↓
//! [Parser, resolver, type checker]   → AST          (upstream, not here)
//!     ↓
//! [Analyses]                         → SCC graph, topological order,
//!                                      recursive clauses, aux arities
//!     ↓
//! [Translator]                       → RAM program
//!     ↓
//! [Evaluator / code generator]                      (downstream, not here)
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use rampart::ast::builders::{ClauseBuilder, RelationBuilder};
//! use rampart::ast::Program;
//! use rampart::{translate, Config, TranslationUnit};
//!
//! let mut program = Program::new();
//! program.relations.push(
//!     RelationBuilder::new("edge")
//!         .attr("a", "number")
//!         .attr("b", "number")
//!         .input()
//!         .build(),
//! );
//! program.relations.push(
//!     RelationBuilder::new("path")
//!         .attr("f", "number")
//!         .attr("t", "number")
//!         .output()
//!         .build(),
//! );
//! program.clauses.push(
//!     ClauseBuilder::new("path")
//!         .head_vars(["x", "y"])
//!         .body_atom("edge", ["x", "y"])
//!         .build(),
//! );
//! program.clauses.push(
//!     ClauseBuilder::new("path")
//!         .head_vars(["x", "z"])
//!         .body_atom("path", ["x", "y"])
//!         .body_atom("edge", ["y", "z"])
//!         .build(),
//! );
//!
//! let unit = TranslationUnit::new(program);
//! let ram = translate(&unit, &Config::default()).expect("translates");
//! println!("{ram}");
//! ```
//!
//! ## Module Organization
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `ast` | Rule AST: programs, relations, clauses, arguments |
//! | `ram` | RAM IR: relations, expressions, conditions, operations, statements |
//! | `analysis` | SCC graph, topological order, recursive clauses, schedules |
//! | `translator` | AST → RAM lowering (clauses, relations, provenance, driver) |
//! | `config` | Translator configuration |
//! | `symbols` | String interning for constant representations |
//! | `debug_report` | Named-section report sink |

pub mod analysis;
pub mod ast;
pub mod config;
pub mod debug_report;
pub mod ram;
pub mod symbols;
pub mod translator;

pub use config::{Config, ProvenanceMode};
pub use debug_report::DebugReport;
pub use symbols::SymbolTable;
pub use translator::{translate, TranslateError, TranslationUnit};
