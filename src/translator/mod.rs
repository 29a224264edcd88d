//! # Translator
//!
//! Lowers an analysed rule AST into a RAM program. The driver walks the
//! SCCs of the relation dependency graph in topological order and emits,
//! per component: loads for input relations, either straight-line
//! evaluation (non-recursive) or a semi-naive fixpoint loop over delta/new
//! auxiliaries (recursive), stores for output relations, and clears for
//! expired relations. Provenance builds additionally emit subproof
//! subroutines per rule.
//!
//! ```text
//! AST (Program/Clauses) -> [Analyses] -> [Translator] -> RAM Program
//! ```

use crate::analysis::Analyses;
use crate::ast::{self, Argument, Clause, Literal, Program};
use crate::config::Config;
use crate::debug_report::DebugReport;
use crate::ram;
use crate::symbols::SymbolTable;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use tracing::{debug, warn};

pub mod clause;
pub mod io;
pub mod provenance;
pub mod relation;
pub mod value_index;
pub mod values;

// ============================================================================
// Errors
// ============================================================================

/// Fatal translation errors. The AST is validated upstream, so each of
/// these marks a logic error that aborts translation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TranslateError {
    /// An atom references a relation absent from the relation table
    #[error("unknown relation: {name}")]
    UnknownRelation { name: String },

    /// A user-defined functor application has no declaration
    #[error("unknown functor: {name}")]
    UnknownFunctor { name: String },

    /// A variable is used without any binding site
    #[error("variable not grounded: {name}")]
    UngroundedVariable { name: String },

    /// A record initialiser is unpacked without a binding site
    #[error("record initialiser has no binding site")]
    UngroundedRecord,

    /// An aggregator value is referenced without a binding site
    #[error("aggregator has no binding site")]
    UnboundAggregator,

    /// An aggregate body that the translator cannot lower
    #[error("unsupported aggregate body: {reason}")]
    UnsupportedAggregateBody { reason: String },
}

// ============================================================================
// Translation units
// ============================================================================

/// The translator's input: an analysed program together with the symbol
/// table backing its string constants and the debug-report sink.
#[derive(Debug, Default)]
pub struct TranslationUnit {
    pub program: Program,
    symbols: Mutex<SymbolTable>,
    debug_report: Mutex<DebugReport>,
}

impl TranslationUnit {
    /// Create a translation unit for a program
    pub fn new(program: Program) -> Self {
        TranslationUnit::with_symbols(program, SymbolTable::new())
    }

    /// Create a translation unit reusing the symbol table the program's
    /// string constants were interned against
    pub fn with_symbols(program: Program, symbols: SymbolTable) -> Self {
        TranslationUnit {
            program,
            symbols: Mutex::new(symbols),
            debug_report: Mutex::new(DebugReport::new()),
        }
    }

    /// Intern a string constant, returning its symbol index
    pub fn intern(&self, text: &str) -> usize {
        self.symbols.lock().intern(text)
    }

    /// Snapshot the symbol table for the downstream evaluator
    pub fn symbols(&self) -> SymbolTable {
        self.symbols.lock().clone()
    }

    /// Snapshot the debug report collected so far
    pub fn debug_report(&self) -> DebugReport {
        self.debug_report.lock().clone()
    }
}

/// Translate a unit into a RAM program under the given configuration
pub fn translate(unit: &TranslationUnit, config: &Config) -> Result<ram::Program, TranslateError> {
    let start = std::time::Instant::now();

    let analyses = Analyses::compute(&unit.program, config);
    let mut translator = Translator {
        program: &unit.program,
        config,
        analyses,
        ram_relations: BTreeMap::new(),
    };
    let (main, subroutines) = translator.translate_program()?;

    let relations = translator.ram_relations.into_values().collect();
    let program = ram::Program {
        relations,
        main,
        subroutines,
    };

    if let Some(path) = &config.debug_report {
        let elapsed = start.elapsed().as_secs_f64();
        let mut report = unit.debug_report.lock();
        report.add_section(
            "ram-program",
            format!("RAM Program ({elapsed:.3}s)"),
            program.to_string(),
        );
        if let Err(error) = report.write_to(path) {
            warn!(?path, %error, "failed to write debug report");
        }
    }

    Ok(program)
}

// ============================================================================
// Driver
// ============================================================================

/// Shared state of one translation run
pub(crate) struct Translator<'p> {
    pub(crate) program: &'p Program,
    pub(crate) config: &'p Config,
    pub(crate) analyses: Analyses,
    /// Name to relation table; built once before any clause translation
    pub(crate) ram_relations: BTreeMap<String, ram::Relation>,
}

impl<'p> Translator<'p> {
    /// Translate the whole program: main statement plus subroutines
    fn translate_program(
        &mut self,
    ) -> Result<(ram::Statement, BTreeMap<String, ram::Statement>), TranslateError> {
        let mut main: Vec<ram::Statement> = Vec::new();

        if !self.analyses.scc_graph.is_empty() {
            self.create_ram_relations();

            let order = self.analyses.topological_order.order().to_vec();
            for (index_of_scc, &scc) in order.iter().enumerate() {
                let node = self.analyses.scc_graph.node(scc).clone();
                debug!(scc, recursive = node.recursive, relations = ?node.relations,
                    "translating SCC");
                let mut current: Vec<ram::Statement> = Vec::new();

                for input in &node.inputs {
                    self.make_load(&mut current, input)?;
                }

                let body = if node.recursive {
                    self.translate_recursive_relation(&node.relations)?
                } else {
                    self.translate_non_recursive_relation(&node.relations[0])?
                };
                if let Some(statement) = body {
                    current.push(statement);
                }

                for output in &node.outputs {
                    self.make_store(&mut current, output)?;
                }

                if !self.config.has_provenance() {
                    for expired in self.analyses.schedule.expired_at(index_of_scc) {
                        current.push(ram::Statement::Clear(expired.clone()));
                    }
                }

                if let Some(statement) = seq(current) {
                    main.push(statement);
                }
            }
        }

        let mut main = ram::Statement::Sequence(main);
        if self.config.profile {
            main = ram::Statement::LogTimer {
                inner: Box::new(main),
                message: logs::runtime(),
            };
        }

        let mut subroutines = BTreeMap::new();
        if self.config.has_provenance() {
            for rel in &self.program.relations {
                if rel.name.contains("@info") {
                    continue;
                }
                for (clause_num, (_, clause)) in self.program.clauses_of(&rel.name).enumerate() {
                    if clause.is_fact() {
                        continue;
                    }
                    let label = format!("{}_{}_subproof", rel.name, clause_num);
                    subroutines.insert(label, self.make_subproof_subroutine(clause)?);

                    let negation_label =
                        format!("{}_{}_negation_subproof", rel.name, clause_num);
                    subroutines
                        .insert(negation_label, self.make_negation_subproof_subroutine(clause)?);
                }
            }
        }

        Ok((main, subroutines))
    }

    /// Create RAM relations for every relation of every SCC; recursive
    /// components additionally get `@delta_` and `@new_` twins of the same
    /// shape.
    fn create_ram_relations(&mut self) {
        for &scc in self.analyses.topological_order.order() {
            let node = self.analyses.scc_graph.node(scc);
            for name in &node.relations {
                let Some(rel) = self.program.relation(name) else {
                    continue;
                };
                let attributes: Vec<String> =
                    rel.attributes.iter().map(|a| a.name.clone()).collect();
                let attribute_types: Vec<String> = rel
                    .attributes
                    .iter()
                    .map(|a| self.analyses.type_env.qualifier(&a.type_name))
                    .collect();
                let template = ram::Relation {
                    name: name.clone(),
                    arity: rel.arity(),
                    aux_arity: self.analyses.aux_arity.arity_of(name),
                    attributes,
                    attribute_types,
                    representation: lower_representation(rel.representation),
                };
                if node.recursive {
                    for prefixed in [delta_relation(name), new_relation(name)] {
                        let mut twin = template.clone();
                        twin.name = prefixed.clone();
                        self.ram_relations.insert(prefixed, twin);
                    }
                }
                self.ram_relations.insert(name.clone(), template);
            }
        }
        debug!(count = self.ram_relations.len(), "built relation table");
    }

    /// Resolve a relation name through the relation table
    pub(crate) fn relation_ref(&self, name: &str) -> Result<String, TranslateError> {
        if self.ram_relations.contains_key(name) {
            Ok(name.to_string())
        } else {
            Err(TranslateError::UnknownRelation {
                name: name.to_string(),
            })
        }
    }

    /// Total arity of a relation in the relation table
    pub(crate) fn relation_arity(&self, name: &str) -> Result<usize, TranslateError> {
        self.ram_relations
            .get(name)
            .map(|rel| rel.arity)
            .ok_or_else(|| TranslateError::UnknownRelation {
                name: name.to_string(),
            })
    }

    fn make_load(
        &self,
        out: &mut Vec<ram::Statement>,
        relation: &str,
    ) -> Result<(), TranslateError> {
        let Some(rel) = self.program.relation(relation) else {
            return Err(TranslateError::UnknownRelation {
                name: relation.to_string(),
            });
        };
        let mut statement = ram::Statement::Load {
            relation: self.relation_ref(relation)?,
            directives: self.input_io_directives(rel),
        };
        if self.config.profile {
            statement = ram::Statement::LogRelationTimer {
                inner: Box::new(statement),
                message: logs::t_relation_load(relation),
                relation: relation.to_string(),
            };
        }
        out.push(statement);
        Ok(())
    }

    fn make_store(
        &self,
        out: &mut Vec<ram::Statement>,
        relation: &str,
    ) -> Result<(), TranslateError> {
        let Some(rel) = self.program.relation(relation) else {
            return Err(TranslateError::UnknownRelation {
                name: relation.to_string(),
            });
        };
        let mut statement = ram::Statement::Store {
            relation: self.relation_ref(relation)?,
            directives: self.output_io_directives(rel),
        };
        if self.config.profile {
            statement = ram::Statement::LogRelationTimer {
                inner: Box::new(statement),
                message: logs::t_relation_save(relation),
                relation: relation.to_string(),
            };
        }
        out.push(statement);
        Ok(())
    }
}

// ============================================================================
// Shared helpers
// ============================================================================

/// Name of the delta auxiliary of a relation
pub(crate) fn delta_relation(name: &str) -> String {
    format!("@delta_{name}")
}

/// Name of the new-tuples auxiliary of a relation
pub(crate) fn new_relation(name: &str) -> String {
    format!("@new_{name}")
}

/// Collapse a statement list: none, the single statement, or a sequence
pub(crate) fn seq(mut statements: Vec<ram::Statement>) -> Option<ram::Statement> {
    match statements.len() {
        0 => None,
        1 => statements.pop(),
        _ => Some(ram::Statement::Sequence(statements)),
    }
}

fn lower_representation(representation: ast::Representation) -> ram::Representation {
    match representation {
        ast::Representation::Default => ram::Representation::Default,
        ast::Representation::Btree => ram::Representation::Btree,
        ast::Representation::Brie => ram::Representation::Brie,
        ast::Representation::EqRel => ram::Representation::EqRel,
        ast::Representation::Info => ram::Representation::Info,
    }
}

/// Rename every wildcard in the clause's positive body atoms to a fresh
/// variable, so enclosing constructs may be cloned without losing
/// variable identity.
pub(crate) fn name_unnamed_variables(clause: &mut Clause) {
    let mut counter = 0usize;
    for literal in &mut clause.body {
        if let Literal::Atom(atom) = literal {
            for arg in &mut atom.args {
                name_unnamed_in_argument(arg, &mut counter);
            }
        }
    }
}

fn name_unnamed_in_argument(arg: &mut Argument, counter: &mut usize) {
    match arg {
        Argument::Unnamed => {
            *counter += 1;
            *arg = Argument::Variable(format!(" _unnamed_var{counter}"));
        }
        Argument::Record(args)
        | Argument::Intrinsic { args, .. }
        | Argument::UserDefined { args, .. } => {
            for a in args {
                name_unnamed_in_argument(a, counter);
            }
        }
        Argument::Aggregator(agg) => {
            if let Some(target) = &mut agg.target {
                name_unnamed_in_argument(target, counter);
            }
            for lit in &mut agg.body {
                name_unnamed_in_literal(lit, counter);
            }
        }
        _ => {}
    }
}

fn name_unnamed_in_literal(literal: &mut Literal, counter: &mut usize) {
    match literal {
        Literal::Atom(atom) | Literal::Negation(atom) | Literal::ProvenanceNegation(atom) => {
            for arg in &mut atom.args {
                name_unnamed_in_argument(arg, counter);
            }
        }
        Literal::Constraint { lhs, rhs, .. } => {
            name_unnamed_in_argument(lhs, counter);
            name_unnamed_in_argument(rhs, counter);
        }
    }
}

/// Profiling log message construction
pub(crate) mod logs {
    use std::fmt::Display;

    pub fn runtime() -> String {
        "@runtime;".to_string()
    }

    pub fn t_nonrecursive_rule(relation: &str, clause: impl Display) -> String {
        format!("@t-nonrecursive-rule;{relation};{clause};")
    }

    pub fn t_nonrecursive_relation(relation: &str) -> String {
        format!("@t-nonrecursive-relation;{relation};")
    }

    pub fn n_nonrecursive_relation(relation: &str) -> String {
        format!("@n-nonrecursive-relation;{relation};")
    }

    pub fn t_recursive_rule(relation: &str, version: usize, clause: impl Display) -> String {
        format!("@t-recursive-rule;{relation};{version};{clause};")
    }

    pub fn t_recursive_relation(relation: &str) -> String {
        format!("@t-recursive-relation;{relation};")
    }

    pub fn c_recursive_relation(relation: &str) -> String {
        format!("@c-recursive-relation;{relation};")
    }

    pub fn t_relation_load(relation: &str) -> String {
        format!("@t-relation-load;{relation};")
    }

    pub fn t_relation_save(relation: &str) -> String {
        format!("@t-relation-save;{relation};")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Atom;

    #[test]
    fn test_name_unnamed_variables_numbers_wildcards() {
        let mut clause = Clause::new(
            Atom::new("r", vec![Argument::Variable("x".to_string())]),
            vec![
                Literal::Atom(Atom::new(
                    "e",
                    vec![
                        Argument::Unnamed,
                        Argument::Variable("x".to_string()),
                        Argument::Record(vec![Argument::Unnamed]),
                    ],
                )),
                Literal::Negation(Atom::new("p", vec![Argument::Unnamed])),
            ],
        );
        name_unnamed_variables(&mut clause);

        let Literal::Atom(atom) = &clause.body[0] else {
            panic!("positive atom expected");
        };
        assert_eq!(atom.args[0], Argument::Variable(" _unnamed_var1".to_string()));
        assert_eq!(
            atom.args[2],
            Argument::Record(vec![Argument::Variable(" _unnamed_var2".to_string())])
        );
        // wildcards in negations stay untouched
        assert_eq!(
            clause.body[1],
            Literal::Negation(Atom::new("p", vec![Argument::Unnamed]))
        );
    }

    #[test]
    fn test_seq_collapses() {
        assert_eq!(seq(vec![]), None);
        let single = seq(vec![ram::Statement::Clear("r".to_string())]);
        assert_eq!(single, Some(ram::Statement::Clear("r".to_string())));
        let double = seq(vec![
            ram::Statement::Clear("a".to_string()),
            ram::Statement::Clear("b".to_string()),
        ]);
        assert!(matches!(double, Some(ram::Statement::Sequence(v)) if v.len() == 2));
    }

    #[test]
    fn test_auxiliary_names() {
        assert_eq!(delta_relation("r"), "@delta_r");
        assert_eq!(new_relation("r"), "@new_r");
    }
}
