//! Relation scheduling
//!
//! Generates the RAM statements computing whole relations. Non-recursive
//! relations evaluate their clauses once, in order. Recursive SCCs run the
//! classic semi-naive fixpoint: seed `@delta_r` from the non-recursive
//! rules, then loop a parallel block in which every rule version joins
//! exactly one `@delta` atom, writing into `@new_r`; after each iteration
//! the new tuples merge into `r`, `@delta_r` and `@new_r` swap, and the
//! loop exits once every `@new_r` is empty.

use crate::ast::Literal;
use crate::ram;
use crate::translator::clause::{translate_clause, ClauseMode};
use crate::translator::{
    delta_relation, logs, name_unnamed_variables, new_relation, seq, TranslateError, Translator,
};
use tracing::debug;

impl Translator<'_> {
    /// Straight-line evaluation of a relation's non-recursive clauses
    pub(crate) fn translate_non_recursive_relation(
        &self,
        relation: &str,
    ) -> Result<Option<ram::Statement>, TranslateError> {
        let mut statements: Vec<ram::Statement> = Vec::new();

        for (clause_index, clause) in self.program.clauses_of(relation) {
            if self.analyses.recursive_clauses.is_recursive(clause_index) {
                continue;
            }

            let mut rule = translate_clause(self, ClauseMode::Standard, clause, clause, 0)?;

            if self.config.profile {
                rule = ram::Statement::LogRelationTimer {
                    inner: Box::new(rule),
                    message: logs::t_nonrecursive_rule(relation, clause),
                    relation: relation.to_string(),
                };
            }

            rule = ram::Statement::DebugInfo {
                inner: Box::new(rule),
                message: clause.to_string(),
            };
            statements.push(rule);
        }

        if self.config.profile {
            if statements.is_empty() {
                statements.push(ram::Statement::LogSize {
                    relation: relation.to_string(),
                    message: logs::n_nonrecursive_relation(relation),
                });
            } else {
                return Ok(Some(ram::Statement::LogRelationTimer {
                    inner: Box::new(ram::Statement::Sequence(statements)),
                    message: logs::t_nonrecursive_relation(relation),
                    relation: relation.to_string(),
                }));
            }
        }

        Ok(seq(statements))
    }

    /// Semi-naive fixpoint evaluation of one recursive SCC
    pub(crate) fn translate_recursive_relation(
        &self,
        relations: &[String],
    ) -> Result<Option<ram::Statement>, TranslateError> {
        let mut preamble: Vec<ram::Statement> = Vec::new();
        let mut updates: Vec<ram::Statement> = Vec::new();
        let mut postamble: Vec<ram::Statement> = Vec::new();

        // --- preamble and per-relation update blocks ---

        for relation in relations {
            let delta = delta_relation(relation);
            let new = new_relation(relation);

            let mut update = ram::Statement::Sequence(vec![
                self.gen_merge(relation, &new)?,
                ram::Statement::Swap {
                    first: delta.clone(),
                    second: new.clone(),
                },
                ram::Statement::Clear(new.clone()),
            ]);
            if self.config.profile {
                update = ram::Statement::LogRelationTimer {
                    inner: Box::new(update),
                    message: logs::c_recursive_relation(relation),
                    relation: new.clone(),
                };
            }
            updates.push(update);

            postamble.push(ram::Statement::Clear(delta.clone()));
            postamble.push(ram::Statement::Clear(new.clone()));

            if let Some(non_recursive) = self.translate_non_recursive_relation(relation)? {
                preamble.push(non_recursive);
            }
            preamble.push(self.gen_merge(&delta, relation)?);
        }

        // --- main loop: semi-naive rule versions per relation ---

        let mut parallel: Vec<ram::Statement> = Vec::new();
        for relation in relations {
            let mut loop_body: Vec<ram::Statement> = Vec::new();

            for (clause_index, clause) in self.program.clauses_of(relation) {
                if !self.analyses.recursive_clauses.is_recursive(clause_index) {
                    continue;
                }

                let mut version = 0;
                let atom_positions = clause.positive_atom_positions();
                for (j, &literal_index) in atom_positions.iter().enumerate() {
                    let Some(atom) = clause.body[literal_index].atom() else {
                        continue;
                    };
                    // only versions placing delta inside the SCC exist
                    if !self.analyses.scc_graph.same_scc(relation, &atom.name) {
                        continue;
                    }
                    let delta_of_atom = delta_relation(&atom.name);

                    // rewrite the rule: write into @new, read one @delta
                    let mut rewritten = clause.clone();
                    rewritten.head.name = new_relation(relation);
                    if let Literal::Atom(target) = &mut rewritten.body[literal_index] {
                        target.name = delta_of_atom;
                    }

                    // never re-derive tuples already in the head relation
                    if self.config.has_provenance() {
                        rewritten
                            .body
                            .push(Literal::ProvenanceNegation(clause.head.clone()));
                    } else if rewritten.head.arity() > 0 {
                        rewritten.body.push(Literal::Negation(clause.head.clone()));
                    }

                    // keep variable identity stable across the clones below
                    name_unnamed_variables(&mut rewritten);

                    // subtract later delta positions: the summands of the
                    // semi-naive decomposition must not overlap
                    for &later_index in &atom_positions[j + 1..] {
                        let Some(later_atom) = clause.body[later_index].atom() else {
                            continue;
                        };
                        if !self.analyses.scc_graph.same_scc(relation, &later_atom.name) {
                            continue;
                        }
                        let Some(renamed) = rewritten.body[later_index].atom() else {
                            continue;
                        };
                        let mut negated = renamed.clone();
                        negated.name = delta_relation(&later_atom.name);
                        rewritten.body.push(Literal::Negation(negated));
                    }

                    let mut rule =
                        translate_clause(self, ClauseMode::Standard, &rewritten, clause, version)?;

                    if self.config.profile {
                        rule = ram::Statement::LogRelationTimer {
                            inner: Box::new(rule),
                            message: logs::t_recursive_rule(relation, version, clause),
                            relation: new_relation(relation),
                        };
                    }

                    rule = ram::Statement::DebugInfo {
                        inner: Box::new(rule),
                        message: clause.to_string(),
                    };
                    loop_body.push(rule);

                    version += 1;
                }
                debug!(relation = %relation, clause = %clause, versions = version, "semi-naive versions");
            }

            if loop_body.is_empty() {
                continue;
            }

            if self.config.profile {
                parallel.push(ram::Statement::LogRelationTimer {
                    inner: Box::new(ram::Statement::Sequence(loop_body)),
                    message: logs::t_recursive_relation(relation),
                    relation: new_relation(relation),
                });
            } else if let Some(statement) = seq(loop_body) {
                parallel.push(statement);
            }
        }

        // --- exit condition: all @new relations drained ---

        let mut exit: Option<ram::Condition> = None;
        for relation in relations {
            exit = Some(ram::Condition::conjoin(
                exit,
                ram::Condition::EmptinessCheck {
                    relation: new_relation(relation),
                },
            ));
        }

        let mut result = preamble;
        if !parallel.is_empty() {
            if let Some(exit) = exit {
                result.push(ram::Statement::Loop {
                    body: Box::new(ram::Statement::Parallel(parallel)),
                    exit,
                    update: Box::new(ram::Statement::Sequence(updates)),
                });
            }
        }
        result.extend(postamble);
        Ok(seq(result))
    }

    /// Merge all tuples of `source` into `destination`. Equivalence
    /// relations first extend the destination's equivalence classes;
    /// nullary relations propagate the null tuple through an emptiness
    /// test instead of a scan.
    fn gen_merge(
        &self,
        destination: &str,
        source: &str,
    ) -> Result<ram::Statement, TranslateError> {
        let destination = self.relation_ref(destination)?;
        let source = self.relation_ref(source)?;
        let arity = self.relation_arity(&destination)?;

        if self.relation_arity(&source)? == 0 {
            return Ok(ram::Statement::Query(ram::Operation::Filter {
                condition: ram::Condition::EmptinessCheck {
                    relation: source.clone(),
                }
                .negated(),
                inner: Box::new(ram::Operation::Project {
                    relation: destination,
                    values: Vec::new(),
                }),
            }));
        }

        let values = (0..arity).map(|i| ram::Expression::tuple(0, i)).collect();
        let statement = ram::Statement::Query(ram::Operation::Scan {
            relation: source.clone(),
            level: 0,
            inner: Box::new(ram::Operation::Project {
                relation: destination.clone(),
                values,
            }),
            profile_text: None,
        });

        let is_eqrel = self
            .ram_relations
            .get(&destination)
            .is_some_and(|rel| rel.representation == ram::Representation::EqRel);
        if is_eqrel {
            return Ok(ram::Statement::Sequence(vec![
                ram::Statement::Extend {
                    target: destination,
                    source,
                },
                statement,
            ]));
        }
        Ok(statement)
    }
}
