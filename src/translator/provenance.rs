//! Provenance subroutines
//!
//! For every rule, two auxiliary subroutines are emitted: a *subproof*
//! routine that, given a tuple's values, re-runs the rule body and returns
//! the witness values of one proof step, and a *negation subproof* routine
//! that checks each body literal in isolation and returns 1 or 0 per
//! literal, disproving the existence of a tuple.

use crate::ast::{Argument, Atom, Clause, ConstraintOp, Literal};
use crate::config::ProvenanceMode;
use crate::ram;
use crate::translator::clause::{translate_clause, ClauseMode};
use crate::translator::value_index::ValueIndex;
use crate::translator::{name_unnamed_variables, seq, TranslateError, Translator};

impl Translator<'_> {
    /// Build the subproof subroutine for one rule.
    ///
    /// The clause is augmented with equality constraints binding each user
    /// head argument to a subroutine argument in head order, followed by
    /// level constraints over the body atoms, then translated with the
    /// subroutine-return operation as its innermost node.
    pub(crate) fn make_subproof_subroutine(
        &self,
        clause: &Clause,
    ) -> Result<ram::Statement, TranslateError> {
        let mut intermediate = clause.clone();
        name_unnamed_variables(&mut intermediate);

        let head_arity = intermediate.head.arity();
        let aux_arity = self
            .analyses
            .aux_arity
            .evaluation_arity(&intermediate.head.name);
        let user_arity = head_arity - aux_arity;

        for i in 0..user_arity {
            let arg = &intermediate.head.args[i];
            if arg.is_variable() || arg.is_functor() || matches!(arg, Argument::Record(_)) {
                let bound = arg.clone();
                intermediate.body.push(Literal::Constraint {
                    op: ConstraintOp::Eq,
                    lhs: bound,
                    rhs: Argument::SubroutineArg(i),
                });
            }
        }

        // level constraints over the body atoms; the snapshot excludes the
        // constraints appended below
        let literals: Vec<Literal> = intermediate.body.clone();
        if self.config.provenance == Some(ProvenanceMode::SubtreeHeights) {
            // the height arguments follow the user head arguments; the
            // running index advances for every body literal, atoms and
            // constraints alike
            let mut level_index = user_arity;
            for literal in &literals {
                if let Literal::Atom(atom) = literal {
                    let atom_aux = self.analyses.aux_arity.evaluation_arity(&atom.name);
                    let height_column = atom.arity() - atom_aux + 1;
                    intermediate.body.push(Literal::Constraint {
                        op: ConstraintOp::Eq,
                        lhs: atom.args[height_column].clone(),
                        rhs: Argument::SubroutineArg(level_index),
                    });
                }
                level_index += 1;
            }
        } else {
            // default scheme: every body atom's level column is strictly
            // below the level argument following the user head arguments
            let level_index = user_arity;
            for literal in &literals {
                if let Literal::Atom(atom) = literal {
                    intermediate.body.push(Literal::Constraint {
                        op: ConstraintOp::Lt,
                        lhs: atom.args[atom.arity() - 1].clone(),
                        rhs: Argument::SubroutineArg(level_index),
                    });
                }
            }
        }

        translate_clause(self, ClauseMode::ProvenanceReturn, &intermediate, clause, 0)
    }

    /// Build the negation subproof subroutine for one rule.
    ///
    /// Aggregators are opaque here and become fresh variables. Each body
    /// atom or constraint is tested in isolation against the subroutine
    /// arguments: a pair of queries returns 1 when the literal holds and 0
    /// when it does not.
    pub(crate) fn make_negation_subproof_subroutine(
        &self,
        clause: &Clause,
    ) -> Result<ram::Statement, TranslateError> {
        let mut replaced = clause.clone();
        let mut aggregate_counter = 0usize;
        replace_aggregators_in_clause(&mut replaced, &mut aggregate_counter);

        // unique variables in order of first occurrence; level annotations
        // are wildcarded rather than bound
        let mut unique_variables: Vec<String> = Vec::new();
        replaced.for_each_variable(&mut |name| {
            if !name.contains("@level_num") && !unique_variables.iter().any(|v| v == name) {
                unique_variables.push(name.to_string());
            }
        });

        let empty_index = ValueIndex::new();
        let mut statements: Vec<ram::Statement> = Vec::new();

        for literal in &replaced.body {
            match literal {
                Literal::Atom(atom) => {
                    let mut probe = atom.clone();
                    variables_to_arguments_in_atom(&mut probe, &unique_variables);

                    let aux_arity = self.analyses.aux_arity.evaluation_arity(&probe.name);
                    let user_arity = probe.arity() - aux_arity;
                    let mut tuple = Vec::with_capacity(probe.arity());
                    for arg in &probe.args[..user_arity] {
                        tuple.push(self.translate_value(arg, &empty_index)?);
                    }
                    tuple.extend(std::iter::repeat_n(ram::Expression::Undefined, aux_arity));
                    debug_assert_eq!(tuple.len(), probe.arity(), "wrong query tuple size");

                    let exists = ram::Condition::ExistenceCheck {
                        relation: self.relation_ref(&probe.name)?,
                        tuple,
                    };
                    statements.push(return_when(exists.clone(), 1));
                    statements.push(return_when(exists.negated(), 0));
                }
                Literal::Constraint { op, lhs, rhs } => {
                    let mut lhs = lhs.clone();
                    let mut rhs = rhs.clone();
                    variables_to_arguments(&mut lhs, &unique_variables);
                    variables_to_arguments(&mut rhs, &unique_variables);
                    let probe = Literal::Constraint { op: *op, lhs, rhs };

                    let Some(condition) = self.translate_constraint(&probe, &empty_index)? else {
                        continue;
                    };
                    statements.push(return_when(condition.clone(), 1));
                    statements.push(return_when(condition.negated(), 0));
                }
                Literal::Negation(_) | Literal::ProvenanceNegation(_) => {}
            }
        }

        Ok(seq(statements).unwrap_or(ram::Statement::Sequence(Vec::new())))
    }
}

fn return_when(condition: ram::Condition, value: i64) -> ram::Statement {
    ram::Statement::Query(ram::Operation::Filter {
        condition,
        inner: Box::new(ram::Operation::SubroutineReturn(vec![
            ram::Expression::Signed(value),
        ])),
    })
}

/// Replace every aggregator in the clause with a fresh `agg_<n>` variable,
/// outermost first; nested aggregators disappear with their parent.
fn replace_aggregators_in_clause(clause: &mut Clause, counter: &mut usize) {
    for arg in &mut clause.head.args {
        replace_aggregators(arg, counter);
    }
    for literal in &mut clause.body {
        match literal {
            Literal::Atom(atom) | Literal::Negation(atom) | Literal::ProvenanceNegation(atom) => {
                for arg in &mut atom.args {
                    replace_aggregators(arg, counter);
                }
            }
            Literal::Constraint { lhs, rhs, .. } => {
                replace_aggregators(lhs, counter);
                replace_aggregators(rhs, counter);
            }
        }
    }
}

fn replace_aggregators(arg: &mut Argument, counter: &mut usize) {
    match arg {
        Argument::Aggregator(_) => {
            *arg = Argument::Variable(format!("agg_{counter}"));
            *counter += 1;
        }
        Argument::Record(args)
        | Argument::Intrinsic { args, .. }
        | Argument::UserDefined { args, .. } => {
            for nested in args {
                replace_aggregators(nested, counter);
            }
        }
        _ => {}
    }
}

fn variables_to_arguments_in_atom(atom: &mut Atom, unique_variables: &[String]) {
    for arg in &mut atom.args {
        variables_to_arguments(arg, unique_variables);
    }
}

/// Replace named variables with their subroutine-argument index; level
/// annotation variables become wildcards.
fn variables_to_arguments(arg: &mut Argument, unique_variables: &[String]) {
    match arg {
        Argument::Variable(name) => {
            if name.contains("@level_num") {
                *arg = Argument::Unnamed;
            } else if let Some(position) = unique_variables.iter().position(|v| v == name) {
                *arg = Argument::SubroutineArg(position);
            }
        }
        Argument::Record(args)
        | Argument::Intrinsic { args, .. }
        | Argument::UserDefined { args, .. } => {
            for nested in args {
                variables_to_arguments(nested, unique_variables);
            }
        }
        Argument::Aggregator(agg) => {
            if let Some(target) = &mut agg.target {
                variables_to_arguments(target, unique_variables);
            }
            for literal in &mut agg.body {
                match literal {
                    Literal::Atom(atom)
                    | Literal::Negation(atom)
                    | Literal::ProvenanceNegation(atom) => {
                        variables_to_arguments_in_atom(atom, unique_variables);
                    }
                    Literal::Constraint { lhs, rhs, .. } => {
                        variables_to_arguments(lhs, unique_variables);
                        variables_to_arguments(rhs, unique_variables);
                    }
                }
            }
        }
        _ => {}
    }
}
