//! Clause translation
//!
//! Compiles one rule into a nested tree of relational operations wrapped in
//! a query statement. Construction runs inside-out: the innermost node is
//! the head projection (or subroutine return for provenance builds), then
//! equality filters, body-literal conditions, aggregate layers, and finally
//! one scan or unpack level per body atom and record initialiser.
//!
//! Every body atom and record initialiser occupies one nesting level; the
//! level of an operation equals its position on the nesting stack when it
//! was pushed, so tuple elements `t<level>.<column>` always resolve inside
//! an enclosing scan, unpack or aggregate of matching width.

use crate::ast::{Aggregator, Argument, Atom, Clause, Literal};
use crate::ram;
use crate::translator::value_index::{Location, ValueIndex};
use crate::translator::values::lower_aggregate_op;
use crate::translator::{TranslateError, Translator};
use tracing::trace;

/// Selects the innermost operation of the emitted tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ClauseMode {
    /// Project the head tuple into the head relation
    Standard,
    /// Return every body value from a provenance subroutine
    ProvenanceReturn,
}

/// Translate one clause at the given semi-naive version.
///
/// `original` is the unmodified source clause, used for diagnostics and the
/// head-specific stopping condition.
pub(crate) fn translate_clause(
    translator: &Translator<'_>,
    mode: ClauseMode,
    clause: &Clause,
    original: &Clause,
    version: usize,
) -> Result<ram::Statement, TranslateError> {
    // an execution plan for this version replaces the clause outright
    if let Some(reordered) = reordered_clause(clause, version) {
        return translate_clause(translator, mode, &reordered, original, version);
    }
    ClauseContext::new(translator, mode).translate(clause, original, version)
}

/// Apply the clause's execution plan for a version, if one is given:
/// clone, re-permute the body atoms (plans are 1-based) and clear the plan
/// so translation restarts exactly once.
fn reordered_clause(clause: &Clause, version: usize) -> Option<Clause> {
    let plan = clause.plan.as_ref()?;
    let order = plan.orders.get(&version)?;

    let mut reordered = clause.clone();
    let zero_based: Vec<usize> = order.iter().map(|&position| position - 1).collect();
    reordered.reorder_atoms(&zero_based);
    reordered.plan = None;
    Some(reordered)
}

/// One nesting level of the operation tree under construction
enum NestingEntry<'c> {
    Atom(&'c Atom),
    Record(&'c Argument),
}

/// Per-clause translation state
struct ClauseContext<'t, 'p, 'c> {
    translator: &'t Translator<'p>,
    mode: ClauseMode,
    value_index: ValueIndex<'c>,
    op_nesting: Vec<NestingEntry<'c>>,
    aggregators: Vec<&'c Aggregator>,
    level: usize,
}

impl<'t, 'p, 'c> ClauseContext<'t, 'p, 'c> {
    fn new(translator: &'t Translator<'p>, mode: ClauseMode) -> Self {
        ClauseContext {
            translator,
            mode,
            value_index: ValueIndex::new(),
            op_nesting: Vec::new(),
            aggregators: Vec::new(),
            level: 0,
        }
    }

    fn translate(
        mut self,
        clause: &'c Clause,
        original: &Clause,
        version: usize,
    ) -> Result<ram::Statement, TranslateError> {
        trace!(clause = %clause, version, "translating clause");
        let head = &clause.head;

        // facts project constants straight into the head relation
        if clause.is_fact() {
            let empty = ValueIndex::new();
            let mut values = Vec::with_capacity(head.arity());
            for arg in &head.args {
                values.push(self.translator.translate_value(arg, &empty)?);
            }
            return Ok(ram::Statement::Query(ram::Operation::Project {
                relation: self.translator.relation_ref(&head.name)?,
                values,
            }));
        }

        self.create_value_index(clause);

        let mut op = self.create_operation(clause)?;

        // equality constraints imposed by repeated variable bindings
        for locations in self.value_index.variable_references().values() {
            let Some(&first) = locations.iter().next() else {
                continue;
            };
            for &location in locations {
                if location != first && !self.value_index.is_aggregator_level(location.identifier)
                {
                    op = ram::Operation::Filter {
                        condition: ram::Condition::Constraint {
                            op: ram::ConstraintOp::Eq,
                            lhs: tuple_element(first),
                            rhs: tuple_element(location),
                        },
                        inner: Box::new(op),
                    };
                }
            }
        }

        // conditions caused by negations and binary constraints
        for literal in &clause.body {
            if let Some(condition) = self
                .translator
                .translate_constraint(literal, &self.value_index)?
            {
                op = ram::Operation::Filter {
                    condition,
                    inner: Box::new(op),
                };
            }
        }

        // bind aggregator results showing up as atom arguments
        let mut current_level = self.op_nesting.len();
        for entry in self.op_nesting.iter().rev() {
            current_level -= 1;
            if let NestingEntry::Atom(atom) = entry {
                for (pos, arg) in atom.args.iter().enumerate() {
                    if let Argument::Aggregator(agg) = arg {
                        let location = self
                            .value_index
                            .aggregator_location(agg)
                            .ok_or(TranslateError::UnboundAggregator)?;
                        op = ram::Operation::Filter {
                            condition: ram::Condition::Constraint {
                                op: ram::ConstraintOp::Eq,
                                lhs: ram::Expression::tuple(current_level, pos),
                                rhs: tuple_element(location),
                            },
                            inner: Box::new(op),
                        };
                    }
                }
            }
        }

        // aggregate layers, innermost first
        let mut level = self.level;
        for agg in self.aggregators.iter().rev() {
            level -= 1;
            op = self.make_aggregate_layer(agg, level, op)?;
        }

        // scan and unpack levels, built bottom-up
        while let Some(entry) = self.op_nesting.pop() {
            let level = self.op_nesting.len();
            op = match entry {
                NestingEntry::Atom(atom) => {
                    self.make_scan_layer(atom, level, op, clause, original, version)?
                }
                NestingEntry::Record(record) => self.make_unpack_layer(record, level, op)?,
            };
        }

        // head-specific stopping condition
        if let Some(condition) = self.create_condition(original)? {
            op = ram::Operation::Filter {
                condition,
                inner: Box::new(op),
            };
        }
        Ok(ram::Statement::Query(op))
    }

    // ------------------------------------------------------------------
    // value index construction
    // ------------------------------------------------------------------

    fn create_value_index(&mut self, clause: &'c Clause) {
        for literal in &clause.body {
            if let Literal::Atom(atom) = literal {
                let level = self.next_level();
                self.op_nesting.push(NestingEntry::Atom(atom));
                for (pos, arg) in atom.args.iter().enumerate() {
                    self.index_argument(arg, level, pos);
                }
            }
        }

        // aggregators bind at synthetic levels, registered post-order so
        // nested aggregators come first
        for arg in &clause.head.args {
            self.register_aggregators(arg);
        }
        for literal in &clause.body {
            for arg in literal.arguments() {
                self.register_aggregators(arg);
            }
        }
    }

    fn next_level(&mut self) -> usize {
        let level = self.level;
        self.level += 1;
        level
    }

    fn index_argument(&mut self, arg: &'c Argument, level: usize, pos: usize) {
        match arg {
            Argument::Variable(name) => {
                self.value_index
                    .add_var_reference(name, Location::new(level, pos));
            }
            Argument::Record(args) => {
                let record_level = self.next_level();
                self.op_nesting.push(NestingEntry::Record(arg));
                self.value_index
                    .set_record_definition(arg, Location::new(level, pos));
                for (nested_pos, nested) in args.iter().enumerate() {
                    self.index_argument(nested, record_level, nested_pos);
                }
            }
            _ => {}
        }
    }

    fn register_aggregators(&mut self, arg: &'c Argument) {
        match arg {
            Argument::Record(args)
            | Argument::Intrinsic { args, .. }
            | Argument::UserDefined { args, .. } => {
                for nested in args {
                    self.register_aggregators(nested);
                }
            }
            Argument::Aggregator(agg) => {
                if let Some(target) = &agg.target {
                    self.register_aggregators(target);
                }
                for literal in &agg.body {
                    for nested in literal.arguments() {
                        self.register_aggregators(nested);
                    }
                }
                self.register_aggregator(agg);
            }
            _ => {}
        }
    }

    fn register_aggregator(&mut self, agg: &'c Aggregator) {
        // each structurally distinct aggregator binds exactly once
        if self.aggregators.iter().any(|known| *known == agg) {
            return;
        }

        let agg_level = self.next_level();
        self.value_index
            .set_aggregator_location(agg, Location::new(agg_level, 0));

        if let Some(Literal::Atom(atom)) = agg.body.first() {
            for (pos, arg) in atom.args.iter().enumerate() {
                if let Argument::Variable(name) = arg {
                    self.value_index
                        .add_var_reference(name, Location::new(agg_level, pos));
                }
            }
        }

        self.aggregators.push(agg);
    }

    // ------------------------------------------------------------------
    // innermost operation
    // ------------------------------------------------------------------

    fn create_operation(&self, clause: &Clause) -> Result<ram::Operation, TranslateError> {
        match self.mode {
            ClauseMode::Standard => self.create_projection(clause),
            ClauseMode::ProvenanceReturn => self.create_subroutine_return(clause),
        }
    }

    fn create_projection(&self, clause: &Clause) -> Result<ram::Operation, TranslateError> {
        let head = &clause.head;
        let config = self.translator.config;

        let mut values = Vec::with_capacity(head.arity());
        for arg in &head.args {
            values.push(self.translator.translate_value(arg, &self.value_index)?);
        }

        let mut op = ram::Operation::Project {
            relation: self.translator.relation_ref(&head.name)?,
            values,
        };

        // a nullary head holds at most the null tuple; never reinsert it
        if head.arity() == 0 {
            op = ram::Operation::Filter {
                condition: ram::Condition::EmptinessCheck {
                    relation: self.translator.relation_ref(&head.name)?,
                },
                inner: Box::new(op),
            };
        }

        // interpreter provenance builds guard against re-deriving an
        // existing tuple, unless the head involves a counter whose values
        // are non-deterministic
        if config.has_provenance() && config.interpreter_mode() {
            let aux_arity = self.translator.analyses.aux_arity.evaluation_arity(&head.name);
            let arity = head.arity() - aux_arity;
            let mut tuple = Vec::with_capacity(head.arity());
            let mut guard_applies = true;
            for arg in &head.args[..arity] {
                if arg.contains_counter() {
                    guard_applies = false;
                }
                tuple.push(self.translator.translate_value(arg, &self.value_index)?);
            }
            tuple.extend(std::iter::repeat_n(ram::Expression::Undefined, aux_arity));
            if guard_applies {
                return Ok(ram::Operation::Filter {
                    condition: ram::Condition::ExistenceCheck {
                        relation: self.translator.relation_ref(&head.name)?,
                        tuple,
                    }
                    .negated(),
                    inner: Box::new(op),
                });
            }
        }

        Ok(op)
    }

    fn create_subroutine_return(&self, clause: &Clause) -> Result<ram::Operation, TranslateError> {
        let mut values = Vec::new();
        for literal in &clause.body {
            match literal {
                Literal::Atom(atom) | Literal::Negation(atom) => {
                    for arg in &atom.args {
                        values.push(self.translator.translate_value(arg, &self.value_index)?);
                    }
                }
                Literal::Constraint { lhs, rhs, .. } => {
                    values.push(self.translator.translate_value(lhs, &self.value_index)?);
                    values.push(self.translator.translate_value(rhs, &self.value_index)?);
                }
                Literal::ProvenanceNegation(atom) => {
                    let aux_arity = self
                        .translator
                        .analyses
                        .aux_arity
                        .evaluation_arity(&atom.name);
                    let arity = atom.arity() - aux_arity;
                    for arg in &atom.args[..arity] {
                        values.push(self.translator.translate_value(arg, &self.value_index)?);
                    }
                    values.extend(std::iter::repeat_n(ram::Expression::Signed(-1), aux_arity));
                }
            }
        }
        Ok(ram::Operation::SubroutineReturn(values))
    }

    fn create_condition(
        &self,
        original: &Clause,
    ) -> Result<Option<ram::Condition>, TranslateError> {
        if self.mode == ClauseMode::ProvenanceReturn {
            return Ok(None);
        }
        let head = &original.head;
        // stopping criterion: once the null tuple is present, a nullary
        // relation never needs recomputation
        if head.arity() == 0 {
            return Ok(Some(ram::Condition::EmptinessCheck {
                relation: self.translator.relation_ref(&head.name)?,
            }));
        }
        Ok(None)
    }

    // ------------------------------------------------------------------
    // layers
    // ------------------------------------------------------------------

    fn make_aggregate_layer(
        &self,
        agg: &Aggregator,
        level: usize,
        inner: ram::Operation,
    ) -> Result<ram::Operation, TranslateError> {
        let function = lower_aggregate_op(agg.op);

        let mut condition: Option<ram::Condition> = None;
        for literal in &agg.body {
            if let Some(translated) = self
                .translator
                .translate_constraint(literal, &self.value_index)?
            {
                condition = Some(ram::Condition::conjoin(condition, translated));
            }
        }

        if agg.atom_count() > 1 {
            return Err(TranslateError::UnsupportedAggregateBody {
                reason: "more than one atom".to_string(),
            });
        }
        let Some(atom) = agg.first_atom() else {
            return Err(TranslateError::UnsupportedAggregateBody {
                reason: "no subject atom".to_string(),
            });
        };

        for (pos, arg) in atom.args.iter().enumerate() {
            match arg {
                // variables bound elsewhere restrict the aggregate range;
                // the self-reference at this level is skipped
                Argument::Variable(name) => {
                    if let Some(locations) = self.value_index.references_of(name) {
                        for &location in locations {
                            if location.identifier != level || location.element != pos {
                                condition = Some(ram::Condition::conjoin(
                                    condition,
                                    ram::Condition::Constraint {
                                        op: ram::ConstraintOp::Eq,
                                        lhs: tuple_element(location),
                                        rhs: ram::Expression::tuple(level, pos),
                                    },
                                ));
                                break;
                            }
                        }
                    }
                }
                _ => {
                    let value = self.translator.translate_value(arg, &self.value_index)?;
                    if !value.is_undefined() {
                        condition = Some(ram::Condition::conjoin(
                            condition,
                            ram::Condition::Constraint {
                                op: ram::ConstraintOp::Eq,
                                lhs: ram::Expression::tuple(level, pos),
                                rhs: value,
                            },
                        ));
                    }
                }
            }
        }

        let expression = match &agg.target {
            Some(target) => self.translator.translate_value(target, &self.value_index)?,
            None => ram::Expression::Undefined,
        };

        Ok(ram::Operation::Aggregate {
            inner: Box::new(inner),
            function,
            relation: self.translator.relation_ref(&atom.name)?,
            expression,
            condition: condition.unwrap_or(ram::Condition::True),
            level,
        })
    }

    fn make_scan_layer(
        &self,
        atom: &Atom,
        level: usize,
        mut op: ram::Operation,
        clause: &Clause,
        original: &Clause,
        version: usize,
    ) -> Result<ram::Operation, TranslateError> {
        // constants in atom arguments become equality filters
        for (pos, arg) in atom.args.iter().enumerate() {
            if arg.is_constant() {
                op = ram::Operation::Filter {
                    condition: ram::Condition::Constraint {
                        op: ram::ConstraintOp::Eq,
                        lhs: ram::Expression::tuple(level, pos),
                        rhs: self.translator.translate_value(arg, &self.value_index)?,
                    },
                    inner: Box::new(op),
                };
            }
        }

        let all_args_unnamed = atom.args.iter().all(|a| matches!(a, Argument::Unnamed));

        // the scan is pointless while the relation is empty
        op = ram::Operation::Filter {
            condition: ram::Condition::EmptinessCheck {
                relation: self.translator.relation_ref(&atom.name)?,
            }
            .negated(),
            inner: Box::new(op),
        };

        if atom.arity() != 0 && !all_args_unnamed {
            if clause.head.arity() == 0 {
                op = ram::Operation::Break {
                    condition: ram::Condition::EmptinessCheck {
                        relation: self.translator.relation_ref(&clause.head.name)?,
                    }
                    .negated(),
                    inner: Box::new(op),
                };
            }
            let profile_text = self.translator.config.profile.then(|| {
                format!(
                    "@frequency-atom;{};{};{};{};{};{};",
                    original.head.name, version, clause, atom, original, level
                )
            });
            op = ram::Operation::Scan {
                relation: self.translator.relation_ref(&atom.name)?,
                level,
                inner: Box::new(op),
                profile_text,
            };
        }

        Ok(op)
    }

    fn make_unpack_layer(
        &self,
        record: &Argument,
        level: usize,
        mut op: ram::Operation,
    ) -> Result<ram::Operation, TranslateError> {
        let Argument::Record(args) = record else {
            return Err(TranslateError::UngroundedRecord);
        };

        for (pos, arg) in args.iter().enumerate() {
            if arg.is_constant() || arg.is_functor() {
                op = ram::Operation::Filter {
                    condition: ram::Condition::Constraint {
                        op: ram::ConstraintOp::Eq,
                        lhs: ram::Expression::tuple(level, pos),
                        rhs: self.translator.translate_value(arg, &self.value_index)?,
                    },
                    inner: Box::new(op),
                };
            }
        }

        let location = self
            .value_index
            .record_definition_point(record)
            .ok_or(TranslateError::UngroundedRecord)?;
        Ok(ram::Operation::UnpackRecord {
            inner: Box::new(op),
            level,
            expression: tuple_element(location),
            arity: args.len(),
        })
    }
}

fn tuple_element(location: Location) -> ram::Expression {
    ram::Expression::tuple(location.identifier, location.element)
}
