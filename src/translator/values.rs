//! Value and constraint translation
//!
//! Lowers AST argument expressions to RAM expressions, resolving variables
//! and aggregators through the clause's value index, and lowers non-atom
//! body literals (binary constraints and negations) to RAM conditions.
//! Positive atoms yield no condition here: the scan layer of the clause
//! translator covers them.

use crate::ast::{AggregateOp, Argument, ConstraintOp, FunctorOp, Literal};
use crate::ram;
use crate::translator::value_index::ValueIndex;
use crate::translator::{TranslateError, Translator};

impl Translator<'_> {
    /// Translate an argument expression to a RAM expression
    pub(crate) fn translate_value(
        &self,
        arg: &Argument,
        index: &ValueIndex<'_>,
    ) -> Result<ram::Expression, TranslateError> {
        match arg {
            Argument::Variable(name) => {
                let location = index.definition_point(name).ok_or_else(|| {
                    TranslateError::UngroundedVariable { name: name.clone() }
                })?;
                Ok(ram::Expression::tuple(location.identifier, location.element))
            }
            Argument::Unnamed => Ok(ram::Expression::Undefined),
            Argument::Signed(v) => Ok(ram::Expression::Signed(*v)),
            Argument::Unsigned(v) => Ok(ram::Expression::Unsigned(*v)),
            Argument::Float(v) => Ok(ram::Expression::Float(*v)),
            Argument::Str { index: symbol, .. } => Ok(ram::Expression::Signed(*symbol as i64)),
            Argument::Nil => Ok(ram::Expression::Signed(0)),
            Argument::Intrinsic { op, args } => {
                let args = self.translate_values(args, index)?;
                Ok(ram::Expression::Intrinsic {
                    op: lower_functor_op(*op),
                    args,
                })
            }
            Argument::UserDefined { name, args } => {
                let decl = self.program.functor(name).ok_or_else(|| {
                    TranslateError::UnknownFunctor { name: name.clone() }
                })?;
                let args = self.translate_values(args, index)?;
                Ok(ram::Expression::UserDefined {
                    name: name.clone(),
                    signature: decl.signature.clone(),
                    args,
                })
            }
            Argument::Counter => Ok(ram::Expression::AutoIncrement),
            Argument::Record(args) => {
                let args = self.translate_values(args, index)?;
                Ok(ram::Expression::PackRecord(args))
            }
            Argument::Aggregator(agg) => {
                let location = index
                    .aggregator_location(agg)
                    .ok_or(TranslateError::UnboundAggregator)?;
                Ok(ram::Expression::tuple(location.identifier, location.element))
            }
            Argument::SubroutineArg(number) => Ok(ram::Expression::SubroutineArg(*number)),
        }
    }

    fn translate_values(
        &self,
        args: &[Argument],
        index: &ValueIndex<'_>,
    ) -> Result<Vec<ram::Expression>, TranslateError> {
        args.iter()
            .map(|arg| self.translate_value(arg, index))
            .collect()
    }

    /// Translate a body literal to a RAM condition, if it imposes one
    pub(crate) fn translate_constraint(
        &self,
        literal: &Literal,
        index: &ValueIndex<'_>,
    ) -> Result<Option<ram::Condition>, TranslateError> {
        match literal {
            // covered by the scan/lookup generation step
            Literal::Atom(_) => Ok(None),

            Literal::Constraint { op, lhs, rhs } => Ok(Some(ram::Condition::Constraint {
                op: lower_constraint_op(*op),
                lhs: self.translate_value(lhs, index)?,
                rhs: self.translate_value(rhs, index)?,
            })),

            Literal::Negation(atom) => {
                let aux_arity = self.analyses.aux_arity.evaluation_arity(&atom.name);
                let arity = atom.arity() - aux_arity;
                let mut tuple = Vec::with_capacity(atom.arity());
                for arg in &atom.args[..arity] {
                    tuple.push(self.translate_value(arg, index)?);
                }
                tuple.extend(std::iter::repeat_n(ram::Expression::Undefined, aux_arity));

                let relation = self.relation_ref(&atom.name)?;
                if arity > 0 {
                    Ok(Some(
                        ram::Condition::ExistenceCheck { relation, tuple }.negated(),
                    ))
                } else {
                    Ok(Some(ram::Condition::EmptinessCheck { relation }))
                }
            }

            Literal::ProvenanceNegation(atom) => {
                let aux_arity = self.analyses.aux_arity.evaluation_arity(&atom.name);
                let arity = atom.arity() - aux_arity;
                let mut tuple = Vec::with_capacity(atom.arity());
                for arg in &atom.args[..arity] {
                    tuple.push(self.translate_value(arg, index)?);
                }
                // the annotation columns are irrelevant to the existence
                // check itself: wildcard the rule number, keep the heights
                if self.config.has_provenance() {
                    tuple.push(ram::Expression::Undefined);
                    for h in 1..aux_arity {
                        tuple.push(self.translate_value(&atom.args[arity + h], index)?);
                    }
                }
                let relation = self.relation_ref(&atom.name)?;
                Ok(Some(
                    ram::Condition::ProvenanceExistenceCheck { relation, tuple }.negated(),
                ))
            }
        }
    }
}

/// Lower an AST functor operator to its RAM counterpart
pub(crate) fn lower_functor_op(op: FunctorOp) -> ram::IntrinsicOp {
    match op {
        FunctorOp::Add => ram::IntrinsicOp::Add,
        FunctorOp::Sub => ram::IntrinsicOp::Sub,
        FunctorOp::Mul => ram::IntrinsicOp::Mul,
        FunctorOp::Div => ram::IntrinsicOp::Div,
        FunctorOp::Mod => ram::IntrinsicOp::Mod,
        FunctorOp::Exp => ram::IntrinsicOp::Exp,
        FunctorOp::Neg => ram::IntrinsicOp::Neg,
        FunctorOp::BitAnd => ram::IntrinsicOp::BitAnd,
        FunctorOp::BitOr => ram::IntrinsicOp::BitOr,
        FunctorOp::BitXor => ram::IntrinsicOp::BitXor,
        FunctorOp::Cat => ram::IntrinsicOp::Cat,
        FunctorOp::Ord => ram::IntrinsicOp::Ord,
        FunctorOp::StrLen => ram::IntrinsicOp::StrLen,
        FunctorOp::ToNumber => ram::IntrinsicOp::ToNumber,
        FunctorOp::ToString => ram::IntrinsicOp::ToString,
    }
}

/// Lower an AST constraint operator to its RAM counterpart
pub(crate) fn lower_constraint_op(op: ConstraintOp) -> ram::ConstraintOp {
    match op {
        ConstraintOp::Eq => ram::ConstraintOp::Eq,
        ConstraintOp::Ne => ram::ConstraintOp::Ne,
        ConstraintOp::Lt => ram::ConstraintOp::Lt,
        ConstraintOp::Le => ram::ConstraintOp::Le,
        ConstraintOp::Gt => ram::ConstraintOp::Gt,
        ConstraintOp::Ge => ram::ConstraintOp::Ge,
    }
}

/// Lower an AST aggregate operator to its RAM counterpart
pub(crate) fn lower_aggregate_op(op: AggregateOp) -> ram::AggregateFunction {
    match op {
        AggregateOp::Min => ram::AggregateFunction::Min,
        AggregateOp::Max => ram::AggregateFunction::Max,
        AggregateOp::Count => ram::AggregateFunction::Count,
        AggregateOp::Sum => ram::AggregateFunction::Sum,
    }
}
