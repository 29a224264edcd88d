//! End-to-end translation tests: hand-built programs lowered to RAM, with
//! assertions over the shape of the emitted main statement, subroutines
//! and I/O directives.

use rampart::ast::builders::{ClauseBuilder, RelationBuilder};
use rampart::ast::{
    AggregateOp, Aggregator, Argument, Atom, Literal, Program, StoreDirective,
};
use rampart::ram::{self, Condition, Expression, Operation, Statement};
use rampart::{translate, Config, ProvenanceMode, SymbolTable, TranslationUnit};
use std::collections::BTreeMap;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn run(program: Program, config: &Config) -> ram::Program {
    init_tracing();
    let unit = TranslationUnit::new(program);
    translate(&unit, config).expect("translation succeeds")
}

fn var(name: &str) -> Argument {
    Argument::Variable(name.to_string())
}

// ============================================================================
// Tree walkers
// ============================================================================

fn all_statements(statement: &Statement) -> Vec<&Statement> {
    let mut out = Vec::new();
    walk_statement(statement, &mut out);
    out
}

fn walk_statement<'a>(statement: &'a Statement, out: &mut Vec<&'a Statement>) {
    out.push(statement);
    match statement {
        Statement::Sequence(stmts) | Statement::Parallel(stmts) => {
            for s in stmts {
                walk_statement(s, out);
            }
        }
        Statement::Loop { body, update, .. } => {
            walk_statement(body, out);
            walk_statement(update, out);
        }
        Statement::LogTimer { inner, .. }
        | Statement::LogRelationTimer { inner, .. }
        | Statement::DebugInfo { inner, .. } => walk_statement(inner, out),
        _ => {}
    }
}

fn all_operations(statement: &Statement) -> Vec<&Operation> {
    let mut out = Vec::new();
    for s in all_statements(statement) {
        if let Statement::Query(op) = s {
            walk_operation(op, &mut out);
        }
    }
    out
}

fn walk_operation<'a>(op: &'a Operation, out: &mut Vec<&'a Operation>) {
    out.push(op);
    match op {
        Operation::Scan { inner, .. }
        | Operation::UnpackRecord { inner, .. }
        | Operation::Aggregate { inner, .. }
        | Operation::Filter { inner, .. }
        | Operation::Break { inner, .. } => walk_operation(inner, out),
        Operation::Project { .. } | Operation::SubroutineReturn(_) => {}
    }
}

fn relations_in_condition(condition: &Condition, out: &mut Vec<String>) {
    match condition {
        Condition::Conjunction(lhs, rhs) => {
            relations_in_condition(lhs, out);
            relations_in_condition(rhs, out);
        }
        Condition::Negation(inner) => relations_in_condition(inner, out),
        Condition::ExistenceCheck { relation, .. }
        | Condition::ProvenanceExistenceCheck { relation, .. }
        | Condition::EmptinessCheck { relation } => out.push(relation.clone()),
        _ => {}
    }
}

// ============================================================================
// Programs
// ============================================================================

/// S1: `.decl e(a,b) .decl r(f,t)  r(X,Y) :- e(X,Y).  r(X,Z) :- r(X,Y), r(Y,Z).`
fn transitive_closure() -> Program {
    let mut program = Program::new();
    program.relations.push(
        RelationBuilder::new("e")
            .attr("a", "number")
            .attr("b", "number")
            .input()
            .build(),
    );
    program.relations.push(
        RelationBuilder::new("r")
            .attr("f", "number")
            .attr("t", "number")
            .output()
            .build(),
    );
    program.clauses.push(
        ClauseBuilder::new("r")
            .head_vars(["X", "Y"])
            .body_atom("e", ["X", "Y"])
            .build(),
    );
    program.clauses.push(
        ClauseBuilder::new("r")
            .head_vars(["X", "Z"])
            .body_atom("r", ["X", "Y"])
            .body_atom("r", ["Y", "Z"])
            .build(),
    );
    program
}

/// S2: `a(X) :- b(X).  b(X) :- a(X).`
fn mutual_recursion() -> Program {
    let mut program = Program::new();
    program.relations.push(
        RelationBuilder::new("a")
            .attr("x", "number")
            .output()
            .build(),
    );
    program
        .relations
        .push(RelationBuilder::new("b").attr("x", "number").input().build());
    program.clauses.push(
        ClauseBuilder::new("a")
            .head_vars(["X"])
            .body_atom("b", ["X"])
            .build(),
    );
    program.clauses.push(
        ClauseBuilder::new("b")
            .head_vars(["X"])
            .body_atom("a", ["X"])
            .build(),
    );
    program
}

/// S3: `r(sum y : s(y)) :- t().`
fn aggregate_program() -> Program {
    let mut program = Program::new();
    program
        .relations
        .push(RelationBuilder::new("s").attr("y", "number").input().build());
    program.relations.push(RelationBuilder::new("t").input().build());
    program.relations.push(
        RelationBuilder::new("r")
            .attr("x", "number")
            .output()
            .build(),
    );
    program.clauses.push(
        ClauseBuilder::new("r")
            .head_arg(Argument::Aggregator(Aggregator {
                op: AggregateOp::Sum,
                target: Some(Box::new(var("y"))),
                body: vec![Literal::Atom(Atom::new("s", vec![var("y")]))],
            }))
            .body_atom::<&str>("t", [])
            .build(),
    );
    program
}

/// S4: `.decl stop()  stop() :- ready(X).`
fn nullary_head_program() -> Program {
    let mut program = Program::new();
    program.relations.push(
        RelationBuilder::new("ready")
            .attr("x", "number")
            .input()
            .build(),
    );
    program
        .relations
        .push(RelationBuilder::new("stop").output().build());
    program.clauses.push(
        ClauseBuilder::new("stop")
            .body_atom("ready", ["X"])
            .build(),
    );
    program
}

/// S5: `p(X) :- q(X).` after the upstream provenance transform added the
/// rule-number and level columns.
fn provenance_program() -> Program {
    let mut program = Program::new();
    program.relations.push(
        RelationBuilder::new("q")
            .attr("x", "number")
            .attr("@rule_num", "number")
            .attr("@level_num", "number")
            .input()
            .build(),
    );
    program.relations.push(
        RelationBuilder::new("p")
            .attr("x", "number")
            .attr("@rule_num", "number")
            .attr("@level_num", "number")
            .output()
            .build(),
    );
    program.clauses.push(
        ClauseBuilder::new("p")
            .head_arg(var("X"))
            .head_arg(Argument::Signed(0))
            .head_arg(Argument::Intrinsic {
                op: rampart::ast::FunctorOp::Add,
                args: vec![var("@level_num_0"), Argument::Signed(1)],
            })
            .literal(Literal::Atom(Atom::new(
                "q",
                vec![var("X"), Argument::Unnamed, var("@level_num_0")],
            )))
            .build(),
    );
    program
}

// ============================================================================
// Scenario S1: transitive closure
// ============================================================================

#[test]
fn s1_creates_delta_and_new_relations_for_recursive_scc_only() {
    let ram = run(transitive_closure(), &Config::default());

    assert!(ram.relation("r").is_some());
    assert!(ram.relation("@delta_r").is_some());
    assert!(ram.relation("@new_r").is_some());
    assert!(ram.relation("e").is_some());
    assert!(ram.relation("@delta_e").is_none());
    assert!(ram.relation("@new_e").is_none());
}

#[test]
fn s1_loads_inputs_and_stores_outputs() {
    let ram = run(transitive_closure(), &Config::default());
    let statements = all_statements(&ram.main);

    assert!(statements
        .iter()
        .any(|s| matches!(s, Statement::Load { relation, .. } if relation == "e")));
    assert!(statements
        .iter()
        .any(|s| matches!(s, Statement::Store { relation, .. } if relation == "r")));
}

#[test]
fn s1_preamble_merges_into_delta() {
    let ram = run(transitive_closure(), &Config::default());

    // query { scan r -> project @delta_r } appears before the loop
    let merge_found = all_operations(&ram.main).iter().any(|op| {
        matches!(op, Operation::Scan { relation, inner, .. }
            if relation == "r"
                && matches!(&**inner, Operation::Project { relation, .. } if relation == "@delta_r"))
    });
    assert!(merge_found, "preamble must merge r into @delta_r");
}

#[test]
fn s1_loop_update_swaps_and_clears() {
    let ram = run(transitive_closure(), &Config::default());
    let statements = all_statements(&ram.main);

    let Some(Statement::Loop { exit, update, body }) = statements
        .iter()
        .find(|s| matches!(s, Statement::Loop { .. }))
    else {
        panic!("recursive SCC must emit a loop");
    };

    assert_eq!(
        *exit,
        Condition::EmptinessCheck {
            relation: "@new_r".to_string()
        }
    );

    let update_statements = all_statements(update);
    assert!(update_statements.iter().any(|s| matches!(s,
        Statement::Swap { first, second } if first == "@delta_r" && second == "@new_r")));
    assert!(update_statements
        .iter()
        .any(|s| matches!(s, Statement::Clear(rel) if rel == "@new_r")));

    assert!(matches!(&**body, Statement::Parallel(arms) if arms.len() == 1));
}

#[test]
fn s1_recursive_rule_emits_one_version_per_scc_atom() {
    let ram = run(transitive_closure(), &Config::default());
    let statements = all_statements(&ram.main);

    let Some(Statement::Loop { body, .. }) = statements
        .iter()
        .find(|s| matches!(s, Statement::Loop { .. }))
    else {
        panic!("loop expected");
    };

    // the recursive rule has two r-atoms, hence exactly two versions
    let versions = all_statements(body)
        .iter()
        .filter(|s| matches!(s, Statement::DebugInfo { .. }))
        .count();
    assert_eq!(versions, 2);

    // version 0 scans @delta_r at the first position and subtracts the
    // trailing delta; version 1 scans @delta_r at the second position
    let scans: Vec<&str> = all_operations(body)
        .iter()
        .filter_map(|op| match op {
            Operation::Scan { relation, .. } => Some(relation.as_str()),
            _ => None,
        })
        .collect();
    assert!(scans.contains(&"@delta_r"));
    assert!(scans.contains(&"r"));
}

#[test]
fn s1_version_zero_subtracts_later_delta() {
    let ram = run(transitive_closure(), &Config::default());

    // somewhere in the loop: a negated existence check against @delta_r
    let found = all_operations(&ram.main).iter().any(|op| {
        matches!(op, Operation::Filter { condition, .. }
            if matches!(condition, Condition::Negation(inner)
                if matches!(&**inner, Condition::ExistenceCheck { relation, .. }
                    if relation == "@delta_r")))
    });
    assert!(found, "semi-naive subtraction of later delta positions");
}

#[test]
fn s1_recursive_versions_negate_original_head() {
    let ram = run(transitive_closure(), &Config::default());

    let found = all_operations(&ram.main).iter().any(|op| {
        matches!(op, Operation::Filter { condition, .. }
            if matches!(condition, Condition::Negation(inner)
                if matches!(&**inner, Condition::ExistenceCheck { relation, tuple }
                    if relation == "r" && tuple.len() == 2)))
    });
    assert!(found, "recursive versions must not re-derive existing tuples");
}

#[test]
fn s1_postamble_clears_auxiliaries() {
    let ram = run(transitive_closure(), &Config::default());
    let statements = all_statements(&ram.main);

    for relation in ["@delta_r", "@new_r"] {
        assert!(statements
            .iter()
            .any(|s| matches!(s, Statement::Clear(rel) if rel == relation)));
    }
}

// ============================================================================
// Scenario S2: mutual recursion
// ============================================================================

#[test]
fn s2_single_scc_with_one_version_per_rule() {
    let ram = run(mutual_recursion(), &Config::default());
    let statements = all_statements(&ram.main);

    let loops: Vec<_> = statements
        .iter()
        .filter(|s| matches!(s, Statement::Loop { .. }))
        .collect();
    assert_eq!(loops.len(), 1, "one SCC, one loop");

    let Statement::Loop { body, exit, .. } = loops[0] else {
        unreachable!();
    };

    // two relations in the SCC, each rule contributing one version
    let Statement::Parallel(arms) = &**body else {
        panic!("loop body must be a parallel block");
    };
    assert_eq!(arms.len(), 2);
    for arm in arms {
        let versions = all_statements(arm)
            .iter()
            .filter(|s| matches!(s, Statement::DebugInfo { .. }))
            .count();
        assert_eq!(versions, 1);
    }

    // exit once both @new relations drained
    let mut exit_relations = Vec::new();
    relations_in_condition(exit, &mut exit_relations);
    assert!(exit_relations.contains(&"@new_a".to_string()));
    assert!(exit_relations.contains(&"@new_b".to_string()));
}

// ============================================================================
// Scenario S3: aggregation
// ============================================================================

#[test]
fn s3_sum_aggregate_layer() {
    let ram = run(aggregate_program(), &Config::default());
    let operations = all_operations(&ram.main);

    let Some(Operation::Aggregate {
        function,
        relation,
        expression,
        condition,
        level,
        ..
    }) = operations
        .iter()
        .find(|op| matches!(op, Operation::Aggregate { .. }))
    else {
        panic!("aggregate layer expected");
    };

    assert_eq!(*function, ram::AggregateFunction::Sum);
    assert_eq!(relation, "s");
    assert_eq!(*condition, Condition::True);
    // the aggregator got the fresh level after the single body atom
    assert_eq!(*level, 1);
    // target expression is y's tuple element at the aggregate level
    assert_eq!(*expression, Expression::tuple(1, 0));
}

#[test]
fn s3_head_projects_aggregate_result() {
    let ram = run(aggregate_program(), &Config::default());

    let found = all_operations(&ram.main).iter().any(|op| {
        matches!(op, Operation::Project { relation, values }
            if relation == "r" && values == &vec![Expression::tuple(1, 0)])
    });
    assert!(found, "head projects the aggregator's binding site");
}

// ============================================================================
// Scenario S4: nullary head
// ============================================================================

#[test]
fn s4_nullary_head_guards_and_breaks() {
    let ram = run(nullary_head_program(), &Config::default());
    let operations = all_operations(&ram.main);

    // outermost layer of the rule: the stopping filter on the head
    let rule_query = all_statements(&ram.main)
        .into_iter()
        .find_map(|s| match s {
            Statement::Query(op @ Operation::Filter { .. }) => Some(op),
            _ => None,
        })
        .expect("rule query expected");
    let Operation::Filter { condition, .. } = rule_query else {
        unreachable!();
    };
    assert_eq!(
        *condition,
        Condition::EmptinessCheck {
            relation: "stop".to_string()
        }
    );

    // the scan over ready breaks once stop becomes non-empty
    let break_found = operations.iter().any(|op| {
        matches!(op, Operation::Break { condition, .. }
            if matches!(condition, Condition::Negation(inner)
                if matches!(&**inner, Condition::EmptinessCheck { relation } if relation == "stop")))
    });
    assert!(break_found);

    // the innermost projection re-checks emptiness before inserting
    let guarded_project = operations.iter().any(|op| {
        matches!(op, Operation::Filter { condition, inner }
            if matches!(condition, Condition::EmptinessCheck { relation } if relation == "stop")
                && matches!(&**inner, Operation::Project { relation, values }
                    if relation == "stop" && values.is_empty()))
    });
    assert!(guarded_project);
}

// ============================================================================
// Scenario S5: provenance subroutines
// ============================================================================

#[test]
fn s5_subproof_binds_head_and_level_arguments() {
    let mut config = Config::default();
    config.provenance = Some(ProvenanceMode::Explain);
    let ram = run(provenance_program(), &config);

    let subproof = ram
        .subroutines
        .get("p_0_subproof")
        .expect("subproof subroutine emitted");
    let operations = all_operations(subproof);

    // the witness values: the body atom's three columns plus both sides
    // of the two appended binding constraints
    let returns = operations
        .iter()
        .find_map(|op| match op {
            Operation::SubroutineReturn(values) => Some(values),
            _ => None,
        })
        .expect("subroutine return expected");
    assert_eq!(returns.len(), 7);

    // head binding: q's first column equals subroutine argument 0
    let head_binding = operations.iter().any(|op| {
        matches!(op, Operation::Filter { condition, .. }
            if matches!(condition, Condition::Constraint { op: ram::ConstraintOp::Eq, lhs, rhs }
                if *lhs == Expression::tuple(0, 0) && *rhs == Expression::SubroutineArg(0)))
    });
    assert!(head_binding);

    // level constraint: q's last column strictly below argument 1
    let level_constraint = operations.iter().any(|op| {
        matches!(op, Operation::Filter { condition, .. }
            if matches!(condition, Condition::Constraint { op: ram::ConstraintOp::Lt, lhs, rhs }
                if *lhs == Expression::tuple(0, 2) && *rhs == Expression::SubroutineArg(1)))
    });
    assert!(level_constraint);
}

#[test]
fn s5_negation_subproof_checks_user_columns() {
    let mut config = Config::default();
    config.provenance = Some(ProvenanceMode::Explain);
    let ram = run(provenance_program(), &config);

    let subroutine = ram
        .subroutines
        .get("p_0_negation_subproof")
        .expect("negation subproof emitted");
    let operations = all_operations(subroutine);

    let expected_tuple = vec![
        Expression::SubroutineArg(0),
        Expression::Undefined,
        Expression::Undefined,
    ];

    // return 1 when q(arg0, _, _) exists
    let positive = operations.iter().any(|op| {
        matches!(op, Operation::Filter { condition, inner }
            if matches!(condition, Condition::ExistenceCheck { relation, tuple }
                if relation == "q" && tuple == &expected_tuple)
                && matches!(&**inner, Operation::SubroutineReturn(values)
                    if values == &vec![Expression::Signed(1)]))
    });
    assert!(positive);

    // return 0 when it does not
    let negative = operations.iter().any(|op| {
        matches!(op, Operation::Filter { condition, inner }
            if matches!(condition, Condition::Negation(check)
                if matches!(&**check, Condition::ExistenceCheck { relation, tuple }
                    if relation == "q" && tuple == &expected_tuple))
                && matches!(&**inner, Operation::SubroutineReturn(values)
                    if values == &vec![Expression::Signed(0)]))
    });
    assert!(negative);
}

#[test]
fn s5_no_subroutines_without_provenance() {
    let ram = run(transitive_closure(), &Config::default());
    assert!(ram.subroutines.is_empty());
}

// ============================================================================
// Scenario S6 and property 9: stdout overrides
// ============================================================================

#[test]
fn s6_stdout_override_with_print_size_store() {
    let mut program = Program::new();
    program.relations.push(
        RelationBuilder::new("out")
            .attr("x", "number")
            .print_size()
            .output()
            .build(),
    );
    program
        .clauses
        .push(ClauseBuilder::new("out").head_arg(Argument::Signed(1)).build());

    let mut config = Config::default();
    config.output_dir = "-".to_string();
    let ram = run(program, &config);

    let directives = all_statements(&ram.main)
        .into_iter()
        .find_map(|s| match s {
            Statement::Store { directives, .. } => Some(directives.clone()),
            _ => None,
        })
        .expect("store statement expected");

    assert_eq!(directives.len(), 2);
    assert_eq!(directives[0].io_type(), Some("stdoutprintsize"));
    assert_eq!(directives[1].io_type(), Some("stdout"));
    assert_eq!(directives[1].get("headers"), Some("true"));
}

#[test]
fn p9_stdout_override_suppresses_extra_stores() {
    let mut kvs = BTreeMap::new();
    kvs.insert("filename".to_string(), "custom.csv".to_string());

    let mut program = Program::new();
    program.relations.push(
        RelationBuilder::new("out")
            .attr("x", "number")
            .output()
            .print_size()
            .store(StoreDirective {
                kvs,
                print_size: false,
            })
            .build(),
    );
    program
        .clauses
        .push(ClauseBuilder::new("out").head_arg(Argument::Signed(1)).build());

    let mut config = Config::default();
    config.output_dir = "-".to_string();
    let ram = run(program, &config);

    let directives = all_statements(&ram.main)
        .into_iter()
        .find_map(|s| match s {
            Statement::Store { directives, .. } => Some(directives.clone()),
            _ => None,
        })
        .expect("store statement expected");

    // three declared stores collapse to stdout + stdoutprintsize
    assert_eq!(directives.len(), 2);
    assert_eq!(directives[0].io_type(), Some("stdout"));
    assert_eq!(directives[0].get("headers"), Some("true"));
    assert_eq!(directives[1].io_type(), Some("stdoutprintsize"));
}

// ============================================================================
// Property 3: grounding of tuple elements
// ============================================================================

fn assert_grounded(ram: &ram::Program) {
    for statement in all_statements(&ram.main) {
        if let Statement::Query(op) = statement {
            let mut levels = BTreeMap::new();
            check_operation(op, ram, &mut levels);
        }
    }
}

fn check_operation(op: &Operation, ram: &ram::Program, levels: &mut BTreeMap<usize, usize>) {
    match op {
        Operation::Scan {
            relation,
            level,
            inner,
            ..
        } => {
            let arity = ram.relation(relation).expect("scanned relation").arity;
            levels.insert(*level, arity);
            check_operation(inner, ram, levels);
        }
        Operation::UnpackRecord {
            inner,
            level,
            expression,
            arity,
        } => {
            check_expression(expression, levels);
            levels.insert(*level, *arity);
            check_operation(inner, ram, levels);
        }
        Operation::Aggregate {
            inner,
            relation,
            expression,
            condition,
            level,
            ..
        } => {
            let arity = ram.relation(relation).expect("aggregate relation").arity;
            levels.insert(*level, arity);
            check_expression(expression, levels);
            check_condition(condition, levels);
            check_operation(inner, ram, levels);
        }
        Operation::Filter { condition, inner } | Operation::Break { condition, inner } => {
            check_condition(condition, levels);
            check_operation(inner, ram, levels);
        }
        Operation::Project { values, .. } | Operation::SubroutineReturn(values) => {
            for value in values {
                check_expression(value, levels);
            }
        }
    }
}

fn check_condition(condition: &Condition, levels: &BTreeMap<usize, usize>) {
    match condition {
        Condition::Constraint { lhs, rhs, .. } => {
            check_expression(lhs, levels);
            check_expression(rhs, levels);
        }
        Condition::Conjunction(lhs, rhs) => {
            check_condition(lhs, levels);
            check_condition(rhs, levels);
        }
        Condition::Negation(inner) => check_condition(inner, levels),
        Condition::ExistenceCheck { tuple, .. }
        | Condition::ProvenanceExistenceCheck { tuple, .. } => {
            for value in tuple {
                check_expression(value, levels);
            }
        }
        Condition::True | Condition::EmptinessCheck { .. } => {}
    }
}

fn check_expression(expression: &Expression, levels: &BTreeMap<usize, usize>) {
    match expression {
        Expression::TupleElement { level, element } => {
            let width = levels
                .get(level)
                .unwrap_or_else(|| panic!("t{level}.{element} outside any enclosing operation"));
            assert!(
                element < width,
                "t{level}.{element} exceeds tuple width {width}"
            );
        }
        Expression::Intrinsic { args, .. }
        | Expression::UserDefined { args, .. }
        | Expression::PackRecord(args) => {
            for arg in args {
                check_expression(arg, levels);
            }
        }
        _ => {}
    }
}

#[test]
fn p3_all_tuple_elements_resolve_in_scope() {
    assert_grounded(&run(transitive_closure(), &Config::default()));
    assert_grounded(&run(mutual_recursion(), &Config::default()));
    assert_grounded(&run(aggregate_program(), &Config::default()));
    assert_grounded(&run(nullary_head_program(), &Config::default()));
}

#[test]
fn p3_ungrounded_variable_is_fatal() {
    let mut program = Program::new();
    program
        .relations
        .push(RelationBuilder::new("b").attr("x", "number").build());
    program
        .relations
        .push(RelationBuilder::new("a").attr("x", "number").build());
    // Y never appears in a positive body atom
    program.clauses.push(
        ClauseBuilder::new("a")
            .head_vars(["Y"])
            .body_atom("b", ["X"])
            .build(),
    );

    let unit = TranslationUnit::new(program);
    let error = translate(&unit, &Config::default()).expect_err("must fail");
    assert!(matches!(
        error,
        rampart::TranslateError::UngroundedVariable { name } if name == "Y"
    ));
}

// ============================================================================
// Property 4: fact translation
// ============================================================================

#[test]
fn p4_fact_lowers_to_bare_projection() {
    let mut program = Program::new();
    program.relations.push(
        RelationBuilder::new("e")
            .attr("a", "number")
            .attr("b", "number")
            .build(),
    );
    program.clauses.push(
        ClauseBuilder::new("e")
            .head_arg(Argument::Signed(1))
            .head_arg(Argument::Signed(2))
            .build(),
    );

    let ram = run(program, &Config::default());
    let query = all_statements(&ram.main)
        .into_iter()
        .find_map(|s| match s {
            Statement::Query(op) => Some(op),
            _ => None,
        })
        .expect("fact query");

    assert_eq!(
        *query,
        Operation::Project {
            relation: "e".to_string(),
            values: vec![Expression::Signed(1), Expression::Signed(2)],
        }
    );
}

// ============================================================================
// Property 5: negation arity
// ============================================================================

#[test]
fn p5_negation_existence_check_arity() {
    let mut program = Program::new();
    program
        .relations
        .push(RelationBuilder::new("b").attr("x", "number").input().build());
    program.relations.push(
        RelationBuilder::new("p")
            .attr("x", "number")
            .attr("y", "number")
            .input()
            .build(),
    );
    program
        .relations
        .push(RelationBuilder::new("z").input().build());
    program
        .relations
        .push(RelationBuilder::new("a").attr("x", "number").output().build());
    program.clauses.push(
        ClauseBuilder::new("a")
            .head_vars(["X"])
            .body_atom("b", ["X"])
            .negation("p", ["X", "X"])
            .literal(Literal::Negation(Atom::new("z", vec![])))
            .build(),
    );

    let ram = run(program, &Config::default());
    let operations = all_operations(&ram.main);

    // !p(X, X): negated existence check of full arity
    let binary = operations.iter().any(|op| {
        matches!(op, Operation::Filter { condition, .. }
            if matches!(condition, Condition::Negation(inner)
                if matches!(&**inner, Condition::ExistenceCheck { relation, tuple }
                    if relation == "p" && tuple.len() == 2)))
    });
    assert!(binary);

    // !z(): nullary negation degrades to an emptiness check
    let nullary = operations.iter().any(|op| {
        matches!(op, Operation::Filter { condition, .. }
            if matches!(condition, Condition::EmptinessCheck { relation } if relation == "z"))
    });
    assert!(nullary);
}

#[test]
fn p5_negation_wildcards_auxiliary_columns() {
    let mut config = Config::default();
    config.provenance = Some(ProvenanceMode::Explain);

    // p's negation under provenance must wildcard the 2 trailing columns
    let mut program = provenance_program();
    program.relations.push(
        RelationBuilder::new("blocked")
            .attr("x", "number")
            .attr("@rule_num", "number")
            .attr("@level_num", "number")
            .output()
            .build(),
    );
    program.clauses.push(
        ClauseBuilder::new("blocked")
            .head_arg(var("Y"))
            .head_arg(Argument::Signed(0))
            .head_arg(Argument::Signed(0))
            .literal(Literal::Atom(Atom::new(
                "q",
                vec![var("Y"), Argument::Unnamed, Argument::Unnamed],
            )))
            .literal(Literal::Negation(Atom::new(
                "p",
                vec![var("Y"), Argument::Unnamed, Argument::Unnamed],
            )))
            .build(),
    );

    let ram = run(program, &config);
    let found = all_operations(&ram.main).iter().any(|op| {
        matches!(op, Operation::Filter { condition, .. }
            if matches!(condition, Condition::Negation(inner)
                if matches!(&**inner, Condition::ExistenceCheck { relation, tuple }
                    if relation == "p"
                        && tuple.len() == 3
                        && tuple[1] == Expression::Undefined
                        && tuple[2] == Expression::Undefined)))
    });
    assert!(found, "negation under provenance wildcards auxiliary columns");
}

// ============================================================================
// Property 8: execution plans
// ============================================================================

#[test]
fn p8_execution_plan_equals_manual_reordering() {
    let base = |planned: bool| {
        let mut program = Program::new();
        program.relations.push(
            RelationBuilder::new("u")
                .attr("x", "number")
                .attr("y", "number")
                .input()
                .build(),
        );
        program.relations.push(
            RelationBuilder::new("v")
                .attr("x", "number")
                .attr("y", "number")
                .input()
                .build(),
        );
        program.relations.push(
            RelationBuilder::new("w")
                .attr("x", "number")
                .attr("y", "number")
                .output()
                .build(),
        );
        let clause = if planned {
            ClauseBuilder::new("w")
                .head_vars(["X", "Z"])
                .body_atom("u", ["X", "Y"])
                .body_atom("v", ["Y", "Z"])
                .plan_order(0, vec![2, 1])
                .build()
        } else {
            ClauseBuilder::new("w")
                .head_vars(["X", "Z"])
                .body_atom("v", ["Y", "Z"])
                .body_atom("u", ["X", "Y"])
                .build()
        };
        program.clauses.push(clause);
        program
    };

    let planned = run(base(true), &Config::default());
    let manual = run(base(false), &Config::default());
    // diagnostic texts differ (they render the source clause), the
    // operation trees must not
    assert_eq!(all_operations(&planned.main), all_operations(&manual.main));
}

// ============================================================================
// Variable equality and constant filters
// ============================================================================

#[test]
fn repeated_variables_emit_equality_filters() {
    let mut program = Program::new();
    program.relations.push(
        RelationBuilder::new("e")
            .attr("a", "number")
            .attr("b", "number")
            .input()
            .build(),
    );
    program
        .relations
        .push(RelationBuilder::new("loop_edge").attr("x", "number").output().build());
    program.clauses.push(
        ClauseBuilder::new("loop_edge")
            .head_vars(["X"])
            .body_atom("e", ["X", "X"])
            .build(),
    );

    let ram = run(program, &Config::default());
    let found = all_operations(&ram.main).iter().any(|op| {
        matches!(op, Operation::Filter { condition, .. }
            if matches!(condition, Condition::Constraint { op: ram::ConstraintOp::Eq, lhs, rhs }
                if *lhs == Expression::tuple(0, 0) && *rhs == Expression::tuple(0, 1)))
    });
    assert!(found, "e(X, X) requires t0.0 = t0.1");
}

#[test]
fn constants_in_body_atoms_emit_equality_filters() {
    let mut program = Program::new();
    program.relations.push(
        RelationBuilder::new("color")
            .attr("x", "number")
            .attr("c", "number")
            .input()
            .build(),
    );
    program
        .relations
        .push(RelationBuilder::new("red").attr("x", "number").output().build());
    program.clauses.push(
        ClauseBuilder::new("red")
            .head_vars(["X"])
            .literal(Literal::Atom(Atom::new(
                "color",
                vec![var("X"), Argument::Signed(0)],
            )))
            .build(),
    );

    let ram = run(program, &Config::default());
    let found = all_operations(&ram.main).iter().any(|op| {
        matches!(op, Operation::Filter { condition, .. }
            if matches!(condition, Condition::Constraint { op: ram::ConstraintOp::Eq, lhs, rhs }
                if *lhs == Expression::tuple(0, 1) && *rhs == Expression::Signed(0)))
    });
    assert!(found, "color(X, 0) requires t0.1 = 0");
}

#[test]
fn string_constants_lower_to_symbol_indices() {
    let mut symbols = SymbolTable::new();
    let red = symbols.intern("red");

    let mut program = Program::new();
    program.relations.push(
        RelationBuilder::new("color")
            .attr("x", "number")
            .attr("c", "symbol")
            .input()
            .build(),
    );
    program
        .relations
        .push(RelationBuilder::new("red_things").attr("x", "number").output().build());
    program.clauses.push(
        ClauseBuilder::new("red_things")
            .head_vars(["X"])
            .literal(Literal::Atom(Atom::new(
                "color",
                vec![
                    var("X"),
                    Argument::Str {
                        text: "red".to_string(),
                        index: red,
                    },
                ],
            )))
            .build(),
    );

    init_tracing();
    let unit = TranslationUnit::with_symbols(program, symbols);
    let ram = translate(&unit, &Config::default()).expect("translation succeeds");

    let found = all_operations(&ram.main).iter().any(|op| {
        matches!(op, Operation::Filter { condition, .. }
            if matches!(condition, Condition::Constraint { op: ram::ConstraintOp::Eq, lhs, rhs }
                if *lhs == Expression::tuple(0, 1) && *rhs == Expression::Signed(red as i64)))
    });
    assert!(found, "string constants compare by their interned index");
    assert_eq!(unit.symbols().resolve(red), Some("red"));
}

// ============================================================================
// Profiling and debug report
// ============================================================================

#[test]
fn profile_wraps_main_and_annotates_scans() {
    let mut config = Config::default();
    config.profile = true;
    let ram = run(transitive_closure(), &config);

    assert!(matches!(&ram.main, Statement::LogTimer { message, .. } if message == "@runtime;"));

    let annotated_scan = all_operations(&ram.main).iter().any(|op| {
        matches!(op, Operation::Scan { profile_text: Some(text), .. }
            if text.starts_with("@frequency-atom;"))
    });
    assert!(annotated_scan);

    let relation_timers = all_statements(&ram.main)
        .iter()
        .filter(|s| matches!(s, Statement::LogRelationTimer { .. }))
        .count();
    assert!(relation_timers > 0);
}

#[test]
fn debug_report_records_ram_program() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("report.txt");

    let mut config = Config::default();
    config.debug_report = Some(path.clone());

    let unit = TranslationUnit::new(transitive_closure());
    translate(&unit, &config).expect("translation succeeds");

    let report = unit.debug_report();
    assert!(!report.is_empty());
    assert!(report.sections()[0].title.starts_with("RAM Program"));

    let written = std::fs::read_to_string(&path).expect("report written");
    assert!(written.contains("BEGIN MAIN"));
}

// ============================================================================
// Expiry, defaults and edge cases
// ============================================================================

#[test]
fn expired_relations_are_cleared_without_provenance() {
    let ram = run(transitive_closure(), &Config::default());
    let cleared: Vec<&str> = all_statements(&ram.main)
        .iter()
        .filter_map(|s| match s {
            Statement::Clear(rel) => Some(rel.as_str()),
            _ => None,
        })
        .collect();
    assert!(cleared.contains(&"e"));
}

#[test]
fn provenance_suppresses_expiry_clears() {
    let mut config = Config::default();
    config.provenance = Some(ProvenanceMode::Explain);
    let ram = run(provenance_program(), &config);

    let cleared: Vec<&str> = all_statements(&ram.main)
        .iter()
        .filter_map(|s| match s {
            Statement::Clear(rel) => Some(rel.as_str()),
            _ => None,
        })
        .collect();
    assert!(!cleared.contains(&"q"));

    // stored attribute names drop the auxiliary columns
    let store = all_statements(&ram.main)
        .into_iter()
        .find_map(|s| match s {
            Statement::Store { directives, .. } => Some(directives.clone()),
            _ => None,
        })
        .expect("store statement expected");
    assert_eq!(store[0].get("attributeNames"), Some("x"));
}

#[test]
fn default_io_directives_use_configured_directories() {
    let mut config = Config::default();
    config.fact_dir = "facts".to_string();
    config.output_dir = "out".to_string();
    let ram = run(transitive_closure(), &config);

    let statements = all_statements(&ram.main);
    let load = statements
        .iter()
        .find_map(|s| match s {
            Statement::Load { directives, .. } => Some(directives),
            _ => None,
        })
        .expect("load statement");
    assert_eq!(load[0].io_type(), Some("file"));
    assert_eq!(load[0].get("filename"), Some("facts/e.facts"));

    let store = statements
        .iter()
        .find_map(|s| match s {
            Statement::Store { directives, .. } => Some(directives),
            _ => None,
        })
        .expect("store statement");
    assert_eq!(store[0].get("filename"), Some("out/r.csv"));
    assert_eq!(store[0].get("attributeNames"), Some("f\tt"));
}

#[test]
fn empty_program_translates_to_empty_main() {
    let ram = run(Program::new(), &Config::default());
    assert_eq!(ram.main, Statement::Sequence(vec![]));
    assert!(ram.relations.is_empty());
}

#[test]
fn unknown_relation_is_fatal() {
    let mut program = Program::new();
    program
        .relations
        .push(RelationBuilder::new("a").attr("x", "number").build());
    program.clauses.push(
        ClauseBuilder::new("a")
            .head_vars(["X"])
            .body_atom("ghost", ["X"])
            .build(),
    );

    let unit = TranslationUnit::new(program);
    let error = translate(&unit, &Config::default()).expect_err("must fail");
    assert!(matches!(
        error,
        rampart::TranslateError::UnknownRelation { name } if name == "ghost"
    ));
}

#[test]
fn aggregate_with_two_atoms_is_fatal() {
    let mut program = Program::new();
    program
        .relations
        .push(RelationBuilder::new("s").attr("y", "number").input().build());
    program
        .relations
        .push(RelationBuilder::new("t").attr("y", "number").input().build());
    program
        .relations
        .push(RelationBuilder::new("r").attr("x", "number").output().build());
    program.clauses.push(
        ClauseBuilder::new("r")
            .head_arg(Argument::Aggregator(Aggregator {
                op: AggregateOp::Count,
                target: None,
                body: vec![
                    Literal::Atom(Atom::new("s", vec![var("y")])),
                    Literal::Atom(Atom::new("t", vec![var("y")])),
                ],
            }))
            .body_atom("s", ["z"])
            .build(),
    );

    let unit = TranslationUnit::new(program);
    let error = translate(&unit, &Config::default()).expect_err("must fail");
    assert!(matches!(
        error,
        rampart::TranslateError::UnsupportedAggregateBody { .. }
    ));
}

// ============================================================================
// Records
// ============================================================================

#[test]
fn record_arguments_unpack_at_fresh_levels() {
    let mut program = Program::new();
    program.relations.push(
        RelationBuilder::new("pairs")
            .attr("p", "number")
            .input()
            .build(),
    );
    program
        .relations
        .push(RelationBuilder::new("firsts").attr("x", "number").output().build());
    program.clauses.push(
        ClauseBuilder::new("firsts")
            .head_vars(["X"])
            .literal(Literal::Atom(Atom::new(
                "pairs",
                vec![Argument::Record(vec![var("X"), var("Y")])],
            )))
            .build(),
    );

    let ram = run(program, &Config::default());
    let operations = all_operations(&ram.main);

    let Some(Operation::UnpackRecord {
        level,
        expression,
        arity,
        ..
    }) = operations
        .iter()
        .find(|op| matches!(op, Operation::UnpackRecord { .. }))
    else {
        panic!("unpack layer expected");
    };

    // the record is bound at the atom's first column and unpacks two wide
    assert_eq!(*expression, Expression::tuple(0, 0));
    assert_eq!(*arity, 2);
    assert_eq!(*level, 1);

    // the head projects the record's first component
    let projected = operations.iter().any(|op| {
        matches!(op, Operation::Project { relation, values }
            if relation == "firsts" && values == &vec![Expression::tuple(1, 0)])
    });
    assert!(projected);

    assert_grounded(&ram);
}
