use super::*;
use cel_ast::{unparse, ExprFactory};
use pretty_assertions::assert_eq;

fn fold(ast: &Ast) -> Ast {
    ConstantFoldingOptimizer::new()
        .optimize(ast, &AstMutator::default())
        .unwrap()
}

/// `1 + 2 * 3`
fn arithmetic_ast() -> Ast {
    let mut f = ExprFactory::new();
    let one = f.new_int(1);
    let two = f.new_int(2);
    let three = f.new_int(3);
    let product = f.new_global_call(MULTIPLY, vec![two, three]);
    let sum = f.new_global_call(ADD, vec![one, product]);
    f.build_ast(sum)
}

#[test]
fn test_folds_nested_arithmetic() {
    let folded = fold(&arithmetic_ast());
    assert_eq!(folded.expr, Expr::new_constant(ExprId::new(5), 7i64));
    assert_eq!(unparse(&folded).unwrap(), "7");
}

#[test]
fn test_folds_inside_macro() {
    let mut f = ExprFactory::new();
    let one = f.new_int(1);
    let range = f.new_list(vec![one]);
    let x = f.new_ident("x");
    let two = f.new_int(2);
    let three = f.new_int(3);
    let sum = f.new_global_call(ADD, vec![two, three]);
    let product = f.new_global_call(MULTIPLY, vec![x, sum]);
    let map = f.expand_map(range, "x", None, product);
    let ast = f.build_ast(map);

    let folded = fold(&ast);
    assert_eq!(unparse(&folded).unwrap(), "[1].map(x, x * 5)");
    assert_eq!(folded.source.macro_calls.len(), 1);
}

#[test]
fn test_short_circuit_hoists_other_operand() {
    let mut f = ExprFactory::new();
    let x = f.new_ident("x");
    let t = f.new_bool(true);
    let and = f.new_global_call(LOGICAL_AND, vec![x, t]);
    let folded = fold(&f.build_ast(and));
    assert_eq!(folded.expr, Expr::new_ident(ExprId::new(3), "x"));

    let mut f = ExprFactory::new();
    let x = f.new_ident("x");
    let t = f.new_bool(true);
    let or = f.new_global_call(LOGICAL_OR, vec![x, t]);
    let folded = fold(&f.build_ast(or));
    assert_eq!(folded.expr, Expr::new_constant(ExprId::new(3), true));
}

#[test]
fn test_dead_branch_keeps_macro_record() {
    let mut f = ExprFactory::new();
    let cond = f.new_bool(false);
    let x = f.new_ident("x");
    let one = f.new_int(1);
    let range = f.new_list(vec![one]);
    let y = f.new_ident("y");
    let zero = f.new_int(0);
    let predicate = f.new_global_call(GREATER, vec![y, zero]);
    let exists = f.expand_exists(range, "y", predicate);
    let ternary = f.new_global_call(CONDITIONAL, vec![cond, x, exists]);
    let ast = f.build_ast(ternary);
    assert_eq!(unparse(&ast).unwrap(), "false ? x : [1].exists(y, y > 0)");

    let folded = fold(&ast);
    assert_eq!(folded.expr.id(), ast.expr.id());
    assert_eq!(unparse(&folded).unwrap(), "[1].exists(y, y > 0)");
    let keys: Vec<_> = folded.source.macro_calls.keys().copied().collect();
    assert_eq!(keys, vec![ast.expr.id()]);
}

#[test]
fn test_runtime_errors_are_not_folded() {
    let cases = [
        (Constant::Int(i64::MAX), Constant::Int(1), ADD),
        (Constant::Int(1), Constant::Int(0), DIVIDE),
        (Constant::Int(1), Constant::Int(0), MODULO),
        (Constant::Uint(0), Constant::Uint(1), SUBTRACT),
        (Constant::Int(1), Constant::Uint(1), ADD),
        (Constant::Double(1.0), Constant::Double(0.0), DIVIDE),
    ];
    for (lhs, rhs, function) in cases {
        let mut f = ExprFactory::new();
        let lhs = f.new_constant(lhs);
        let rhs = f.new_constant(rhs);
        let call = f.new_global_call(function, vec![lhs, rhs]);
        let ast = f.build_ast(call);
        assert_eq!(fold(&ast).expr, ast.expr, "{function}");
    }
}

#[test]
fn test_evaluate_operators() {
    let b = |v: bool| Constant::Bool(v);
    assert_eq!(evaluate(LOGICAL_NOT, &[&b(true)]), Some(b(false)));
    assert_eq!(evaluate(NEGATE, &[&Constant::Int(5)]), Some(Constant::Int(-5)));
    assert_eq!(evaluate(NEGATE, &[&Constant::Int(i64::MIN)]), None);
    assert_eq!(
        evaluate(ADD, &[&Constant::from("a"), &Constant::from("b")]),
        Some(Constant::from("ab"))
    );
    assert_eq!(
        evaluate(ADD, &[&Constant::Bytes(vec![1]), &Constant::Bytes(vec![2])]),
        Some(Constant::Bytes(vec![1, 2]))
    );
    assert_eq!(
        evaluate(LESS, &[&Constant::Double(2.0), &Constant::Double(3.0)]),
        Some(b(true))
    );
    assert_eq!(
        evaluate(EQUALS, &[&Constant::Double(f64::NAN), &Constant::Double(f64::NAN)]),
        None
    );
    assert_eq!(
        evaluate(GREATER_EQUALS, &[&Constant::Uint(3), &Constant::Uint(3)]),
        Some(b(true))
    );
    assert_eq!(evaluate(NOT_EQUALS, &[&b(true), &b(false)]), Some(b(true)));
    assert_eq!(evaluate(LESS_EQUALS, &[&Constant::Int(1), &Constant::Uint(2)]), None);
    assert_eq!(evaluate(MODULO, &[&Constant::Int(7), &Constant::Int(3)]), Some(Constant::Int(1)));
}

#[test]
fn test_not_strictly_false_on_literal() {
    let mut f = ExprFactory::new();
    let t = f.new_bool(true);
    let call = f.new_global_call(NOT_STRICTLY_FALSE, vec![t]);
    let folded = fold(&f.build_ast(call));
    assert_eq!(folded.expr, Expr::new_constant(ExprId::new(2), true));
}

#[test]
fn test_iteration_limit() {
    let optimizer = ConstantFoldingOptimizer::with_options(
        ConstantFoldingOptions::default().with_max_iteration_count(1),
    );
    assert_eq!(
        optimizer.optimize(&arithmetic_ast(), &AstMutator::default()),
        Err(OptimizationError::IterationLimit {
            pass: "constant_folding",
            limit: 1,
        })
    );

    let optimizer = ConstantFoldingOptimizer::with_options(
        ConstantFoldingOptions::default().with_max_iteration_count(2),
    );
    assert!(optimizer
        .optimize(&arithmetic_ast(), &AstMutator::default())
        .is_ok());
}

#[test]
fn test_input_is_untouched() {
    let ast = arithmetic_ast();
    let before = ast.clone();
    let _ = fold(&ast);
    assert_eq!(ast, before);
}
