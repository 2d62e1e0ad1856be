use super::*;
use cel_ast::operators::{ADD, GREATER, LESS, LOGICAL_AND, LOGICAL_OR};
use cel_ast::{unparse, CelType, ExprFactory, ExprKindTag};
use pretty_assertions::assert_eq;
use rustc_hash::FxHashSet;

fn block() -> SubexpressionOptimizer {
    SubexpressionOptimizer::new()
}

fn bind() -> SubexpressionOptimizer {
    SubexpressionOptimizer::with_options(
        SubexpressionOptimizerOptions::default().with_cel_block(false),
    )
}

fn run(optimizer: &SubexpressionOptimizer, ast: &Ast) -> Ast {
    optimizer.optimize(ast, &AstMutator::default()).unwrap()
}

fn assert_unique_ids(ast: &Ast) {
    let mut seen = FxHashSet::default();
    for node in NavigableExpr::new(&ast.expr).all_nodes(TraversalOrder::PreOrder) {
        assert!(seen.insert(node.id()), "duplicate id {}", node.id());
    }
}

/// Idents are ints, comprehensions bools, everything else dyn.
fn with_types(ast: Ast) -> Ast {
    let types = NavigableExpr::new(&ast.expr)
        .all_nodes(TraversalOrder::PreOrder)
        .map(|node| {
            let ty = match node.kind_tag() {
                ExprKindTag::Ident => CelType::Int,
                ExprKindTag::Comprehension => CelType::Bool,
                _ => CelType::Dyn,
            };
            (node.id(), ty)
        })
        .collect();
    ast.with_types(types)
}

fn size_of_pair(f: &mut ExprFactory) -> Expr {
    let one = f.new_int(1);
    let two = f.new_int(2);
    let list = f.new_list(vec![one, two]);
    f.new_global_call("size", vec![list])
}

/// `size([1, 2]) + size([1, 2])`
fn size_sum() -> Ast {
    let mut f = ExprFactory::new();
    let left = size_of_pair(&mut f);
    let right = size_of_pair(&mut f);
    let sum = f.new_global_call(ADD, vec![left, right]);
    f.build_ast(sum)
}

fn pair_exists(f: &mut ExprFactory) -> Expr {
    let one = f.new_int(1);
    let two = f.new_int(2);
    let range = f.new_list(vec![one, two]);
    let x = f.new_ident("x");
    let zero = f.new_int(0);
    let predicate = f.new_global_call(GREATER, vec![x, zero]);
    f.expand_exists(range, "x", predicate)
}

#[test]
fn test_block_extracts_innermost_first() {
    let optimized = run(&block(), &size_sum());
    assert_eq!(
        unparse(&optimized).unwrap(),
        "cel.@block([[1, 2], size(@index0)], @index1 + @index1)"
    );
    assert_unique_ids(&optimized);
    assert!(!optimized.is_checked());
}

#[test]
fn test_bind_nests_bindings() {
    let optimized = run(&bind(), &size_sum());
    assert_eq!(
        unparse(&optimized).unwrap(),
        "cel.bind(@r0, [1, 2], cel.bind(@r1, size(@r0), @r1 + @r1))"
    );
    assert_eq!(optimized.source.macro_calls.len(), 2);
    assert_unique_ids(&optimized);
}

#[test]
fn test_bind_depth_is_capped() {
    let optimizer = SubexpressionOptimizer::with_options(
        SubexpressionOptimizerOptions::default()
            .with_cel_block(false)
            .with_max_recursion_depth(1),
    );
    let optimized = run(&optimizer, &size_sum());
    assert_eq!(
        unparse(&optimized).unwrap(),
        "cel.bind(@r0, [1, 2], size(@r0) + size(@r0))"
    );
}

#[test]
fn test_block_extracts_equal_comprehensions() {
    let mut f = ExprFactory::new();
    let left = pair_exists(&mut f);
    let right = pair_exists(&mut f);
    let or = f.new_global_call(LOGICAL_OR, vec![left, right]);
    let ast = with_types(f.build_ast(or));

    let optimized = run(&block(), &ast);
    assert_eq!(
        unparse(&optimized).unwrap(),
        "cel.@block([[1, 2], @index0.exists(@it0:0, @it0:0 > 0)], @index1 || @index1)"
    );
    assert_unique_ids(&optimized);
}

/// `[1, 2].all(var, true)`
fn pair_all(f: &mut ExprFactory, var: &str) -> Expr {
    let one = f.new_int(1);
    let two = f.new_int(2);
    let range = f.new_list(vec![one, two]);
    let always = f.new_bool(true);
    f.expand_all(range, var, always)
}

#[test]
fn test_block_extracts_comprehensions_ignoring_their_variable() {
    let mut f = ExprFactory::new();
    let left = pair_all(&mut f, "x");
    let right = pair_all(&mut f, "y");
    let or = f.new_global_call(LOGICAL_OR, vec![left, right]);
    let ast = with_types(f.build_ast(or));

    let optimized = run(&block(), &ast);
    assert_eq!(
        unparse(&optimized).unwrap(),
        "cel.@block([[1, 2], @index0.all(@it0:0, true)], @index1 || @index1)"
    );
    assert_unique_ids(&optimized);
}

#[test]
fn test_loop_bound_subexpressions_stay() {
    let mut f = ExprFactory::new();
    let one = f.new_int(1);
    let range = f.new_list(vec![one]);
    let x = f.new_ident("x");
    let one = f.new_int(1);
    let left = f.new_global_call(ADD, vec![x, one]);
    let zero = f.new_int(0);
    let positive = f.new_global_call(GREATER, vec![left, zero]);
    let x = f.new_ident("x");
    let one = f.new_int(1);
    let right = f.new_global_call(ADD, vec![x, one]);
    let five = f.new_int(5);
    let small = f.new_global_call(LESS, vec![right, five]);
    let predicate = f.new_global_call(LOGICAL_AND, vec![positive, small]);
    let all = f.expand_all(range, "x", predicate);
    let ast = with_types(f.build_ast(all));

    let optimized = run(&block(), &ast);
    assert_eq!(optimized, ast);
    assert_eq!(
        unparse(&optimized).unwrap(),
        "[1].all(x, x + 1 > 0 && x + 1 < 5)"
    );
}

#[test]
fn test_nothing_to_extract_returns_input() {
    let mut f = ExprFactory::new();
    let x = f.new_ident("x");
    let size = f.new_global_call("size", vec![x]);
    let one = f.new_int(1);
    let sum = f.new_global_call(ADD, vec![size, one]);
    let ast = f.build_ast(sum);

    assert_eq!(run(&block(), &ast), ast);
    assert_eq!(run(&bind(), &ast), ast);
}

#[test]
fn test_iteration_limit() {
    let optimizer = SubexpressionOptimizer::with_options(
        SubexpressionOptimizerOptions::default().with_iteration_limit(1),
    );
    assert_eq!(
        optimizer.optimize(&size_sum(), &AstMutator::default()),
        Err(OptimizationError::IterationLimit {
            pass: "common_subexpression_elimination",
            limit: 1,
        })
    );
}
