use super::*;
use crate::{Call, Comprehension, CreateList};
use pretty_assertions::assert_eq;

fn id(raw: i64) -> ExprId {
    ExprId::new(raw)
}

/// `f(a, [b, c])`
fn call_tree() -> Expr {
    Expr::new_call(
        id(1),
        Call::global(
            "f",
            vec![
                Expr::new_ident(id(2), "a"),
                Expr::new_list(
                    id(3),
                    CreateList::new(vec![Expr::new_ident(id(4), "b"), Expr::new_ident(id(5), "c")]),
                ),
            ],
        ),
    )
}

fn ids<'a, E: ExprNode + 'a>(nodes: impl Iterator<Item = NavigableExpr<'a, E>>) -> Vec<i64> {
    nodes.map(|n| n.id().raw()).collect()
}

#[test]
fn test_pre_and_post_order() {
    let expr = call_tree();
    let root = NavigableExpr::new(&expr);
    assert_eq!(ids(root.all_nodes(TraversalOrder::PreOrder)), vec![1, 2, 3, 4, 5]);
    assert_eq!(ids(root.all_nodes(TraversalOrder::PostOrder)), vec![2, 4, 5, 3, 1]);
}

#[test]
fn test_traversal_is_restartable() {
    let expr = call_tree();
    let root = NavigableExpr::new(&expr);
    let first = ids(root.all_nodes(TraversalOrder::PreOrder));
    let second = ids(root.all_nodes(TraversalOrder::PreOrder));
    assert_eq!(first, second);
}

#[test]
fn test_descendants_exclude_self() {
    let expr = call_tree();
    let root = NavigableExpr::new(&expr);
    assert_eq!(ids(root.descendants(TraversalOrder::PreOrder)), vec![2, 3, 4, 5]);
}

#[test]
fn test_parent_and_depth() {
    let expr = call_tree();
    let root = NavigableExpr::new(&expr);
    assert!(root.parent().is_none());

    let leaf = root
        .all_nodes(TraversalOrder::PreOrder)
        .find(|n| n.id() == id(5))
        .unwrap();
    assert_eq!(leaf.depth(), 2);
    assert_eq!(leaf.parent().map(NavigableExpr::id), Some(id(3)));
    let chain: Vec<_> = leaf.ancestors().map(|n| n.id().raw()).collect();
    assert_eq!(chain, vec![3, 1]);
}

#[test]
fn test_standalone_child_has_no_parent() {
    let expr = call_tree();
    let arg = &expr.call().unwrap().args[0];
    assert!(NavigableExpr::new(arg).parent().is_none());
}

#[test]
fn test_mutable_view_matches_immutable() {
    let expr = call_tree();
    let mutable = expr.to_mutable();
    let a = ids(NavigableExpr::new(&expr).all_nodes(TraversalOrder::PostOrder));
    let b = ids(NavigableExpr::new(&mutable).all_nodes(TraversalOrder::PostOrder));
    assert_eq!(a, b);
}

#[test]
fn test_comprehension_depth() {
    let inner = Expr::new_comprehension(
        id(10),
        Comprehension {
            iter_var: "y".to_owned(),
            iter_var2: None,
            iter_range: Expr::new_ident(id(11), "ys"),
            accu_var: "@result".to_owned(),
            accu_init: Expr::new_constant(id(12), false),
            loop_condition: Expr::new_constant(id(13), true),
            loop_step: Expr::new_ident(id(14), "y"),
            result: Expr::new_ident(id(15), "@result"),
        },
    );
    let outer = Expr::new_comprehension(
        id(1),
        Comprehension {
            iter_var: "x".to_owned(),
            iter_var2: None,
            iter_range: Expr::new_ident(id(2), "xs"),
            accu_var: "@result".to_owned(),
            accu_init: Expr::new_constant(id(3), false),
            loop_condition: Expr::new_constant(id(4), true),
            loop_step: inner,
            result: Expr::new_ident(id(5), "@result"),
        },
    );
    let root = NavigableExpr::new(&outer);
    let step = root
        .all_nodes(TraversalOrder::PreOrder)
        .find(|n| n.id() == id(14))
        .unwrap();
    assert_eq!(step.comprehension_depth(), 2);
    let inner_nav = step.parent().unwrap();
    assert_eq!(inner_nav.comprehension_depth(), 1);
    assert_eq!(root.comprehension_depth(), 0);
}
