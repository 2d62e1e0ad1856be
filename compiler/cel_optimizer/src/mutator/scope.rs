//! Variable scoping over comprehensions.
//!
//! A comprehension binds its iteration variables in `loop_condition` and
//! `loop_step`, and its accumulator in those two and in `result`. The range
//! and the accumulator initializer see the enclosing scope.

use cel_ast::{
    ensure_sufficient_stack, Comprehension, Expr, ExprId, ExprKind, ExprNode, NavigableExpr,
    TraversalOrder,
};
use rustc_hash::FxHashSet;

fn binds_in_loop(comprehension: &Comprehension, name: &str) -> bool {
    comprehension.iter_var == name
        || comprehension.iter_var2.as_deref() == Some(name)
        || comprehension.accu_var == name
}

/// Id of the first free reference to `name` in `expr`, pre-order.
pub(crate) fn free_reference(expr: &Expr, name: &str) -> Option<ExprId> {
    ensure_sufficient_stack(|| match expr.kind() {
        ExprKind::Ident(ident) => (ident.name == name).then(|| expr.id()),
        ExprKind::Comprehension(c) => free_reference(&c.iter_range, name)
            .or_else(|| free_reference(&c.accu_init, name))
            .or_else(|| {
                if binds_in_loop(c, name) {
                    return None;
                }
                free_reference(&c.loop_condition, name)
                    .or_else(|| free_reference(&c.loop_step, name))
            })
            .or_else(|| {
                if c.accu_var == name {
                    return None;
                }
                free_reference(&c.result, name)
            }),
        _ => expr
            .child_nodes()
            .into_iter()
            .find_map(|child| free_reference(child, name)),
    })
}

/// Names referenced in `expr` that no comprehension inside `expr` binds.
pub(crate) fn free_idents(expr: &Expr) -> FxHashSet<String> {
    let mut free = FxHashSet::default();
    collect_free(expr, &mut Vec::new(), &mut free);
    free
}

fn collect_free<'e>(expr: &'e Expr, bound: &mut Vec<&'e str>, free: &mut FxHashSet<String>) {
    ensure_sufficient_stack(|| match expr.kind() {
        ExprKind::Ident(ident) => {
            if !bound.contains(&ident.name.as_str()) {
                free.insert(ident.name.clone());
            }
        }
        ExprKind::Comprehension(c) => {
            collect_free(&c.iter_range, bound, free);
            collect_free(&c.accu_init, bound, free);

            let outer = bound.len();
            bound.push(&c.accu_var);
            collect_free(&c.result, bound, free);
            bound.push(&c.iter_var);
            if let Some(iter_var2) = &c.iter_var2 {
                bound.push(iter_var2);
            }
            collect_free(&c.loop_condition, bound, free);
            collect_free(&c.loop_step, bound, free);
            bound.truncate(outer);
        }
        _ => {
            for child in expr.child_nodes() {
                collect_free(child, bound, free);
            }
        }
    });
}

/// Every name some comprehension inside `expr` binds.
pub(crate) fn bound_names(expr: &Expr) -> FxHashSet<String> {
    let mut names = FxHashSet::default();
    for node in NavigableExpr::new(expr).all_nodes(TraversalOrder::PreOrder) {
        if let Ok(c) = node.expr().comprehension() {
            names.insert(c.iter_var.clone());
            names.extend(c.iter_var2.iter().cloned());
            names.insert(c.accu_var.clone());
        }
    }
    names
}
