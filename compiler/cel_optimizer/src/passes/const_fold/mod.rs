//! Constant folding.
//!
//! Finds the innermost foldable call, replaces it through
//! [`AstMutator::replace_subtree_ast`] and starts over, until nothing is
//! left to fold.
//!
//! # Scope
//!
//! - Pure operators applied to literals of one kind
//! - `!_` and `-_` on literals
//! - Short-circuit `_&&_` / `_||_` with one literal boolean
//! - `_?_:_` with a literal condition (dead branch elimination)
//!
//! Integer overflow, division by zero and mixed-kind operands are left for
//! the runtime to report.

use std::cmp::Ordering;

use cel_ast::operators::{
    is_pure_function, ADD, CONDITIONAL, DIVIDE, EQUALS, GREATER, GREATER_EQUALS, LESS,
    LESS_EQUALS, LOGICAL_AND, LOGICAL_NOT, LOGICAL_OR, MODULO, MULTIPLY, NEGATE, NOT_EQUALS,
    NOT_STRICTLY_FALSE, SUBTRACT,
};
use cel_ast::{
    Ast, Call, Constant, Expr, ExprId, ExprKind, NavigableExpr, SourceInfo, TraversalOrder,
};

use crate::{AstMutator, AstOptimizer, OptimizationError};

/// Options for [`ConstantFoldingOptimizer`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ConstantFoldingOptions {
    /// Folds allowed per run. A tree that still has candidates afterwards
    /// fails the pass.
    pub max_iteration_count: usize,
}

impl ConstantFoldingOptions {
    #[must_use]
    pub fn with_max_iteration_count(mut self, max_iteration_count: usize) -> Self {
        self.max_iteration_count = max_iteration_count;
        self
    }
}

impl Default for ConstantFoldingOptions {
    fn default() -> Self {
        ConstantFoldingOptions {
            max_iteration_count: 400,
        }
    }
}

#[derive(Copy, Clone, Debug, Default)]
pub struct ConstantFoldingOptimizer {
    options: ConstantFoldingOptions,
}

impl ConstantFoldingOptimizer {
    pub fn new() -> Self {
        ConstantFoldingOptimizer::default()
    }

    pub fn with_options(options: ConstantFoldingOptions) -> Self {
        ConstantFoldingOptimizer { options }
    }
}

impl AstOptimizer for ConstantFoldingOptimizer {
    fn name(&self) -> &'static str {
        "constant_folding"
    }

    #[tracing::instrument(level = "debug", skip_all)]
    fn optimize(&self, ast: &Ast, mutator: &AstMutator) -> Result<Ast, OptimizationError> {
        let limit = self.options.max_iteration_count;
        let mut current = ast.clone();
        let mut folds = 0;
        while let Some((id, replacement)) = find_fold(&current) {
            if folds == limit {
                return Err(OptimizationError::IterationLimit {
                    pass: self.name(),
                    limit,
                });
            }
            tracing::debug!(%id, "constant folded");
            current = mutator.replace_subtree_ast(&current, &replacement, id)?;
            folds += 1;
        }
        Ok(current)
    }
}

/// Innermost foldable node and what to put in its place.
fn find_fold(ast: &Ast) -> Option<(ExprId, Ast)> {
    NavigableExpr::new(&ast.expr)
        .all_nodes(TraversalOrder::PostOrder)
        .find_map(|node| {
            let expr = node.expr();
            let ExprKind::Call(call) = expr.kind() else {
                return None;
            };
            if call.target.is_some() {
                return None;
            }
            fold_call(ast, call).map(|replacement| (expr.id(), replacement))
        })
}

fn fold_call(ast: &Ast, call: &Call) -> Option<Ast> {
    match (call.function.as_str(), call.args.as_slice()) {
        (LOGICAL_AND, [lhs, rhs]) => fold_short_circuit(ast, lhs, rhs, false),
        (LOGICAL_OR, [lhs, rhs]) => fold_short_circuit(ast, lhs, rhs, true),
        (CONDITIONAL, [cond, then, otherwise]) => {
            let branch = if literal(cond)?.as_bool()? { then } else { otherwise };
            Some(AstMutator::subtree_ast(ast, branch))
        }
        (NOT_STRICTLY_FALSE, [arg]) => {
            let value = literal(arg)?.as_bool()?;
            Some(literal_ast(Constant::Bool(value)))
        }
        (function, args) if is_pure_function(function) => {
            let values: Option<Vec<&Constant>> = args.iter().map(literal).collect();
            evaluate(function, &values?).map(literal_ast)
        }
        _ => None,
    }
}

/// `absorbing` is the value that decides the operator on its own: `false`
/// for `&&`, `true` for `||`. The other literal is the identity, and the
/// remaining operand is hoisted.
fn fold_short_circuit(ast: &Ast, lhs: &Expr, rhs: &Expr, absorbing: bool) -> Option<Ast> {
    let lhs_value = literal(lhs).and_then(Constant::as_bool);
    let rhs_value = literal(rhs).and_then(Constant::as_bool);
    if lhs_value == Some(absorbing) || rhs_value == Some(absorbing) {
        return Some(literal_ast(Constant::Bool(absorbing)));
    }
    match (lhs_value, rhs_value) {
        (Some(_), _) => Some(AstMutator::subtree_ast(ast, rhs)),
        (None, Some(_)) => Some(AstMutator::subtree_ast(ast, lhs)),
        (None, None) => None,
    }
}

fn literal(expr: &Expr) -> Option<&Constant> {
    match expr.kind() {
        ExprKind::Constant(value) if value.is_set() => Some(value),
        _ => None,
    }
}

fn literal_ast(value: Constant) -> Ast {
    Ast::new(Expr::new_constant(ExprId::UNSET, value), SourceInfo::default())
}

/// Evaluate a pure operator over literal operands.
///
/// Returns `None` whenever the result would be a runtime error or the
/// operands do not share a kind.
fn evaluate(function: &str, args: &[&Constant]) -> Option<Constant> {
    match (function, args) {
        (LOGICAL_NOT, [Constant::Bool(b)]) => Some(Constant::Bool(!b)),
        (NEGATE, [Constant::Int(v)]) => v.checked_neg().map(Constant::Int),
        (NEGATE, [Constant::Double(v)]) => Some(Constant::Double(-v)),
        (EQUALS, [lhs, rhs]) => compare(lhs, rhs).map(|ord| Constant::Bool(ord.is_eq())),
        (NOT_EQUALS, [lhs, rhs]) => compare(lhs, rhs).map(|ord| Constant::Bool(ord.is_ne())),
        (LESS, [lhs, rhs]) => compare(lhs, rhs).map(|ord| Constant::Bool(ord.is_lt())),
        (LESS_EQUALS, [lhs, rhs]) => compare(lhs, rhs).map(|ord| Constant::Bool(ord.is_le())),
        (GREATER, [lhs, rhs]) => compare(lhs, rhs).map(|ord| Constant::Bool(ord.is_gt())),
        (GREATER_EQUALS, [lhs, rhs]) => compare(lhs, rhs).map(|ord| Constant::Bool(ord.is_ge())),
        (_, [lhs, rhs]) => arithmetic(function, lhs, rhs),
        _ => None,
    }
}

fn arithmetic(function: &str, lhs: &Constant, rhs: &Constant) -> Option<Constant> {
    match (function, lhs, rhs) {
        (ADD, Constant::Int(a), Constant::Int(b)) => a.checked_add(*b).map(Constant::Int),
        (SUBTRACT, Constant::Int(a), Constant::Int(b)) => a.checked_sub(*b).map(Constant::Int),
        (MULTIPLY, Constant::Int(a), Constant::Int(b)) => a.checked_mul(*b).map(Constant::Int),
        // `checked_div`/`checked_rem` also reject a zero divisor.
        (DIVIDE, Constant::Int(a), Constant::Int(b)) => a.checked_div(*b).map(Constant::Int),
        (MODULO, Constant::Int(a), Constant::Int(b)) => a.checked_rem(*b).map(Constant::Int),

        (ADD, Constant::Uint(a), Constant::Uint(b)) => a.checked_add(*b).map(Constant::Uint),
        (SUBTRACT, Constant::Uint(a), Constant::Uint(b)) => a.checked_sub(*b).map(Constant::Uint),
        (MULTIPLY, Constant::Uint(a), Constant::Uint(b)) => a.checked_mul(*b).map(Constant::Uint),
        (DIVIDE, Constant::Uint(a), Constant::Uint(b)) => a.checked_div(*b).map(Constant::Uint),
        (MODULO, Constant::Uint(a), Constant::Uint(b)) => a.checked_rem(*b).map(Constant::Uint),

        (ADD, Constant::Double(a), Constant::Double(b)) => Some(Constant::Double(a + b)),
        (SUBTRACT, Constant::Double(a), Constant::Double(b)) => Some(Constant::Double(a - b)),
        (MULTIPLY, Constant::Double(a), Constant::Double(b)) => Some(Constant::Double(a * b)),
        (DIVIDE, Constant::Double(a), Constant::Double(b)) => {
            if *b == 0.0 {
                None
            } else {
                Some(Constant::Double(a / b))
            }
        }

        (ADD, Constant::String(a), Constant::String(b)) => {
            Some(Constant::String(format!("{a}{b}")))
        }
        (ADD, Constant::Bytes(a), Constant::Bytes(b)) => {
            Some(Constant::Bytes([a.as_slice(), b.as_slice()].concat()))
        }
        _ => None,
    }
}

/// Ordering of two literals of the same kind. Doubles compare numerically,
/// so NaN compares with nothing.
fn compare(lhs: &Constant, rhs: &Constant) -> Option<Ordering> {
    match (lhs, rhs) {
        (Constant::Bool(a), Constant::Bool(b)) => Some(a.cmp(b)),
        (Constant::Int(a), Constant::Int(b)) => Some(a.cmp(b)),
        (Constant::Uint(a), Constant::Uint(b)) => Some(a.cmp(b)),
        (Constant::Double(a), Constant::Double(b)) => a.partial_cmp(b),
        (Constant::String(a), Constant::String(b)) => Some(a.cmp(b)),
        (Constant::Bytes(a), Constant::Bytes(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

#[cfg(test)]
mod tests;
