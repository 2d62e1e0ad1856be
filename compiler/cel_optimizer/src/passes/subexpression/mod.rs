//! Common-subexpression elimination.
//!
//! Comprehension variables are mangled first, so equal comprehensions at
//! the same depth compare equal. The pass then repeatedly looks for the
//! first subtree, in post-order, that occurs at least twice in the search
//! scope and does not use a variable bound inside that scope. Post-order
//! makes extraction innermost-first: `size([1, 2])` is found only after
//! `[1, 2]` has been pulled out.
//!
//! Two output shapes are supported:
//!
//! ```text
//! cel.@block([[1, 2], size(@index0)], @index1 + @index1)
//! cel.bind(@r0, [1, 2], cel.bind(@r1, size(@r0), @r1 + @r1))
//! ```
//!
//! With `cel.bind` each binding wraps the scope it was found in, and the
//! search continues in the new binding's result so later bindings see the
//! earlier ones.

use cel_ast::operators::{CEL_BLOCK, CEL_BLOCK_INDEX_PREFIX};
use cel_ast::{Ast, Expr, ExprId, ExprKind, NavigableExpr, SourceInfo, TraversalOrder};
use rustc_hash::FxHashMap;

use crate::mutator::ast_max_id;
use crate::mutator::scope::{bound_names, free_idents};
use crate::{AstMutator, AstOptimizer, MutatorError, OptimizationError};

const ITER_VAR_PREFIX: &str = "@it";
const ACCU_VAR_PREFIX: &str = "@ac";
const BIND_VAR_PREFIX: &str = "@r";

/// Options for [`SubexpressionOptimizer`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SubexpressionOptimizerOptions {
    /// Extractions allowed per run.
    pub iteration_limit: usize,
    /// Emit `cel.@block`; otherwise nested `cel.bind` macros.
    pub enable_cel_block: bool,
    /// Maximum number of nested `cel.bind` macros. Zero means unbounded.
    /// Ignored in `cel.@block` mode.
    pub subexpression_max_recursion_depth: usize,
}

impl SubexpressionOptimizerOptions {
    #[must_use]
    pub fn with_iteration_limit(mut self, iteration_limit: usize) -> Self {
        self.iteration_limit = iteration_limit;
        self
    }

    #[must_use]
    pub fn with_cel_block(mut self, enable_cel_block: bool) -> Self {
        self.enable_cel_block = enable_cel_block;
        self
    }

    #[must_use]
    pub fn with_max_recursion_depth(mut self, depth: usize) -> Self {
        self.subexpression_max_recursion_depth = depth;
        self
    }
}

impl Default for SubexpressionOptimizerOptions {
    fn default() -> Self {
        SubexpressionOptimizerOptions {
            iteration_limit: 500,
            enable_cel_block: true,
            subexpression_max_recursion_depth: 0,
        }
    }
}

#[derive(Copy, Clone, Debug, Default)]
pub struct SubexpressionOptimizer {
    options: SubexpressionOptimizerOptions,
}

/// A repeated subtree: its first post-order occurrence, and the ids of
/// every occurrence in pre-order.
struct Candidate {
    expr: Expr,
    occurrences: Vec<ExprId>,
}

impl SubexpressionOptimizer {
    pub fn new() -> Self {
        SubexpressionOptimizer::default()
    }

    pub fn with_options(options: SubexpressionOptimizerOptions) -> Self {
        SubexpressionOptimizer { options }
    }

    fn limit_reached(&self) -> OptimizationError {
        OptimizationError::IterationLimit {
            pass: self.name(),
            limit: self.options.iteration_limit,
        }
    }

    fn eliminate_with_block(
        &self,
        ast: &Ast,
        mutator: &AstMutator,
    ) -> Result<Option<Ast>, OptimizationError> {
        let mut current = ast.clone();
        let mut subexpressions = Vec::new();
        let root = current.expr.id();
        while let Some(candidate) = find_candidate(mutator, &current.expr, root)? {
            let index = subexpressions.len();
            if index == self.options.iteration_limit {
                return Err(self.limit_reached());
            }
            let name = format!("{CEL_BLOCK_INDEX_PREFIX}{index}");
            tracing::debug!(
                %name,
                occurrences = candidate.occurrences.len(),
                "subexpression extracted"
            );
            subexpressions.push(AstMutator::subtree_ast(&current, &candidate.expr));
            current = replace_occurrences(mutator, &current, &candidate.occurrences, &name)?;
        }
        if subexpressions.is_empty() {
            return Ok(None);
        }

        // Extracted subtrees still carry ids now owned by `@index` idents.
        let mut floor = ast_max_id(&current);
        let mut items = Vec::with_capacity(subexpressions.len());
        for subexpression in &subexpressions {
            let stable = mutator.stabilize_ast(subexpression, floor)?;
            floor = floor.max(ast_max_id(&stable));
            current.source.macro_calls.extend(stable.source.macro_calls);
            current.source.positions.extend(stable.source.positions);
            items.push(stable.expr);
        }
        Ok(Some(mutator.wrap_ast_with_new_cel_block(&current, items)))
    }

    fn eliminate_with_bind(
        &self,
        ast: &Ast,
        mutator: &AstMutator,
    ) -> Result<Option<Ast>, OptimizationError> {
        let max_depth = self.options.subexpression_max_recursion_depth;
        let mut current = ast.clone();
        let mut scope = current.expr.id();
        let mut bindings = 0;
        while max_depth == 0 || bindings < max_depth {
            let Some(candidate) = find_candidate(mutator, &current.expr, scope)? else {
                break;
            };
            if bindings == self.options.iteration_limit {
                return Err(self.limit_reached());
            }
            let name = format!("{BIND_VAR_PREFIX}{bindings}");
            tracing::debug!(
                %name,
                %scope,
                occurrences = candidate.occurrences.len(),
                "subexpression extracted"
            );

            let init = AstMutator::subtree_ast(&current, &candidate.expr);
            current = replace_occurrences(mutator, &current, &candidate.occurrences, &name)?;
            let result = find_expr(&current.expr, scope)
                .cloned()
                .ok_or(MutatorError::TargetNotFound(scope))?;
            current = mutator
                .replace_subtree_with_new_bind_macro(&current, &name, &init, &result, scope, true)?;
            scope = find_expr(&current.expr, scope)
                .and_then(|bind| bind.comprehension().ok())
                .map(|bind| bind.result.id())
                .ok_or(MutatorError::TargetNotFound(scope))?;
            bindings += 1;
        }
        Ok((bindings > 0).then_some(current))
    }
}

impl AstOptimizer for SubexpressionOptimizer {
    fn name(&self) -> &'static str {
        "common_subexpression_elimination"
    }

    #[tracing::instrument(
        level = "debug",
        skip_all,
        fields(cel_block = self.options.enable_cel_block)
    )]
    fn optimize(&self, ast: &Ast, mutator: &AstMutator) -> Result<Ast, OptimizationError> {
        let mangled = mutator
            .mangle_comprehension_identifier_names(ast, ITER_VAR_PREFIX, ACCU_VAR_PREFIX, false)?
            .ast;
        let eliminated = if self.options.enable_cel_block {
            self.eliminate_with_block(&mangled, mutator)?
        } else {
            self.eliminate_with_bind(&mangled, mutator)?
        };
        Ok(eliminated.unwrap_or_else(|| ast.clone()))
    }
}

fn find_expr(root: &Expr, id: ExprId) -> Option<&Expr> {
    NavigableExpr::new(root)
        .all_nodes(TraversalOrder::PreOrder)
        .find(|node| node.id() == id)
        .map(|node| node.expr())
}

/// Kinds worth naming. Literals and identifiers are as cheap as the
/// reference that would replace them.
fn is_eliminable(expr: &Expr) -> bool {
    match expr.kind() {
        ExprKind::Select(_) | ExprKind::Struct(_) | ExprKind::Comprehension(_) => true,
        ExprKind::Call(call) => call.function != CEL_BLOCK,
        ExprKind::List(list) => !list.elements.is_empty(),
        ExprKind::Map(map) => !map.entries.is_empty(),
        ExprKind::NotSet | ExprKind::Constant(_) | ExprKind::Ident(_) => false,
    }
}

fn find_candidate(
    mutator: &AstMutator,
    root: &Expr,
    scope: ExprId,
) -> Result<Option<Candidate>, MutatorError> {
    let Some(scope) = find_expr(root, scope) else {
        return Ok(None);
    };
    let bound = bound_names(scope);

    let mut cleared = FxHashMap::default();
    let mut occurrences: FxHashMap<Expr, Vec<ExprId>> = FxHashMap::default();
    for node in NavigableExpr::new(scope).all_nodes(TraversalOrder::PreOrder) {
        let expr = node.expr();
        if !is_eliminable(expr) {
            continue;
        }
        let key = mutator.clear_expr_ids(expr)?;
        occurrences.entry(key.clone()).or_default().push(expr.id());
        cleared.insert(expr.id(), key);
    }

    for node in NavigableExpr::new(scope).all_nodes(TraversalOrder::PostOrder) {
        let expr = node.expr();
        let Some(ids) = cleared.get(&expr.id()).and_then(|key| occurrences.get(key)) else {
            continue;
        };
        if ids.len() < 2 || free_idents(expr).iter().any(|name| bound.contains(name)) {
            continue;
        }
        return Ok(Some(Candidate {
            expr: expr.clone(),
            occurrences: ids.clone(),
        }));
    }
    Ok(None)
}

fn replace_occurrences(
    mutator: &AstMutator,
    ast: &Ast,
    occurrences: &[ExprId],
    name: &str,
) -> Result<Ast, MutatorError> {
    let reference = Ast::new(Expr::new_ident(ExprId::UNSET, name), SourceInfo::default());
    let mut current = ast.clone();
    for &id in occurrences {
        current = mutator.replace_subtree_ast(&current, &reference, id)?;
    }
    Ok(current)
}

#[cfg(test)]
mod tests;
