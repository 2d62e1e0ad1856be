//! AST mutation engine.
//!
//! [`AstMutator`] performs the tree surgery optimization passes are built
//! from. Every operation takes an immutable AST, works on a private
//! [`MutableExpr`] copy and returns a new AST; the input is never touched.
//!
//! # Id discipline
//!
//! A whole-AST replacement first renumbers the incoming subtree above the
//! largest id anywhere in the target AST, then walks the target with a
//! [`StableIdGenerator`] whose floor is the largest id of either side. Every
//! node that existed before keeps its id, the spliced root inherits the id
//! of the node it replaces, and no two nodes can collide. The macro-call map
//! and positions are then re-keyed through the same generator (see
//! `normalize`).
//!
//! # Limits
//!
//! Every walk counts visited nodes against the mutator's iteration limit.
//! Hitting it means a malformed tree or a runaway pass and fails the
//! operation with [`MutatorError::IterationLimitExceeded`].

mod mangle;
mod normalize;
pub(crate) mod scope;
mod visitor;

use std::collections::BTreeMap;

use cel_ast::factory::ExprFactory;
use cel_ast::operators::CEL_BLOCK;
use cel_ast::{
    Ast, AstError, Call, ClearIdGenerator, CreateList, Expr, ExprId, ExprIdGenerator, ExprKind,
    MutableAst, MutableExpr, MutableSource, NavigableExpr, NoOpIdGenerator, SourceInfo,
    StableIdGenerator, TraversalOrder,
};
use rustc_hash::FxHashSet;

pub use mangle::{MangledComprehensionAst, MangledComprehensionName, MangledComprehensionType};

use crate::MutatorError;
use normalize::normalize_source;
use visitor::{max_id, IdRewriter};

/// Tree rewriting engine. Stateless apart from its iteration limit, so one
/// instance can be shared across threads.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct AstMutator {
    iteration_limit: usize,
}

impl AstMutator {
    /// A mutator whose walks give up after `iteration_limit` nodes.
    pub fn new(iteration_limit: i64) -> Result<Self, MutatorError> {
        match usize::try_from(iteration_limit) {
            Ok(limit) if limit > 0 => Ok(AstMutator {
                iteration_limit: limit,
            }),
            _ => Err(MutatorError::InvalidIterationLimit(iteration_limit)),
        }
    }

    pub fn iteration_limit(&self) -> usize {
        self.iteration_limit
    }

    fn rewrite(
        &self,
        expr: &mut MutableExpr,
        ids: &mut dyn ExprIdGenerator,
    ) -> Result<(), MutatorError> {
        IdRewriter::new(ids, self.iteration_limit).visit(expr)
    }

    /// Copy of `expr` with every id, entry ids included, set to unset.
    ///
    /// Two subtrees are the same expression exactly when their cleared
    /// copies are equal.
    pub fn clear_expr_ids(&self, expr: &Expr) -> Result<Expr, MutatorError> {
        let mut expr = expr.to_mutable();
        self.rewrite(&mut expr, &mut ClearIdGenerator)?;
        Ok(expr.to_expr())
    }

    /// Replace the node with id `target` in `root` by `new_expr`, keeping
    /// every id as it is. The spliced root takes over `target`.
    ///
    /// `root` is returned unchanged if no node has that id. No id
    /// bookkeeping happens here; use [`replace_subtree_ast`] when the
    /// trees carry source metadata or may share ids.
    ///
    /// [`replace_subtree_ast`]: AstMutator::replace_subtree_ast
    pub fn replace_subtree(
        &self,
        root: &Expr,
        new_expr: &Expr,
        target: ExprId,
    ) -> Result<Expr, MutatorError> {
        let mut root = root.to_mutable();
        let mut ids = NoOpIdGenerator;
        IdRewriter::new(&mut ids, self.iteration_limit)
            .replacing(target, new_expr.to_mutable())
            .visit(&mut root)?;
        Ok(root.to_expr())
    }

    /// Replace the node with id `target` in `ast` by the root of `new_ast`.
    ///
    /// `new_ast` is renumbered above every id in `ast` before it is spliced
    /// in, and its macro records come along. Ids of untouched nodes are
    /// preserved. The result is unchecked.
    #[tracing::instrument(level = "debug", skip_all, fields(%target))]
    pub fn replace_subtree_ast(
        &self,
        ast: &Ast,
        new_ast: &Ast,
        target: ExprId,
    ) -> Result<Ast, MutatorError> {
        let mut root = ast.expr.to_mutable();
        if !target.is_set() || root.find(target).is_none() {
            return Err(MutatorError::TargetNotFound(target));
        }

        let seed = ast_max_id(ast);
        let (incoming, _) = self.stabilize(&new_ast.to_mutable(), seed)?;
        let floor = mutable_ast_max_id(&incoming).max(seed);
        let incoming_root = incoming.expr.id();

        let mut ids = StableIdGenerator::new(floor)?;
        IdRewriter::new(&mut ids, self.iteration_limit)
            .replacing(target, incoming.expr)
            .visit(&mut root)?;

        // The incoming root never shows up under its own id.
        ids.memoize(incoming_root, target);
        let mut source = ast.source.to_mutable();
        if incoming.source.positions.contains_key(&incoming_root) {
            source.positions.remove(&target);
        }
        source.positions.extend(incoming.source.positions);
        source.add_all_macro_calls(incoming.source.macro_calls);
        let source = normalize_source(source, Some(target), &root, &mut ids, self.iteration_limit)?;
        tracing::debug!(macro_calls = source.macro_calls.len(), "subtree replaced");
        Ok(MutableAst::new(root, source).to_ast())
    }

    /// Renumber every id of `ast` to `seed + 1, seed + 2, ...` in pre-order
    /// of the main tree, then the macro records in key order. Unset ids in
    /// the main tree get fresh ids; record roots stay unset.
    ///
    /// Positions and checker annotations are re-keyed along.
    #[tracing::instrument(level = "debug", skip(self, ast))]
    pub fn stabilize_ast(&self, ast: &Ast, seed: i64) -> Result<Ast, MutatorError> {
        let (stable, ids) = self.stabilize(&ast.to_mutable(), seed)?;
        let shift = shift_by(seed);
        let rekey = |id: &ExprId| ids.lookup(*id).filter(|id| id.is_set()).map(shift);

        let mut stabilized = stable.to_ast();
        stabilized.types = ast
            .types
            .iter()
            .filter_map(|(id, ty)| Some((rekey(id)?, ty.clone())))
            .collect();
        stabilized.references = ast
            .references
            .iter()
            .filter_map(|(id, reference)| Some((rekey(id)?, reference.clone())))
            .collect();
        Ok(stabilized)
    }

    /// [`stabilize_ast`](AstMutator::stabilize_ast) from zero: ids become
    /// `1..=n`.
    pub fn renumber_ids_consecutively(&self, ast: &Ast) -> Result<Ast, MutatorError> {
        self.stabilize_ast(ast, 0)
    }

    fn stabilize(
        &self,
        ast: &MutableAst,
        seed: i64,
    ) -> Result<(MutableAst, StableIdGenerator), MutatorError> {
        if seed < 0 {
            return Err(AstError::NegativeSeed(seed).into());
        }
        let shift = shift_by(seed);
        let mut ids = StableIdGenerator::new(0)?;

        let mut expr = ast.expr.clone();
        {
            let mut fresh = |id: ExprId| {
                shift(if id.is_set() {
                    ids.renumber_id(id)
                } else {
                    ids.next_expr_id()
                })
            };
            self.rewrite(&mut expr, &mut fresh)?;
        }

        let mut macro_calls = BTreeMap::new();
        for (key, record) in &ast.source.macro_calls {
            let key = shift(ids.renumber_id(*key));
            let mut record = record.clone();
            {
                let mut keep_unset = |id: ExprId| {
                    if id.is_set() {
                        shift(ids.renumber_id(id))
                    } else {
                        id
                    }
                };
                self.rewrite(&mut record, &mut keep_unset)?;
            }
            macro_calls.insert(key, record);
        }

        let positions = ast
            .source
            .positions
            .iter()
            .filter_map(|(id, offset)| {
                let id = ids.lookup(*id).filter(|id| id.is_set())?;
                Some((shift(id), *offset))
            })
            .collect();

        let source = MutableSource {
            description: ast.source.description.clone(),
            line_offsets: ast.source.line_offsets.clone(),
            positions,
            macro_calls,
        };
        Ok((MutableAst::new(expr, source), ids))
    }

    /// Wrap `ast` as `cel.@block([subexpressions...], expr)`.
    ///
    /// The caller supplies subexpressions whose ids do not collide with
    /// `ast`, and merges their macro records into `ast` beforehand. The
    /// result is unchecked.
    pub fn wrap_ast_with_new_cel_block(&self, ast: &Ast, subexpressions: Vec<Expr>) -> Ast {
        let max = subexpressions
            .iter()
            .map(expr_max_id)
            .fold(ast_max_id(ast), i64::max);
        let list = Expr::new_list(ExprId::new(max + 2), CreateList::new(subexpressions));
        let block = Expr::new_call(
            ExprId::new(max + 1),
            Call::global(CEL_BLOCK, vec![list, ast.expr.clone()]),
        );
        Ast::new(block, ast.source.clone())
    }

    /// Replace `target` in `ast` by `cel.bind(var_name, init, result)`.
    ///
    /// `init` is renumbered above `ast` first, so it may share ids with
    /// `result` (as when it was cut from the same tree). It brings its own
    /// macro records, and records of `ast` keyed inside `result` are
    /// renumbered along with it. With
    /// `populate_macro_source` the `cel.bind` call itself is recorded so the
    /// binding unparses as written.
    #[tracing::instrument(level = "debug", skip(self, ast, init, result))]
    pub fn replace_subtree_with_new_bind_macro(
        &self,
        ast: &Ast,
        var_name: &str,
        init: &Ast,
        result: &Expr,
        target: ExprId,
        populate_macro_source: bool,
    ) -> Result<Ast, MutatorError> {
        let init = self.stabilize_ast(init, ast_max_id(ast))?;
        let seed = ast_max_id(ast).max(ast_max_id(&init));
        let mut factory = ExprFactory::with_seed(seed)?;
        let bind = factory.expand_bind(var_name, init.expr.clone(), result.clone());

        let mut macro_calls = init.source.macro_calls.clone();
        macro_calls.extend(macro_calls_within(&ast.source.macro_calls, result));
        if populate_macro_source {
            macro_calls.extend(factory.into_macro_calls());
        }
        let bind_ast = Ast::new(
            bind,
            SourceInfo {
                macro_calls,
                ..SourceInfo::default()
            },
        );
        self.replace_subtree_ast(ast, &bind_ast, target)
    }

    /// A global call with unset ids, for a later renumbering pass to fill.
    pub fn new_global_call(function: impl Into<String>, args: Vec<Expr>) -> Expr {
        Expr::new_call(ExprId::UNSET, Call::global(function, args))
    }

    /// A receiver call with unset ids, for a later renumbering pass to fill.
    pub fn new_member_call(target: Expr, function: impl Into<String>, args: Vec<Expr>) -> Expr {
        Expr::new_call(ExprId::UNSET, Call::member(target, function, args))
    }

    /// `subtree` of `ast` as an AST of its own, carrying the macro records
    /// and positions keyed inside it.
    pub fn subtree_ast(ast: &Ast, subtree: &Expr) -> Ast {
        let ids = expr_ids(subtree);
        let source = SourceInfo {
            description: ast.source.description.clone(),
            line_offsets: ast.source.line_offsets.clone(),
            positions: ast
                .source
                .positions
                .iter()
                .filter(|(id, _)| ids.contains(id))
                .map(|(id, offset)| (*id, *offset))
                .collect(),
            macro_calls: macro_calls_within(&ast.source.macro_calls, subtree),
        };
        Ast::new(subtree.clone(), source)
    }
}

impl Default for AstMutator {
    fn default() -> Self {
        AstMutator {
            iteration_limit: 1000,
        }
    }
}

fn shift_by(seed: i64) -> impl Fn(ExprId) -> ExprId + Copy {
    move |id: ExprId| {
        if id.is_set() {
            ExprId::new(id.raw() + seed)
        } else {
            id
        }
    }
}

fn expr_ids(expr: &Expr) -> FxHashSet<ExprId> {
    let mut ids = FxHashSet::default();
    for node in NavigableExpr::new(expr).all_nodes(TraversalOrder::PreOrder) {
        ids.insert(node.id());
        match node.expr().kind() {
            ExprKind::Struct(create_struct) => {
                ids.extend(create_struct.entries.iter().map(|entry| entry.id()));
            }
            ExprKind::Map(map) => ids.extend(map.entries.iter().map(|entry| entry.id())),
            _ => {}
        }
    }
    ids
}

fn macro_calls_within(
    macro_calls: &BTreeMap<ExprId, Expr>,
    subtree: &Expr,
) -> BTreeMap<ExprId, Expr> {
    let ids = expr_ids(subtree);
    macro_calls
        .iter()
        .filter(|(id, _)| ids.contains(id))
        .map(|(id, call)| (*id, call.clone()))
        .collect()
}

/// Largest id in `expr`, entry ids included.
pub(crate) fn expr_max_id(expr: &Expr) -> i64 {
    expr_ids(expr).into_iter().map(ExprId::raw).max().unwrap_or(0)
}

/// Largest id anywhere in `ast`: main tree and macro records.
pub fn ast_max_id(ast: &Ast) -> i64 {
    ast.source
        .macro_calls
        .iter()
        .map(|(key, call)| key.raw().max(expr_max_id(call)))
        .fold(expr_max_id(&ast.expr), i64::max)
}

fn mutable_ast_max_id(ast: &MutableAst) -> i64 {
    ast.source
        .macro_calls
        .iter()
        .map(|(key, call)| key.raw().max(max_id(call)))
        .fold(max_id(&ast.expr), i64::max)
}

#[cfg(test)]
mod tests;
