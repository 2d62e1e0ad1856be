//! Bounded id-rewriting walk over a mutable tree.
//!
//! Every rewrite the mutator performs is one pass of this visitor: each
//! node (and each map or struct entry) gets its id passed through an
//! [`ExprIdGenerator`], and optionally one target node is swapped for a
//! replacement subtree on the way down. Node visits are counted against
//! the mutator's iteration limit.

use cel_ast::{
    ensure_sufficient_stack, ExprId, ExprIdGenerator, MutableEntryKey, MutableExpr, MutableExprKind,
};

use crate::MutatorError;

pub(crate) struct IdRewriter<'g> {
    ids: &'g mut dyn ExprIdGenerator,
    replacement: Option<(ExprId, MutableExpr)>,
    iteration_limit: usize,
    iterations: usize,
}

impl<'g> IdRewriter<'g> {
    pub(crate) fn new(ids: &'g mut dyn ExprIdGenerator, iteration_limit: usize) -> Self {
        IdRewriter {
            ids,
            replacement: None,
            iteration_limit,
            iterations: 0,
        }
    }

    /// Splice `replacement` in place of the first node with id `target`.
    /// The spliced root takes over the target's id.
    pub(crate) fn replacing(mut self, target: ExprId, replacement: MutableExpr) -> Self {
        self.replacement = Some((target, replacement));
        self
    }

    /// Whether the replacement was spliced in.
    pub(crate) fn replaced(&self) -> bool {
        self.replacement.is_none()
    }

    pub(crate) fn visit(&mut self, expr: &mut MutableExpr) -> Result<(), MutatorError> {
        self.iterations += 1;
        if self.iterations > self.iteration_limit {
            return Err(MutatorError::IterationLimitExceeded {
                limit: self.iteration_limit,
            });
        }

        if self
            .replacement
            .as_ref()
            .is_some_and(|(target, _)| *target == expr.id())
        {
            if let Some((target, mut replacement)) = self.replacement.take() {
                replacement.set_id(target);
                *expr = replacement;
            }
        }

        expr.set_id(self.ids.generate(expr.id()));
        ensure_sufficient_stack(|| self.visit_children(expr))
    }

    fn visit_children(&mut self, expr: &mut MutableExpr) -> Result<(), MutatorError> {
        // Entries carry ids of their own.
        match expr.kind_mut() {
            MutableExprKind::Struct(create_struct) => {
                for entry in &mut create_struct.entries {
                    entry.id = self.ids.generate(entry.id);
                    if let MutableEntryKey::Map(key) = &mut entry.key {
                        self.visit(key)?;
                    }
                    self.visit(&mut entry.value)?;
                }
                return Ok(());
            }
            MutableExprKind::Map(map) => {
                for entry in &mut map.entries {
                    entry.id = self.ids.generate(entry.id);
                    self.visit(&mut entry.key)?;
                    self.visit(&mut entry.value)?;
                }
                return Ok(());
            }
            _ => {}
        }
        for child in expr.children_mut() {
            self.visit(child)?;
        }
        Ok(())
    }
}

/// Call `f` with every id in `expr`, entry ids included, in pre-order.
pub(crate) fn for_each_id(expr: &MutableExpr, f: &mut dyn FnMut(ExprId)) {
    f(expr.id());
    match expr.kind() {
        MutableExprKind::Struct(create_struct) => {
            for entry in &create_struct.entries {
                f(entry.id);
            }
        }
        MutableExprKind::Map(map) => {
            for entry in &map.entries {
                f(entry.id);
            }
        }
        _ => {}
    }
    ensure_sufficient_stack(|| {
        for child in expr.children() {
            for_each_id(child, f);
        }
    });
}

/// Largest id in `expr`, entry ids included. Zero for an all-unset tree.
pub(crate) fn max_id(expr: &MutableExpr) -> i64 {
    let mut max = 0;
    for_each_id(expr, &mut |id| max = max.max(id.raw()));
    max
}
