//! Read-only navigation over expression trees.
//!
//! [`NavigableExpr`] wraps a node borrowed from either tree representation
//! and remembers the path it was reached by, so `parent()`, `ancestors()`
//! and the depth queries work without back-pointers in the tree itself.
//! A node wrapped directly with [`NavigableExpr::new`] is a root and has no
//! parent.
//!
//! Traversals use an explicit work stack and are lazy: each call to
//! [`NavigableExpr::all_nodes`] returns a fresh iterator.

use std::rc::Rc;

use smallvec::SmallVec;

use crate::expr::{EntryKey, ExprKindTag};
use crate::mutable::{MutableEntryKey, MutableExprKind};
use crate::{Expr, ExprId, ExprKind, MutableExpr};

/// Child access shared by [`Expr`] and [`MutableExpr`].
pub trait ExprNode {
    fn node_id(&self) -> ExprId;

    fn kind_tag(&self) -> ExprKindTag;

    /// Direct children: select operand; call target then args; list
    /// elements; entry keys and values; comprehension range, init,
    /// condition, step, result.
    fn child_nodes(&self) -> SmallVec<[&Self; 4]>;
}

impl ExprNode for Expr {
    fn node_id(&self) -> ExprId {
        self.id()
    }

    fn kind_tag(&self) -> ExprKindTag {
        self.tag()
    }

    fn child_nodes(&self) -> SmallVec<[&Self; 4]> {
        let mut out = SmallVec::new();
        match self.kind() {
            ExprKind::NotSet | ExprKind::Constant(_) | ExprKind::Ident(_) => {}
            ExprKind::Select(select) => out.push(&select.operand),
            ExprKind::Call(call) => {
                if let Some(target) = &call.target {
                    out.push(target);
                }
                out.extend(call.args.iter());
            }
            ExprKind::List(list) => out.extend(list.elements.iter()),
            ExprKind::Struct(create_struct) => {
                for entry in &create_struct.entries {
                    if let EntryKey::Map(key) = entry.key() {
                        out.push(key);
                    }
                    out.push(entry.value());
                }
            }
            ExprKind::Map(map) => {
                for entry in &map.entries {
                    out.push(entry.key());
                    out.push(entry.value());
                }
            }
            ExprKind::Comprehension(c) => {
                out.push(&c.iter_range);
                out.push(&c.accu_init);
                out.push(&c.loop_condition);
                out.push(&c.loop_step);
                out.push(&c.result);
            }
        }
        out
    }
}

impl ExprNode for MutableExpr {
    fn node_id(&self) -> ExprId {
        self.id()
    }

    fn kind_tag(&self) -> ExprKindTag {
        self.tag()
    }

    fn child_nodes(&self) -> SmallVec<[&Self; 4]> {
        let mut out = SmallVec::new();
        match self.kind() {
            MutableExprKind::NotSet | MutableExprKind::Constant(_) | MutableExprKind::Ident(_) => {}
            MutableExprKind::Select(select) => out.push(&select.operand),
            MutableExprKind::Call(call) => {
                if let Some(target) = &call.target {
                    out.push(target.as_ref());
                }
                out.extend(call.args.iter());
            }
            MutableExprKind::List(list) => out.extend(list.elements.iter()),
            MutableExprKind::Struct(create_struct) => {
                for entry in &create_struct.entries {
                    if let MutableEntryKey::Map(key) = &entry.key {
                        out.push(key);
                    }
                    out.push(&entry.value);
                }
            }
            MutableExprKind::Map(map) => {
                for entry in &map.entries {
                    out.push(&entry.key);
                    out.push(&entry.value);
                }
            }
            MutableExprKind::Comprehension(c) => {
                out.push(&c.iter_range);
                out.push(&c.accu_init);
                out.push(&c.loop_condition);
                out.push(&c.loop_step);
                out.push(&c.result);
            }
        }
        out
    }
}

/// Traversal order for [`NavigableExpr::all_nodes`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TraversalOrder {
    /// Parent before children.
    PreOrder,
    /// Children before parent.
    PostOrder,
}

/// A node plus the path that reached it.
pub struct NavigableExpr<'a, E> {
    expr: &'a E,
    parent: Option<Rc<NavigableExpr<'a, E>>>,
    depth: usize,
}

impl<E> Clone for NavigableExpr<'_, E> {
    fn clone(&self) -> Self {
        NavigableExpr {
            expr: self.expr,
            parent: self.parent.clone(),
            depth: self.depth,
        }
    }
}

impl<E: ExprNode> std::fmt::Debug for NavigableExpr<'_, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NavigableExpr")
            .field("id", &self.expr.node_id())
            .field("kind", &self.expr.kind_tag())
            .field("depth", &self.depth)
            .finish()
    }
}

impl<'a, E: ExprNode> NavigableExpr<'a, E> {
    /// Wrap `expr` as a root.
    pub fn new(expr: &'a E) -> Self {
        NavigableExpr {
            expr,
            parent: None,
            depth: 0,
        }
    }

    #[inline]
    pub fn expr(&self) -> &'a E {
        self.expr
    }

    #[inline]
    pub fn id(&self) -> ExprId {
        self.expr.node_id()
    }

    #[inline]
    pub fn kind_tag(&self) -> ExprKindTag {
        self.expr.kind_tag()
    }

    pub fn parent(&self) -> Option<&NavigableExpr<'a, E>> {
        self.parent.as_deref()
    }

    /// Distance from the traversal root.
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn children(&self) -> Vec<NavigableExpr<'a, E>> {
        let me = Rc::new(self.clone());
        self.expr
            .child_nodes()
            .into_iter()
            .map(|child| NavigableExpr {
                expr: child,
                parent: Some(Rc::clone(&me)),
                depth: self.depth + 1,
            })
            .collect()
    }

    /// Parent, grandparent, ... up to the traversal root.
    pub fn ancestors(&self) -> impl Iterator<Item = &NavigableExpr<'a, E>> {
        std::iter::successors(self.parent(), |node| node.parent())
    }

    /// Number of strict ancestors that are comprehensions.
    pub fn comprehension_depth(&self) -> usize {
        self.ancestors()
            .filter(|node| node.kind_tag() == ExprKindTag::Comprehension)
            .count()
    }

    /// Every node of the subtree rooted here, including this one.
    pub fn all_nodes(&self, order: TraversalOrder) -> AllNodes<'a, E> {
        AllNodes {
            order,
            stack: vec![(self.clone(), false)],
        }
    }

    /// Every node of the subtree rooted here, excluding this one.
    pub fn descendants(&self, order: TraversalOrder) -> impl Iterator<Item = NavigableExpr<'a, E>> {
        let root = self.expr;
        self.all_nodes(order)
            .filter(move |node| !std::ptr::eq(node.expr, root))
    }
}

/// Lazy subtree iterator returned by [`NavigableExpr::all_nodes`].
pub struct AllNodes<'a, E> {
    order: TraversalOrder,
    /// Pending nodes; the flag marks nodes whose children are already queued.
    stack: Vec<(NavigableExpr<'a, E>, bool)>,
}

impl<'a, E: ExprNode> Iterator for AllNodes<'a, E> {
    type Item = NavigableExpr<'a, E>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (node, expanded) = self.stack.pop()?;
            match self.order {
                TraversalOrder::PreOrder => {
                    for child in node.children().into_iter().rev() {
                        self.stack.push((child, false));
                    }
                    return Some(node);
                }
                TraversalOrder::PostOrder => {
                    if expanded {
                        return Some(node);
                    }
                    let children = node.children();
                    self.stack.push((node, true));
                    for child in children.into_iter().rev() {
                        self.stack.push((child, false));
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests;
