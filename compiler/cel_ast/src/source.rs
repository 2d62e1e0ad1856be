//! Source metadata carried alongside an expression tree.
//!
//! Two tables are keyed by node id: character offsets for diagnostics, and
//! the macro-call map. The macro-call map records, for each comprehension
//! (or other node) produced by a macro, the call the author actually wrote,
//! so the unparser can print `xs.exists(x, p)` instead of the loop.
//!
//! The macro-call map is a `BTreeMap` so every walk over it visits keys in
//! ascending order. Renumbering through a [`StableIdGenerator`] assigns ids
//! in first-seen order, so the order has to be deterministic.
//!
//! [`StableIdGenerator`]: crate::StableIdGenerator

use std::collections::BTreeMap;

use rustc_hash::FxHashMap;

use crate::{Expr, ExprId, MutableExpr};

/// Immutable source metadata.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SourceInfo {
    pub description: String,
    /// Offset of the first character of each line after the first.
    pub line_offsets: Vec<i32>,
    pub positions: FxHashMap<ExprId, i32>,
    pub macro_calls: BTreeMap<ExprId, Expr>,
}

impl SourceInfo {
    pub fn macro_call(&self, id: ExprId) -> Option<&Expr> {
        self.macro_calls.get(&id)
    }

    pub fn position(&self, id: ExprId) -> Option<i32> {
        self.positions.get(&id).copied()
    }

    /// One-based `(line, column)` of an offset.
    pub fn location(&self, offset: i32) -> (usize, i32) {
        let line = self
            .line_offsets
            .iter()
            .take_while(|&&start| start <= offset)
            .count();
        let line_start = if line == 0 {
            0
        } else {
            self.line_offsets[line - 1]
        };
        (line + 1, offset - line_start + 1)
    }

    pub fn to_mutable(&self) -> MutableSource {
        MutableSource {
            description: self.description.clone(),
            line_offsets: self.line_offsets.clone(),
            positions: self.positions.clone(),
            macro_calls: self
                .macro_calls
                .iter()
                .map(|(id, call)| (*id, call.to_mutable()))
                .collect(),
        }
    }
}

/// Source metadata edited during a rewrite session.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct MutableSource {
    pub description: String,
    pub line_offsets: Vec<i32>,
    pub positions: FxHashMap<ExprId, i32>,
    pub macro_calls: BTreeMap<ExprId, MutableExpr>,
}

impl MutableSource {
    pub fn new(description: impl Into<String>) -> Self {
        MutableSource {
            description: description.into(),
            ..MutableSource::default()
        }
    }

    pub fn macro_call(&self, id: ExprId) -> Option<&MutableExpr> {
        self.macro_calls.get(&id)
    }

    pub fn macro_call_mut(&mut self, id: ExprId) -> Option<&mut MutableExpr> {
        self.macro_calls.get_mut(&id)
    }

    pub fn add_macro_call(&mut self, id: ExprId, call: MutableExpr) {
        self.macro_calls.insert(id, call);
    }

    pub fn clear_macro_call(&mut self, id: ExprId) -> Option<MutableExpr> {
        self.macro_calls.remove(&id)
    }

    /// Merge `other`'s macro calls; entries already present win.
    pub fn add_all_macro_calls(&mut self, other: BTreeMap<ExprId, MutableExpr>) {
        for (id, call) in other {
            self.macro_calls.entry(id).or_insert(call);
        }
    }

    pub fn add_position(&mut self, id: ExprId, offset: i32) {
        self.positions.insert(id, offset);
    }

    pub fn to_source_info(&self) -> SourceInfo {
        SourceInfo {
            description: self.description.clone(),
            line_offsets: self.line_offsets.clone(),
            positions: self.positions.clone(),
            macro_calls: self
                .macro_calls
                .iter()
                .map(|(id, call)| (*id, call.to_expr()))
                .collect(),
        }
    }
}

impl From<&SourceInfo> for MutableSource {
    fn from(source: &SourceInfo) -> Self {
        source.to_mutable()
    }
}

impl From<&MutableSource> for SourceInfo {
    fn from(source: &MutableSource) -> Self {
        source.to_source_info()
    }
}
