//! Whole-program containers.
//!
//! An [`Ast`] bundles the root expression with its source metadata and,
//! once a checker has run, the per-node type and reference annotations.
//! [`MutableAst`] is the rewrite-session twin. It carries no annotations:
//! a rewrite invalidates them, and the caller re-checks the result.

use rustc_hash::FxHashMap;

use crate::{CelType, Expr, ExprId, MutableExpr, MutableSource, Reference, SourceInfo};

/// Read access to checker annotations, keyed by node id.
pub trait TypeAnnotations {
    fn type_of(&self, id: ExprId) -> Option<&CelType>;

    fn reference_of(&self, id: ExprId) -> Option<&Reference>;
}

/// Parsed, and possibly checked, expression.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Ast {
    pub expr: Expr,
    pub source: SourceInfo,
    pub types: FxHashMap<ExprId, CelType>,
    pub references: FxHashMap<ExprId, Reference>,
}

impl Ast {
    /// An unchecked AST.
    pub fn new(expr: Expr, source: SourceInfo) -> Self {
        Ast {
            expr,
            source,
            types: FxHashMap::default(),
            references: FxHashMap::default(),
        }
    }

    pub fn is_checked(&self) -> bool {
        !self.types.is_empty()
    }

    pub fn with_types(mut self, types: FxHashMap<ExprId, CelType>) -> Self {
        self.types = types;
        self
    }

    pub fn with_references(mut self, references: FxHashMap<ExprId, Reference>) -> Self {
        self.references = references;
        self
    }

    /// Drop checker annotations.
    pub fn unchecked(mut self) -> Self {
        self.types.clear();
        self.references.clear();
        self
    }

    pub fn to_mutable(&self) -> MutableAst {
        MutableAst {
            expr: self.expr.to_mutable(),
            source: self.source.to_mutable(),
        }
    }
}

impl TypeAnnotations for Ast {
    fn type_of(&self, id: ExprId) -> Option<&CelType> {
        self.types.get(&id)
    }

    fn reference_of(&self, id: ExprId) -> Option<&Reference> {
        self.references.get(&id)
    }
}

/// An AST being rewritten.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct MutableAst {
    pub expr: MutableExpr,
    pub source: MutableSource,
}

impl MutableAst {
    pub fn new(expr: MutableExpr, source: MutableSource) -> Self {
        MutableAst { expr, source }
    }

    /// Finish the session as an unchecked [`Ast`].
    pub fn to_ast(&self) -> Ast {
        Ast::new(self.expr.to_expr(), self.source.to_source_info())
    }
}

impl From<MutableAst> for Ast {
    fn from(ast: MutableAst) -> Self {
        ast.to_ast()
    }
}
