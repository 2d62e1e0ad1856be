//! CEL AST - expression tree core
//!
//! This crate contains the data structures every CEL tool passes around:
//! - `Constant` literal values and `ExprId` node identity
//! - `Expr`, the immutable, structurally shared tree
//! - `MutableExpr`, its in-place editable twin for rewrite sessions
//! - Id generation policies (monotonic, stable renumbering)
//! - `NavigableExpr`, parent-aware traversal over either representation
//! - Source metadata, including the macro-call map
//! - `Ast`/`MutableAst` with checker annotations (`CelType`, `Reference`)
//! - `ExprFactory` with the standard macro expansions
//! - The unparser
//!
//! # Identity
//!
//! Node ids key positions, macro records and checker annotations. Anything
//! that rewrites a tree has to keep all of those consistent with the tree;
//! see the `cel_optimizer` crate for the rewrite engine that does.

/// Compile-time assertion that a type has a specific size.
///
/// Used to prevent accidental size regressions in frequently-allocated types.
#[macro_export]
macro_rules! static_assert_size {
    ($ty:ty, $size:expr) => {
        const _: [(); $size] = [(); ::std::mem::size_of::<$ty>()];
    };
}

mod ast;
mod constant;
mod error;
pub mod expr;
mod expr_id;
pub mod factory;
pub mod ids;
pub mod mutable;
pub mod navigable;
pub mod operators;
mod source;
mod stack;
mod types;
pub mod unparse;

pub use ast::{Ast, MutableAst, TypeAnnotations};
pub use constant::{Constant, ConstantKind, Duration, Timestamp};
pub use error::AstError;
pub use expr::{
    Call, Comprehension, CreateList, CreateMap, CreateStruct, EntryKey, Expr, ExprKind,
    ExprKindTag, Ident, MapEntry, Select, StructEntry,
};
pub use expr_id::ExprId;
pub use factory::ExprFactory;
pub use ids::{
    ClearIdGenerator, ExprIdGenerator, IdGeneratorFactory, MonotonicIdGenerator, NoOpIdGenerator,
    StableIdGenerator,
};
pub use mutable::{
    MutableCall, MutableComprehension, MutableEntryKey, MutableExpr, MutableExprKind, MutableList,
    MutableMap, MutableMapEntry, MutableSelect, MutableStruct, MutableStructEntry,
};
pub use navigable::{ExprNode, NavigableExpr, TraversalOrder};
pub use source::{MutableSource, SourceInfo};
pub use stack::ensure_sufficient_stack;
pub use types::{CelType, Reference};
pub use unparse::{unparse, UnparseError};

static_assert_size!(ExprId, 8);
