//! Optimization passes.
//!
//! Each pass implements [`AstOptimizer`](crate::AstOptimizer) and is built
//! entirely from [`AstMutator`](crate::AstMutator) operations, so the
//! macro-call map and positions stay consistent with the rewritten tree.

pub mod const_fold;
pub mod subexpression;
