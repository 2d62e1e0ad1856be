//! Error types for tree construction and access.

use crate::expr::ExprKindTag;
use crate::ExprId;

/// Usage and kind-mismatch errors raised by the tree model.
///
/// These are programmer errors in the caller: they are reported at the
/// call that violates the precondition and never coerced.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum AstError {
    /// A payload accessor was called on a node of another kind.
    #[error("expected {expected} expression but found {actual}")]
    KindMismatch {
        expected: ExprKindTag,
        actual: ExprKindTag,
    },

    /// A positional setter was given an index past the end of the list.
    #[error("index {index} out of bounds for length {len}")]
    IndexOutOfBounds { index: usize, len: usize },

    /// A struct entry must carry exactly one key kind.
    #[error("struct entry {id} must set exactly one of field key or map key")]
    InvalidEntryKey { id: ExprId },

    /// A map or struct entry was built without a value expression.
    #[error("entry {id} has a not-set value expression")]
    EmptyEntryValue { id: ExprId },

    /// Id generators cannot start below zero.
    #[error("id generator seed must be non-negative, got {0}")]
    NegativeSeed(i64),
}
