//! Error types for the mutator and the optimizer driver.

use cel_ast::{AstError, ExprId};

/// Structural failures of a rewrite.
///
/// Apart from `InvalidIterationLimit`, these mean a malformed tree reached
/// the mutator or a pass has a bug. The operation that hit one is abandoned
/// and the input AST is left as it was.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum MutatorError {
    #[error(transparent)]
    Ast(#[from] AstError),

    #[error("iteration limit must be positive, got {0}")]
    InvalidIterationLimit(i64),

    #[error("max iteration count of {limit} reached")]
    IterationLimitExceeded { limit: usize },

    #[error("expression {0} to replace does not exist in the AST")]
    TargetNotFound(ExprId),

    #[error("checked type not present for expression {0}")]
    MissingType(ExprId),

    #[error("comprehension {0} was encountered twice while building the mangling map")]
    DuplicateComprehension(ExprId),

    #[error("unsupported macro shape for `{function}` at {id}")]
    UnsupportedMacroShape { id: ExprId, function: String },
}

/// Failure reported by a [`TypeChecker`](crate::TypeChecker).
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[error("type check failed: {message}")]
pub struct CheckError {
    pub message: String,
}

impl CheckError {
    pub fn new(message: impl Into<String>) -> Self {
        CheckError {
            message: message.into(),
        }
    }
}

/// What the driver reports when any pass fails.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum OptimizationError {
    #[error("optimization failed: {0}")]
    Mutator(#[from] MutatorError),

    #[error("optimization failed: {0}")]
    Check(#[from] CheckError),

    #[error("optimization failed: pass `{pass}` reached its limit of {limit} iterations")]
    IterationLimit { pass: &'static str, limit: usize },
}

impl From<AstError> for OptimizationError {
    fn from(err: AstError) -> Self {
        OptimizationError::Mutator(MutatorError::Ast(err))
    }
}
