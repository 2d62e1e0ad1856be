//! CEL optimizer - AST rewriting engine and optimization passes
//!
//! - [`AstMutator`]: subtree replacement that keeps ids, source positions and
//!   the macro-call map consistent, comprehension identifier mangling, and
//!   the `cel.bind`/`cel.@block` synthesis helpers
//! - [`CelOptimizer`]: runs [`AstOptimizer`] passes in order, re-checking
//!   between passes when a [`TypeChecker`] is configured
//! - [`passes`]: constant folding and common-subexpression elimination
//!
//! Every operation is a function from an input AST to a new AST. Inputs are
//! never modified, so a failed rewrite leaves the caller's AST usable.

use std::sync::Once;

mod error;
pub mod mutator;
mod optimizer;
pub mod passes;

pub use error::{CheckError, MutatorError, OptimizationError};
pub use mutator::{
    AstMutator, MangledComprehensionAst, MangledComprehensionName, MangledComprehensionType,
};
pub use optimizer::{AstOptimizer, CelOptimizer, CelOptimizerBuilder, TypeChecker};
pub use passes::const_fold::{ConstantFoldingOptimizer, ConstantFoldingOptions};
pub use passes::subexpression::{SubexpressionOptimizer, SubexpressionOptimizerOptions};

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for debugging optimizer passes.
///
/// Respects the `RUST_LOG` environment variable, e.g.
/// `RUST_LOG=cel_optimizer=debug` or `RUST_LOG=cel_optimizer::mutator=trace`.
/// Does nothing when `RUST_LOG` is unset, and only runs once per process.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        if std::env::var("RUST_LOG").is_ok() {
            let filter = EnvFilter::from_default_env();
            tracing_subscriber::registry()
                .with(fmt::layer().with_target(true).with_level(true))
                .with(filter)
                .init();
        }
    });
}
