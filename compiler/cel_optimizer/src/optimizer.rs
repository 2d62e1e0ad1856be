//! Optimizer driver.
//!
//! A [`CelOptimizer`] owns an ordered list of passes and an optional type
//! checker. Each pass sees the output of the one before it. With a checker
//! every pass output is re-checked, so passes that read types (mangling in
//! the subexpression pass) see annotations matching the rewritten tree.
//! Without one, annotations are dropped after each pass.

use cel_ast::Ast;
use rayon::prelude::*;

use crate::{AstMutator, CheckError, MutatorError, OptimizationError};

/// One optimization pass.
///
/// Passes must not modify their input; they return a new AST, or a clone of
/// the input when there is nothing to do.
pub trait AstOptimizer: Send + Sync {
    /// Short name used in logs and limit errors.
    fn name(&self) -> &'static str;

    fn optimize(&self, ast: &Ast, mutator: &AstMutator) -> Result<Ast, OptimizationError>;
}

/// Re-annotates a rewritten AST with types and references.
pub trait TypeChecker: Send + Sync {
    fn check(&self, ast: Ast) -> Result<Ast, CheckError>;
}

/// Runs configured passes in order.
pub struct CelOptimizer {
    passes: Vec<Box<dyn AstOptimizer>>,
    checker: Option<Box<dyn TypeChecker>>,
    mutator: AstMutator,
}

impl CelOptimizer {
    pub fn builder() -> CelOptimizerBuilder {
        CelOptimizerBuilder::default()
    }

    pub fn pass_names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|pass| pass.name()).collect()
    }

    /// Run every pass over `ast`.
    ///
    /// The input is left untouched. Without a checker the result of any
    /// pass is unchecked.
    #[tracing::instrument(level = "debug", skip_all, fields(passes = self.passes.len()))]
    pub fn optimize(&self, ast: &Ast) -> Result<Ast, OptimizationError> {
        let mut current = ast.clone();
        for pass in &self.passes {
            let optimized = pass.optimize(&current, &self.mutator)?;
            current = self.recheck(optimized)?;
            tracing::debug!(pass = pass.name(), "pass finished");
        }
        Ok(current)
    }

    fn recheck(&self, ast: Ast) -> Result<Ast, CheckError> {
        match &self.checker {
            Some(checker) => checker.check(ast.unchecked()),
            None => Ok(ast.unchecked()),
        }
    }

    /// Optimize independent ASTs in parallel. Results line up with `asts`.
    pub fn optimize_all(&self, asts: &[Ast]) -> Vec<Result<Ast, OptimizationError>> {
        asts.par_iter().map(|ast| self.optimize(ast)).collect()
    }
}

impl std::fmt::Debug for CelOptimizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CelOptimizer")
            .field("passes", &self.pass_names())
            .field("checker", &self.checker.is_some())
            .field("mutator", &self.mutator)
            .finish()
    }
}

/// Builder for [`CelOptimizer`].
#[derive(Default)]
pub struct CelOptimizerBuilder {
    passes: Vec<Box<dyn AstOptimizer>>,
    checker: Option<Box<dyn TypeChecker>>,
    mutator: AstMutator,
}

impl CelOptimizerBuilder {
    #[must_use]
    pub fn add_pass(mut self, pass: impl AstOptimizer + 'static) -> Self {
        self.passes.push(Box::new(pass));
        self
    }

    #[must_use]
    pub fn with_type_checker(mut self, checker: impl TypeChecker + 'static) -> Self {
        self.checker = Some(Box::new(checker));
        self
    }

    /// Node budget for every mutator walk the passes perform.
    pub fn with_iteration_limit(mut self, limit: i64) -> Result<Self, MutatorError> {
        self.mutator = AstMutator::new(limit)?;
        Ok(self)
    }

    pub fn build(self) -> CelOptimizer {
        CelOptimizer {
            passes: self.passes,
            checker: self.checker,
            mutator: self.mutator,
        }
    }
}
