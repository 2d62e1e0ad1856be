//! Comprehension identifier mangling.
//!
//! Before an optimizer hoists subexpressions out of a comprehension, every
//! comprehension's variables are renamed to `{prefix}{depth}:{index}` so a
//! hoisted expression can never be captured by a variable of the same name
//! in its new scope. Comprehensions at the same nesting depth with the same
//! variable types share names, which lets structurally identical loops
//! compare equal after renaming.
//!
//! Comprehensions are visited innermost first, so an inner comprehension is
//! renamed before its enclosing one looks for shadowed names.

use std::collections::BTreeMap;

use cel_ast::{
    Ast, CelType, Comprehension, ExprId, MutableAst, MutableComprehension, MutableExpr,
    MutableExprKind, NavigableExpr, StableIdGenerator, TraversalOrder, TypeAnnotations,
};
use rustc_hash::{FxHashMap, FxHashSet};

use super::normalize::normalize_source;
use super::scope::free_reference;
use super::visitor::max_id;
use super::AstMutator;
use crate::MutatorError;

/// Mangled variable names of one comprehension.
#[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct MangledComprehensionName {
    pub iter_var: String,
    pub iter_var2: Option<String>,
    pub result: String,
}

/// Checker types of a mangled comprehension's variables.
#[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct MangledComprehensionType {
    pub iter_var_type: CelType,
    pub iter_var2_type: Option<CelType>,
    pub result_type: CelType,
}

/// Result of [`AstMutator::mangle_comprehension_identifier_names`].
#[derive(Clone, Debug)]
pub struct MangledComprehensionAst {
    /// The renamed AST. Checker annotations of the input are carried over.
    pub ast: Ast,
    pub mangled_comprehension_map: BTreeMap<MangledComprehensionName, MangledComprehensionType>,
}

struct Candidate {
    id: ExprId,
    depth: usize,
    iter_var: String,
    iter_var2: Option<String>,
    accu_var: String,
    types: MangledComprehensionType,
}

impl AstMutator {
    /// Rename the variables of every comprehension that does not already
    /// carry the given prefixes and whose loop step reads its iteration
    /// variable or its accumulator.
    ///
    /// With `increment_serially`, every comprehension gets a fresh index
    /// instead of sharing names by depth and type.
    #[tracing::instrument(level = "debug", skip(self, ast))]
    pub fn mangle_comprehension_identifier_names(
        &self,
        ast: &Ast,
        iter_var_prefix: &str,
        result_var_prefix: &str,
        increment_serially: bool,
    ) -> Result<MangledComprehensionAst, MutatorError> {
        let candidates = self.mangling_candidates(ast, iter_var_prefix, result_var_prefix)?;
        if candidates.is_empty() {
            return Ok(MangledComprehensionAst {
                ast: ast.clone(),
                mangled_comprehension_map: BTreeMap::new(),
            });
        }

        let mut expr = ast.expr.to_mutable();
        let mut source = ast.source.to_mutable();
        let mut names = NameAllocator {
            iter_var_prefix,
            result_var_prefix,
            serial: increment_serially.then_some(0),
            per_depth: FxHashMap::default(),
            assigned: FxHashMap::default(),
        };
        let mut mangled_comprehension_map = BTreeMap::new();

        for candidate in candidates {
            let name = names.name_for(&candidate);
            let node = expr
                .find_mut(candidate.id)
                .ok_or(MutatorError::TargetNotFound(candidate.id))?;
            self.rename_comprehension(node.comprehension_mut()?, &candidate, &name)?;
            if let Some(record) = source.macro_call_mut(candidate.id) {
                rename_record_vars(record, &candidate, &name);
            }
            tracing::debug!(
                id = %candidate.id,
                depth = candidate.depth,
                iter_var = %name.iter_var,
                result = %name.result,
                "mangled comprehension"
            );
            mangled_comprehension_map.insert(name, candidate.types);
        }

        let floor = source
            .macro_calls
            .values()
            .map(max_id)
            .fold(max_id(&expr), i64::max);
        let mut ids = StableIdGenerator::new(floor)?;
        let source = normalize_source(source, None, &expr, &mut ids, self.iteration_limit)?;

        let mut mangled = MutableAst::new(expr, source).to_ast();
        mangled.types = ast.types.clone();
        mangled.references = ast.references.clone();
        Ok(MangledComprehensionAst {
            ast: mangled,
            mangled_comprehension_map,
        })
    }

    fn mangling_candidates(
        &self,
        ast: &Ast,
        iter_var_prefix: &str,
        result_var_prefix: &str,
    ) -> Result<Vec<Candidate>, MutatorError> {
        let mut seen = FxHashSet::default();
        let mut candidates = Vec::new();
        let mut visited = 0usize;

        for node in NavigableExpr::new(&ast.expr).all_nodes(TraversalOrder::PostOrder) {
            visited += 1;
            if visited > self.iteration_limit {
                return Err(MutatorError::IterationLimitExceeded {
                    limit: self.iteration_limit,
                });
            }
            let Ok(c) = node.expr().comprehension() else {
                continue;
            };
            if c.iter_var.starts_with(iter_var_prefix) || c.accu_var.starts_with(result_var_prefix)
            {
                continue;
            }
            let iter_ref = free_reference(&c.loop_step, &c.iter_var);
            let iter2_ref = c
                .iter_var2
                .as_deref()
                .and_then(|iter_var2| free_reference(&c.loop_step, iter_var2));
            let accu_ref = free_reference(&c.loop_step, &c.accu_var);
            if iter_ref.is_none() && iter2_ref.is_none() && accu_ref.is_none() {
                continue;
            }
            if !seen.insert(node.id()) {
                return Err(MutatorError::DuplicateComprehension(node.id()));
            }

            candidates.push(Candidate {
                id: node.id(),
                depth: node.comprehension_depth(),
                iter_var: c.iter_var.clone(),
                iter_var2: c.iter_var2.clone(),
                accu_var: c.accu_var.clone(),
                types: comprehension_types(ast, node.id(), c, iter_ref, iter2_ref)?,
            });
        }
        Ok(candidates)
    }

    fn rename_comprehension(
        &self,
        comprehension: &mut MutableComprehension,
        candidate: &Candidate,
        name: &MangledComprehensionName,
    ) -> Result<(), MutatorError> {
        let mut renames = vec![(candidate.iter_var.as_str(), name.iter_var.as_str())];
        if let (Some(old), Some(new)) = (&candidate.iter_var2, &name.iter_var2) {
            renames.push((old.as_str(), new.as_str()));
        }
        for (from, to) in renames {
            let mut renamer = Renamer::new(from, to, self.iteration_limit);
            renamer.rename(&mut comprehension.loop_condition)?;
            renamer.rename(&mut comprehension.loop_step)?;
        }

        let mut renamer = Renamer::new(&candidate.accu_var, &name.result, self.iteration_limit);
        renamer.rename(&mut comprehension.loop_condition)?;
        renamer.rename(&mut comprehension.loop_step)?;
        renamer.rename(&mut comprehension.result)?;

        comprehension.iter_var.clone_from(&name.iter_var);
        comprehension.iter_var2.clone_from(&name.iter_var2);
        comprehension.accu_var.clone_from(&name.result);
        Ok(())
    }
}

fn comprehension_types(
    ast: &Ast,
    id: ExprId,
    comprehension: &Comprehension,
    iter_ref: Option<ExprId>,
    iter2_ref: Option<ExprId>,
) -> Result<MangledComprehensionType, MutatorError> {
    let require = |id: ExprId| {
        ast.type_of(id)
            .cloned()
            .ok_or(MutatorError::MissingType(id))
    };
    let range = ast
        .type_of(comprehension.iter_range.id())
        .cloned()
        .unwrap_or(CelType::Dyn);
    let two_var = comprehension.iter_var2.is_some();
    let (first, second) = range_binding_types(&range, two_var);

    let iter_var_type = match iter_ref {
        Some(id) => require(id)?,
        None => first,
    };
    let iter_var2_type = if two_var {
        Some(match iter2_ref {
            Some(id) => require(id)?,
            None => second,
        })
    } else {
        None
    };
    Ok(MangledComprehensionType {
        iter_var_type,
        iter_var2_type,
        result_type: require(id)?,
    })
}

/// Types bound by iterating a range: the element (or map key) for the
/// one-variable form; index and element (or key and value) for two.
fn range_binding_types(range: &CelType, two_var: bool) -> (CelType, CelType) {
    match (range, two_var) {
        (CelType::List(elem), true) => (CelType::Int, elem.as_ref().clone()),
        (CelType::Map(key, value), true) => (key.as_ref().clone(), value.as_ref().clone()),
        (range, _) => (range.iteration_elem(), CelType::Dyn),
    }
}

struct NameAllocator<'p> {
    iter_var_prefix: &'p str,
    result_var_prefix: &'p str,
    serial: Option<usize>,
    per_depth: FxHashMap<usize, usize>,
    assigned: FxHashMap<(usize, MangledComprehensionType), usize>,
}

impl NameAllocator<'_> {
    fn name_for(&mut self, candidate: &Candidate) -> MangledComprehensionName {
        let depth = candidate.depth;
        let index = self.index_for(depth, &candidate.types);
        let iter_var = format!("{}{depth}:{index}", self.iter_var_prefix);
        MangledComprehensionName {
            iter_var2: candidate.iter_var2.as_ref().map(|_| format!("{iter_var}:1")),
            iter_var,
            result: format!("{}{depth}:{index}", self.result_var_prefix),
        }
    }

    fn index_for(&mut self, depth: usize, types: &MangledComprehensionType) -> usize {
        if let Some(serial) = &mut self.serial {
            let index = *serial;
            *serial += 1;
            return index;
        }
        let key = (depth, types.clone());
        if let Some(&index) = self.assigned.get(&key) {
            return index;
        }
        let next = self.per_depth.entry(depth).or_default();
        let index = *next;
        *next += 1;
        self.assigned.insert(key, index);
        index
    }
}

/// Shadowing-aware identifier rename, bounded like every other walk.
struct Renamer<'n> {
    from: &'n str,
    to: &'n str,
    iteration_limit: usize,
    visited: usize,
}

impl<'n> Renamer<'n> {
    fn new(from: &'n str, to: &'n str, iteration_limit: usize) -> Self {
        Renamer {
            from,
            to,
            iteration_limit,
            visited: 0,
        }
    }

    fn rename(&mut self, expr: &mut MutableExpr) -> Result<(), MutatorError> {
        self.visited += 1;
        if self.visited > self.iteration_limit {
            return Err(MutatorError::IterationLimitExceeded {
                limit: self.iteration_limit,
            });
        }
        if let MutableExprKind::Ident(ident) = expr.kind_mut() {
            if ident.name == self.from {
                self.to.clone_into(&mut ident.name);
            }
            return Ok(());
        }
        if let MutableExprKind::Comprehension(c) = expr.kind_mut() {
            self.rename(&mut c.iter_range)?;
            self.rename(&mut c.accu_init)?;
            let shadows = c.iter_var == self.from
                || c.iter_var2.as_deref() == Some(self.from)
                || c.accu_var == self.from;
            if !shadows {
                self.rename(&mut c.loop_condition)?;
                self.rename(&mut c.loop_step)?;
            }
            if c.accu_var != self.from {
                self.rename(&mut c.result)?;
            }
            return Ok(());
        }
        cel_ast::ensure_sufficient_stack(|| {
            for child in expr.children_mut() {
                self.rename(child)?;
            }
            Ok(())
        })
    }
}

/// Macro records repeat the bound variables as leading identifier arguments
/// under ids of their own, so they are renamed by position. `cel.bind`
/// records lead with the accumulator instead.
fn rename_record_vars(
    record: &mut MutableExpr,
    candidate: &Candidate,
    name: &MangledComprehensionName,
) {
    let Ok(call) = record.call_mut() else {
        return;
    };
    let mut renames = vec![
        (0, candidate.iter_var.as_str(), name.iter_var.as_str()),
        (0, candidate.accu_var.as_str(), name.result.as_str()),
    ];
    if let (Some(old), Some(new)) = (&candidate.iter_var2, &name.iter_var2) {
        renames.push((1, old.as_str(), new.as_str()));
    }
    for (position, from, to) in renames {
        if let Some(arg) = call.args.get_mut(position) {
            if arg.ident().is_ok_and(|ident| ident.name == from) {
                arg.set_ident(to);
            }
        }
    }
}
