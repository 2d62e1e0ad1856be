//! Keeping the macro-call map and positions in step with a rewritten tree.
//!
//! After a rewrite, each macro record is re-keyed and renumbered through the
//! session's id generator. Records whose macro result left the tree are
//! dropped, and record children that are stale copies of live nodes are
//! refreshed from the tree. Comprehensions inside records collapse to
//! not-set placeholders. A record left holding a placeholder that no other
//! record explains is dropped too, since it could never be printed.

use std::collections::BTreeMap;

use cel_ast::factory::macros::{FILTER, MAP};
use cel_ast::operators::{ADD, CONDITIONAL};
use cel_ast::{
    ensure_sufficient_stack, ExprId, ExprKindTag, MutableExpr, MutableSource, NavigableExpr,
    StableIdGenerator, TraversalOrder,
};
use rustc_hash::{FxHashMap, FxHashSet};

use super::visitor::{for_each_id, IdRewriter};
use crate::MutatorError;

/// Live nodes by id. The first occurrence in pre-order wins.
pub(crate) fn index_nodes(root: &MutableExpr) -> FxHashMap<ExprId, &MutableExpr> {
    let mut nodes = FxHashMap::default();
    for node in NavigableExpr::new(root).all_nodes(TraversalOrder::PreOrder) {
        if node.id().is_set() {
            nodes.entry(node.id()).or_insert(node.expr());
        }
    }
    nodes
}

/// Bring `source` in line with `root` after a rewrite that ran through `ids`.
///
/// `replaced` is the id of the node a replacement was spliced at, if any.
pub(crate) fn normalize_source(
    mut source: MutableSource,
    replaced: Option<ExprId>,
    root: &MutableExpr,
    ids: &mut StableIdGenerator,
    iteration_limit: usize,
) -> Result<MutableSource, MutatorError> {
    if let Some(target) = replaced {
        source.clear_macro_call(target);
    }
    let live = index_nodes(root);

    let mut macro_calls = BTreeMap::new();
    for (key, mut record) in std::mem::take(&mut source.macro_calls) {
        let key = ids.renumber_id(key);
        let Some(&result) = live.get(&key) else {
            tracing::debug!(%key, "dropping macro call for vanished result");
            continue;
        };
        IdRewriter::new(ids, iteration_limit).visit(&mut record)?;
        refresh_from_live(&mut record, &live);
        if let Some(target) = replaced {
            unwrap_list_wrapper(key, result, &mut record, target)?;
        }
        macro_calls.insert(key, record);
    }

    let keys: FxHashSet<ExprId> = macro_calls.keys().copied().collect();
    for record in macro_calls.values_mut() {
        collapse_nested_results(record, &keys);
    }
    prune_unprintable(&mut macro_calls);

    let mut recorded = FxHashSet::default();
    for record in macro_calls.values() {
        for_each_id(record, &mut |id| {
            recorded.insert(id);
        });
    }
    source.positions = std::mem::take(&mut source.positions)
        .into_iter()
        .filter_map(|(id, offset)| {
            let id = ids.lookup(id)?;
            (live.contains_key(&id) || recorded.contains(&id)).then_some((id, offset))
        })
        .collect();
    source.macro_calls = macro_calls;
    Ok(source)
}

/// Replace record children that share an id with a live node but no longer
/// match it.
fn refresh_from_live(record: &mut MutableExpr, live: &FxHashMap<ExprId, &MutableExpr>) {
    ensure_sufficient_stack(|| {
        for child in record.children_mut() {
            match live.get(&child.id()) {
                Some(&node) if node != &*child => *child = node.clone(),
                Some(_) => {}
                None => refresh_from_live(child, live),
            }
        }
    });
}

/// `map` and `filter` append through a one-element list in their loop step.
/// When that wrapper is the node being replaced, a `map` record must carry
/// the wrapper's elements as call arguments rather than the list itself. A
/// `filter` record can only describe a wrapper holding the iteration
/// variable; anything else is rejected rather than printed as the old
/// filter.
fn unwrap_list_wrapper(
    key: ExprId,
    result: &MutableExpr,
    record: &mut MutableExpr,
    replaced: ExprId,
) -> Result<(), MutatorError> {
    let Ok(comprehension) = result.comprehension() else {
        return Ok(());
    };
    if !comprehension
        .accu_init
        .list()
        .is_ok_and(|init| init.elements.is_empty())
    {
        return Ok(());
    }

    let step = comprehension.loop_step.call_or_default();
    let (append, filter) = match step.function.as_str() {
        ADD => (&comprehension.loop_step, None),
        CONDITIONAL if step.args.len() == 3 => (&step.args[1], Some(&step.args[0])),
        _ => return Ok(()),
    };
    let append = append.call_or_default();
    if append.function != ADD || append.args.len() != 2 || append.args[1].id() != replaced {
        return Ok(());
    }
    let Ok(wrapper) = append.args[1].list() else {
        return Ok(());
    };

    let call = record.call_mut()?;
    match (call.function.as_str(), filter) {
        (MAP, filter) => {
            let mut args: Vec<MutableExpr> = call.args.first().cloned().into_iter().collect();
            args.extend(filter.cloned());
            args.extend(wrapper.elements.iter().cloned());
            call.args = args;
        }
        (FILTER, Some(_)) if appends_iter_var(&wrapper.elements, &comprehension.iter_var) => {}
        _ => {
            return Err(MutatorError::UnsupportedMacroShape {
                id: key,
                function: call.function.clone(),
            })
        }
    }
    Ok(())
}

fn appends_iter_var(elements: &[MutableExpr], iter_var: &str) -> bool {
    matches!(elements, [element] if element.ident().is_ok_and(|ident| ident.name == iter_var))
}

/// Turn comprehensions and other recorded macro results inside a record
/// into not-set placeholders carrying the same id.
fn collapse_nested_results(record: &mut MutableExpr, keys: &FxHashSet<ExprId>) {
    ensure_sufficient_stack(|| {
        for child in record.children_mut() {
            let nested = child.tag() == ExprKindTag::Comprehension
                || (child.tag() != ExprKindTag::NotSet && keys.contains(&child.id()));
            if nested {
                child.set_not_set();
            } else {
                collapse_nested_results(child, keys);
            }
        }
    });
}

fn prune_unprintable(macro_calls: &mut BTreeMap<ExprId, MutableExpr>) {
    loop {
        let dangling: Vec<ExprId> = macro_calls
            .iter()
            .filter(|(_, record)| has_unresolved_placeholder(record, macro_calls))
            .map(|(key, _)| *key)
            .collect();
        if dangling.is_empty() {
            return;
        }
        for key in dangling {
            tracing::debug!(%key, "dropping macro call with unresolved placeholder");
            macro_calls.remove(&key);
        }
    }
}

fn has_unresolved_placeholder(
    record: &MutableExpr,
    macro_calls: &BTreeMap<ExprId, MutableExpr>,
) -> bool {
    NavigableExpr::new(record)
        .descendants(TraversalOrder::PreOrder)
        .any(|node| node.kind_tag() == ExprKindTag::NotSet && !macro_calls.contains_key(&node.id()))
}
