//! Expression id generation policies.
//!
//! Every rewrite walks the tree and pushes each node id through an
//! [`ExprIdGenerator`]. The policy decides what the walk means:
//!
//! - [`MonotonicIdGenerator`] hands out a fresh id per call, ignoring the
//!   input. Used when authoring brand-new nodes.
//! - [`StableIdGenerator`] remaps ids above a floor into a dense range,
//!   memoized so the same old id always maps to the same new id. Used by
//!   every whole-AST rewrite so the macro-call map can be renumbered through
//!   the same function as the main tree.
//! - [`NoOpIdGenerator`] and [`ClearIdGenerator`] leave ids alone or reset
//!   them to [`ExprId::UNSET`].
//!
//! Generators are single-owner values. Each rewrite session builds its own.

use rustc_hash::FxHashMap;

use crate::{AstError, ExprId};

/// Maps a node id encountered during a walk to the id it should carry
/// afterwards.
pub trait ExprIdGenerator {
    fn generate(&mut self, id: ExprId) -> ExprId;
}

impl<F> ExprIdGenerator for F
where
    F: FnMut(ExprId) -> ExprId,
{
    fn generate(&mut self, id: ExprId) -> ExprId {
        self(id)
    }
}

/// Strictly increasing id source. The default is seeded at zero.
#[derive(Clone, Debug, Default)]
pub struct MonotonicIdGenerator {
    last: i64,
}

impl MonotonicIdGenerator {
    /// The first id handed out is `seed + 1`.
    pub fn new(seed: i64) -> Result<Self, AstError> {
        if seed < 0 {
            return Err(AstError::NegativeSeed(seed));
        }
        Ok(MonotonicIdGenerator { last: seed })
    }

    pub fn next_id(&mut self) -> ExprId {
        self.last += 1;
        ExprId::new(self.last)
    }

    /// The most recently handed out id, or the seed if none was.
    pub fn last_id(&self) -> ExprId {
        ExprId::new(self.last)
    }
}

impl ExprIdGenerator for MonotonicIdGenerator {
    fn generate(&mut self, _id: ExprId) -> ExprId {
        self.next_id()
    }
}

/// Deterministic, memoized renumbering into a dense range above a floor.
///
/// Ids at or below the floor map to themselves unless a mapping was forced
/// with [`memoize`](Self::memoize). Ids above it receive
/// `floor + 1`, `floor + 2`, ... in first-seen order, and every later query
/// for the same old id returns the same new id.
#[derive(Clone, Debug)]
pub struct StableIdGenerator {
    floor: i64,
    last: i64,
    memo: FxHashMap<ExprId, ExprId>,
}

impl StableIdGenerator {
    pub fn new(floor: i64) -> Result<Self, AstError> {
        if floor < 0 {
            return Err(AstError::NegativeSeed(floor));
        }
        Ok(StableIdGenerator {
            floor,
            last: floor,
            memo: FxHashMap::default(),
        })
    }

    pub fn renumber_id(&mut self, id: ExprId) -> ExprId {
        if let Some(&mapped) = self.memo.get(&id) {
            return mapped;
        }
        if id.raw() <= self.floor {
            return id;
        }
        let fresh = self.next_expr_id();
        self.memo.insert(id, fresh);
        fresh
    }

    /// Force `old` to map to `new` before it is encountered. A forced
    /// mapping overrides the floor.
    pub fn memoize(&mut self, old: ExprId, new: ExprId) {
        self.memo.insert(old, new);
    }

    /// Whether `old` already has a memoized mapping.
    pub fn has_id(&self, old: ExprId) -> bool {
        self.memo.contains_key(&old)
    }

    /// Memoized mapping for `old`, without assigning one.
    pub fn lookup(&self, old: ExprId) -> Option<ExprId> {
        match self.memo.get(&old) {
            Some(&mapped) => Some(mapped),
            None if old.raw() <= self.floor => Some(old),
            None => None,
        }
    }

    /// Mint a fresh id without recording a mapping.
    pub fn next_expr_id(&mut self) -> ExprId {
        self.last += 1;
        ExprId::new(self.last)
    }

    /// Highest id minted so far, or the floor.
    pub fn last_id(&self) -> ExprId {
        ExprId::new(self.last)
    }
}

impl ExprIdGenerator for StableIdGenerator {
    fn generate(&mut self, id: ExprId) -> ExprId {
        self.renumber_id(id)
    }
}

/// Leaves every id unchanged.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoOpIdGenerator;

impl ExprIdGenerator for NoOpIdGenerator {
    fn generate(&mut self, id: ExprId) -> ExprId {
        id
    }
}

/// Resets every id to [`ExprId::UNSET`].
#[derive(Copy, Clone, Debug, Default)]
pub struct ClearIdGenerator;

impl ExprIdGenerator for ClearIdGenerator {
    fn generate(&mut self, _id: ExprId) -> ExprId {
        ExprId::UNSET
    }
}

/// Entry point for building generators.
pub struct IdGeneratorFactory;

impl IdGeneratorFactory {
    pub fn new_monotonic_id_generator(seed: i64) -> Result<MonotonicIdGenerator, AstError> {
        MonotonicIdGenerator::new(seed)
    }

    pub fn new_stable_id_generator(floor: i64) -> Result<StableIdGenerator, AstError> {
        StableIdGenerator::new(floor)
    }
}

#[cfg(test)]
mod tests;
