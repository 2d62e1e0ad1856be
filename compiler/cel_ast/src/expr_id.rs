//! Expression node identity.
//!
//! Every node in a CEL expression tree carries a 64-bit id. Ids key the
//! source positions map, the macro-call map and the checker's type and
//! reference annotations, so they must stay unique within a well-formed
//! tree and survive every rewrite consistently.

use std::fmt;

/// Stable identity of an expression node.
///
/// `ExprId::UNSET` (zero) marks a node whose id has not been assigned yet,
/// e.g. a template node built before renumbering.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(transparent)]
pub struct ExprId(i64);

impl ExprId {
    /// Unassigned id.
    pub const UNSET: ExprId = ExprId(0);

    /// Create a new `ExprId`.
    #[inline]
    pub const fn new(raw: i64) -> Self {
        ExprId(raw)
    }

    /// Get the raw i64 value.
    #[inline]
    pub const fn raw(self) -> i64 {
        self.0
    }

    /// Check whether an id has been assigned.
    #[inline]
    pub const fn is_set(self) -> bool {
        self.0 != 0
    }
}

impl From<i64> for ExprId {
    fn from(raw: i64) -> Self {
        ExprId(raw)
    }
}

impl fmt::Debug for ExprId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_set() {
            write!(f, "ExprId({})", self.0)
        } else {
            write!(f, "ExprId::UNSET")
        }
    }
}

impl fmt::Display for ExprId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expr_id_set() {
        let id = ExprId::new(42);
        assert!(id.is_set());
        assert_eq!(id.raw(), 42);
    }

    #[test]
    fn test_expr_id_unset() {
        assert!(!ExprId::UNSET.is_set());
        assert_eq!(ExprId::default(), ExprId::UNSET);
    }

    #[test]
    fn test_expr_id_debug() {
        assert_eq!(format!("{:?}", ExprId::new(7)), "ExprId(7)");
        assert_eq!(format!("{:?}", ExprId::UNSET), "ExprId::UNSET");
    }

    #[test]
    fn test_expr_id_ordering() {
        let mut ids = vec![ExprId::new(3), ExprId::new(1), ExprId::new(2)];
        ids.sort();
        assert_eq!(ids, vec![ExprId::new(1), ExprId::new(2), ExprId::new(3)]);
    }

    #[test]
    fn test_memory_size() {
        assert_eq!(std::mem::size_of::<ExprId>(), 8);
    }
}
