//! Stack growth for recursive tree walks.
//!
//! Expression depth is controlled by whoever authors the expression, so the
//! recursive conversions, rewrites and the unparser wrap each level in
//! [`ensure_sufficient_stack`]. The iteration limits on the mutator bound
//! the amount of work; this only keeps deep trees from overflowing.

/// Grow the stack when less than this remains (100KB).
const RED_ZONE: usize = 100 * 1024;

/// Amount of stack allocated per growth (1MB).
const STACK_PER_RECURSION: usize = 1024 * 1024;

/// Run `f`, first growing the stack if it is close to exhausted.
#[inline]
#[cfg(not(target_arch = "wasm32"))]
pub fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    stacker::maybe_grow(RED_ZONE, STACK_PER_RECURSION, f)
}

/// WASM manages its own stack.
#[inline]
#[cfg(target_arch = "wasm32")]
pub fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    f()
}
