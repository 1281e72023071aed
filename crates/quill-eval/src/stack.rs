//! Native stack headroom for the recursive evaluator.
//!
//! Calls and nested expressions recurse on the host stack. Every recursion
//! point goes through [`ensure_sufficient_stack`], so the configured call
//! depth limit is reached before the host stack runs out.

/// Run `f`, first moving to a fresh stack segment if little space is left.
#[inline]
#[cfg(not(target_arch = "wasm32"))]
pub(crate) fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    /// Headroom required before recursing further (128 KiB).
    const RED_ZONE: usize = 128 * 1024;

    /// Size of each new segment (2 MiB).
    const SEGMENT: usize = 2 * 1024 * 1024;

    stacker::maybe_grow(RED_ZONE, SEGMENT, f)
}

/// wasm32 manages its own stack.
#[inline]
#[cfg(target_arch = "wasm32")]
pub(crate) fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    f()
}
