//! Stack growth for script recursion.
//!
//! Each script call nests a dozen or so host frames, so a deep but legal
//! recursion can exhaust a small thread stack long before
//! `VmConfig::max_call_depth` is reached.

/// Free stack below which a new segment is allocated.
const RED_ZONE: usize = 128 * 1024;

/// Size of each freshly allocated segment.
const STACK_PER_RECURSION: usize = 1024 * 1024;

/// Runs `f`, first moving to a fresh stack segment if the current one is
/// nearly exhausted.
#[inline]
pub fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    stacker::maybe_grow(RED_ZONE, STACK_PER_RECURSION, f)
}
