//! Stack growth for the recursive walks of lvalue lowering.
//!
//! Building an lvalue recurses once per nested member, subscript or
//! optional-chain step, and index comparison recurses through tuples and
//! calls. Machine-generated code can nest these arbitrarily deep, so every
//! recursive entry point goes through [`ensure_sufficient_stack`].

/// Remaining stack below which the next recursion step grows the stack.
const RED_ZONE: usize = 100 * 1024;

/// Size of each newly allocated stack segment.
const STACK_PER_RECURSION: usize = 1024 * 1024;

/// Run `f`, first growing the stack if less than the red zone remains.
#[inline]
#[cfg(not(target_arch = "wasm32"))]
pub(crate) fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    stacker::maybe_grow(RED_ZONE, STACK_PER_RECURSION, f)
}

/// WASM manages its own stack; call through.
#[inline]
#[cfg(target_arch = "wasm32")]
pub(crate) fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    f()
}
