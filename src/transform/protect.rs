//! Per-thread marker for work done on behalf of the pipeline itself.

use std::{cell::Cell, marker::PhantomData};

thread_local! {
    static DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// RAII guard marking the current thread as running pipeline code.
///
/// Every hook invocation holds one for its whole duration, and listener delivery holds one
/// while the listener runs. Events raised while any scope is open on a thread come from the
/// pipeline's own activity and are not delivered. Scopes nest; the thread is unprotected
/// again once the outermost guard drops, including when unwinding from a panic.
///
/// ```rust
/// use weavehook::transform::ProtectScope;
///
/// assert!(!ProtectScope::is_protecting());
/// {
///     let _outer = ProtectScope::enter();
///     let _inner = ProtectScope::enter();
///     assert_eq!(ProtectScope::depth(), 2);
/// }
/// assert!(!ProtectScope::is_protecting());
/// ```
#[must_use = "the scope closes as soon as the guard is dropped"]
pub struct ProtectScope {
    // Bound to the thread whose counter it incremented
    _thread_bound: PhantomData<*const ()>,
}

impl ProtectScope {
    /// Opens a scope on the current thread.
    pub fn enter() -> Self {
        DEPTH.with(|depth| depth.set(depth.get() + 1));
        ProtectScope {
            _thread_bound: PhantomData,
        }
    }

    /// Returns `true` if a scope is open on the current thread.
    #[must_use]
    pub fn is_protecting() -> bool {
        Self::depth() > 0
    }

    /// Number of scopes currently open on this thread.
    #[must_use]
    pub fn depth() -> usize {
        DEPTH.with(Cell::get)
    }
}

impl Drop for ProtectScope {
    fn drop(&mut self) {
        DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}
