//! Cooperative cancellation
//!
//! A token is shared between the party that may cancel and the component
//! holding the waiting slot. Cancelling flips a flag and wakes any task that
//! registered interest; owners check the flag when they resolve or prune their
//! waiter lists.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::task::Waker;

#[derive(Debug, Default)]
struct Inner {
    cancelled: AtomicBool,
    wakers: Mutex<Vec<Waker>>,
}

/// Cloneable cancellation flag
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    inner: Arc<Inner>,
}

impl CancellationToken {
    /// Create a fresh, non-cancelled token
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        if self.inner.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }
        let wakers = match self.inner.wakers.lock() {
            Ok(mut guard) => core::mem::take(&mut *guard),
            Err(poisoned) => core::mem::take(&mut *poisoned.into_inner()),
        };
        for waker in wakers {
            waker.wake();
        }
    }

    /// Check whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Wake `waker` when the token is cancelled.
    ///
    /// Returns `true` if the token is already cancelled, in which case the
    /// waker is not stored.
    pub fn register_waker(&self, waker: &Waker) -> bool {
        if self.is_cancelled() {
            return true;
        }
        let mut wakers = match self.inner.wakers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if !wakers.iter().any(|w| w.will_wake(waker)) {
            wakers.push(waker.clone());
        }
        drop(wakers);
        // cancel() may have run between the check and the push
        self.is_cancelled()
    }

    /// True when both tokens share the same flag
    pub fn same_as(&self, other: &CancellationToken) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}
