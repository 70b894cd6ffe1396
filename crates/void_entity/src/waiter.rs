//! Load waiters and completion futures
//!
//! A [`Waiter`] is the record stored for every `wait_until_loaded` call whose
//! entity is not loaded yet. It is consumed exactly once, by whichever of
//! `notify_loaded` / `notify_failed` runs first, unless its token was
//! cancelled, in which case it is dropped without firing.
//!
//! [`LoadWait`] is the future form of the same wait. It rides on an ordinary
//! waiter whose callbacks complete a oneshot channel.

use core::future::Future;
use core::pin::Pin;
use core::task::{Context, Poll};

use tokio::sync::oneshot;
use void_core::{CancellationToken, EntityId};

use crate::error::{EntityError, EntityResult};

/// Callback invoked with the id of the resolved entity
pub type WaitCallback = Box<dyn FnOnce(EntityId)>;

/// Identifies a stored waiter so it can be cancelled
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct WaitHandle {
    pub(crate) entity: EntityId,
    pub(crate) slot: u64,
}

impl WaitHandle {
    pub fn entity(&self) -> EntityId {
        self.entity
    }
}

pub(crate) struct Waiter {
    pub(crate) slot: u64,
    pub(crate) token: Option<CancellationToken>,
    /// Cancelled when the owning [`LoadWait`] is dropped
    pub(crate) released: Option<CancellationToken>,
    pub(crate) on_loaded: WaitCallback,
    pub(crate) on_failed: WaitCallback,
}

impl Waiter {
    pub(crate) fn is_cancelled(&self) -> bool {
        self.token.as_ref().map_or(false, |t| t.is_cancelled())
            || self.released.as_ref().map_or(false, |t| t.is_cancelled())
    }
}

/// Future resolving when an entity finishes loading
///
/// Resolves to `Ok(())` on load, `Err(LoadFailed)` on failure and
/// `Err(Cancelled)` when its token fires or the registry drops the wait.
#[must_use = "futures do nothing unless polled"]
pub struct LoadWait {
    id: EntityId,
    token: Option<CancellationToken>,
    ready: Option<EntityResult<()>>,
    rx: Option<oneshot::Receiver<EntityResult<()>>>,
    released: Option<CancellationToken>,
}

impl LoadWait {
    pub(crate) fn ready(id: EntityId, result: EntityResult<()>) -> Self {
        Self {
            id,
            token: None,
            ready: Some(result),
            rx: None,
            released: None,
        }
    }

    pub(crate) fn pending(
        id: EntityId,
        token: Option<CancellationToken>,
        rx: oneshot::Receiver<EntityResult<()>>,
        released: CancellationToken,
    ) -> Self {
        Self {
            id,
            token,
            ready: None,
            rx: Some(rx),
            released: Some(released),
        }
    }

    pub fn entity(&self) -> EntityId {
        self.id
    }

    /// Non-blocking check, for callers driving their own loop
    pub fn try_result(&mut self) -> Option<EntityResult<()>> {
        if let Some(result) = self.ready.take() {
            return Some(result);
        }
        if self.token.as_ref().map_or(false, |t| t.is_cancelled()) {
            self.rx = None;
            return Some(Err(EntityError::Cancelled(self.id)));
        }
        let rx = self.rx.as_mut()?;
        match rx.try_recv() {
            Ok(result) => {
                self.rx = None;
                Some(result)
            }
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => {
                self.rx = None;
                Some(Err(EntityError::Cancelled(self.id)))
            }
        }
    }
}

impl Drop for LoadWait {
    fn drop(&mut self) {
        // Marks the stored waiter for purging
        if let Some(released) = &self.released {
            released.cancel();
        }
    }
}

impl Future for LoadWait {
    type Output = EntityResult<()>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if let Some(result) = this.ready.take() {
            return Poll::Ready(result);
        }
        if let Some(token) = &this.token {
            if token.register_waker(cx.waker()) {
                this.rx = None;
                return Poll::Ready(Err(EntityError::Cancelled(this.id)));
            }
        }
        let Some(rx) = this.rx.as_mut() else {
            return Poll::Ready(Err(EntityError::Cancelled(this.id)));
        };
        match Pin::new(rx).poll(cx) {
            Poll::Ready(Ok(result)) => {
                this.rx = None;
                Poll::Ready(result)
            }
            Poll::Ready(Err(_)) => {
                this.rx = None;
                Poll::Ready(Err(EntityError::Cancelled(this.id)))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl core::fmt::Debug for LoadWait {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("LoadWait")
            .field("id", &self.id)
            .field("ready", &self.ready.is_some())
            .finish()
    }
}

/// Build the waiter callbacks that complete a [`LoadWait`]
pub(crate) fn load_wait_callbacks(
    tx: oneshot::Sender<EntityResult<()>>,
) -> (WaitCallback, WaitCallback) {
    // Both callbacks share one sender; only one of them ever runs.
    let shared = std::rc::Rc::new(core::cell::RefCell::new(Some(tx)));
    let on_failed_tx = shared.clone();
    let on_loaded: WaitCallback = Box::new(move |_| {
        if let Some(tx) = shared.borrow_mut().take() {
            let _ = tx.send(Ok(()));
        }
    });
    let on_failed: WaitCallback = Box::new(move |id| {
        if let Some(tx) = on_failed_tx.borrow_mut().take() {
            let _ = tx.send(Err(EntityError::LoadFailed(id)));
        }
    });
    (on_loaded, on_failed)
}
