//! Single-delivery completion channels.
//!
//! [`spawn`] runs a future as its own task and hands back a [`Completion`]:
//! a capacity-one channel that yields exactly one `Result` and is closed
//! afterwards. If the task dies without sending (a panic, runtime shutdown)
//! the completion resolves to an error built from [`Dropped`] instead of
//! hanging, so a caller always receives data or a problem, never neither.

use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use tokio::sync::oneshot;

use crate::StoreError;

/// The sending task went away before producing a result.
#[derive(Debug, Clone, Copy)]
pub struct Dropped;

impl From<Dropped> for StoreError {
    fn from(_: Dropped) -> Self {
        StoreError::Dropped
    }
}

#[must_use = "a completion does nothing unless awaited"]
pub struct Completion<T, E> {
    rx: oneshot::Receiver<Result<T, E>>,
}

pub fn spawn<T, E, F>(fut: F) -> Completion<T, E>
where
    F: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
        // receiver may have been dropped; nobody is left to tell
        let _ = tx.send(fut.await);
    });
    Completion { rx }
}

impl<T, E> Completion<T, E> {
    /// A completion that is already resolved.
    pub fn ready(result: Result<T, E>) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(result);
        Completion { rx }
    }
}

impl<T, E: From<Dropped>> Future for Completion<T, E> {
    type Output = Result<T, E>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|res| res.unwrap_or_else(|_| Err(Dropped.into())))
    }
}
