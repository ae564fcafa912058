use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::mpsc;
use tokio_stream::Stream;

/// Handle releasing a registered listener.
///
/// Disposal runs exactly once, either through [`Disposable::dispose`] or on drop.
pub struct Disposable {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl Disposable {
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    pub fn dispose(mut self) {
        self.release_now();
    }

    fn release_now(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for Disposable {
    fn drop(&mut self) {
        self.release_now();
    }
}

impl fmt::Debug for Disposable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Disposable")
            .field("active", &self.release.is_some())
            .finish()
    }
}

/// Live stream of snapshots delivered by a store engine.
///
/// Dropping the subscription disposes the underlying listener.
#[derive(Debug)]
pub struct Subscription<T> {
    receiver: mpsc::UnboundedReceiver<T>,
    disposable: Disposable,
}

impl<T> Subscription<T> {
    pub fn new(receiver: mpsc::UnboundedReceiver<T>, disposable: Disposable) -> Self {
        Self { receiver, disposable }
    }

    /// Waits for the next snapshot. `None` once the engine stops delivering.
    pub async fn next(&mut self) -> Option<T> {
        self.receiver.recv().await
    }

    /// Returns an already-delivered snapshot without waiting.
    pub fn try_next(&mut self) -> Option<T> {
        self.receiver.try_recv().ok()
    }

    pub fn dispose(self) {
        let Self { receiver, disposable } = self;
        drop(receiver);
        disposable.dispose();
    }
}

impl<T> Stream for Subscription<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.receiver.poll_recv(cx)
    }
}
