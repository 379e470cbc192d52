//! Tokio runtime spawner implementation.

use std::future::Future;
use std::pin::Pin;

/// Object-safe abstraction for spawning background work. The pool uses
/// it for best-effort executor kills that must not hold up admissions.
pub trait Spawn: Send + Sync {
    /// Spawn a future to run in the background.
    fn spawn(&self, fut: Pin<Box<dyn Future<Output = ()> + Send + 'static>>);
}

/// Tokio-based spawner that executes work on a tokio runtime.
#[derive(Clone)]
pub struct TokioSpawner {
    handle: tokio::runtime::Handle,
}

impl TokioSpawner {
    /// Create a new `TokioSpawner` from a tokio runtime handle.
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }

    /// Create a `TokioSpawner` on the current runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn current() -> Self {
        Self::new(tokio::runtime::Handle::current())
    }
}

impl Spawn for TokioSpawner {
    fn spawn(&self, fut: Pin<Box<dyn Future<Output = ()> + Send + 'static>>) {
        self.handle.spawn(fut);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_tokio_spawner_spawn() {
        let spawner = TokioSpawner::current();
        let (tx, rx) = tokio::sync::oneshot::channel();
        spawner.spawn(Box::pin(async move {
            tx.send(123).unwrap();
        }));
        assert_eq!(rx.await.expect("oneshot result"), 123);
    }
}
