//! # User Callbacks
//!
//! [`EventHandler`] processes one event and produces an output;
//! [`ProgressHandler`] receives the outputs of a progress window together
//! with the checkpoint that covers them.
//!
//! Both are implemented for async closures, so most callers never name the
//! traits:
//!
//! ```rust
//! use changefeed_core::handler::{EventHandler, ProgressHandler};
//! use changefeed_core::position::ChangefeedPosition;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let handler = |event: String| async move { Ok::<_, anyhow::Error>(event.len()) };
//! let progress = |outputs: Vec<usize>, position: ChangefeedPosition| async move {
//!     println!("{} events, {} partitions", outputs.len(), position.len());
//!     Ok::<_, anyhow::Error>(())
//! };
//!
//! let output = handler.handle("order-created".to_string()).await?;
//! progress.on_progress(vec![output], ChangefeedPosition::new()).await?;
//! # Ok(())
//! # }
//! ```

use std::future::Future;

use async_trait::async_trait;

use crate::position::ChangefeedPosition;

/// Processes a single change-feed event
#[async_trait]
pub trait EventHandler<E: Send + 'static>: Send + Sync + 'static {
    /// Value forwarded to the progress handler for every processed event
    type Output: Send + 'static;

    async fn handle(&self, event: E) -> anyhow::Result<Self::Output>;
}

/// Receives aggregated outputs and the checkpoint they were produced at
///
/// Persisting `position` is how callers make a run resumable; the core
/// never stores checkpoints itself.
#[async_trait]
pub trait ProgressHandler<O: Send + 'static>: Send + Sync + 'static {
    async fn on_progress(&self, outputs: Vec<O>, position: ChangefeedPosition)
        -> anyhow::Result<()>;
}

#[async_trait]
impl<E, O, F, Fut> EventHandler<E> for F
where
    E: Send + 'static,
    O: Send + 'static,
    F: Fn(E) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<O>> + Send + 'static,
{
    type Output = O;

    async fn handle(&self, event: E) -> anyhow::Result<O> {
        (self)(event).await
    }
}

#[async_trait]
impl<O, F, Fut> ProgressHandler<O> for F
where
    O: Send + 'static,
    F: Fn(Vec<O>, ChangefeedPosition) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn on_progress(
        &self,
        outputs: Vec<O>,
        position: ChangefeedPosition,
    ) -> anyhow::Result<()> {
        (self)(outputs, position).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingHandler {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EventHandler<u64> for CountingHandler {
        type Output = u64;

        async fn handle(&self, event: u64) -> anyhow::Result<u64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(event * 2)
        }
    }

    #[tokio::test]
    async fn test_struct_handler() {
        let handler = CountingHandler {
            calls: AtomicUsize::new(0),
        };
        assert_eq!(handler.handle(21).await.unwrap(), 42);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_closure_handlers() {
        let handler = |event: u64| async move {
            if event == 0 {
                anyhow::bail!("zero is not a valid event");
            }
            Ok(event + 1)
        };
        assert_eq!(handler.handle(1).await.unwrap(), 2);
        assert!(handler.handle(0).await.is_err());

        let seen = Arc::new(AtomicUsize::new(0));
        let sink = Arc::clone(&seen);
        let progress = move |outputs: Vec<u64>, _position: ChangefeedPosition| {
            let sink = Arc::clone(&sink);
            async move {
                sink.fetch_add(outputs.len(), Ordering::SeqCst);
                Ok::<_, anyhow::Error>(())
            }
        };
        progress
            .on_progress(vec![1, 2, 3], ChangefeedPosition::new())
            .await
            .unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 3);
    }
}
