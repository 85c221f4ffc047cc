//! # Progress Aggregator
//!
//! Single consumer of the handler-to-aggregator channel. Folds every
//! `(output, partition position)` event into a running state owned by the
//! aggregator task alone, and hands each wall-clock window to the progress
//! handler.
//!
//! - Outputs of a window are delivered in arrival order.
//! - The delivered position is the running merge of every partition position
//!   seen so far, never a per-window subset.
//! - Windows without events are not delivered.
//! - The progress handler is awaited before the next event is received; a slow
//!   handler delays later windows and backpressures the pipelines.
//! - When every sender has gone, the last non-empty window is flushed and the
//!   final position is returned.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::config::{ConfigResult, ConfigurationError};
use crate::error::{ChangefeedError, ChangefeedResult};
use crate::handler::ProgressHandler;
use crate::logging::log_checkpoint;
use crate::position::{ChangefeedPosition, PartitionPosition};
use crate::stats::ProcessorStats;

/// One processed event as seen by the aggregator
pub type ProgressEvent<O> = (O, PartitionPosition);

pub struct ProgressAggregator<O, P> {
    receiver: mpsc::Receiver<ProgressEvent<O>>,
    progress_handler: P,
    interval: Duration,
    stats: Arc<ProcessorStats>,
    window: Vec<O>,
    position: ChangefeedPosition,
}

impl<O, P> ProgressAggregator<O, P>
where
    O: Send + 'static,
    P: ProgressHandler<O>,
{
    /// Create an aggregator delivering one window every `interval`
    ///
    /// A zero `interval` is rejected.
    pub fn new(
        receiver: mpsc::Receiver<ProgressEvent<O>>,
        progress_handler: P,
        interval: Duration,
        stats: Arc<ProcessorStats>,
    ) -> ConfigResult<Self> {
        if interval.is_zero() {
            return Err(ConfigurationError::invalid_value(
                "progress_interval_ms",
                "0",
                "progress interval must be greater than 0",
            ));
        }

        Ok(Self {
            receiver,
            progress_handler,
            interval,
            stats,
            window: Vec::new(),
            position: ChangefeedPosition::new(),
        })
    }

    /// Running checkpoint folded so far
    pub fn position(&self) -> &ChangefeedPosition {
        &self.position
    }

    fn fold(&mut self, output: O, position: PartitionPosition) {
        self.window.push(output);
        self.position = std::mem::take(&mut self.position).merged(position);
    }

    async fn flush(&mut self) -> ChangefeedResult<()> {
        if self.window.is_empty() {
            return Ok(());
        }

        let outputs = std::mem::take(&mut self.window);
        let position = self.position.clone();
        log_checkpoint(&position, outputs.len());

        self.progress_handler
            .on_progress(outputs, position)
            .await
            .map_err(|source| ChangefeedError::ProgressHandler { source })?;

        self.stats.record_progress_report();
        Ok(())
    }

    /// Consume the channel until every sender is dropped
    ///
    /// Returns the final running checkpoint, or the first progress handler error.
    pub async fn run(mut self) -> ChangefeedResult<ChangefeedPosition> {
        let mut ticker = time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        debug!(interval_ms = self.interval.as_millis() as u64, "Progress aggregator started");

        loop {
            tokio::select! {
                received = self.receiver.recv() => match received {
                    Some((output, position)) => self.fold(output, position),
                    None => break,
                },
                _ = ticker.tick() => self.flush().await?,
            }
        }

        self.flush().await?;
        info!(
            partition_count = self.position.len(),
            "Progress aggregator drained"
        );
        Ok(self.position)
    }
}
