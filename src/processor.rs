//! # Changefeed Processor
//!
//! Wires discovery, partition readers and the progress aggregator into one
//! run:
//!
//! 1. discover the partitions of the collection (failure aborts the run)
//! 2. build one reader per partition before anything is spawned
//! 3. spawn the aggregator and one pipeline task per partition
//! 4. wait for whichever side finishes first
//!
//! Readers finishing first close the progress channel, so the aggregator is
//! awaited for its final flush. The aggregator finishing first with a
//! progress handler error shuts down every pipeline still running and
//! returns that error.
//!
//! A failing or panicking pipeline ends only its own partition; its outcome
//! is reported in the [`RunSummary`].

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::{pin_mut, FutureExt, TryStreamExt};
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::aggregator::{ProgressAggregator, ProgressEvent};
use crate::config::ChangefeedConfig;
use crate::discovery::discover_partitions;
use crate::error::{ChangefeedError, ChangefeedResult};
use crate::handler::{EventHandler, ProgressHandler};
use crate::logging::log_partition_operation;
use crate::position::{ChangefeedPosition, PartitionPosition};
use crate::reader::PartitionReader;
use crate::stats::{ProcessorStats, ProcessorStatsSnapshot};
use crate::store::{ChangefeedStore, StoreConnector, StoreEndpoint};

/// What one partition pipeline got through before it ended
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartitionProgress {
    pub batches_read: u64,
    pub events_handled: u64,
    /// Position of the last batch whose events were all handled
    pub last_position: Option<PartitionPosition>,
}

#[derive(Debug)]
pub struct PartitionReport {
    pub partition_id: String,
    pub outcome: ChangefeedResult<PartitionProgress>,
}

/// Result of a run in which progress delivery never failed
#[derive(Debug)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub partitions: Vec<PartitionReport>,
    /// Last checkpoint folded by the aggregator; empty if no event was handled
    pub final_position: ChangefeedPosition,
    pub stats: ProcessorStatsSnapshot,
}

impl RunSummary {
    /// True when every partition pipeline ended without error
    pub fn is_complete(&self) -> bool {
        self.partitions.iter().all(|report| report.outcome.is_ok())
    }

    pub fn failed_partitions(&self) -> impl Iterator<Item = (&str, &ChangefeedError)> {
        self.partitions.iter().filter_map(|report| match &report.outcome {
            Ok(_) => None,
            Err(error) => Some((report.partition_id.as_str(), error)),
        })
    }
}

pub struct ChangefeedProcessor<S, H, P> {
    run_id: Uuid,
    store: Arc<S>,
    collection: String,
    config: ChangefeedConfig,
    handler: Arc<H>,
    progress_handler: P,
    stats: Arc<ProcessorStats>,
}

impl<S, H, P> std::fmt::Debug for ChangefeedProcessor<S, H, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangefeedProcessor")
            .field("run_id", &self.run_id)
            .field("collection", &self.collection)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<S, H, P> ChangefeedProcessor<S, H, P>
where
    S: ChangefeedStore,
    H: EventHandler<S::Event>,
    P: ProgressHandler<H::Output>,
{
    pub fn new(
        store: Arc<S>,
        collection: impl Into<String>,
        config: ChangefeedConfig,
        handler: H,
        progress_handler: P,
    ) -> ChangefeedResult<Self> {
        config.validate()?;

        Ok(Self {
            run_id: Uuid::new_v4(),
            store,
            collection: collection.into(),
            config,
            handler: Arc::new(handler),
            progress_handler,
            stats: Arc::new(ProcessorStats::new()),
        })
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Counters shared with the running tasks; stays readable during `run`
    pub fn stats(&self) -> Arc<ProcessorStats> {
        Arc::clone(&self.stats)
    }

    /// Consume the collection until every partition reaches its stopping
    /// condition or the progress handler fails
    pub async fn run(self) -> ChangefeedResult<RunSummary> {
        let span = info_span!(
            "changefeed_run",
            run_id = %self.run_id,
            collection = %self.collection,
            store = self.store.store_name()
        );
        self.run_inner().instrument(span).await
    }

    async fn run_inner(self) -> ChangefeedResult<RunSummary> {
        let Self {
            run_id,
            store,
            collection,
            config,
            handler,
            progress_handler,
            stats,
        } = self;

        let partitions = discover_partitions(store.as_ref(), &collection).await?;
        let readers = partitions
            .iter()
            .map(|partition| {
                PartitionReader::new(Arc::clone(&store), collection.as_str(), partition, &config)
            })
            .collect::<ChangefeedResult<Vec<_>>>()?;

        info!(
            partition_count = readers.len(),
            batch_size = config.batch_size,
            progress_interval_ms = config.progress_interval_ms,
            "Starting changefeed run"
        );

        let (sender, receiver) =
            mpsc::channel::<ProgressEvent<H::Output>>(config.progress_channel_buffer_size);

        let aggregator = ProgressAggregator::new(
            receiver,
            progress_handler,
            config.progress_interval(),
            Arc::clone(&stats),
        )?;
        let mut aggregator_task =
            tokio::spawn(aggregator.run().instrument(info_span!("progress_aggregator")));

        let mut pipelines = JoinSet::new();
        for reader in readers {
            let partition_id = reader.partition_id().to_string();
            let span = info_span!("partition_pipeline", partition_id = %partition_id);
            let pipeline = run_pipeline(
                reader,
                Arc::clone(&handler),
                sender.clone(),
                Arc::clone(&stats),
            );
            let stats = Arc::clone(&stats);

            pipelines.spawn(
                async move {
                    let outcome = match AssertUnwindSafe(pipeline).catch_unwind().await {
                        Ok(outcome) => outcome,
                        Err(panic) => {
                            let message = panic_message(panic.as_ref());
                            error!(partition_id = %partition_id, panic_msg = %message, "Partition pipeline panicked");
                            stats.record_partition_failed();
                            Err(ChangefeedError::TaskPanicked {
                                partition_id: partition_id.clone(),
                                message,
                            })
                        }
                    };
                    PartitionReport {
                        partition_id,
                        outcome,
                    }
                }
                .instrument(span),
            );
        }
        // Pipelines hold the only senders; the channel closes when the last one ends
        drop(sender);

        let mut reports = Vec::with_capacity(pipelines.len());
        let mut aggregated = None;
        let mut pipeline_failure = None;
        loop {
            tokio::select! {
                result = &mut aggregator_task => {
                    aggregated = Some(result);
                    break;
                }
                joined = pipelines.join_next() => match joined {
                    Some(Ok(report)) => reports.push(report),
                    Some(Err(join_error)) => {
                        pipeline_failure = Some(join_error);
                        break;
                    }
                    None => break,
                },
            }
        }

        if let Some(join_error) = pipeline_failure {
            error!(error = %join_error, "Partition pipeline task failed, abandoning run");
            abandon_run(&aggregator_task, &mut pipelines).await;
            return Err(ChangefeedError::TaskJoin(join_error.to_string()));
        }

        let aggregated = match aggregated {
            Some(result) => result,
            None => {
                info!("All partition pipelines finished, waiting for final progress flush");
                aggregator_task.await
            }
        };

        let final_position = match aggregated {
            Ok(Ok(position)) => position,
            Ok(Err(error)) => {
                warn!(error = %error, "Progress aggregation failed, shutting down partition pipelines");
                pipelines.shutdown().await;
                return Err(error);
            }
            Err(join_error) => {
                pipelines.shutdown().await;
                return Err(ChangefeedError::TaskJoin(join_error.to_string()));
            }
        };

        while let Some(joined) = pipelines.join_next().await {
            match joined {
                Ok(report) => reports.push(report),
                Err(join_error) => {
                    pipelines.shutdown().await;
                    return Err(ChangefeedError::TaskJoin(join_error.to_string()));
                }
            }
        }

        let summary = RunSummary {
            run_id,
            partitions: reports,
            final_position,
            stats: stats.snapshot(),
        };

        info!(
            partitions_completed = summary.stats.partitions_completed,
            partitions_failed = summary.stats.partitions_failed,
            events_handled = summary.stats.events_handled,
            progress_reports = summary.stats.progress_reports,
            "Changefeed run finished"
        );
        Ok(summary)
    }
}

/// Connect to the store behind `endpoint` and run one consumer over its collection
pub async fn run<C, H, P>(
    connector: &C,
    endpoint: &StoreEndpoint,
    config: ChangefeedConfig,
    handler: H,
    progress_handler: P,
) -> ChangefeedResult<RunSummary>
where
    C: StoreConnector,
    H: EventHandler<<C::Store as ChangefeedStore>::Event>,
    P: ProgressHandler<H::Output>,
{
    let store = connector
        .connect(endpoint)
        .await
        .map_err(|source| ChangefeedError::Connection {
            endpoint: endpoint.uri.clone(),
            source,
        })?;

    ChangefeedProcessor::new(
        store,
        endpoint.collection.as_str(),
        config,
        handler,
        progress_handler,
    )?
    .run()
    .await
}

async fn run_pipeline<S, H>(
    reader: PartitionReader<S>,
    handler: Arc<H>,
    sender: mpsc::Sender<ProgressEvent<H::Output>>,
    stats: Arc<ProcessorStats>,
) -> ChangefeedResult<PartitionProgress>
where
    S: ChangefeedStore,
    H: EventHandler<S::Event>,
{
    let partition_id = reader.partition_id().to_string();
    log_partition_operation("read", &partition_id, "started", None, reader.continuation());

    let mut progress = PartitionProgress::default();
    let outcome = pump_partition(
        &partition_id,
        reader,
        handler.as_ref(),
        &sender,
        &stats,
        &mut progress,
    )
    .await;
    drop(sender);

    let last_sequence_number = progress
        .last_position
        .as_ref()
        .map(|position| position.last_sequence_number);

    match outcome {
        Ok(()) => {
            stats.record_partition_completed();
            log_partition_operation("read", &partition_id, "completed", last_sequence_number, None);
            Ok(progress)
        }
        Err(error) => {
            stats.record_partition_failed();
            let details = error.to_string();
            log_partition_operation(
                "read",
                &partition_id,
                "failed",
                last_sequence_number,
                Some(&details),
            );
            Err(error)
        }
    }
}

async fn pump_partition<S, H>(
    partition_id: &str,
    reader: PartitionReader<S>,
    handler: &H,
    sender: &mpsc::Sender<ProgressEvent<H::Output>>,
    stats: &ProcessorStats,
    progress: &mut PartitionProgress,
) -> ChangefeedResult<()>
where
    S: ChangefeedStore,
    H: EventHandler<S::Event>,
{
    let batches = reader.into_stream();
    pin_mut!(batches);

    while let Some(batch) = batches.try_next().await? {
        stats.record_batch();
        progress.batches_read += 1;

        // Every event of a batch carries the batch's trailing position
        for event in batch.events {
            let output = handler
                .handle(event)
                .await
                .map_err(|source| ChangefeedError::handler(partition_id, source))?;
            stats.record_event();
            progress.events_handled += 1;

            sender
                .send((output, batch.position.clone()))
                .await
                .map_err(|_| ChangefeedError::ProgressChannelClosed {
                    partition_id: partition_id.to_string(),
                })?;
        }

        progress.last_position = Some(batch.position);
    }

    Ok(())
}

/// Stop the aggregator and every pipeline still running before `run` returns
async fn abandon_run<T>(
    aggregator_task: &JoinHandle<T>,
    pipelines: &mut JoinSet<PartitionReport>,
) {
    aggregator_task.abort();
    pipelines.shutdown().await;
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "Unknown panic".to_string()
    }
}
