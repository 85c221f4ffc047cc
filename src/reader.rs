//! # Partition Reader
//!
//! Turns the store's continuation-token paging into a lazy, forward-only
//! sequence of `(batch, position)` pairs for a single partition.
//!
//! A reader is not restartable mid-stream; to resume, start a new reader
//! from any previously emitted position via
//! [`StartingPosition::At`](crate::config::StartingPosition::At).
//!
//! ## Stopping policy
//!
//! Evaluated after every emitted batch:
//! - the store reports no more events: stop
//! - no stop point for this partition: continue
//! - otherwise continue while `stop >= emitted`; the reader may overshoot
//!   the stop point by one batch and that overshoot is kept

use std::sync::Arc;

use futures::stream::{self, Stream};
use tracing::debug;

use crate::config::ChangefeedConfig;
use crate::error::{ChangefeedError, ChangefeedResult};
use crate::position::{parse_sequence_number, PartitionPosition, PartitionRange};
use crate::store::{ChangefeedRequest, ChangefeedStore, PartitionDescriptor};

/// Events read in one page, all tagged with the page's trailing position
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionBatch<E> {
    pub events: Vec<E>,
    pub position: PartitionPosition,
}

pub struct PartitionReader<S: ChangefeedStore> {
    store: Arc<S>,
    collection: String,
    range: PartitionRange,
    continuation: Option<String>,
    batch_size: usize,
    stop_at: Option<i64>,
    exhausted: bool,
}

impl<S: ChangefeedStore> PartitionReader<S> {
    /// Create a reader positioned at the partition's resume point
    ///
    /// `config` is validated first; a zero batch size could never make progress.
    pub fn new(
        store: Arc<S>,
        collection: impl Into<String>,
        partition: &PartitionDescriptor,
        config: &ChangefeedConfig,
    ) -> ChangefeedResult<Self> {
        config.validate()?;

        let range = partition
            .range()
            .map_err(|e| ChangefeedError::malformed_position(partition.id.as_str(), e))?;
        let continuation = config
            .starting_position
            .resume_point_for(&partition.id)
            .map(PartitionPosition::continuation_token);

        Ok(Self {
            store,
            collection: collection.into(),
            range,
            continuation,
            batch_size: config.batch_size,
            stop_at: config.stop_point_for(&partition.id),
            exhausted: false,
        })
    }

    pub fn partition_id(&self) -> &str {
        &self.range.partition_id
    }

    /// Token the next page will be requested with; `None` means start of partition
    pub fn continuation(&self) -> Option<&str> {
        self.continuation.as_deref()
    }

    /// True once the stopping policy ended the sequence or a fetch failed
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Fetch the next page; `Ok(None)` once the sequence has ended
    ///
    /// A failed fetch ends the sequence: later calls return `Ok(None)`.
    pub async fn next_batch(&mut self) -> ChangefeedResult<Option<PartitionBatch<S::Event>>> {
        if self.exhausted {
            return Ok(None);
        }

        let request = ChangefeedRequest {
            partition_id: self.range.partition_id.clone(),
            continuation: self.continuation.clone(),
            max_item_count: self.batch_size,
        };

        let page = match self.store.query_changefeed(&self.collection, &request).await {
            Ok(page) => page,
            Err(source) => {
                self.exhausted = true;
                return Err(ChangefeedError::page_fetch(request.partition_id, source));
            }
        };

        let last_sequence_number = match parse_sequence_number(&page.continuation) {
            Ok(lsn) => lsn,
            Err(source) => {
                self.exhausted = true;
                return Err(ChangefeedError::malformed_position(
                    request.partition_id,
                    source,
                ));
            }
        };

        let position = PartitionPosition::new(self.range.clone(), last_sequence_number);
        self.continuation = Some(page.continuation);
        self.exhausted = !self.should_continue(page.has_more, last_sequence_number);

        debug!(
            partition_id = %self.range.partition_id,
            events = page.items.len(),
            last_sequence_number,
            has_more = page.has_more,
            exhausted = self.exhausted,
            "Read changefeed page"
        );

        Ok(Some(PartitionBatch {
            events: page.items,
            position,
        }))
    }

    fn should_continue(&self, has_more: bool, last_sequence_number: i64) -> bool {
        if !has_more {
            return false;
        }
        match self.stop_at {
            None => true,
            Some(stop) => stop >= last_sequence_number,
        }
    }

    /// Lazy stream of batches; ends after the first error
    pub fn into_stream(self) -> impl Stream<Item = ChangefeedResult<PartitionBatch<S::Event>>> + Send {
        stream::try_unfold(self, |mut reader| async move {
            let batch = reader.next_batch().await?;
            Ok::<_, ChangefeedError>(batch.map(|batch| (batch, reader)))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StartingPosition;
    use crate::position::ChangefeedPosition;
    use crate::store::InMemoryChangefeedStore;
    use futures::TryStreamExt;

    const COLLECTION: &str = "orders";

    fn store_with_events(count: u32) -> (Arc<InMemoryChangefeedStore<u32>>, PartitionDescriptor) {
        let store = InMemoryChangefeedStore::new();
        store.add_partition(COLLECTION, "0", "", "ff");
        store.append(COLLECTION, "0", 1..=count).unwrap();
        (Arc::new(store), PartitionDescriptor::new("0", "", "ff"))
    }

    fn checkpoint(lsn: i64) -> ChangefeedPosition {
        vec![PartitionPosition::new(PartitionRange::new("0", 0, i64::MAX), lsn)].into()
    }

    #[tokio::test]
    async fn test_reads_until_caught_up() {
        let (store, partition) = store_with_events(7);
        let config = ChangefeedConfig::new().with_batch_size(3);
        let reader = PartitionReader::new(Arc::clone(&store), COLLECTION, &partition, &config).unwrap();

        let batches: Vec<_> = reader.into_stream().try_collect().await.unwrap();
        let lsns: Vec<_> = batches.iter().map(|b| b.position.last_sequence_number).collect();
        assert_eq!(lsns, vec![3, 6, 7]);
        assert_eq!(batches[2].events, vec![7]);
        assert_eq!(batches[0].position.range.range_max, i64::MAX);
        assert_eq!(store.query_count(COLLECTION, "0"), 3);
    }

    #[tokio::test]
    async fn test_resumes_from_starting_position() {
        let (store, partition) = store_with_events(7);
        let config = ChangefeedConfig::new()
            .with_batch_size(10)
            .with_starting_position(StartingPosition::At(checkpoint(5)));
        let mut reader = PartitionReader::new(store, COLLECTION, &partition, &config).unwrap();
        assert_eq!(reader.continuation(), Some("5"));

        let batch = reader.next_batch().await.unwrap().unwrap();
        assert_eq!(batch.events, vec![6, 7]);
        assert_eq!(batch.position.last_sequence_number, 7);
        assert!(reader.is_exhausted());
        assert!(reader.next_batch().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unknown_partition_in_checkpoint_starts_from_beginning() {
        let (store, partition) = store_with_events(2);
        let other: ChangefeedPosition =
            vec![PartitionPosition::new(PartitionRange::new("9", 0, 10), 4)].into();
        let config =
            ChangefeedConfig::new().with_starting_position(StartingPosition::At(other));
        let reader = PartitionReader::new(store, COLLECTION, &partition, &config).unwrap();
        assert_eq!(reader.continuation(), None);
    }

    #[tokio::test]
    async fn test_stops_after_passing_stop_point() {
        let (store, partition) = store_with_events(20);
        let config = ChangefeedConfig::new()
            .with_batch_size(3)
            .with_stopping_position(checkpoint(4));
        let reader = PartitionReader::new(Arc::clone(&store), COLLECTION, &partition, &config).unwrap();

        let batches: Vec<_> = reader.into_stream().try_collect().await.unwrap();
        let lsns: Vec<_> = batches.iter().map(|b| b.position.last_sequence_number).collect();
        // 4 >= 3 continues, 4 >= 6 does not: one batch of overshoot
        assert_eq!(lsns, vec![3, 6]);
        assert_eq!(store.query_count(COLLECTION, "0"), 2);
    }

    #[tokio::test]
    async fn test_fetch_failure_ends_sequence() {
        let (store, partition) = store_with_events(5);
        store.fail_partition(COLLECTION, "0", "partition offline");
        let config = ChangefeedConfig::new();
        let mut reader = PartitionReader::new(store, COLLECTION, &partition, &config).unwrap();

        let error = reader.next_batch().await.unwrap_err();
        assert!(matches!(error, ChangefeedError::PageFetch { .. }));
        assert!(reader.is_exhausted());
        assert!(reader.next_batch().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_malformed_bounds_are_rejected() {
        let (store, _) = store_with_events(1);
        let partition = PartitionDescriptor::new("0", "", "xyz");
        let result = PartitionReader::new(store, COLLECTION, &partition, &ChangefeedConfig::new());
        assert!(matches!(
            result,
            Err(ChangefeedError::MalformedPosition { .. })
        ));
    }

    #[tokio::test]
    async fn test_zero_batch_size_is_rejected() {
        let (store, partition) = store_with_events(3);
        let config = ChangefeedConfig::new().with_batch_size(0);
        let result = PartitionReader::new(Arc::clone(&store), COLLECTION, &partition, &config);

        assert!(matches!(result, Err(ChangefeedError::Configuration(_))));
        assert_eq!(store.query_count(COLLECTION, "0"), 0);
    }
}
