//! # In-Memory Changefeed Store
//!
//! Thread-safe in-process store for development and testing.
//!
//! ## Features
//!
//! - **Partitions with native bounds**: descriptors carry hex range bounds like a real store
//! - **LSN continuation tokens**: the token after a page is the number of events consumed
//! - **Append**: grow a partition's log between runs to exercise resumption
//! - **Fault injection**: fail discovery or individual partitions
//! - **Query counters**: observe how many pages a partition served

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;

use super::{ChangefeedPage, ChangefeedRequest, ChangefeedStore, PartitionDescriptor, StoreError};
use crate::position::parse_sequence_number;

#[derive(Debug)]
struct InMemoryPartition<E> {
    descriptor: PartitionDescriptor,
    events: Vec<E>,
    failure: Option<String>,
    queries: u64,
}

/// In-memory change feed
///
/// # Example
///
/// ```rust
/// use changefeed_core::store::{ChangefeedRequest, ChangefeedStore, InMemoryChangefeedStore};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = InMemoryChangefeedStore::new();
/// store.add_partition("orders", "0", "", "ff");
/// store.append("orders", "0", vec!["created", "paid", "shipped"])?;
///
/// let request = ChangefeedRequest {
///     partition_id: "0".to_string(),
///     continuation: None,
///     max_item_count: 2,
/// };
/// let page = store.query_changefeed("orders", &request).await?;
/// assert_eq!(page.items, vec!["created", "paid"]);
/// assert_eq!(page.continuation, "2");
/// assert!(page.has_more);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct InMemoryChangefeedStore<E> {
    collections: RwLock<HashMap<String, Vec<InMemoryPartition<E>>>>,
    discovery_failure: RwLock<Option<String>>,
    latency: Option<Duration>,
}

impl<E> Default for InMemoryChangefeedStore<E> {
    fn default() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            discovery_failure: RwLock::new(None),
            latency: None,
        }
    }
}

impl<E: Clone> InMemoryChangefeedStore<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every page read by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Register a partition; re-adding an existing id replaces its bounds and keeps its events
    pub fn add_partition(
        &self,
        collection: &str,
        partition_id: &str,
        range_min_hex: &str,
        range_max_hex: &str,
    ) {
        let descriptor = PartitionDescriptor::new(partition_id, range_min_hex, range_max_hex);
        let mut collections = self.collections.write();
        let partitions = collections.entry(collection.to_string()).or_default();

        match partitions.iter_mut().find(|p| p.descriptor.id == partition_id) {
            Some(existing) => existing.descriptor = descriptor,
            None => partitions.push(InMemoryPartition {
                descriptor,
                events: Vec::new(),
                failure: None,
                queries: 0,
            }),
        }
    }

    /// Append events to a partition's log
    pub fn append(
        &self,
        collection: &str,
        partition_id: &str,
        events: impl IntoIterator<Item = E>,
    ) -> Result<(), StoreError> {
        let mut collections = self.collections.write();
        let partition = collections
            .get_mut(collection)
            .ok_or_else(|| StoreError::collection_not_found(collection))?
            .iter_mut()
            .find(|p| p.descriptor.id == partition_id)
            .ok_or_else(|| StoreError::partition_not_found(partition_id))?;
        partition.events.extend(events);
        Ok(())
    }

    /// Make every later page read of the partition fail
    pub fn fail_partition(&self, collection: &str, partition_id: &str, message: &str) {
        self.set_partition_failure(collection, partition_id, Some(message.to_string()));
    }

    pub fn heal_partition(&self, collection: &str, partition_id: &str) {
        self.set_partition_failure(collection, partition_id, None);
    }

    /// Make partition listing fail until cleared with `None`
    pub fn set_discovery_failure(&self, message: Option<&str>) {
        *self.discovery_failure.write() = message.map(str::to_string);
    }

    /// Number of page reads served for a partition
    pub fn query_count(&self, collection: &str, partition_id: &str) -> u64 {
        self.collections
            .read()
            .get(collection)
            .and_then(|partitions| partitions.iter().find(|p| p.descriptor.id == partition_id))
            .map(|p| p.queries)
            .unwrap_or(0)
    }

    /// Number of events in a partition's log
    pub fn partition_len(&self, collection: &str, partition_id: &str) -> usize {
        self.collections
            .read()
            .get(collection)
            .and_then(|partitions| partitions.iter().find(|p| p.descriptor.id == partition_id))
            .map(|p| p.events.len())
            .unwrap_or(0)
    }

    fn set_partition_failure(&self, collection: &str, partition_id: &str, failure: Option<String>) {
        let mut collections = self.collections.write();
        if let Some(partition) = collections
            .get_mut(collection)
            .and_then(|partitions| partitions.iter_mut().find(|p| p.descriptor.id == partition_id))
        {
            partition.failure = failure;
        }
    }

    fn read_page(
        &self,
        collection: &str,
        request: &ChangefeedRequest,
    ) -> Result<ChangefeedPage<E>, StoreError> {
        let start = match request.continuation.as_deref() {
            None => 0,
            Some(token) => parse_sequence_number(token)
                .map_err(|e| StoreError::invalid_continuation(token, e.to_string()))?,
        };
        let start = usize::try_from(start)
            .map_err(|_| StoreError::invalid_continuation(start.to_string(), "out of range"))?;

        let mut collections = self.collections.write();
        let partition = collections
            .get_mut(collection)
            .ok_or_else(|| StoreError::collection_not_found(collection))?
            .iter_mut()
            .find(|p| p.descriptor.id == request.partition_id)
            .ok_or_else(|| StoreError::partition_not_found(request.partition_id.as_str()))?;

        partition.queries += 1;
        if let Some(message) = &partition.failure {
            return Err(StoreError::unavailable(message.as_str()));
        }

        let len = partition.events.len();
        let first = start.min(len);
        let end = first.saturating_add(request.max_item_count).min(len);

        // Tokens past the end are echoed back; the cursor never moves backwards
        Ok(ChangefeedPage {
            items: partition.events[first..end].to_vec(),
            continuation: end.max(start).to_string(),
            has_more: end < len,
        })
    }
}

#[async_trait]
impl<E> ChangefeedStore for InMemoryChangefeedStore<E>
where
    E: Clone + Send + Sync + 'static,
{
    type Event = E;

    async fn list_partitions(
        &self,
        collection: &str,
    ) -> Result<Vec<PartitionDescriptor>, StoreError> {
        if let Some(message) = self.discovery_failure.read().clone() {
            return Err(StoreError::unavailable(message));
        }

        self.collections
            .read()
            .get(collection)
            .map(|partitions| partitions.iter().map(|p| p.descriptor.clone()).collect())
            .ok_or_else(|| StoreError::collection_not_found(collection))
    }

    async fn query_changefeed(
        &self,
        collection: &str,
        request: &ChangefeedRequest,
    ) -> Result<ChangefeedPage<E>, StoreError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let page = self.read_page(collection, request)?;
        debug!(
            collection = %collection,
            partition_id = %request.partition_id,
            items = page.items.len(),
            continuation = %page.continuation,
            has_more = page.has_more,
            "Served in-memory changefeed page"
        );
        Ok(page)
    }

    fn store_name(&self) -> &'static str {
        "in_memory"
    }
}
