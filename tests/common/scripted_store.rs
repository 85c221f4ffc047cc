use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use changefeed_core::store::{
    ChangefeedPage, ChangefeedRequest, ChangefeedStore, PartitionDescriptor, StoreConnector,
    StoreEndpoint, StoreError,
};

/// One page the store will serve, in order, for a partition
#[derive(Debug, Clone)]
pub struct ScriptedPage {
    pub items: Vec<u32>,
    pub continuation: String,
    pub has_more: bool,
    pub delay: Option<Duration>,
}

impl ScriptedPage {
    pub fn new(items: Vec<u32>, continuation: &str, has_more: bool) -> Self {
        Self {
            items,
            continuation: continuation.to_string(),
            has_more,
            delay: None,
        }
    }

    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

/// Store that replays fixed pages and records every request it receives
///
/// Reading past the end of a partition's script is a protocol error so tests
/// notice an unexpected extra fetch.
#[derive(Debug, Default)]
pub struct ScriptedChangefeedStore {
    partitions: Vec<PartitionDescriptor>,
    pages: Mutex<HashMap<String, Vec<ScriptedPage>>>,
    requests: Mutex<Vec<ChangefeedRequest>>,
    discovery_error: Option<String>,
}

impl ScriptedChangefeedStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_partition(
        mut self,
        descriptor: PartitionDescriptor,
        pages: Vec<ScriptedPage>,
    ) -> Self {
        self.pages.lock().insert(descriptor.id.clone(), pages);
        self.partitions.push(descriptor);
        self
    }

    pub fn with_discovery_error(mut self, message: &str) -> Self {
        self.discovery_error = Some(message.to_string());
        self
    }

    pub fn requests_for(&self, partition_id: &str) -> Vec<ChangefeedRequest> {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.partition_id == partition_id)
            .cloned()
            .collect()
    }

    pub fn fetch_count(&self, partition_id: &str) -> usize {
        self.requests_for(partition_id).len()
    }
}

#[async_trait]
impl ChangefeedStore for ScriptedChangefeedStore {
    type Event = u32;

    async fn list_partitions(
        &self,
        _collection: &str,
    ) -> Result<Vec<PartitionDescriptor>, StoreError> {
        match &self.discovery_error {
            Some(message) => Err(StoreError::unavailable(message.clone())),
            None => Ok(self.partitions.clone()),
        }
    }

    async fn query_changefeed(
        &self,
        _collection: &str,
        request: &ChangefeedRequest,
    ) -> Result<ChangefeedPage<u32>, StoreError> {
        let served = {
            let mut requests = self.requests.lock();
            let served = requests
                .iter()
                .filter(|r| r.partition_id == request.partition_id)
                .count();
            requests.push(request.clone());
            served
        };

        let page = self
            .pages
            .lock()
            .get(&request.partition_id)
            .and_then(|pages| pages.get(served).cloned())
            .ok_or_else(|| {
                StoreError::protocol(format!(
                    "no scripted page {served} for partition {}",
                    request.partition_id
                ))
            })?;

        if let Some(delay) = page.delay {
            tokio::time::sleep(delay).await;
        }

        Ok(ChangefeedPage {
            items: page.items,
            continuation: page.continuation,
            has_more: page.has_more,
        })
    }

    fn store_name(&self) -> &'static str {
        "scripted"
    }
}

/// Connector that refuses every endpoint
#[derive(Debug, Default)]
pub struct UnreachableConnector;

#[async_trait]
impl StoreConnector for UnreachableConnector {
    type Store = ScriptedChangefeedStore;

    async fn connect(
        &self,
        endpoint: &StoreEndpoint,
    ) -> Result<Arc<ScriptedChangefeedStore>, StoreError> {
        Err(StoreError::unavailable(format!(
            "connection refused by {}",
            endpoint.uri
        )))
    }
}

/// Partition covering the whole key space
pub fn full_range(id: &str) -> PartitionDescriptor {
    PartitionDescriptor::new(id, "", "ff")
}
