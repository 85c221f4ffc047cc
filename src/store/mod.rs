//! # Changefeed Store Boundary
//!
//! Provider-agnostic interface to the remote store that exposes the
//! partitioned change feed. The core only needs two operations:
//!
//! - list the current partitions of a collection
//! - read one page of a partition's change feed from a continuation token
//!
//! Implementations must be safe for concurrent use: one store instance is
//! shared by every partition reader of a run.

pub mod in_memory;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::position::{parse_range_bound, PartitionRange, PositionParseError};

pub use in_memory::InMemoryChangefeedStore;

/// Errors reported by a store implementation
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store unavailable: {message}")]
    Unavailable { message: String },

    #[error("Collection not found: {collection}")]
    CollectionNotFound { collection: String },

    #[error("Partition not found: {partition_id}")]
    PartitionNotFound { partition_id: String },

    #[error("Invalid continuation token '{token}': {message}")]
    InvalidContinuation { token: String, message: String },

    #[error("Request throttled: retry after {retry_after_ms}ms")]
    Throttled { retry_after_ms: u64 },

    #[error("Store protocol error: {message}")]
    Protocol { message: String },
}

impl StoreError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    pub fn collection_not_found(collection: impl Into<String>) -> Self {
        Self::CollectionNotFound {
            collection: collection.into(),
        }
    }

    pub fn partition_not_found(partition_id: impl Into<String>) -> Self {
        Self::PartitionNotFound {
            partition_id: partition_id.into(),
        }
    }

    pub fn invalid_continuation(token: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidContinuation {
            token: token.into(),
            message: message.into(),
        }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }
}

/// Connection details for a store
#[derive(Clone, Serialize, Deserialize)]
pub struct StoreEndpoint {
    pub uri: String,
    pub collection: String,
    #[serde(default, skip_serializing)]
    pub access_key: Option<String>,
}

impl StoreEndpoint {
    pub fn new(uri: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            collection: collection.into(),
            access_key: None,
        }
    }

    pub fn with_access_key(mut self, access_key: impl Into<String>) -> Self {
        self.access_key = Some(access_key.into());
        self
    }
}

impl fmt::Debug for StoreEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreEndpoint")
            .field("uri", &self.uri)
            .field("collection", &self.collection)
            .field(
                "access_key",
                &self.access_key.as_ref().map(|_| "[MASKED]"),
            )
            .finish()
    }
}

/// A partition as reported by the store, with store-native hex range bounds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionDescriptor {
    pub id: String,
    pub range_min_hex: String,
    pub range_max_hex: String,
}

impl PartitionDescriptor {
    pub fn new(
        id: impl Into<String>,
        range_min_hex: impl Into<String>,
        range_max_hex: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            range_min_hex: range_min_hex.into(),
            range_max_hex: range_max_hex.into(),
        }
    }

    /// Parse the native bounds into a [`PartitionRange`]
    pub fn range(&self) -> Result<PartitionRange, PositionParseError> {
        Ok(PartitionRange::new(
            self.id.clone(),
            parse_range_bound(&self.range_min_hex)?,
            parse_range_bound(&self.range_max_hex)?,
        ))
    }
}

/// One page request against a partition's change feed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangefeedRequest {
    pub partition_id: String,
    /// `None` reads from the start of the partition
    pub continuation: Option<String>,
    pub max_item_count: usize,
}

/// One page of a partition's change feed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangefeedPage<E> {
    pub items: Vec<E>,
    /// Token that resumes after the last item of this page
    pub continuation: String,
    pub has_more: bool,
}

/// Read access to a partitioned change feed
#[async_trait]
pub trait ChangefeedStore: Send + Sync + 'static {
    /// Event type carried by the feed
    type Event: Send + 'static;

    /// List the current partitions of a collection
    async fn list_partitions(&self, collection: &str)
        -> Result<Vec<PartitionDescriptor>, StoreError>;

    /// Read up to `request.max_item_count` events after `request.continuation`
    async fn query_changefeed(
        &self,
        collection: &str,
        request: &ChangefeedRequest,
    ) -> Result<ChangefeedPage<Self::Event>, StoreError>;

    /// Provider name for logging
    fn store_name(&self) -> &'static str {
        "changefeed_store"
    }
}

/// Opens a store for an endpoint
#[async_trait]
pub trait StoreConnector: Send + Sync {
    type Store: ChangefeedStore;

    async fn connect(&self, endpoint: &StoreEndpoint) -> Result<Arc<Self::Store>, StoreError>;
}

/// An already open store connects to itself
#[async_trait]
impl<S: ChangefeedStore> StoreConnector for Arc<S> {
    type Store = S;

    async fn connect(&self, _endpoint: &StoreEndpoint) -> Result<Arc<S>, StoreError> {
        Ok(Arc::clone(self))
    }
}
