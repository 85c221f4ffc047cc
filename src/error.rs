//! Error types for the changefeed consumer.
//!
//! Fatal errors (connection, discovery, progress delivery) end a whole run.
//! Partition-scoped errors (page fetch, malformed position, handler failure)
//! end only the pipeline of the partition they name and are reported in the
//! run summary.

use crate::config::ConfigurationError;
use crate::position::PositionParseError;
use crate::store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChangefeedError {
    #[error("Store connection failed for {endpoint}: {source}")]
    Connection {
        endpoint: String,
        #[source]
        source: StoreError,
    },

    #[error("Partition discovery failed for collection {collection}: {source}")]
    Discovery {
        collection: String,
        #[source]
        source: StoreError,
    },

    #[error("Malformed partition list for collection {collection}: {reason}")]
    MalformedPartitionList { collection: String, reason: String },

    #[error("Page fetch failed for partition {partition_id}: {source}")]
    PageFetch {
        partition_id: String,
        #[source]
        source: StoreError,
    },

    #[error("Malformed position for partition {partition_id}: {source}")]
    MalformedPosition {
        partition_id: String,
        #[source]
        source: PositionParseError,
    },

    #[error("Event handler failed for partition {partition_id}: {source}")]
    Handler {
        partition_id: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Progress handler failed: {source}")]
    ProgressHandler {
        #[source]
        source: anyhow::Error,
    },

    #[error("Progress channel closed while partition {partition_id} was still emitting")]
    ProgressChannelClosed { partition_id: String },

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Pipeline for partition {partition_id} panicked: {message}")]
    TaskPanicked {
        partition_id: String,
        message: String,
    },

    #[error("Task join error: {0}")]
    TaskJoin(String),
}

impl ChangefeedError {
    /// Create a discovery error
    pub fn discovery(collection: impl Into<String>, source: StoreError) -> Self {
        Self::Discovery {
            collection: collection.into(),
            source,
        }
    }

    /// Create a malformed partition list error
    pub fn malformed_partition_list(
        collection: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::MalformedPartitionList {
            collection: collection.into(),
            reason: reason.into(),
        }
    }

    /// Create a page fetch error
    pub fn page_fetch(partition_id: impl Into<String>, source: StoreError) -> Self {
        Self::PageFetch {
            partition_id: partition_id.into(),
            source,
        }
    }

    /// Create a malformed position error
    pub fn malformed_position(partition_id: impl Into<String>, source: PositionParseError) -> Self {
        Self::MalformedPosition {
            partition_id: partition_id.into(),
            source,
        }
    }

    /// Create an event handler error
    pub fn handler(partition_id: impl Into<String>, source: anyhow::Error) -> Self {
        Self::Handler {
            partition_id: partition_id.into(),
            source,
        }
    }

    /// True when the error ends the whole run rather than a single partition
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::Discovery { .. }
                | Self::MalformedPartitionList { .. }
                | Self::ProgressHandler { .. }
                | Self::Configuration(_)
                | Self::TaskJoin(_)
        )
    }

    /// Partition the error is scoped to, if any
    pub fn partition_id(&self) -> Option<&str> {
        match self {
            Self::PageFetch { partition_id, .. }
            | Self::MalformedPosition { partition_id, .. }
            | Self::Handler { partition_id, .. }
            | Self::ProgressChannelClosed { partition_id }
            | Self::TaskPanicked { partition_id, .. } => Some(partition_id),
            _ => None,
        }
    }
}

pub type ChangefeedResult<T> = Result<T, ChangefeedError>;
