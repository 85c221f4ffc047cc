#![allow(clippy::doc_markdown)] // Allow technical terms like ChangefeedPosition, LSN in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Changefeed Core
//!
//! Concurrent consumer for ordered, partitioned, append-only change feeds.
//!
//! ## Overview
//!
//! A run discovers the partitions of a collection, reads every partition
//! concurrently through its continuation-token paging API, passes each event
//! through a user event handler and reports the handler outputs on a fixed
//! wall-clock cadence together with a resumable checkpoint.
//!
//! ## Architecture
//!
//! ```text
//! discovery -> PartitionReader (one per partition) -> EventHandler
//!           -> bounded channel -> ProgressAggregator -> ProgressHandler
//! ```
//!
//! The checkpoint ([`ChangefeedPosition`]) maps every partition to the last
//! sequence number whose events were handled. It is owned by the aggregator
//! task alone and handed to the progress handler by value; persisting it is
//! the caller's job.
//!
//! ## Module Organization
//!
//! - [`position`] - Range and checkpoint algebra
//! - [`store`] - Store boundary traits and an in-memory store
//! - [`discovery`] - Partition discovery
//! - [`reader`] - Per-partition paging reader with stopping policy
//! - [`aggregator`] - Windowed progress aggregation
//! - [`processor`] - Run orchestration
//! - [`config`] - Run configuration and layered loading
//! - [`error`] - Structured error handling
//! - [`logging`] - Structured logging setup
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use changefeed_core::{ChangefeedConfig, ChangefeedPosition, InMemoryChangefeedStore, StoreEndpoint};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = InMemoryChangefeedStore::<String>::new();
//! store.add_partition("orders", "0", "", "ff");
//! store.append("orders", "0", ["created".to_string(), "paid".to_string()])?;
//!
//! let summary = changefeed_core::run(
//!     &Arc::new(store),
//!     &StoreEndpoint::new("memory://local", "orders"),
//!     ChangefeedConfig::new().with_batch_size(50),
//!     |event: String| async move { Ok::<_, anyhow::Error>(event.len()) },
//!     |outputs: Vec<usize>, position: ChangefeedPosition| async move {
//!         println!("{} outputs, checkpoint {}", outputs.len(), position.to_json()?);
//!         Ok::<_, anyhow::Error>(())
//!     },
//! )
//! .await?;
//!
//! assert!(summary.is_complete());
//! # Ok(())
//! # }
//! ```
//!
//! ## Testing
//!
//! ```bash
//! cargo test --lib    # Unit tests
//! cargo test          # Unit, scenario and property tests
//! ```

pub mod aggregator;
pub mod config;
pub mod constants;
pub mod discovery;
pub mod error;
pub mod handler;
pub mod logging;
pub mod position;
pub mod processor;
pub mod reader;
pub mod stats;
pub mod store;

pub use aggregator::ProgressAggregator;
pub use config::{ChangefeedConfig, ConfigLoader, ConfigurationError, ConsumerSettings, StartingPosition};
pub use discovery::discover_partitions;
pub use error::{ChangefeedError, ChangefeedResult};
pub use handler::{EventHandler, ProgressHandler};
pub use logging::init_structured_logging;
pub use position::{
    pick_latest, range_covers, succeeds, ChangefeedPosition, PartitionPosition, PartitionRange,
    PositionParseError,
};
pub use processor::{run, ChangefeedProcessor, PartitionProgress, PartitionReport, RunSummary};
pub use reader::{PartitionBatch, PartitionReader};
pub use stats::{ProcessorStats, ProcessorStatsSnapshot};
pub use store::{
    ChangefeedPage, ChangefeedRequest, ChangefeedStore, InMemoryChangefeedStore,
    PartitionDescriptor, StoreConnector, StoreEndpoint, StoreError,
};
