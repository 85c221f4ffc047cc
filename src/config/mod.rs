//! # Changefeed Configuration
//!
//! Processing configuration for one consumer run, plus the file/environment
//! loader for deployments.
//!
//! ## Usage
//!
//! ```rust
//! use changefeed_core::config::{ChangefeedConfig, StartingPosition};
//!
//! let config = ChangefeedConfig::new()
//!     .with_batch_size(50)
//!     .with_progress_interval_ms(250)
//!     .with_starting_position(StartingPosition::Beginning);
//!
//! assert!(config.validate().is_ok());
//! assert_eq!(config.progress_interval().as_millis(), 250);
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::constants::{
    DEFAULT_BATCH_SIZE, DEFAULT_PROGRESS_CHANNEL_BUFFER_SIZE, DEFAULT_PROGRESS_INTERVAL_MS,
};
use crate::position::{ChangefeedPosition, PartitionPosition};

pub use error::{ConfigResult, ConfigurationError};
pub use loader::{ConfigLoader, ConsumerSettings};

/// Where each partition reader begins
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "position", rename_all = "snake_case")]
pub enum StartingPosition {
    /// Every partition starts from its first event
    #[default]
    Beginning,
    /// Resume from a checkpoint; partitions missing from it start from their first event
    At(ChangefeedPosition),
}

impl StartingPosition {
    /// Prior position of a partition, if the starting checkpoint has one
    pub fn resume_point_for(&self, partition_id: &str) -> Option<&PartitionPosition> {
        match self {
            Self::Beginning => None,
            Self::At(position) => position.find_partition(partition_id),
        }
    }
}

/// Configuration for a single changefeed run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChangefeedConfig {
    /// Maximum number of events requested per page
    pub batch_size: usize,

    /// Wall-clock length of a progress window in milliseconds
    pub progress_interval_ms: u64,

    /// Capacity of the channel between partition pipelines and the aggregator
    pub progress_channel_buffer_size: usize,

    pub starting_position: StartingPosition,

    /// Readers stop once they reach this checkpoint; `None` reads until caught up
    pub stopping_position: Option<ChangefeedPosition>,
}

impl Default for ChangefeedConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            progress_interval_ms: DEFAULT_PROGRESS_INTERVAL_MS,
            progress_channel_buffer_size: DEFAULT_PROGRESS_CHANNEL_BUFFER_SIZE,
            starting_position: StartingPosition::Beginning,
            stopping_position: None,
        }
    }
}

impl ChangefeedConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_progress_interval_ms(mut self, interval_ms: u64) -> Self {
        self.progress_interval_ms = interval_ms;
        self
    }

    pub fn with_progress_interval(self, interval: Duration) -> Self {
        let interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self.with_progress_interval_ms(interval_ms)
    }

    pub fn with_progress_channel_buffer_size(mut self, buffer_size: usize) -> Self {
        self.progress_channel_buffer_size = buffer_size;
        self
    }

    pub fn with_starting_position(mut self, starting_position: StartingPosition) -> Self {
        self.starting_position = starting_position;
        self
    }

    pub fn with_stopping_position(mut self, stopping_position: ChangefeedPosition) -> Self {
        self.stopping_position = Some(stopping_position);
        self
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }

    /// Sequence number a partition's reader stops at, if one is configured
    pub fn stop_point_for(&self, partition_id: &str) -> Option<i64> {
        self.stopping_position
            .as_ref()
            .and_then(|position| position.find_partition(partition_id))
            .map(|position| position.last_sequence_number)
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.batch_size == 0 {
            return Err(ConfigurationError::invalid_value(
                "batch_size",
                "0",
                "batch size must be greater than 0",
            ));
        }

        if self.progress_interval_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "progress_interval_ms",
                "0",
                "progress interval must be greater than 0",
            ));
        }

        if self.progress_channel_buffer_size == 0 {
            return Err(ConfigurationError::invalid_value(
                "progress_channel_buffer_size",
                "0",
                "channel buffer size must be greater than 0",
            ));
        }

        Ok(())
    }
}
