//! # Changefeed Constants
//!
//! Defaults, sentinels and environment variable names shared across the crate.

/// Lowest sequence number of a partition: "start of partition"
pub const START_OF_PARTITION: i64 = 0;

/// Range bound reserved for the unbounded (last) partition range
pub const UNBOUNDED_RANGE_MAX: i64 = i64::MAX;

/// Store-native encoding of the unbounded upper range bound
pub const UNBOUNDED_RANGE_MAX_HEX: &str = "ff";

/// Default number of events requested per page
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Default wall-clock length of a progress window
pub const DEFAULT_PROGRESS_INTERVAL_MS: u64 = 1_000;

/// Default capacity of the handler-to-aggregator channel
pub const DEFAULT_PROGRESS_CHANNEL_BUFFER_SIZE: usize = 1_024;

/// Environment variable names
pub mod env {
    /// Deployment environment (development, test, production)
    pub const ENVIRONMENT: &str = "CHANGEFEED_ENV";

    /// Generic fallback for the deployment environment
    pub const APP_ENVIRONMENT: &str = "APP_ENV";

    /// Log output format (`json` or `pretty`)
    pub const LOG_FORMAT: &str = "CHANGEFEED_LOG_FORMAT";

    /// Directory holding `changefeed.toml` and its environment overrides
    pub const CONFIG_DIR: &str = "CHANGEFEED_CONFIG_DIR";

    /// Prefix for configuration overrides, e.g. `CHANGEFEED__PROCESSOR__BATCH_SIZE`
    pub const CONFIG_PREFIX: &str = "CHANGEFEED";
}
