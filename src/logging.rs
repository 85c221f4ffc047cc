//! # Structured Logging Module
//!
//! Environment-aware structured logging for consumer runs. Human-readable
//! output in development, JSON lines in production or when
//! `CHANGEFEED_LOG_FORMAT=json`.

use std::sync::OnceLock;

use chrono::Utc;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::constants::env;
use crate::position::ChangefeedPosition;

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let json = use_json_format(&environment);
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(get_log_level(&environment)));

        let json_layer = json.then(|| {
            fmt::layer()
                .json()
                .with_target(true)
                .with_thread_ids(true)
                .with_current_span(true)
        });
        let pretty_layer = (!json).then(|| {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_ansi(true)
        });

        // Another subscriber may already be installed by the host application
        if tracing_subscriber::registry()
            .with(filter)
            .with(json_layer)
            .with(pretty_layer)
            .try_init()
            .is_err()
        {
            tracing::debug!("Global tracing subscriber already initialized - continuing with existing subscriber");
            return;
        }

        tracing::info!(
            pid = std::process::id(),
            environment = %environment,
            json,
            "Structured logging initialized"
        );
    });
}

/// Get current environment from environment variables
fn get_environment() -> String {
    std::env::var(env::ENVIRONMENT)
        .or_else(|_| std::env::var(env::APP_ENVIRONMENT))
        .unwrap_or_else(|_| "development".to_string())
}

/// Get log level based on environment
fn get_log_level(environment: &str) -> &'static str {
    match environment {
        "production" => "info",
        "test" => "warn",
        _ => "debug",
    }
}

fn use_json_format(environment: &str) -> bool {
    match std::env::var(env::LOG_FORMAT) {
        Ok(format) => format.eq_ignore_ascii_case("json"),
        Err(_) => environment == "production",
    }
}

/// Log structured data for partition pipeline operations
pub fn log_partition_operation(
    operation: &str,
    partition_id: &str,
    status: &str,
    last_sequence_number: Option<i64>,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        partition_id = %partition_id,
        status = %status,
        last_sequence_number = last_sequence_number,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "PARTITION_OPERATION"
    );
}

/// Log a checkpoint handed to the progress handler
pub fn log_checkpoint(position: &ChangefeedPosition, outputs: usize) {
    let partitions: Vec<String> = position
        .iter()
        .map(|p| format!("{}@{}", p.partition_id(), p.last_sequence_number))
        .collect();

    tracing::debug!(
        outputs = outputs,
        partition_count = position.len(),
        partitions = %partitions.join(","),
        timestamp = %Utc::now().to_rfc3339(),
        "CHECKPOINT"
    );
}
