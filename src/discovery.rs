//! # Partition Discovery
//!
//! One call to the store listing the current partitions of a collection.
//! There is no caching, retry or split/merge tracking: partitions are
//! discovered once when a run starts and any failure is fatal to the run.

use std::collections::HashSet;

use tracing::{info, instrument};

use crate::error::{ChangefeedError, ChangefeedResult};
use crate::store::{ChangefeedStore, PartitionDescriptor};

/// List and validate the current partitions of `collection`
///
/// The returned list is non-empty, has unique ids and parseable bounds with
/// `min <= max`; anything else is reported as a malformed partition list.
#[instrument(skip(store), fields(store = store.store_name()))]
pub async fn discover_partitions<S: ChangefeedStore>(
    store: &S,
    collection: &str,
) -> ChangefeedResult<Vec<PartitionDescriptor>> {
    let partitions = store
        .list_partitions(collection)
        .await
        .map_err(|source| ChangefeedError::discovery(collection, source))?;

    validate_partitions(collection, &partitions)?;

    info!(
        collection = %collection,
        partition_count = partitions.len(),
        "Discovered partitions"
    );
    Ok(partitions)
}

fn validate_partitions(collection: &str, partitions: &[PartitionDescriptor]) -> ChangefeedResult<()> {
    if partitions.is_empty() {
        return Err(ChangefeedError::malformed_partition_list(
            collection,
            "store returned no partitions",
        ));
    }

    let mut seen = HashSet::with_capacity(partitions.len());
    for partition in partitions {
        if !seen.insert(partition.id.as_str()) {
            return Err(ChangefeedError::malformed_partition_list(
                collection,
                format!("duplicate partition id {}", partition.id),
            ));
        }

        let range = partition.range().map_err(|e| {
            ChangefeedError::malformed_partition_list(
                collection,
                format!("partition {}: {e}", partition.id),
            )
        })?;

        if range.range_min > range.range_max {
            return Err(ChangefeedError::malformed_partition_list(
                collection,
                format!(
                    "partition {} has range_min {} above range_max {}",
                    partition.id, partition.range_min_hex, partition.range_max_hex
                ),
            ));
        }
    }

    Ok(())
}
