use proptest::prelude::*;

use changefeed_core::position::{ChangefeedPosition, PartitionPosition, PartitionRange};

/// Strategy for partition ids drawn from a small pool so positions collide
pub fn partition_id_strategy() -> impl Strategy<Value = String> {
    (0u8..8).prop_map(|n| format!("p{n}"))
}

/// Strategy for ranges with `min <= max`
pub fn partition_range_strategy() -> impl Strategy<Value = PartitionRange> {
    (partition_id_strategy(), 0i64..=i64::MAX, 0i64..=i64::MAX).prop_map(|(id, a, b)| {
        PartitionRange::new(id, a.min(b), a.max(b))
    })
}

/// Strategy for ranges with small bounds so containment is common
pub fn narrow_range_strategy() -> impl Strategy<Value = PartitionRange> {
    (partition_id_strategy(), 0i64..64, 0i64..64)
        .prop_map(|(id, a, b)| PartitionRange::new(id, a.min(b), a.max(b)))
}

pub fn partition_position_strategy() -> impl Strategy<Value = PartitionPosition> {
    (narrow_range_strategy(), 0i64..10_000)
        .prop_map(|(range, lsn)| PartitionPosition::new(range, lsn))
}

pub fn changefeed_position_strategy() -> impl Strategy<Value = ChangefeedPosition> {
    prop::collection::vec(partition_position_strategy(), 0..8)
        .prop_map(|positions| positions.into_iter().collect())
}
