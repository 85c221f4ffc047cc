//! # Position Algebra
//!
//! Pure functions over partition ranges and sequence numbers that model a
//! distributed checkpoint.
//!
//! A [`ChangefeedPosition`] maps partition ids to the last processed
//! [`PartitionPosition`] of each partition. A partition with no entry is
//! treated as "start of partition", never as "fully consumed". Entries are
//! unique per partition id: [`merge`] replaces, it never duplicates.
//!
//! ## Succession
//!
//! [`succeeds`] reproduces the checkpoint comparison exactly as it is used
//! by the consumer: `A` succeeds `B` iff there is **no** pair `(x in A, y in B)`
//! where `x`'s range covers `y`'s range and `x` has the larger sequence
//! number. Such a pair disqualifies succession. Disjoint positions therefore
//! succeed each other vacuously. Do not flip this polarity without sign-off
//! from whoever owns checkpoint selection.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::constants::{START_OF_PARTITION, UNBOUNDED_RANGE_MAX, UNBOUNDED_RANGE_MAX_HEX};

/// Failure to parse a store-native range bound or sequence number
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PositionParseError {
    #[error("invalid hexadecimal range bound '{value}'")]
    InvalidRangeBound { value: String },

    #[error("invalid sequence number '{value}'")]
    InvalidSequenceNumber { value: String },
}

/// Contiguous key-hash interval owned by one partition at a point in time
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartitionRange {
    pub partition_id: String,
    pub range_min: i64,
    pub range_max: i64,
}

impl PartitionRange {
    pub fn new(partition_id: impl Into<String>, range_min: i64, range_max: i64) -> Self {
        Self {
            partition_id: partition_id.into(),
            range_min,
            range_max,
        }
    }

    /// True iff this interval fully contains `other`'s interval
    pub fn covers(&self, other: &PartitionRange) -> bool {
        self.range_min <= other.range_min && self.range_max >= other.range_max
    }
}

/// A partition range plus the last processed sequence number in it
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartitionPosition {
    #[serde(flatten)]
    pub range: PartitionRange,
    pub last_sequence_number: i64,
}

impl PartitionPosition {
    pub fn new(range: PartitionRange, last_sequence_number: i64) -> Self {
        Self {
            range,
            last_sequence_number,
        }
    }

    /// Position at the very start of the given range
    pub fn start_of(range: PartitionRange) -> Self {
        Self::new(range, START_OF_PARTITION)
    }

    pub fn partition_id(&self) -> &str {
        &self.range.partition_id
    }

    /// Continuation token that resumes the store's change feed after this position
    pub fn continuation_token(&self) -> String {
        self.last_sequence_number.to_string()
    }
}

/// Checkpoint across all partitions of a collection
///
/// Serialized as a list of [`PartitionPosition`]s. Deserializing a list that
/// repeats a partition id keeps the last entry for that id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<PartitionPosition>", into = "Vec<PartitionPosition>")]
pub struct ChangefeedPosition {
    partitions: BTreeMap<String, PartitionPosition>,
}

impl ChangefeedPosition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }

    /// Number of distinct partitions in the checkpoint
    pub fn len(&self) -> usize {
        self.partitions.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PartitionPosition> {
        self.partitions.values()
    }

    pub fn partition_ids(&self) -> impl Iterator<Item = &str> {
        self.partitions.keys().map(String::as_str)
    }

    pub fn find_partition(&self, partition_id: &str) -> Option<&PartitionPosition> {
        self.partitions.get(partition_id)
    }

    /// New checkpoint equal to `self` with `position` replacing any entry
    /// for the same partition id
    pub fn merge(&self, position: PartitionPosition) -> Self {
        self.clone().merged(position)
    }

    /// Consuming form of [`ChangefeedPosition::merge`]
    pub fn merged(mut self, position: PartitionPosition) -> Self {
        self.partitions
            .insert(position.partition_id().to_string(), position);
        self
    }

    pub fn succeeds(&self, other: &ChangefeedPosition) -> bool {
        !self.iter().any(|x| {
            other
                .iter()
                .any(|y| x.range.covers(&y.range) && x.last_sequence_number > y.last_sequence_number)
        })
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

impl From<Vec<PartitionPosition>> for ChangefeedPosition {
    fn from(positions: Vec<PartitionPosition>) -> Self {
        positions.into_iter().collect()
    }
}

impl From<ChangefeedPosition> for Vec<PartitionPosition> {
    fn from(position: ChangefeedPosition) -> Self {
        position.partitions.into_values().collect()
    }
}

impl FromIterator<PartitionPosition> for ChangefeedPosition {
    fn from_iter<I: IntoIterator<Item = PartitionPosition>>(iter: I) -> Self {
        iter.into_iter()
            .fold(ChangefeedPosition::new(), ChangefeedPosition::merged)
    }
}

pub fn range_covers(x: &PartitionRange, y: &PartitionRange) -> bool {
    x.covers(y)
}

/// Parse a store-native hexadecimal range bound
///
/// `""` is the lowest bound (0) and `"ff"` encodes "no upper bound"
/// ([`UNBOUNDED_RANGE_MAX`]).
pub fn parse_range_bound(hex: &str) -> Result<i64, PositionParseError> {
    if hex.is_empty() {
        return Ok(0);
    }
    if hex.eq_ignore_ascii_case(UNBOUNDED_RANGE_MAX_HEX) {
        return Ok(UNBOUNDED_RANGE_MAX);
    }
    if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(PositionParseError::InvalidRangeBound {
            value: hex.to_string(),
        });
    }
    i64::from_str_radix(hex, 16).map_err(|_| PositionParseError::InvalidRangeBound {
        value: hex.to_string(),
    })
}

/// Parse a decimal sequence number, accepting the quoted ETag form (`"42"`)
pub fn parse_sequence_number(value: &str) -> Result<i64, PositionParseError> {
    let unquoted = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value);
    if unquoted.is_empty() || !unquoted.bytes().all(|b| b.is_ascii_digit()) {
        return Err(PositionParseError::InvalidSequenceNumber {
            value: value.to_string(),
        });
    }
    unquoted
        .parse::<i64>()
        .map_err(|_| PositionParseError::InvalidSequenceNumber {
            value: value.to_string(),
        })
}

/// [`parse_range_bound`] that falls back to 0 on unparsable input
pub fn parse_range_bound_lossy(hex: &str) -> i64 {
    parse_range_bound(hex).unwrap_or_else(|error| {
        warn!(%error, "Falling back to range bound 0");
        0
    })
}

/// [`parse_sequence_number`] that falls back to 0 on unparsable input
pub fn parse_sequence_number_lossy(value: &str) -> i64 {
    parse_sequence_number(value).unwrap_or_else(|error| {
        warn!(%error, "Falling back to sequence number 0");
        START_OF_PARTITION
    })
}

pub fn succeeds(a: &ChangefeedPosition, b: &ChangefeedPosition) -> bool {
    a.succeeds(b)
}

/// `a` if it succeeds `b`, else `b` if it succeeds `a`, else `None`
pub fn pick_latest<'a>(
    a: &'a ChangefeedPosition,
    b: &'a ChangefeedPosition,
) -> Option<&'a ChangefeedPosition> {
    if a.succeeds(b) {
        Some(a)
    } else if b.succeeds(a) {
        Some(b)
    } else {
        None
    }
}

pub fn find_partition<'a>(
    partition_id: &str,
    position: &'a ChangefeedPosition,
) -> Option<&'a PartitionPosition> {
    position.find_partition(partition_id)
}

pub fn merge(position: &ChangefeedPosition, partition: PartitionPosition) -> ChangefeedPosition {
    position.merge(partition)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(id: &str, min: i64, max: i64, lsn: i64) -> PartitionPosition {
        PartitionPosition::new(PartitionRange::new(id, min, max), lsn)
    }

    fn checkpoint(entries: &[PartitionPosition]) -> ChangefeedPosition {
        entries.iter().cloned().collect()
    }

    #[test]
    fn test_range_covers() {
        let wide = PartitionRange::new("p0", 0, 100);
        let narrow = PartitionRange::new("p1", 10, 20);

        assert!(range_covers(&wide, &narrow));
        assert!(!range_covers(&narrow, &wide));
        assert!(range_covers(&wide, &wide));
    }

    #[test]
    fn test_parse_range_bound() {
        assert_eq!(parse_range_bound("ff"), Ok(i64::MAX));
        assert_eq!(parse_range_bound("FF"), Ok(i64::MAX));
        assert_eq!(parse_range_bound(""), Ok(0));
        assert_eq!(parse_range_bound("0a"), Ok(10));
        assert_eq!(parse_range_bound("05C1DFFFFFFFFC"), Ok(0x05C1_DFFF_FFFF_FC));
        assert!(parse_range_bound("zz").is_err());
        assert!(parse_range_bound("-1").is_err());
        assert!(parse_range_bound("FFFFFFFFFFFFFFFFFF").is_err());
    }

    #[test]
    fn test_parse_sequence_number() {
        assert_eq!(parse_sequence_number("42"), Ok(42));
        assert_eq!(parse_sequence_number("\"42\""), Ok(42));
        assert!(parse_sequence_number("bad").is_err());
        assert!(parse_sequence_number("").is_err());
        assert!(parse_sequence_number("-3").is_err());
    }

    #[test]
    fn test_lossy_parsers_fall_back_to_zero() {
        assert_eq!(parse_sequence_number_lossy("bad"), 0);
        assert_eq!(parse_sequence_number_lossy("42"), 42);
        assert_eq!(parse_range_bound_lossy("not-hex"), 0);
        assert_eq!(parse_range_bound_lossy("ff"), i64::MAX);
    }

    #[test]
    fn test_merge_replaces_existing_entry() {
        let base = checkpoint(&[pos("p1", 0, 10, 3), pos("p2", 11, 20, 7)]);
        let merged = merge(&base, pos("p1", 0, 10, 9));

        assert_eq!(merged.len(), 2);
        assert_eq!(
            find_partition("p1", &merged).map(|p| p.last_sequence_number),
            Some(9)
        );
        // the input checkpoint is left untouched
        assert_eq!(base.find_partition("p1").map(|p| p.last_sequence_number), Some(3));
    }

    #[test]
    fn test_find_partition_missing() {
        let position = checkpoint(&[pos("p1", 0, 10, 3)]);
        assert!(find_partition("p9", &position).is_none());
    }

    #[test]
    fn test_succeeds_polarity() {
        let ahead = checkpoint(&[pos("p1", 0, 10, 9)]);
        let behind = checkpoint(&[pos("p1", 0, 10, 3)]);

        // a covering pair with a larger sequence number disqualifies succession
        assert!(!succeeds(&ahead, &behind));
        assert!(succeeds(&behind, &ahead));
        assert_eq!(pick_latest(&ahead, &behind), Some(&behind));
    }

    #[test]
    fn test_pick_latest_disjoint_positions_succeed_vacuously() {
        let left = checkpoint(&[pos("p1", 0, 10, 4)]);
        let right = checkpoint(&[pos("p2", 11, 20, 8)]);

        assert!(succeeds(&left, &right));
        assert!(succeeds(&right, &left));
        assert_eq!(pick_latest(&left, &right), Some(&left));
    }

    #[test]
    fn test_pick_latest_incomparable() {
        let a = checkpoint(&[pos("p1", 0, 10, 5), pos("p2", 11, 20, 1)]);
        let b = checkpoint(&[pos("p1", 0, 10, 3), pos("p2", 11, 20, 4)]);

        assert!(!succeeds(&a, &b));
        assert!(!succeeds(&b, &a));
        assert_eq!(pick_latest(&a, &b), None);
    }

    #[test]
    fn test_json_checkpoint_is_a_list() {
        let position = checkpoint(&[pos("p1", 0, i64::MAX, 8)]);
        let json = position.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert!(value.is_array());
        assert_eq!(value[0]["partition_id"], "p1");
        assert_eq!(value[0]["last_sequence_number"], 8);
        assert_eq!(ChangefeedPosition::from_json(&json).unwrap(), position);
    }

    #[test]
    fn test_json_duplicates_keep_last_entry() {
        let json = r#"[
            {"partition_id": "p1", "range_min": 0, "range_max": 10, "last_sequence_number": 2},
            {"partition_id": "p1", "range_min": 0, "range_max": 10, "last_sequence_number": 6}
        ]"#;
        let position = ChangefeedPosition::from_json(json).unwrap();

        assert_eq!(position.len(), 1);
        assert_eq!(
            position.find_partition("p1").map(|p| p.last_sequence_number),
            Some(6)
        );
    }
}
