//! Error type for octree construction and flattening.

use thiserror::Error;

/// Failures the octree reports instead of silently truncating.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OctreeError {
  /// `level_count` outside what the packed level field can hold.
  #[error("level count must be in 1..={max}, got {count}")]
  InvalidLevelCount { count: u32, max: u32 },

  /// The flattened hierarchy would need more records than a child index can address.
  #[error("flattened hierarchy exceeds {limit} nodes")]
  HierarchyOverflow { limit: usize },

  /// More payload records than a data index can address.
  #[error("flattened hierarchy holds {items} payloads, limit is {limit}")]
  DataOverflow { items: usize, limit: usize },

  /// A value does not fit its bit field in a packed node record.
  #[error("{field} value {value} does not fit in {bits} bits")]
  FieldOverflow {
    field: &'static str,
    value: u32,
    bits: u32,
  },
}
