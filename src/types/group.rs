//! Duplicate group entity (spec.md §3 "Duplicate group").

use chrono::{DateTime, Utc};

/// A set of files sharing one content hash. Only valid at `count >= 2`;
/// the repository deletes groups that fall below that threshold.
#[derive(Clone, Debug, PartialEq)]
pub struct DuplicateGroup {
    pub id: i64,
    pub hash: String,
    pub count: i64,
    pub total_size: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A hydrated group plus its member file ids (fetched separately; the
/// group owns ids only, per DESIGN.md's "no transitive ownership" rule).
#[derive(Clone, Debug)]
pub struct DuplicateGroupWithMembers {
    pub group: DuplicateGroup,
    pub file_ids: Vec<String>,
}

/// Aggregate statistics surfaced by the duplicate detector (spec.md §4.7).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DuplicateStats {
    pub total_groups: i64,
    pub total_wasted_bytes: u64,
}
