//! Gradebook domain model.
//!
//! # Responsibility
//! - Define canonical data structures used by core business logic.
//! - Keep validation rules next to the records they protect.
//!
//! # Invariants
//! - Every assignment is identified by a stable `AssignmentId`.
//! - Deletion is represented by soft-delete tombstones, not hard delete.
//! - Ungraded scores are an explicit state, never a numeric sentinel.

use once_cell::sync::Lazy;
use regex::Regex;

pub mod assignment;
pub mod gradebook;
pub mod principal;
pub mod score;

/// Maximum accepted length for externally supplied identifiers.
pub(crate) const MAX_UID_CHARS: usize = 64;

static UID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.:-]*$").expect("valid uid regex"));

/// Returns whether an externally supplied identifier (gradebook uid,
/// external assessment id) is well formed.
pub(crate) fn is_well_formed_uid(value: &str) -> bool {
    value.chars().count() <= MAX_UID_CHARS && UID_RE.is_match(value)
}
