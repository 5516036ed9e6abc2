//! Correlation identifiers.
//!
//! The controller never cancels a scheduled timer. Instead it rotates the
//! relevant id in [`crate::role::ControllerState`] so that when the stale
//! timer message eventually arrives, the handler compares it against the
//! live id and drops it. See spec.md §5 "Cancellation semantics".

use uuid::Uuid;

/// A correlation id. Generation is monotonic in the sense that every call to
/// [`new_id`] returns a value that has never been returned before (invariant
/// 5 in the data model: "Correlation ids are globally unique").
pub type Id = Uuid;

/// Generates a fresh, globally unique correlation id.
pub fn new_id() -> Id {
    Uuid::new_v4()
}
