//! Dependency ordering for constructive actions.
//!
//! The translator upstream cannot be trusted to emit a container before the
//! things placed inside it, so constructive actions are re-sorted by a fixed
//! rank table.

use crate::types::{Action, ActionKind};

/// Rank assigned to kinds missing from the table. Sorts after every ranked kind.
pub const UNRANKED: u8 = u8::MAX;

/// Position of a constructive kind in the dependency chain.
pub fn dependency_rank(kind: &ActionKind) -> u8 {
    match kind {
        ActionKind::CreateCategory => 0,
        ActionKind::CreateRole => 1,
        ActionKind::CreateChannel => 2,
        ActionKind::CreateEvent => 3,
        ActionKind::MoveChannel => 4,
        ActionKind::AssignRole => 5,
        ActionKind::SendMessage => 6,
        _ => UNRANKED,
    }
}

/// Stable sort by `(rank, original_index)`.
pub fn order_constructive(mut actions: Vec<Action>) -> Vec<Action> {
    actions.sort_by_key(|a| (dependency_rank(&a.kind), a.original_index));
    actions
}
