//! Risk/dependency classification of actions.
//!
//! Maps every action kind onto one of four categories and splits a batch
//! into the per-phase buckets the engine executes.

use tracing::warn;

use crate::ordering::order_constructive;
use crate::types::{Action, ActionCategory, ActionKind, Phase};

/// Category for a kind. Unknown kinds land in `Modification`: neither
/// assumed safe enough to run first nor dangerous enough to run last.
pub fn category_of(kind: &ActionKind) -> ActionCategory {
    match kind {
        ActionKind::UnbanMember | ActionKind::RemoveTimeout => ActionCategory::Recovery,

        ActionKind::CreateCategory
        | ActionKind::CreateRole
        | ActionKind::CreateChannel
        | ActionKind::CreateEvent
        | ActionKind::MoveChannel
        | ActionKind::AssignRole
        | ActionKind::SendMessage => ActionCategory::Constructive,

        ActionKind::RenameChannel
        | ActionKind::RenameRole
        | ActionKind::SetTopic
        | ActionKind::SetNickname
        | ActionKind::SetSlowmode
        | ActionKind::Unknown(_) => ActionCategory::Modification,

        ActionKind::DeleteChannel
        | ActionKind::DeleteCategory
        | ActionKind::DeleteRole
        | ActionKind::RemoveRole
        | ActionKind::KickMember
        | ActionKind::BanMember
        | ActionKind::TimeoutMember => ActionCategory::Destructive,
    }
}

/// Classify a single action. Pure apart from the warning for unknown kinds.
pub fn classify(action: &Action) -> ActionCategory {
    if let ActionKind::Unknown(token) = &action.kind {
        warn!(
            kind = %token,
            index = action.original_index,
            "Unknown action kind, defaulting to modification"
        );
    }
    category_of(&action.kind)
}

/// A batch split into execution buckets.
#[derive(Debug, Clone, Default)]
pub struct PhasePlan {
    pub recovery: Vec<Action>,
    /// Already in dependency order.
    pub constructive: Vec<Action>,
    pub modification: Vec<Action>,
    pub destructive: Vec<Action>,
}

impl PhasePlan {
    /// Bucket `actions` by category. Each bucket keeps `original_index`
    /// order; the constructive bucket is then dependency-ordered.
    pub fn build(actions: &[Action]) -> Self {
        let mut sorted: Vec<&Action> = actions.iter().collect();
        sorted.sort_by_key(|a| a.original_index);

        let mut plan = PhasePlan::default();
        for action in sorted {
            let bucket = match classify(action) {
                ActionCategory::Recovery => &mut plan.recovery,
                ActionCategory::Constructive => &mut plan.constructive,
                ActionCategory::Modification => &mut plan.modification,
                ActionCategory::Destructive => &mut plan.destructive,
            };
            bucket.push(action.clone());
        }
        plan.constructive = order_constructive(plan.constructive);
        plan
    }

    /// The bucket executed in `phase`.
    pub fn actions(&self, phase: Phase) -> &[Action] {
        match phase {
            Phase::Recovery => &self.recovery,
            Phase::Constructive => &self.constructive,
            Phase::Modification => &self.modification,
            Phase::Destructive => &self.destructive,
            Phase::Done => &[],
        }
    }

    pub fn len(&self) -> usize {
        self.recovery.len()
            + self.constructive.len()
            + self.modification.len()
            + self.destructive.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
