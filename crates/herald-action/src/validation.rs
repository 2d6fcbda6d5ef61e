//! Pre- and post-execution checks against live platform state.
//!
//! Pre-checks confirm that the resources an action refers to exist.
//! Post-checks confirm that creations now exist and deletions are gone, so
//! an executor that reports success without effect is still caught.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use herald_core::config::ValidationConfig;
use herald_core::types::TenantId;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::ActionError;
use crate::pacing::pause;
use crate::types::{Action, ActionKind};

/// Resource families the platform can be asked about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Category,
    Channel,
    Role,
    Event,
    Member,
    Ban,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Category => write!(f, "category"),
            ResourceKind::Channel => write!(f, "channel"),
            ResourceKind::Role => write!(f, "role"),
            ResourceKind::Event => write!(f, "event"),
            ResourceKind::Member => write!(f, "member"),
            ResourceKind::Ban => write!(f, "ban"),
        }
    }
}

/// Read access to the platform, used only for validation.
#[async_trait]
pub trait PlatformState: Send + Sync {
    async fn exists(
        &self,
        tenant: &TenantId,
        kind: ResourceKind,
        name: &str,
    ) -> Result<bool, ActionError>;
}

/// One fact about platform state a check expects to hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expectation {
    pub resource: ResourceKind,
    pub name: String,
    pub present: bool,
}

impl Expectation {
    fn present(resource: ResourceKind, name: &str) -> Self {
        Self {
            resource,
            name: name.to_string(),
            present: true,
        }
    }

    fn absent(resource: ResourceKind, name: &str) -> Self {
        Self {
            resource,
            name: name.to_string(),
            present: false,
        }
    }
}

impl fmt::Display for Expectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.present {
            write!(f, "{} \"{}\" does not exist", self.resource, self.name)
        } else {
            write!(f, "{} \"{}\" still exists", self.resource, self.name)
        }
    }
}

/// What must hold before `action` runs.
///
/// Missing arguments produce no expectation; the executor rejects those.
pub fn preconditions(action: &Action) -> Vec<Expectation> {
    use ResourceKind::*;

    let target = action.target();
    let container = action.container();
    let mut out = Vec::new();
    let mut need = |resource, name: Option<&str>| {
        if let Some(name) = name {
            out.push(Expectation::present(resource, name));
        }
    };

    match &action.kind {
        ActionKind::CreateChannel => need(Category, container),
        ActionKind::MoveChannel => {
            need(Channel, target);
            need(Category, container);
        }
        ActionKind::AssignRole | ActionKind::RemoveRole => {
            need(Role, target);
            need(Member, container);
        }
        ActionKind::SendMessage
        | ActionKind::RenameChannel
        | ActionKind::SetTopic
        | ActionKind::SetSlowmode
        | ActionKind::DeleteChannel => need(Channel, target),
        ActionKind::RenameRole | ActionKind::DeleteRole => need(Role, target),
        ActionKind::DeleteCategory => need(Category, target),
        ActionKind::SetNickname
        | ActionKind::RemoveTimeout
        | ActionKind::KickMember
        | ActionKind::BanMember
        | ActionKind::TimeoutMember => need(Member, target),
        ActionKind::UnbanMember => need(Ban, target),
        ActionKind::CreateCategory
        | ActionKind::CreateRole
        | ActionKind::CreateEvent
        | ActionKind::Unknown(_) => {}
    }
    out
}

/// What must hold after `action` reported success.
pub fn postconditions(action: &Action) -> Vec<Expectation> {
    use ResourceKind::*;

    let target = action.target();
    // Renames carry the new name as their second argument.
    let renamed = action.container();

    let (resource, name, present) = match &action.kind {
        ActionKind::CreateCategory => (Category, target, true),
        ActionKind::CreateRole => (Role, target, true),
        ActionKind::CreateChannel => (Channel, target, true),
        ActionKind::CreateEvent => (Event, target, true),
        ActionKind::RenameChannel => (Channel, renamed, true),
        ActionKind::RenameRole => (Role, renamed, true),
        ActionKind::DeleteChannel => (Channel, target, false),
        ActionKind::DeleteCategory => (Category, target, false),
        ActionKind::DeleteRole => (Role, target, false),
        ActionKind::KickMember => (Member, target, false),
        ActionKind::BanMember => (Ban, target, true),
        ActionKind::UnbanMember => (Ban, target, false),
        _ => return Vec::new(),
    };

    match name {
        Some(name) if present => vec![Expectation::present(resource, name)],
        Some(name) => vec![Expectation::absent(resource, name)],
        None => Vec::new(),
    }
}

/// Runs pre/post checks after a short settle wait.
pub struct ValidationGate {
    state: Arc<dyn PlatformState>,
    settle_delay: Duration,
}

impl ValidationGate {
    pub fn new(state: Arc<dyn PlatformState>, config: &ValidationConfig) -> Self {
        Self {
            state,
            settle_delay: config.settle_delay(),
        }
    }

    pub async fn pre_check(
        &self,
        tenant: &TenantId,
        action: &Action,
        cancel: &CancellationToken,
    ) -> Result<(), ActionError> {
        let expectations = preconditions(action);
        match self.first_violation(tenant, &expectations, cancel).await? {
            None => Ok(()),
            Some(violated) => {
                warn!(tenant = %tenant, kind = %action.kind, "Precondition failed: {}", violated);
                Err(ActionError::PreconditionFailed(violated.to_string()))
            }
        }
    }

    pub async fn post_check(
        &self,
        tenant: &TenantId,
        action: &Action,
        cancel: &CancellationToken,
    ) -> Result<(), ActionError> {
        let expectations = postconditions(action);
        match self.first_violation(tenant, &expectations, cancel).await? {
            None => Ok(()),
            Some(violated) => {
                warn!(tenant = %tenant, kind = %action.kind, "Postcondition failed: {}", violated);
                Err(ActionError::PostconditionFailed(violated.to_string()))
            }
        }
    }

    async fn first_violation<'a>(
        &self,
        tenant: &TenantId,
        expectations: &'a [Expectation],
        cancel: &CancellationToken,
    ) -> Result<Option<&'a Expectation>, ActionError> {
        if expectations.is_empty() {
            return Ok(None);
        }
        if !pause(self.settle_delay, cancel).await {
            return Err(ActionError::Cancelled);
        }
        for expectation in expectations {
            let exists = self
                .state
                .exists(tenant, expectation.resource, &expectation.name)
                .await?;
            debug!(
                resource = %expectation.resource,
                name = %expectation.name,
                exists,
                "Validation read"
            );
            if exists != expectation.present {
                return Ok(Some(expectation));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use tokio::time::Instant;

    #[derive(Default)]
    struct FixedState {
        present: Mutex<HashSet<(ResourceKind, String)>>,
    }

    impl FixedState {
        fn with(items: &[(ResourceKind, &str)]) -> Arc<Self> {
            let state = FixedState::default();
            {
                let mut present = state.present.lock().unwrap();
                for (kind, name) in items {
                    present.insert((*kind, name.to_string()));
                }
            }
            Arc::new(state)
        }
    }

    #[async_trait]
    impl PlatformState for FixedState {
        async fn exists(
            &self,
            _tenant: &TenantId,
            kind: ResourceKind,
            name: &str,
        ) -> Result<bool, ActionError> {
            Ok(self.present.lock().unwrap().contains(&(kind, name.to_string())))
        }
    }

    fn gate(state: Arc<FixedState>) -> ValidationGate {
        ValidationGate::new(state, &ValidationConfig::default())
    }

    fn tenant() -> TenantId {
        TenantId::new("guild-1")
    }

    #[test]
    fn test_channel_in_category_requires_category() {
        let action = Action::parse(0, r#"create_channel "general" in "Lobby""#);
        assert_eq!(
            preconditions(&action),
            vec![Expectation::present(ResourceKind::Category, "Lobby")]
        );
        assert_eq!(
            postconditions(&action),
            vec![Expectation::present(ResourceKind::Channel, "general")]
        );
    }

    #[test]
    fn test_deletion_expects_absence() {
        let action = Action::parse(0, "delete_role Muted");
        assert_eq!(
            postconditions(&action),
            vec![Expectation::absent(ResourceKind::Role, "Muted")]
        );
    }

    #[test]
    fn test_missing_arguments_produce_no_expectations() {
        let action = Action::parse(0, "delete_channel");
        assert!(preconditions(&action).is_empty());
        assert!(postconditions(&action).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_pre_check_fails_for_missing_dependency() {
        let gate = gate(FixedState::with(&[]));
        let action = Action::parse(0, r#"create_channel "general" in "Lobby""#);
        let err = gate
            .pre_check(&tenant(), &action, &CancellationToken::new())
            .await
            .unwrap_err();
        match err {
            ActionError::PreconditionFailed(msg) => {
                assert_eq!(msg, "category \"Lobby\" does not exist")
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_pre_check_waits_settle_delay() {
        let gate = gate(FixedState::with(&[(ResourceKind::Channel, "general")]));
        let action = Action::parse(0, r#"set_topic general "hi""#);
        let start = Instant::now();
        gate.pre_check(&tenant(), &action, &CancellationToken::new())
            .await
            .unwrap();
        assert!(start.elapsed() >= Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_nothing_to_check_skips_wait() {
        let gate = gate(FixedState::with(&[]));
        let action = Action::parse(0, "create_role Mods");
        let start = Instant::now();
        gate.pre_check(&tenant(), &action, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_post_check_catches_ghost_deletion() {
        let gate = gate(FixedState::with(&[(ResourceKind::Channel, "old")]));
        let action = Action::parse(0, "delete_channel old");
        let err = gate
            .post_check(&tenant(), &action, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ActionError::PostconditionFailed(_)));
        assert!(!err.is_transient());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_during_settle() {
        let gate = gate(FixedState::with(&[]));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let action = Action::parse(0, "delete_channel old");
        let err = gate.post_check(&tenant(), &action, &cancel).await.unwrap_err();
        assert!(matches!(err, ActionError::Cancelled));
    }
}
