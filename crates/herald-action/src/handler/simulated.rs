//! In-memory community platform for dry runs and tests.
//!
//! Implements an executor for every known action kind plus the
//! [`PlatformState`] reads used by validation. Faults can be queued per
//! kind to exercise retry, ghost successes and permanent rejections.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use herald_core::types::TenantId;
use tracing::debug;

use super::{ActionHandler, ActionRegistry};
use crate::error::ActionError;
use crate::types::{Action, ActionKind, ActionResult};
use crate::validation::{PlatformState, ResourceKind};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelState {
    pub category: Option<String>,
    pub topic: Option<String>,
    pub slowmode_secs: u64,
    pub messages: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemberState {
    pub roles: BTreeSet<String>,
    pub nickname: Option<String>,
    pub timed_out: bool,
}

/// State of one simulated community.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GuildState {
    pub categories: BTreeSet<String>,
    pub channels: BTreeMap<String, ChannelState>,
    pub roles: BTreeSet<String>,
    pub events: BTreeSet<String>,
    pub members: BTreeMap<String, MemberState>,
    pub bans: BTreeSet<String>,
}

impl GuildState {
    pub fn with_members<'a>(mut self, names: impl IntoIterator<Item = &'a str>) -> Self {
        for name in names {
            self.members.insert(name.to_string(), MemberState::default());
        }
        self
    }

    pub fn with_channel(mut self, name: &str) -> Self {
        self.channels.insert(name.to_string(), ChannelState::default());
        self
    }

    pub fn with_category(mut self, name: &str) -> Self {
        self.categories.insert(name.to_string());
        self
    }

    pub fn with_role(mut self, name: &str) -> Self {
        self.roles.insert(name.to_string());
        self
    }

    pub fn with_ban(mut self, name: &str) -> Self {
        self.bans.insert(name.to_string());
        self
    }

    fn exists(&self, kind: ResourceKind, name: &str) -> bool {
        match kind {
            ResourceKind::Category => self.categories.contains(name),
            ResourceKind::Channel => self.channels.contains_key(name),
            ResourceKind::Role => self.roles.contains(name),
            ResourceKind::Event => self.events.contains(name),
            ResourceKind::Member => self.members.contains_key(name),
            ResourceKind::Ban => self.bans.contains(name),
        }
    }

    fn channel_mut(&mut self, name: &str) -> Result<&mut ChannelState, ActionError> {
        self.channels
            .get_mut(name)
            .ok_or_else(|| ActionError::Reported(format!("Unknown Channel: {}", name)))
    }

    fn member_mut(&mut self, name: &str) -> Result<&mut MemberState, ActionError> {
        self.members
            .get_mut(name)
            .ok_or_else(|| ActionError::Reported(format!("Unknown Member: {}", name)))
    }

    fn require_category(&self, name: &str) -> Result<(), ActionError> {
        if self.categories.contains(name) {
            Ok(())
        } else {
            Err(ActionError::Reported(format!("Unknown Category: {}", name)))
        }
    }

    fn require_role(&self, name: &str) -> Result<(), ActionError> {
        if self.roles.contains(name) {
            Ok(())
        } else {
            Err(ActionError::Reported(format!("Unknown Role: {}", name)))
        }
    }

    /// Apply one action, returning the executor's success message.
    fn apply(&mut self, action: &Action) -> Result<String, ActionError> {
        match &action.kind {
            ActionKind::UnbanMember => {
                let user = arg(action, 0, "user")?;
                if !self.bans.remove(user) {
                    return Err(ActionError::Reported(format!("Unknown Ban: {}", user)));
                }
                Ok(format!("Unbanned {}", user))
            }
            ActionKind::RemoveTimeout => {
                let member = arg(action, 0, "member")?;
                self.member_mut(member)?.timed_out = false;
                Ok(format!("Removed timeout from {}", member))
            }
            ActionKind::CreateCategory => {
                let name = arg(action, 0, "category name")?;
                self.categories.insert(name.to_string());
                Ok(format!("Created category {}", name))
            }
            ActionKind::CreateRole => {
                let name = arg(action, 0, "role name")?;
                self.roles.insert(name.to_string());
                Ok(format!("Created role {}", name))
            }
            ActionKind::CreateChannel => {
                let name = arg(action, 0, "channel name")?;
                let category = action.container();
                if let Some(category) = category {
                    self.require_category(category)?;
                }
                let channel = self.channels.entry(name.to_string()).or_default();
                channel.category = category.map(str::to_string);
                Ok(format!("Created channel {}", name))
            }
            ActionKind::CreateEvent => {
                let name = arg(action, 0, "event name")?;
                self.events.insert(name.to_string());
                Ok(format!("Scheduled event {}", name))
            }
            ActionKind::MoveChannel => {
                let name = arg(action, 0, "channel")?;
                let category = arg(action, 1, "category")?;
                self.require_category(category)?;
                self.channel_mut(name)?.category = Some(category.to_string());
                Ok(format!("Moved {} into {}", name, category))
            }
            ActionKind::AssignRole => {
                let role = arg(action, 0, "role")?;
                let member = arg(action, 1, "member")?;
                self.require_role(role)?;
                self.member_mut(member)?.roles.insert(role.to_string());
                Ok(format!("Gave {} to {}", role, member))
            }
            ActionKind::SendMessage => {
                let channel = arg(action, 0, "channel")?;
                let text = arg(action, 1, "message text")?;
                self.channel_mut(channel)?.messages.push(text.to_string());
                Ok(format!("Posted in {}", channel))
            }
            ActionKind::RenameChannel => {
                let old = arg(action, 0, "channel")?;
                let new = arg(action, 1, "new name")?;
                let channel = self
                    .channels
                    .remove(old)
                    .ok_or_else(|| ActionError::Reported(format!("Unknown Channel: {}", old)))?;
                self.channels.insert(new.to_string(), channel);
                Ok(format!("Renamed {} to {}", old, new))
            }
            ActionKind::RenameRole => {
                let old = arg(action, 0, "role")?;
                let new = arg(action, 1, "new name")?;
                if !self.roles.remove(old) {
                    return Err(ActionError::Reported(format!("Unknown Role: {}", old)));
                }
                self.roles.insert(new.to_string());
                for member in self.members.values_mut() {
                    if member.roles.remove(old) {
                        member.roles.insert(new.to_string());
                    }
                }
                Ok(format!("Renamed role {} to {}", old, new))
            }
            ActionKind::SetTopic => {
                let channel = arg(action, 0, "channel")?;
                let topic = arg(action, 1, "topic")?;
                self.channel_mut(channel)?.topic = Some(topic.to_string());
                Ok(format!("Set topic of {}", channel))
            }
            ActionKind::SetNickname => {
                let member = arg(action, 0, "member")?;
                let nickname = arg(action, 1, "nickname")?;
                self.member_mut(member)?.nickname = Some(nickname.to_string());
                Ok(format!("Nicknamed {} as {}", member, nickname))
            }
            ActionKind::SetSlowmode => {
                let channel = arg(action, 0, "channel")?;
                let raw = arg(action, 1, "seconds")?;
                let secs: u64 = raw
                    .trim_end_matches('s')
                    .parse()
                    .map_err(|_| ActionError::InvalidPayload(format!("bad slowmode: {}", raw)))?;
                self.channel_mut(channel)?.slowmode_secs = secs;
                Ok(format!("Slowmode {}s in {}", secs, channel))
            }
            ActionKind::DeleteChannel => {
                let name = arg(action, 0, "channel")?;
                if self.channels.remove(name).is_none() {
                    return Err(ActionError::Reported(format!("Unknown Channel: {}", name)));
                }
                Ok(format!("Deleted channel {}", name))
            }
            ActionKind::DeleteCategory => {
                let name = arg(action, 0, "category")?;
                if !self.categories.remove(name) {
                    return Err(ActionError::Reported(format!("Unknown Category: {}", name)));
                }
                for channel in self.channels.values_mut() {
                    if channel.category.as_deref() == Some(name) {
                        channel.category = None;
                    }
                }
                Ok(format!("Deleted category {}", name))
            }
            ActionKind::DeleteRole => {
                let name = arg(action, 0, "role")?;
                if !self.roles.remove(name) {
                    return Err(ActionError::Reported(format!("Unknown Role: {}", name)));
                }
                for member in self.members.values_mut() {
                    member.roles.remove(name);
                }
                Ok(format!("Deleted role {}", name))
            }
            ActionKind::RemoveRole => {
                let role = arg(action, 0, "role")?;
                let member = arg(action, 1, "member")?;
                self.member_mut(member)?.roles.remove(role);
                Ok(format!("Took {} from {}", role, member))
            }
            ActionKind::KickMember => {
                let member = arg(action, 0, "member")?;
                if self.members.remove(member).is_none() {
                    return Err(ActionError::Reported(format!("Unknown Member: {}", member)));
                }
                Ok(format!("Kicked {}", member))
            }
            ActionKind::BanMember => {
                let member = arg(action, 0, "member")?;
                self.members.remove(member);
                self.bans.insert(member.to_string());
                Ok(format!("Banned {}", member))
            }
            ActionKind::TimeoutMember => {
                let member = arg(action, 0, "member")?;
                self.member_mut(member)?.timed_out = true;
                Ok(format!("Timed out {}", member))
            }
            ActionKind::Unknown(token) => Err(ActionError::InvalidPayload(format!(
                "no simulation for {}",
                token
            ))),
        }
    }
}

fn arg<'a>(action: &'a Action, index: usize, what: &str) -> Result<&'a str, ActionError> {
    action
        .args
        .get(index)
        .map(String::as_str)
        .ok_or_else(|| ActionError::InvalidPayload(format!("missing {}", what)))
}

/// A scripted misbehaviour for the next invocation of a kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    RateLimited,
    ServerError(u16),
    Rejected(String),
    /// Report success without changing any state.
    GhostSuccess,
}

/// Shared simulated platform holding one [`GuildState`] per tenant.
#[derive(Default)]
pub struct SimulatedPlatform {
    guilds: Mutex<HashMap<TenantId, GuildState>>,
    faults: Mutex<HashMap<ActionKind, VecDeque<Fault>>>,
    invocations: Mutex<Vec<(ActionKind, String)>>,
}

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl SimulatedPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the state of `tenant`.
    pub fn seed(&self, tenant: &TenantId, state: GuildState) {
        locked(&self.guilds).insert(tenant.clone(), state);
    }

    pub fn snapshot(&self, tenant: &TenantId) -> GuildState {
        locked(&self.guilds).get(tenant).cloned().unwrap_or_default()
    }

    /// Queue `fault` for the next invocation of `kind`.
    pub fn inject(&self, kind: ActionKind, fault: Fault) {
        locked(&self.faults).entry(kind).or_default().push_back(fault);
    }

    /// Every executor invocation so far, in call order.
    pub fn invocations(&self) -> Vec<(ActionKind, String)> {
        locked(&self.invocations).clone()
    }

    /// Register a handler for every known kind.
    pub fn register_all(self: &Arc<Self>, registry: &ActionRegistry) {
        registry.register_all(ActionKind::KNOWN.into_iter().map(|kind| {
            Arc::new(SimulatedHandler {
                kind,
                platform: Arc::clone(self),
            }) as Arc<dyn ActionHandler>
        }));
    }

    fn invoke(&self, tenant: &TenantId, action: &Action) -> Result<ActionResult, ActionError> {
        locked(&self.invocations).push((action.kind.clone(), action.raw_text.clone()));

        let fault = locked(&self.faults)
            .get_mut(&action.kind)
            .and_then(VecDeque::pop_front);
        match fault {
            Some(Fault::RateLimited) => return Err(ActionError::RateLimited),
            Some(Fault::ServerError(status)) => {
                return Err(ActionError::Server {
                    status,
                    message: "simulated outage".to_string(),
                })
            }
            Some(Fault::Rejected(message)) => return Ok(ActionResult::rejected(message)),
            Some(Fault::GhostSuccess) => {
                debug!(kind = %action.kind, "Simulating success without effect");
                return Ok(ActionResult::ok(format!("{} (simulated)", action.kind)));
            }
            None => {}
        }

        let mut guilds = locked(&self.guilds);
        let guild = guilds.entry(tenant.clone()).or_default();
        guild.apply(action).map(ActionResult::ok)
    }
}

#[async_trait]
impl PlatformState for SimulatedPlatform {
    async fn exists(
        &self,
        tenant: &TenantId,
        kind: ResourceKind,
        name: &str,
    ) -> Result<bool, ActionError> {
        Ok(locked(&self.guilds)
            .get(tenant)
            .map(|guild| guild.exists(kind, name))
            .unwrap_or(false))
    }
}

/// Executor for one kind against a [`SimulatedPlatform`].
pub struct SimulatedHandler {
    kind: ActionKind,
    platform: Arc<SimulatedPlatform>,
}

#[async_trait]
impl ActionHandler for SimulatedHandler {
    fn kind(&self) -> ActionKind {
        self.kind.clone()
    }

    async fn execute(
        &self,
        tenant: &TenantId,
        action: &Action,
    ) -> Result<ActionResult, ActionError> {
        self.platform.invoke(tenant, action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tenant() -> TenantId {
        TenantId::new("guild-1")
    }

    fn platform() -> Arc<SimulatedPlatform> {
        let platform = Arc::new(SimulatedPlatform::new());
        platform.seed(
            &tenant(),
            GuildState::default()
                .with_members(["alice", "bob"])
                .with_channel("general")
                .with_role("Member"),
        );
        platform
    }

    async fn run(platform: &SimulatedPlatform, line: &str) -> Result<ActionResult, ActionError> {
        platform.invoke(&tenant(), &Action::parse(0, line))
    }

    #[tokio::test]
    async fn test_create_channel_in_category() {
        let platform = platform();
        run(&platform, "create_category Lobby").await.unwrap();
        run(&platform, r#"create_channel "voice-1" in Lobby"#).await.unwrap();

        let state = platform.snapshot(&tenant());
        assert_eq!(state.channels["voice-1"].category.as_deref(), Some("Lobby"));
        assert!(platform
            .exists(&tenant(), ResourceKind::Channel, "voice-1")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_create_channel_in_missing_category_is_rejected() {
        let platform = platform();
        let err = run(&platform, "create_channel x in Nowhere").await.unwrap_err();
        assert!(matches!(err, ActionError::Reported(_)));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_ban_removes_member_and_records_ban() {
        let platform = platform();
        run(&platform, "ban_member bob").await.unwrap();
        let state = platform.snapshot(&tenant());
        assert!(!state.members.contains_key("bob"));
        assert!(state.bans.contains("bob"));

        run(&platform, "unban_member bob").await.unwrap();
        assert!(platform.snapshot(&tenant()).bans.is_empty());
    }

    #[tokio::test]
    async fn test_rename_role_follows_members() {
        let platform = platform();
        run(&platform, "assign_role Member to alice").await.unwrap();
        run(&platform, "rename_role Member Regular").await.unwrap();
        let state = platform.snapshot(&tenant());
        assert!(state.members["alice"].roles.contains("Regular"));
        assert!(!state.roles.contains("Member"));
    }

    #[tokio::test]
    async fn test_missing_argument_is_invalid_payload() {
        let platform = platform();
        let err = run(&platform, "set_topic general").await.unwrap_err();
        assert!(matches!(err, ActionError::InvalidPayload(_)));
    }

    #[tokio::test]
    async fn test_slowmode_parses_seconds() {
        let platform = platform();
        run(&platform, "set_slowmode general 10s").await.unwrap();
        assert_eq!(platform.snapshot(&tenant()).channels["general"].slowmode_secs, 10);
        assert!(run(&platform, "set_slowmode general fast").await.is_err());
    }

    #[tokio::test]
    async fn test_faults_are_consumed_in_order() {
        let platform = platform();
        platform.inject(ActionKind::DeleteChannel, Fault::RateLimited);
        platform.inject(ActionKind::DeleteChannel, Fault::GhostSuccess);

        assert!(matches!(
            run(&platform, "delete_channel general").await,
            Err(ActionError::RateLimited)
        ));
        assert!(run(&platform, "delete_channel general").await.unwrap().success);
        assert!(platform.snapshot(&tenant()).channels.contains_key("general"));

        run(&platform, "delete_channel general").await.unwrap();
        assert!(!platform.snapshot(&tenant()).channels.contains_key("general"));
        assert_eq!(platform.invocations().len(), 3);
    }

    #[tokio::test]
    async fn test_rejected_fault_reports_failure() {
        let platform = platform();
        platform.inject(ActionKind::KickMember, Fault::Rejected("Missing Permissions".into()));
        let result = run(&platform, "kick_member alice").await.unwrap();
        assert!(!result.success);
        assert_eq!(result.message, "Missing Permissions");
    }

    #[test]
    fn test_register_all_covers_known_kinds() {
        let platform = platform();
        let registry = ActionRegistry::new();
        platform.register_all(&registry);
        assert_eq!(registry.len(), ActionKind::KNOWN.len());
    }
}
