//! Core types and value objects for the action orchestrator.
//!
//! Defines action kinds, parsed actions, batches, execution phases and the
//! per-action result record.

use std::fmt;
use std::sync::LazyLock;

use herald_core::types::{BatchId, TenantId, Timestamp};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Double-quoted argument or bare word.
static TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""([^"]*)"|(\S+)"#).expect("token regex is valid"));

/// Bare words that only join arguments together ("create_channel X in Y").
const CONNECTORS: [&str; 7] = ["in", "to", "into", "under", "from", "as", "on"];

// =============================================================================
// Enums
// =============================================================================

/// Known action kinds, with a fallback for anything the registry has never
/// heard of.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    UnbanMember,
    RemoveTimeout,
    CreateCategory,
    CreateRole,
    CreateChannel,
    CreateEvent,
    MoveChannel,
    AssignRole,
    SendMessage,
    RenameChannel,
    RenameRole,
    SetTopic,
    SetNickname,
    SetSlowmode,
    DeleteChannel,
    DeleteCategory,
    DeleteRole,
    RemoveRole,
    KickMember,
    BanMember,
    TimeoutMember,
    Unknown(String),
}

impl ActionKind {
    /// Every kind except `Unknown`.
    pub const KNOWN: [ActionKind; 21] = [
        ActionKind::UnbanMember,
        ActionKind::RemoveTimeout,
        ActionKind::CreateCategory,
        ActionKind::CreateRole,
        ActionKind::CreateChannel,
        ActionKind::CreateEvent,
        ActionKind::MoveChannel,
        ActionKind::AssignRole,
        ActionKind::SendMessage,
        ActionKind::RenameChannel,
        ActionKind::RenameRole,
        ActionKind::SetTopic,
        ActionKind::SetNickname,
        ActionKind::SetSlowmode,
        ActionKind::DeleteChannel,
        ActionKind::DeleteCategory,
        ActionKind::DeleteRole,
        ActionKind::RemoveRole,
        ActionKind::KickMember,
        ActionKind::BanMember,
        ActionKind::TimeoutMember,
    ];

    /// Resolve a leading instruction token. Case and `-`/`_` are ignored;
    /// anything unrecognised becomes `Unknown` carrying the normalised token.
    pub fn from_token(token: &str) -> Self {
        let normalized = token.trim().to_ascii_lowercase().replace('-', "_");
        match normalized.as_str() {
            "unban_member" => ActionKind::UnbanMember,
            "remove_timeout" => ActionKind::RemoveTimeout,
            "create_category" => ActionKind::CreateCategory,
            "create_role" => ActionKind::CreateRole,
            "create_channel" => ActionKind::CreateChannel,
            "create_event" => ActionKind::CreateEvent,
            "move_channel" => ActionKind::MoveChannel,
            "assign_role" => ActionKind::AssignRole,
            "send_message" => ActionKind::SendMessage,
            "rename_channel" => ActionKind::RenameChannel,
            "rename_role" => ActionKind::RenameRole,
            "set_topic" => ActionKind::SetTopic,
            "set_nickname" => ActionKind::SetNickname,
            "set_slowmode" => ActionKind::SetSlowmode,
            "delete_channel" => ActionKind::DeleteChannel,
            "delete_category" => ActionKind::DeleteCategory,
            "delete_role" => ActionKind::DeleteRole,
            "remove_role" => ActionKind::RemoveRole,
            "kick_member" => ActionKind::KickMember,
            "ban_member" => ActionKind::BanMember,
            "timeout_member" => ActionKind::TimeoutMember,
            _ => ActionKind::Unknown(normalized),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ActionKind::UnbanMember => "unban_member",
            ActionKind::RemoveTimeout => "remove_timeout",
            ActionKind::CreateCategory => "create_category",
            ActionKind::CreateRole => "create_role",
            ActionKind::CreateChannel => "create_channel",
            ActionKind::CreateEvent => "create_event",
            ActionKind::MoveChannel => "move_channel",
            ActionKind::AssignRole => "assign_role",
            ActionKind::SendMessage => "send_message",
            ActionKind::RenameChannel => "rename_channel",
            ActionKind::RenameRole => "rename_role",
            ActionKind::SetTopic => "set_topic",
            ActionKind::SetNickname => "set_nickname",
            ActionKind::SetSlowmode => "set_slowmode",
            ActionKind::DeleteChannel => "delete_channel",
            ActionKind::DeleteCategory => "delete_category",
            ActionKind::DeleteRole => "delete_role",
            ActionKind::RemoveRole => "remove_role",
            ActionKind::KickMember => "kick_member",
            ActionKind::BanMember => "ban_member",
            ActionKind::TimeoutMember => "timeout_member",
            ActionKind::Unknown(token) => token,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, ActionKind::Unknown(_))
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Risk/dependency bucket an action is executed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionCategory {
    /// Lifts a restriction. Only ever restores access.
    Recovery,
    /// Creates or attaches something later actions may reference.
    Constructive,
    /// Edits an existing resource.
    Modification,
    /// Deletes, removes or suspends. Irreversible.
    Destructive,
}

impl fmt::Display for ActionCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionCategory::Recovery => write!(f, "recovery"),
            ActionCategory::Constructive => write!(f, "constructive"),
            ActionCategory::Modification => write!(f, "modification"),
            ActionCategory::Destructive => write!(f, "destructive"),
        }
    }
}

/// Execution phases, in the only order the engine ever runs them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Recovery,
    Constructive,
    Modification,
    Destructive,
    Done,
}

impl Phase {
    pub fn next(self) -> Phase {
        match self {
            Phase::Recovery => Phase::Constructive,
            Phase::Constructive => Phase::Modification,
            Phase::Modification => Phase::Destructive,
            Phase::Destructive | Phase::Done => Phase::Done,
        }
    }
}

impl From<ActionCategory> for Phase {
    fn from(category: ActionCategory) -> Self {
        match category {
            ActionCategory::Recovery => Phase::Recovery,
            ActionCategory::Constructive => Phase::Constructive,
            ActionCategory::Modification => Phase::Modification,
            ActionCategory::Destructive => Phase::Destructive,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Recovery => write!(f, "recovery"),
            Phase::Constructive => write!(f, "constructive"),
            Phase::Modification => write!(f, "modification"),
            Phase::Destructive => write!(f, "destructive"),
            Phase::Done => write!(f, "done"),
        }
    }
}

/// The requester's answer to a staged batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confirmation {
    Approved,
    Declined,
}

// =============================================================================
// Domain Structs
// =============================================================================

/// A single requested mutation against the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub raw_text: String,
    pub kind: ActionKind,
    /// Positional arguments with quotes stripped and connector words dropped.
    pub args: Vec<String>,
    pub original_index: usize,
}

impl Action {
    /// Parse one instruction line, e.g. `create_channel "general" in "Lobby"`.
    pub fn parse(original_index: usize, raw_text: impl Into<String>) -> Self {
        let raw_text = raw_text.into();
        let mut tokens = TOKEN.captures_iter(&raw_text).filter_map(|caps| {
            if let Some(quoted) = caps.get(1) {
                Some((quoted.as_str().to_string(), true))
            } else {
                caps.get(2).map(|bare| (bare.as_str().to_string(), false))
            }
        });

        let kind = tokens
            .next()
            .map(|(token, _)| ActionKind::from_token(&token))
            .unwrap_or_else(|| ActionKind::Unknown(String::new()));

        let args = tokens
            .filter(|(token, quoted)| {
                *quoted || !CONNECTORS.contains(&token.to_ascii_lowercase().as_str())
            })
            .map(|(token, _)| token)
            .collect();

        Self {
            raw_text,
            kind,
            args,
            original_index,
        }
    }

    /// The resource the action is about (first argument).
    pub fn target(&self) -> Option<&str> {
        self.args.first().map(String::as_str)
    }

    /// The resource the target is placed in or attached to (second argument).
    pub fn container(&self) -> Option<&str> {
        self.args.get(1).map(String::as_str)
    }
}

/// Identifies a pending batch: who asked, and where.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    pub requester: String,
    pub context: String,
}

impl SessionKey {
    pub fn new(requester: impl Into<String>, context: impl Into<String>) -> Self {
        Self {
            requester: requester.into(),
            context: context.into(),
        }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.requester, self.context)
    }
}

/// A staged unit of work awaiting (or holding) confirmation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
    pub id: BatchId,
    pub actions: Vec<Action>,
    pub tenant_id: TenantId,
    pub confirmed: bool,
    pub created_at: Timestamp,
    pub expires_at: Timestamp,
}

impl Batch {
    /// Build an unconfirmed batch from instruction lines, in submission order.
    pub fn from_lines<I, S>(tenant_id: TenantId, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let actions = lines
            .into_iter()
            .enumerate()
            .map(|(i, line)| Action::parse(i, line))
            .collect();
        let now = Timestamp::now();
        Self {
            id: BatchId::new(),
            actions,
            tenant_id,
            confirmed: false,
            created_at: now,
            expires_at: now,
        }
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

/// Outcome of one action within a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub action: Action,
    pub success: bool,
    pub message: Option<String>,
    pub error: Option<String>,
    pub attempts: u32,
    pub phase: Phase,
    /// Order in which the action was started within the run, from 0.
    pub sequence: usize,
}

impl ExecutionResult {
    pub fn succeeded(
        action: Action,
        message: String,
        attempts: u32,
        phase: Phase,
        sequence: usize,
    ) -> Self {
        Self {
            action,
            success: true,
            message: Some(message),
            error: None,
            attempts,
            phase,
            sequence,
        }
    }

    pub fn failed(
        action: Action,
        error: String,
        attempts: u32,
        phase: Phase,
        sequence: usize,
    ) -> Self {
        Self {
            action,
            success: false,
            message: None,
            error: Some(error),
            attempts,
            phase,
            sequence,
        }
    }
}

/// What an executor hands back for a single invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResult {
    pub success: bool,
    pub message: String,
}

impl ActionResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
