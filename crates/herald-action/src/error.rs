//! Error types for the action orchestrator.

use std::sync::LazyLock;

use herald_core::error::HeraldError;
use regex::Regex;

use crate::types::SessionKey;

/// Transport failures a handler may surface as plain text. Matches a leading
/// status code or one of a fixed set of whole messages, never text that can
/// carry action arguments.
static TRANSIENT_TRANSPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?:(?:HTTP\s+)?(?:429|5\d\d)\b.*|(?:you are being )?rate limited\.?|too many requests|(?:request )?timed out|connection (?:reset|refused)|network unreachable|broken pipe|internal server error|bad gateway|service unavailable)$",
    )
    .expect("transient transport regex is valid")
});

/// Errors from a single action's execution.
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("action handler failed: {0}")]
    HandlerFailed(String),
    #[error("executor reported failure: {0}")]
    Reported(String),
    #[error("unknown or inactive action")]
    UnknownOrInactive,
    #[error("invalid action arguments: {0}")]
    InvalidPayload(String),
    #[error("rate limited by platform")]
    RateLimited,
    #[error("action execution timed out after {0} seconds")]
    Timeout(u64),
    #[error("server error {status}: {message}")]
    Server { status: u16, message: String },
    #[error("network failure: {0}")]
    Network(String),
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),
    #[error("postcondition failed: {0}")]
    PostconditionFailed(String),
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        last: Box<ActionError>,
    },
    #[error("cancelled")]
    Cancelled,
    #[error("storage error: {0}")]
    Storage(#[from] HeraldError),
}

impl ActionError {
    /// Whether another attempt may succeed: rate limiting, timeouts, 5xx
    /// responses and connection failures. Everything else fails fast.
    ///
    /// A `Reported` failure is the platform's verdict on the action and is
    /// always permanent.
    pub fn is_transient(&self) -> bool {
        match self {
            ActionError::RateLimited | ActionError::Timeout(_) | ActionError::Network(_) => true,
            ActionError::Server { status, .. } => (500..600).contains(status),
            ActionError::HandlerFailed(msg) => TRANSIENT_TRANSPORT.is_match(msg.trim()),
            ActionError::Reported(_)
            | ActionError::UnknownOrInactive
            | ActionError::InvalidPayload(_)
            | ActionError::PreconditionFailed(_)
            | ActionError::PostconditionFailed(_)
            | ActionError::Exhausted { .. }
            | ActionError::Cancelled
            | ActionError::Storage(_) => false,
        }
    }
}

/// Errors from the pending-batch session store.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session not found or expired: {0}")]
    NotFound(SessionKey),
    #[error("storage error: {0}")]
    Storage(#[from] HeraldError),
}

impl SessionError {
    pub(crate) fn poisoned(e: impl std::fmt::Display) -> Self {
        SessionError::Storage(HeraldError::Storage(format!("Lock poisoned: {}", e)))
    }
}
