//! Action orchestrator for Herald.
//!
//! Stages batches of platform mutations for confirmation, then executes
//! them in risk-ordered phases with validation, retries, a per-tenant
//! circuit breaker and a single final report.

pub mod breaker;
pub mod classifier;
pub mod engine;
pub mod error;
pub mod handler;
pub mod orchestrator;
pub mod ordering;
pub mod pacing;
pub mod report;
pub mod retry;
pub mod session;
pub mod types;
pub mod validation;

pub use breaker::CircuitBreaker;
pub use classifier::{classify, PhasePlan};
pub use engine::{EngineRun, ExecutionEngine};
pub use error::{ActionError, SessionError};
pub use handler::{ActionHandler, ActionRegistry};
pub use orchestrator::{NotificationSink, Orchestrator, RunOutcome};
pub use report::{ExecutionReport, ReportBuilder};
pub use retry::RetryPolicy;
pub use session::{InMemorySessionStore, SessionStore};
pub use types::{
    Action, ActionCategory, ActionKind, ActionResult, Batch, Confirmation, ExecutionResult,
    Phase, SessionKey,
};
pub use validation::{PlatformState, ResourceKind, ValidationGate};
