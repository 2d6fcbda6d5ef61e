//! Batch orchestrator.
//!
//! Coordinates the full pipeline: staging a batch as a pending session,
//! consuming it on the requester's answer, executing it and turning the
//! results into one final outcome.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use herald_core::config::{HeraldConfig, SessionConfig};
use herald_core::types::{TenantId, Timestamp};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::engine::ExecutionEngine;
use crate::error::SessionError;
use crate::report::{ExecutionReport, ReportBuilder};
use crate::session::SessionStore;
use crate::types::{Batch, Confirmation, SessionKey};

/// Terminal outcome of a confirmation. The requester sees exactly one.
#[derive(Debug, Clone)]
pub enum RunOutcome {
    Completed(ExecutionReport),
    /// Cancelled mid-run; the report covers what ran before the signal.
    Cancelled(ExecutionReport),
    /// The session was absent, already consumed, or past its expiry.
    Expired,
    /// The requester declined; nothing ran.
    Declined,
}

impl RunOutcome {
    pub fn report(&self) -> Option<&ExecutionReport> {
        match self {
            RunOutcome::Completed(report) | RunOutcome::Cancelled(report) => Some(report),
            RunOutcome::Expired | RunOutcome::Declined => None,
        }
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunOutcome::Completed(report) => write!(f, "{}", report),
            RunOutcome::Cancelled(report) => {
                writeln!(f, "Run cancelled. Partial results:")?;
                write!(f, "{}", report)
            }
            RunOutcome::Expired => write!(
                f,
                "This request has expired or was already handled. Please submit it again."
            ),
            RunOutcome::Declined => write!(f, "Request declined. No actions were executed."),
        }
    }
}

/// Receives the final outcome of every confirmation.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, key: &SessionKey, outcome: &RunOutcome);
}

pub struct Orchestrator {
    sessions: Arc<dyn SessionStore>,
    engine: ExecutionEngine,
    session_config: SessionConfig,
    reports: ReportBuilder,
    sink: Option<Arc<dyn NotificationSink>>,
}

impl Orchestrator {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        engine: ExecutionEngine,
        config: &HeraldConfig,
    ) -> Self {
        Self {
            sessions,
            engine,
            session_config: config.session.clone(),
            reports: ReportBuilder::new(&config.report),
            sink: None,
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn engine(&self) -> &ExecutionEngine {
        &self.engine
    }

    /// Stage `lines` as an unconfirmed batch under `key`, replacing any
    /// earlier pending batch. Bulk batches get the longer expiry once, here.
    pub async fn submit<I, S>(
        &self,
        key: SessionKey,
        tenant: TenantId,
        lines: I,
    ) -> Result<Batch, SessionError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut batch = Batch::from_lines(tenant, lines);
        let count = batch.len();
        let bulk = self.session_config.is_bulk(count);
        self.sessions
            .put(key.clone(), batch.clone(), self.session_config.ttl())
            .await?;
        let ttl = if bulk {
            self.sessions
                .extend(&key, self.session_config.bulk_ttl())
                .await?;
            self.session_config.bulk_ttl()
        } else {
            self.session_config.ttl()
        };
        batch.expires_at = Timestamp::now().plus(ttl);
        info!(session = %key, actions = count, bulk, "Batch staged for confirmation");
        Ok(batch)
    }

    /// Human-readable lines for a confirmation prompt.
    pub fn preview(&self, batch: &Batch) -> Vec<String> {
        batch
            .actions
            .iter()
            .map(|action| match self.engine.registry().lookup(&action.kind) {
                Some(handler) => handler.describe(action),
                None => format!("{} (unavailable)", action.raw_text),
            })
            .collect()
    }

    /// Consume the pending session for `key` and act on the answer.
    ///
    /// A missing or expired session yields [`RunOutcome::Expired`] rather
    /// than an error. Only store failures are returned as `Err`.
    pub async fn respond(
        &self,
        key: &SessionKey,
        answer: Confirmation,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, SessionError> {
        let outcome = match self.sessions.take(key).await {
            Ok(batch) => match answer {
                Confirmation::Approved => self.execute(batch, cancel).await,
                Confirmation::Declined => {
                    info!(session = %key, batch = %batch.id, "Batch declined");
                    RunOutcome::Declined
                }
            },
            Err(SessionError::NotFound(_)) => {
                warn!(session = %key, "Confirmation for expired or unknown session");
                RunOutcome::Expired
            }
            Err(e) => return Err(e),
        };

        if let Some(sink) = &self.sink {
            sink.deliver(key, &outcome).await;
        }
        Ok(outcome)
    }

    /// Execute a batch that has already been taken from the store.
    pub async fn execute(&self, mut batch: Batch, cancel: &CancellationToken) -> RunOutcome {
        batch.confirmed = true;
        let run = self.engine.run(&batch, cancel).await;
        let report = self.reports.build(run.results);
        if run.cancelled {
            RunOutcome::Cancelled(report)
        } else {
            RunOutcome::Completed(report)
        }
    }

    /// Drop expired sessions now. The in-memory store also evicts them on
    /// each `submit`, so hosts only need this to reclaim memory while idle.
    pub async fn purge_expired(&self) -> Result<usize, SessionError> {
        let purged = self.sessions.purge_expired().await?;
        if purged > 0 {
            info!(purged, "Purged expired sessions");
        }
        Ok(purged)
    }
}
