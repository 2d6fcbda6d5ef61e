//! Phased batch execution.
//!
//! Runs a confirmed batch through the four phases in fixed order. Recovery
//! and constructive actions run one at a time with a propagation delay
//! after each; modifications share a small semaphore-bounded pool;
//! destructive actions run strictly in sequence with a gap between them.
//!
//! Every action goes through the same primitive: breaker check, registry
//! lookup, pre-validation, retried execution, post-validation, bookkeeping.
//! A failed action never stops the batch. Only cancellation does.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use herald_core::config::{HeraldConfig, PacingConfig, ValidationConfig};
use herald_core::types::TenantId;
use tokio::sync::{Mutex, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::breaker::CircuitBreaker;
use crate::classifier::PhasePlan;
use crate::error::ActionError;
use crate::handler::ActionRegistry;
use crate::pacing::pause;
use crate::retry::RetryPolicy;
use crate::types::{Action, ActionKind, Batch, ExecutionResult, Phase};
use crate::validation::{PlatformState, ValidationGate};

/// Results of one engine run.
#[derive(Debug, Clone, Default)]
pub struct EngineRun {
    /// In execution order, except within the modification phase where
    /// results follow submission order.
    pub results: Vec<ExecutionResult>,
    /// The run stopped early because its cancellation token fired.
    pub cancelled: bool,
}

/// Per-run state shared by every action of one batch.
struct RunContext<'a> {
    tenant: &'a TenantId,
    cancel: &'a CancellationToken,
    /// Destructive actions skip validation in large batches.
    large_batch: bool,
    sequence: AtomicUsize,
    interrupted: AtomicBool,
}

impl RunContext<'_> {
    fn next_sequence(&self) -> usize {
        self.sequence.fetch_add(1, Ordering::SeqCst)
    }

    fn interrupt(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
    }

    fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }
}

pub struct ExecutionEngine {
    registry: Arc<ActionRegistry>,
    breaker: Arc<CircuitBreaker>,
    validator: Option<ValidationGate>,
    retry: RetryPolicy,
    pacing: PacingConfig,
    skip_destructive_validation_above: usize,
    // Serialises breaker cooldowns between modification workers.
    cooldown_gate: Mutex<()>,
}

impl ExecutionEngine {
    /// Engine without validation. Use [`with_validation`](Self::with_validation)
    /// to attach a platform state reader.
    pub fn new(
        registry: Arc<ActionRegistry>,
        breaker: Arc<CircuitBreaker>,
        config: &HeraldConfig,
    ) -> Self {
        Self {
            registry,
            breaker,
            validator: None,
            retry: RetryPolicy::new(&config.retry),
            pacing: config.pacing.clone(),
            skip_destructive_validation_above: config.validation.skip_destructive_above,
            cooldown_gate: Mutex::new(()),
        }
    }

    /// Validate actions against `state`, unless validation is disabled in `config`.
    pub fn with_validation(
        mut self,
        state: Arc<dyn PlatformState>,
        config: &ValidationConfig,
    ) -> Self {
        if config.enabled {
            self.validator = Some(ValidationGate::new(state, config));
            self.skip_destructive_validation_above = config.skip_destructive_above;
        } else {
            debug!("Validation disabled by configuration");
        }
        self
    }

    pub fn registry(&self) -> &Arc<ActionRegistry> {
        &self.registry
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Execute every action of `batch`. Returns early, with the results
    /// gathered so far, once `cancel` fires.
    pub async fn run(&self, batch: &Batch, cancel: &CancellationToken) -> EngineRun {
        let plan = PhasePlan::build(&batch.actions);
        let ctx = RunContext {
            tenant: &batch.tenant_id,
            cancel,
            large_batch: batch.len() > self.skip_destructive_validation_above,
            sequence: AtomicUsize::new(0),
            interrupted: AtomicBool::new(false),
        };
        info!(
            batch = %batch.id,
            tenant = %batch.tenant_id,
            actions = batch.len(),
            "Executing batch"
        );

        let mut results = Vec::with_capacity(plan.len());
        let mut phase = Phase::Recovery;
        while phase != Phase::Done {
            if cancel.is_cancelled() {
                ctx.interrupt();
                break;
            }
            let actions = plan.actions(phase);
            if !actions.is_empty() {
                info!(phase = %phase, count = actions.len(), "Starting phase");
                match phase {
                    Phase::Recovery | Phase::Constructive => {
                        self.run_propagating(&ctx, actions, phase, &mut results).await
                    }
                    Phase::Modification => self.run_pooled(&ctx, actions, &mut results).await,
                    Phase::Destructive => self.run_destructive(&ctx, actions, &mut results).await,
                    Phase::Done => {}
                }
            }
            if ctx.is_interrupted() {
                break;
            }
            phase = phase.next();
        }

        let cancelled = ctx.is_interrupted();
        let failed = results.iter().filter(|r| !r.success).count();
        if cancelled {
            warn!(
                batch = %batch.id,
                completed = results.len(),
                total = batch.len(),
                "Batch run cancelled"
            );
        } else {
            info!(
                batch = %batch.id,
                succeeded = results.len() - failed,
                failed,
                "Batch run finished"
            );
        }
        EngineRun { results, cancelled }
    }

    /// One at a time, each followed by its kind's propagation delay.
    async fn run_propagating(
        &self,
        ctx: &RunContext<'_>,
        actions: &[Action],
        phase: Phase,
        results: &mut Vec<ExecutionResult>,
    ) {
        for action in actions {
            match self.execute_one(ctx, action, phase).await {
                Some(result) => results.push(result),
                None => break,
            }
            if ctx.is_interrupted() {
                break;
            }
            if !pause(self.propagation_delay(&action.kind), ctx.cancel).await {
                ctx.interrupt();
                break;
            }
        }
    }

    /// Semaphore-bounded pool. Each worker holds its permit through a short
    /// stagger after its action. Results keep submission order.
    ///
    /// The breaker is checked when a worker takes its permit. Workers already
    /// in flight when it opens run to completion; the next worker to start
    /// waits out the cooldown.
    async fn run_pooled(
        &self,
        ctx: &RunContext<'_>,
        actions: &[Action],
        results: &mut Vec<ExecutionResult>,
    ) {
        let semaphore = Semaphore::new(self.pacing.modification_concurrency.max(1));
        let stagger = self.pacing.modification_stagger();

        let workers = actions.iter().map(|action| {
            let semaphore = &semaphore;
            async move {
                let Ok(_permit) = semaphore.acquire().await else {
                    return None;
                };
                if ctx.is_interrupted() {
                    return None;
                }
                let result = self.execute_one(ctx, action, Phase::Modification).await;
                if result.is_some() && !pause(stagger, ctx.cancel).await {
                    ctx.interrupt();
                }
                result
            }
        });

        results.extend(join_all(workers).await.into_iter().flatten());
    }

    /// Strictly sequential with a fixed gap between actions.
    async fn run_destructive(
        &self,
        ctx: &RunContext<'_>,
        actions: &[Action],
        results: &mut Vec<ExecutionResult>,
    ) {
        for (i, action) in actions.iter().enumerate() {
            if i > 0 && !pause(self.pacing.destructive_delay(), ctx.cancel).await {
                ctx.interrupt();
                break;
            }
            match self.execute_one(ctx, action, Phase::Destructive).await {
                Some(result) => results.push(result),
                None => break,
            }
            if ctx.is_interrupted() {
                break;
            }
        }
    }

    /// Settle time after an action. Containers, roles and moves are read
    /// back by later actions so they wait longer.
    fn propagation_delay(&self, kind: &ActionKind) -> Duration {
        match kind {
            ActionKind::CreateCategory
            | ActionKind::CreateRole
            | ActionKind::CreateChannel
            | ActionKind::MoveChannel => self.pacing.dependent_delay(),
            _ => self.pacing.independent_delay(),
        }
    }

    /// Run one action to a result. Returns `None` (and marks the run
    /// interrupted) when cancellation stops it before it was attempted.
    async fn execute_one(
        &self,
        ctx: &RunContext<'_>,
        action: &Action,
        phase: Phase,
    ) -> Option<ExecutionResult> {
        let tenant = ctx.tenant;
        if ctx.cancel.is_cancelled() {
            ctx.interrupt();
            return None;
        }

        if self.breaker.is_open(tenant) {
            let _gate = self.cooldown_gate.lock().await;
            // Another worker may have finished the cooldown while we waited.
            if self.breaker.is_open(tenant) {
                warn!(
                    tenant = %tenant,
                    cooldown = ?self.breaker.cooldown(),
                    "Circuit breaker open, cooling down"
                );
                if !pause(self.breaker.cooldown(), ctx.cancel).await {
                    ctx.interrupt();
                    return None;
                }
                self.breaker.reset(tenant);
            }
        }

        let sequence = ctx.next_sequence();
        let Some(handler) = self.registry.lookup(&action.kind) else {
            warn!(kind = %action.kind, index = action.original_index, "Unknown or inactive action");
            return Some(ExecutionResult::failed(
                action.clone(),
                ActionError::UnknownOrInactive.to_string(),
                0,
                phase,
                sequence,
            ));
        };

        let validator = self
            .validator
            .as_ref()
            .filter(|_| !(ctx.large_batch && phase == Phase::Destructive));

        if let Some(gate) = validator {
            match gate.pre_check(tenant, action, ctx.cancel).await {
                Ok(()) => {}
                Err(ActionError::Cancelled) => {
                    ctx.interrupt();
                    return Some(self.cancelled(action, 0, phase, sequence));
                }
                Err(e) => return Some(self.failure(tenant, action, e, 0, phase, sequence)),
            }
        }

        let attempted = self
            .retry
            .execute(ctx.cancel, |attempt| {
                let handler = Arc::clone(&handler);
                async move {
                    debug!(kind = %action.kind, attempt, "Invoking handler");
                    let outcome = handler.execute(tenant, action).await?;
                    if outcome.success {
                        Ok(outcome.message)
                    } else {
                        Err(ActionError::Reported(outcome.message))
                    }
                }
            })
            .await;
        let attempts = attempted.attempts;

        let mut message = match attempted.outcome {
            Ok(message) => message,
            Err(ActionError::Cancelled) => {
                ctx.interrupt();
                return Some(self.cancelled(action, attempts, phase, sequence));
            }
            Err(e) => return Some(self.failure(tenant, action, e, attempts, phase, sequence)),
        };

        if let Some(gate) = validator {
            match gate.post_check(tenant, action, ctx.cancel).await {
                Ok(()) => {}
                Err(ActionError::Cancelled) => {
                    ctx.interrupt();
                    message.push_str(" (unverified)");
                }
                Err(e) => {
                    return Some(self.failure(tenant, action, e, attempts, phase, sequence))
                }
            }
        }

        self.breaker.record_success(tenant);
        debug!(kind = %action.kind, attempts, "Action succeeded");
        Some(ExecutionResult::succeeded(
            action.clone(),
            message,
            attempts,
            phase,
            sequence,
        ))
    }

    fn failure(
        &self,
        tenant: &TenantId,
        action: &Action,
        error: ActionError,
        attempts: u32,
        phase: Phase,
        sequence: usize,
    ) -> ExecutionResult {
        warn!(
            tenant = %tenant,
            kind = %action.kind,
            attempts,
            error = %error,
            "Action failed"
        );
        self.breaker.record_failure(tenant);
        ExecutionResult::failed(action.clone(), error.to_string(), attempts, phase, sequence)
    }

    fn cancelled(
        &self,
        action: &Action,
        attempts: u32,
        phase: Phase,
        sequence: usize,
    ) -> ExecutionResult {
        ExecutionResult::failed(
            action.clone(),
            ActionError::Cancelled.to_string(),
            attempts,
            phase,
            sequence,
        )
    }
}
