//! The per-request execution engine: a cooperative state machine that
//! replays memoized steps, discovers new ones, executes at most one step,
//! and reconciles handler completion against step discovery. See spec
//! §4.4.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use inngest_core::{
    Checkpoint, CheckpointReceiver, ExecutionState, IncomingOp, OutgoingOp, Result as CoreResult, SerializedError,
    StepInfo, StepOptions,
};

use crate::middleware::{new_reentrancy_guard, BoxFut, ExecutionResult, FunctionInputTransform, MiddlewarePipeline};

pub type HandlerOutcome = std::result::Result<serde_json::Value, SerializedError>;
pub type HandlerFn = Arc<dyn Fn(serde_json::Value, Arc<ExecutionState>) -> BoxFut<HandlerOutcome> + Send + Sync>;

/// One engine instance is constructed per HTTP request and `start()` is
/// meant to be called exactly once — that per-request-instance contract is
/// what satisfies `start()`'s idempotence (spec §4.4), rather than a
/// cached-future indirection.
pub struct Engine {
    state: Arc<ExecutionState>,
    rx: CheckpointReceiver,
    middleware: MiddlewarePipeline,
    handler: HandlerFn,
    ctx: serde_json::Value,
    attempt: u32,
    step_not_found_timeout: Duration,
}

impl Engine {
    pub fn new(
        ctx: serde_json::Value,
        attempt: u32,
        memoized: HashMap<String, IncomingOp>,
        requested_run_step: Option<String>,
        handler: HandlerFn,
        middleware: MiddlewarePipeline,
        step_not_found_timeout: Duration,
    ) -> Self {
        let (tx, rx) = inngest_core::checkpoint_channel();
        let state = Arc::new(ExecutionState::new(memoized, tx, requested_run_step));
        Self {
            state,
            rx,
            middleware,
            handler,
            ctx,
            attempt,
            step_not_found_timeout,
        }
    }

    pub fn state(&self) -> Arc<ExecutionState> {
        self.state.clone()
    }

    /// Run `transformFunctionInput`, fire `onRunStart`, spawn the handler,
    /// then drive the core loop until a terminal [`ExecutionResult`] is
    /// reached.
    pub async fn start(mut self) -> CoreResult<ExecutionResult> {
        let transformed = self
            .middleware
            .transform_function_input(FunctionInputTransform {
                ctx: self.ctx.clone(),
                steps: self.state.memoized_snapshot(),
            })
            .await?;

        if self.attempt == 0 && self.state.memoized_len() == 0 {
            self.middleware.on_run_start().await;
        }

        let handler = self.handler.clone();
        let state_for_handler = self.state.clone();
        let final_ctx = transformed.ctx;
        let middleware = self.middleware.clone();
        tokio::spawn(async move {
            let state_for_core = state_for_handler.clone();
            let core: BoxFut<inngest_core::Result<serde_json::Value>> = Box::pin(async move {
                handler(final_ctx, state_for_core).await.map_err(inngest_core::InngestError::Function)
            });
            let guard = new_reentrancy_guard();
            let outcome = middleware.wrap_function_handler(guard, core).await;
            let checkpoint = match outcome {
                Ok(data) => Checkpoint::FunctionResolved(data),
                Err(inngest_core::InngestError::Function(error)) => Checkpoint::FunctionRejected(error),
                Err(error) => Checkpoint::FunctionRejected(SerializedError::new("Error", error.to_string())),
            };
            // the handler task outlives the request if the engine already
            // returned (at most one checkpoint is ever consumed); a closed
            // receiver here is expected, not an error.
            let _ = state_for_handler.checkpoint_tx.send(checkpoint).await;
        });

        self.core_loop().await
    }

    async fn core_loop(&mut self) -> CoreResult<ExecutionResult> {
        let requested = self.state.requested_run_step.clone();
        let deadline = requested
            .as_ref()
            .map(|_| tokio::time::Instant::now() + self.step_not_found_timeout);

        loop {
            let checkpoint = match deadline {
                Some(at) => tokio::select! {
                    cp = self.rx.recv() => cp,
                    _ = tokio::time::sleep_until(at) => {
                        let id = requested.clone().unwrap_or_default();
                        warn!(step_id = %id, "requested run step not found within timeout");
                        return Ok(ExecutionResult::StepNotFound { hashed_id: id });
                    }
                },
                None => self.rx.recv().await,
            };

            let Some(checkpoint) = checkpoint else {
                return Err(inngest_core::InngestError::Internal(
                    "checkpoint channel closed before a terminal result was produced".into(),
                ));
            };

            match checkpoint {
                Checkpoint::FunctionResolved(data) => {
                    self.middleware.on_run_end(&data).await;
                    return Ok(ExecutionResult::FunctionResolved { data });
                }
                Checkpoint::FunctionRejected(error) => {
                    let retriable = error.name != "NonRetriableError";
                    self.middleware.on_run_error(&error, !retriable).await;
                    return Ok(ExecutionResult::FunctionRejected { error, retriable });
                }
                Checkpoint::StepNotFound(hashed_id) => {
                    return Ok(ExecutionResult::StepNotFound { hashed_id });
                }
                Checkpoint::StepsFound(ids) => {
                    if let Some(result) = self.handle_steps_found(ids, requested.as_deref()).await? {
                        return Ok(result);
                    }
                    // nothing reportable yet (all steps already memoized);
                    // keep waiting for the next checkpoint.
                }
            }
        }
    }

    /// Decide what to do with a batch of newly discovered steps: execute
    /// one (requested or opportunistic), report them as found, or — if
    /// none are un-memoized yet — defer to the next checkpoint.
    async fn handle_steps_found(
        &mut self,
        ids: Vec<String>,
        requested: Option<&str>,
    ) -> CoreResult<Option<ExecutionResult>> {
        if !self.state.all_state_used() {
            warn!(
                fulfilled = self.state.fulfilled_memoized_count(),
                memoized = self.state.memoized_len(),
                "handler discovered a step before replaying all memoized state"
            );
        }

        let unmemoized = self.state.unmemoized_discovered();
        if unmemoized.is_empty() {
            return Ok(None);
        }

        if let Some(wanted) = requested {
            if ids.iter().any(|id| id == wanted) || unmemoized.iter().any(|id| id == wanted) {
                let outcome = self.execute_step(wanted).await;
                return Ok(Some(outcome));
            }
            return Ok(None);
        }

        // Never preempt the very first invocation of a run (attempt 0, no
        // memoized steps yet) — that's the plain discovery-report case
        // (spec §8 Scenario A). Once a later round or a retried attempt is
        // underway, a lone un-opted `StepPlanned` may still run inline.
        let is_first_invocation = self.attempt == 0 && self.state.memoized_len() == 0;
        if !is_first_invocation && !self.state.is_parallel_suppressed() && unmemoized.len() == 1 {
            let only = &unmemoized[0];
            let eligible = self
                .state
                .with_found(only, |step| step.op == inngest_core::OpCode::StepPlanned && step.opts.is_none())
                .unwrap_or(false);
            if eligible {
                let outcome = self.execute_step(only).await;
                return Ok(Some(outcome));
            }
        }

        let ops = unmemoized
            .iter()
            .filter_map(|id| {
                self.state
                    .with_found(id, |step| OutgoingOp::planned(id.clone(), step.display_name.clone(), step.op))
            })
            .collect();
        Ok(Some(ExecutionResult::StepsFound { ops }))
    }

    /// Step execution: cancel the not-found timeout (implicit — we only
    /// reach here once a terminal decision has been made, so the loop's
    /// `select!` simply won't be polled again), fire `onMemoizationEnd`
    /// once, run `wrapStepHandler` around the thunk, and report the
    /// outcome.
    async fn execute_step(&mut self, hashed_id: &str) -> ExecutionResult {
        self.middleware.on_memoization_end().await;

        let info = self.state.with_found(hashed_id, |step| StepInfo {
            hashed_id: step.hashed_id.clone(),
            options: StepOptions {
                id: step.id.clone(),
                name: step.display_name.clone(),
            },
            input: step.opts.clone(),
            memoized: false,
            step_type: step.kind,
        });
        let Some(info) = info else {
            return ExecutionResult::StepNotFound {
                hashed_id: hashed_id.to_string(),
            };
        };

        let handler = self.state.take_handler(hashed_id);
        let Some(slot) = handler else {
            // no thunk (sleep/waitForEvent/invoke/...): nothing to attempt,
            // just report the discovery with its own op code.
            debug!(hashed_id, "step has no handler thunk, reporting as planned");
            let op = OutgoingOp::planned(hashed_id, info.options.name.clone(), info.step_type.discovery_op());
            return ExecutionResult::StepRan { op };
        };

        self.middleware.on_step_start(&info).await;

        let guard = new_reentrancy_guard();
        let core: BoxFut<inngest_core::StepOutcome> = Box::pin(async move {
            slot.take_and_run()
                .await
                .unwrap_or_else(|| Err(SerializedError::new("Error", "step handler not set")))
        });
        let outcome = self.middleware.wrap_step_handler(info.clone(), guard, core).await;

        let (op, resolved) = match outcome {
            Ok(data) => {
                self.middleware.on_step_end(&info, &data).await;
                (OutgoingOp::ran(hashed_id, data.clone()), Ok(data))
            }
            Err(error) => {
                let retriable = error.name != "NonRetriableError";
                self.middleware.on_step_error(&info, &error, !retriable).await;
                (OutgoingOp::ran_error(hashed_id, error.clone()), Err(error))
            }
        };

        self.state.resolve_step(hashed_id, resolved);
        ExecutionResult::StepRan { op }
    }
}
