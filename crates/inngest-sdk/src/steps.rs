//! Step Tooling: the operations a user handler awaits (spec §4.2). Each
//! call runs `transformStepInput`, allocates a (possibly collision-rewritten)
//! hashed id, and either resolves immediately from memoized state or
//! registers a [`FoundStep`] and suspends until the engine resolves it.

use std::sync::Mutex;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use inngest_core::{
    Checkpoint, EventPayload, ExecutionState, FoundStep, SerializedError, StepIdAllocator, StepInfo, StepKind,
    StepOptions,
};
use inngest_runtime::middleware::{new_reentrancy_guard, ReentrancyGuard};
use inngest_runtime::{BoxFut, MiddlewarePipeline, StepTransformInput};

use crate::error::{from_serialized, to_serialized, StepError};
use crate::events::send_events;

type StepOutcome = inngest_core::StepOutcome;
type ThunkBox = Box<dyn FnOnce() -> BoxFut<StepOutcome> + Send>;

/// Options accepted by [`StepTools::wait_for_event`].
#[derive(Debug, Clone, Default)]
pub struct WaitForEventOpts {
    pub event: String,
    pub timeout: String,
    /// A CEL expression gating which matching events are accepted.
    pub if_expr: Option<String>,
    /// A dot-path whose value must be equal in the triggering and
    /// incoming events.
    pub match_path: Option<String>,
}

/// Options accepted by [`StepTools::invoke`].
#[derive(Debug, Clone)]
pub struct InvokeOpts {
    pub function: String,
    pub data: serde_json::Value,
}

/// The handle passed into a registered function's handler. Bound to one
/// request's [`ExecutionState`]; every method is a suspension point (spec
/// §4.2 "Suspension contract").
#[derive(Clone)]
pub struct StepTools {
    state: Arc<ExecutionState>,
    middleware: MiddlewarePipeline,
    allocator: Arc<Mutex<StepIdAllocator>>,
    guard: ReentrancyGuard,
    http: reqwest::Client,
    base_url: String,
    event_key: Option<String>,
}

impl StepTools {
    pub(crate) fn new(
        state: Arc<ExecutionState>,
        middleware: MiddlewarePipeline,
        http: reqwest::Client,
        base_url: String,
        event_key: Option<String>,
    ) -> Self {
        Self {
            state,
            middleware,
            allocator: Arc::new(Mutex::new(StepIdAllocator::new())),
            guard: new_reentrancy_guard(),
            http,
            base_url,
            event_key,
        }
    }

    /// Execute `f` at-most-once and memoize its return value. If `f`
    /// returns `StepError::NonRetriable`, no retry is attempted.
    pub async fn run<F, Fut, T>(&self, id: &str, f: F) -> Result<T, StepError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: std::future::Future<Output = Result<T, StepError>> + Send + 'static,
        T: Serialize + DeserializeOwned + Send + 'static,
    {
        let thunk: ThunkBox = Box::new(move || {
            Box::pin(async move {
                match f().await {
                    Ok(value) => serde_json::to_value(value)
                        .map_err(|e| SerializedError::new("Error", e.to_string())),
                    Err(e) => Err(to_serialized(e)),
                }
            })
        });

        let outcome = self.declare(id, StepKind::Run, None, Some(thunk)).await;
        match outcome {
            Ok(value) => serde_json::from_value(value).map_err(|e| {
                StepError::Retriable(format!("failed to deserialize step output: {e}"))
            }),
            Err(e) => Err(from_serialized(e)),
        }
    }

    /// Suspend the run for `duration` (a `"1h30m"`-style string). Resolves
    /// with `()` once the Executor reschedules past the sleep.
    pub async fn sleep(&self, id: &str, duration: &str) -> Result<(), StepError> {
        inngest_core::parse_duration_string(duration).map_err(|e| StepError::NonRetriable(e.to_string()))?;
        let opts = serde_json::json!({ "duration": duration });
        let outcome = self.declare(id, StepKind::Sleep, Some(opts), None).await;
        outcome.map(|_| ()).map_err(from_serialized)
    }

    /// Same as [`StepTools::sleep`], but the wake-up time is absolute.
    pub async fn sleep_until(&self, id: &str, when: chrono::DateTime<chrono::Utc>) -> Result<(), StepError> {
        let opts = serde_json::json!({ "until": when.to_rfc3339() });
        let outcome = self.declare(id, StepKind::Sleep, Some(opts), None).await;
        outcome.map(|_| ()).map_err(from_serialized)
    }

    /// Resolve with the matching event payload, or `None` on timeout.
    pub async fn wait_for_event(
        &self,
        id: &str,
        opts: WaitForEventOpts,
    ) -> Result<Option<serde_json::Value>, StepError> {
        let json_opts = serde_json::json!({
            "event": opts.event,
            "timeout": opts.timeout,
            "if": opts.if_expr,
            "match": opts.match_path,
        });
        let outcome = self.declare(id, StepKind::WaitForEvent, Some(json_opts), None).await;
        match outcome {
            Ok(value) if value.is_null() => Ok(None),
            Ok(value) => Ok(Some(value)),
            Err(e) => Err(from_serialized(e)),
        }
    }

    /// Invoke another registered function and resolve with its return
    /// value. The Executor performs the actual dispatch; this tool only
    /// declares the dependency.
    pub async fn invoke<T: DeserializeOwned>(&self, id: &str, opts: InvokeOpts) -> Result<T, StepError> {
        let json_opts = serde_json::json!({ "function": opts.function, "data": opts.data });
        let outcome = self.declare(id, StepKind::Invoke, Some(json_opts), None).await;
        match outcome {
            Ok(value) => serde_json::from_value(value).map_err(StepError::from),
            Err(e) => Err(from_serialized(e)),
        }
    }

    /// Send one or more events, resolving with the ids the Executor
    /// assigned them. Unlike the other tools, this one actually performs
    /// work locally (an HTTP call to the event API) rather than deferring
    /// to the Executor.
    pub async fn send_event(&self, id: &str, events: Vec<EventPayload>) -> Result<Vec<String>, StepError> {
        let middleware = self.middleware.clone();
        let http = self.http.clone();
        let base_url = self.base_url.clone();
        let event_key = self.event_key.clone();

        let thunk: ThunkBox = Box::new(move || {
            Box::pin(async move {
                let events = middleware
                    .transform_send_event(events)
                    .await
                    .map_err(|e| SerializedError::new("Error", e.to_string()))?;

                let guard = new_reentrancy_guard();
                let core: BoxFut<inngest_core::Result<Vec<String>>> = Box::pin({
                    let events = events.clone();
                    async move { send_events(&http, &base_url, event_key.as_deref(), &events).await }
                });
                let ids = middleware
                    .wrap_send_event(events, guard, core)
                    .await
                    .map_err(|e| SerializedError::new("Error", e.to_string()))?;
                serde_json::to_value(&ids).map_err(|e| SerializedError::new("Error", e.to_string()))
            })
        });

        let outcome = self.declare(id, StepKind::SendEvent, None, Some(thunk)).await;
        match outcome {
            Ok(value) => serde_json::from_value(value).map_err(StepError::from),
            Err(e) => Err(from_serialized(e)),
        }
    }

    /// Common declare/resolve-or-suspend logic shared by every step tool
    /// (spec §4.2 steps 1-3).
    async fn declare(
        &self,
        user_id: &str,
        kind: StepKind,
        opts: Option<serde_json::Value>,
        handler: Option<ThunkBox>,
    ) -> StepOutcome {
        let transform_input = StepTransformInput {
            id: user_id.to_string(),
            name: user_id.to_string(),
            input: opts.clone().unwrap_or(serde_json::Value::Null),
        };
        let transformed = match self.middleware.transform_step_input(transform_input).await {
            Ok(t) => t,
            Err(e) => return Err(SerializedError::new("Error", e.to_string())),
        };

        // Collision resolution re-runs against the (possibly rewritten) id
        // transformStepInput produced (spec §4.3).
        let (rewritten_id, hashed_id) = self.allocator.lock().unwrap().allocate(&transformed.id);
        let display_name = transformed.name.clone();
        let opts = if transformed.input.is_null() { opts } else { Some(transformed.input.clone()) };

        let info = StepInfo {
            hashed_id: hashed_id.clone(),
            options: StepOptions { id: rewritten_id.clone(), name: display_name.clone() },
            input: opts.clone(),
            memoized: self.state.memoized(&hashed_id).is_some(),
            step_type: kind,
        };

        let state = self.state.clone();
        let hid = hashed_id.clone();
        let rid = rewritten_id.clone();
        let dname = display_name.clone();
        let o = opts.clone();
        let core: BoxFut<StepOutcome> = Box::pin(async move {
            if let Some(memo) = state.memoized(&hid) {
                let mut found = FoundStep::new(hid.clone(), rid, kind).with_display_name(dname);
                if let Some(v) = o {
                    found = found.with_opts(v);
                }
                found.fulfilled = true;
                state.record_found(found);
                if let Some(err) = memo.error {
                    return Err(err);
                }
                return Ok(memo.data.unwrap_or(serde_json::Value::Null));
            }

            let mut found = FoundStep::new(hid.clone(), rid, kind).with_display_name(dname);
            if let Some(v) = o {
                found = found.with_opts(v);
            }
            let (tx, rx) = tokio::sync::oneshot::channel();
            found.resolver = Some(tx);
            if let Some(thunk) = handler {
                found.handler.set(move || thunk());
            }
            state.record_found(found);

            if state
                .checkpoint_tx
                .send(Checkpoint::StepsFound(vec![hid.clone()]))
                .await
                .is_err()
            {
                return Err(SerializedError::new("Error", "checkpoint channel closed before step was scheduled"));
            }

            rx.await
                .unwrap_or_else(|_| Err(SerializedError::new("Error", "step promise dropped before resolution")))
        });

        self.middleware.wrap_step(info, self.guard.clone(), core).await
    }
}

/// Run a set of step-tool futures concurrently (`Promise.all`-style). Each
/// future is boxed before being handed in, since the calls being fanned out
/// (different step IDs, different closures) are rarely the same concrete
/// type. Marks the request's [`ExecutionState`] as parallelism-suppressed
/// for the duration so the engine's opportunistic early execution (spec
/// §4.4) doesn't pick one of the concurrently-discovered steps out of
/// order.
pub async fn parallel<T>(tools: &StepTools, futures: Vec<BoxFut<T>>) -> Vec<T>
where
    T: Send + 'static,
{
    tools.state.set_parallel_suppressed(true);
    let results = futures::future::join_all(futures).await;
    tools.state.set_parallel_suppressed(false);
    results
}
