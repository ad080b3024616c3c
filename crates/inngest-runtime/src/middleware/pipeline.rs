//! Runs the registered middleware list: lifecycle hooks fire in
//! registration order and swallow their own errors; transform hooks chain
//! output-to-input in registration order and propagate errors; wrap hooks
//! compose into an onion where the first-registered middleware is
//! outermost (spec §4.3).

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use inngest_core::{IncomingOp, OutgoingOp, Result, SerializedError, StepInfo, StepOutcome};

use super::hooks::{BoxFut, ExecutionResult, FunctionInputTransform, Middleware, RequestInfo, StepTransformInput};

/// The reentrancy guard for `wrapStep`: the set of middleware indices
/// currently "active" (i.e. somewhere on the call stack of their own
/// `wrap_step`). Carried per-request, not globally (Design Notes §9).
pub type ReentrancyGuard = Arc<Mutex<HashSet<usize>>>;

pub fn new_reentrancy_guard() -> ReentrancyGuard {
    Arc::new(Mutex::new(HashSet::new()))
}

/// The registration-ordered middleware list for one client/request.
#[derive(Clone, Default)]
pub struct MiddlewarePipeline {
    middlewares: Vec<Arc<dyn Middleware>>,
}

impl MiddlewarePipeline {
    pub fn new(middlewares: Vec<Arc<dyn Middleware>>) -> Self {
        Self { middlewares }
    }

    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }

    // ---- lifecycle: fire in order, catch and log errors/panics-as-errors ----

    pub async fn on_run_start(&self) {
        for mw in &self.middlewares {
            mw.on_run_start().await;
        }
    }

    pub async fn on_run_end(&self, output: &serde_json::Value) {
        for mw in &self.middlewares {
            mw.on_run_end(output).await;
        }
    }

    pub async fn on_run_error(&self, error: &SerializedError, is_final_attempt: bool) {
        for mw in &self.middlewares {
            mw.on_run_error(error, is_final_attempt).await;
        }
    }

    pub async fn on_step_start(&self, info: &StepInfo) {
        for mw in &self.middlewares {
            mw.on_step_start(info).await;
        }
    }

    pub async fn on_step_end(&self, info: &StepInfo, output: &serde_json::Value) {
        for mw in &self.middlewares {
            mw.on_step_end(info, output).await;
        }
    }

    pub async fn on_step_error(&self, info: &StepInfo, error: &SerializedError, is_final_attempt: bool) {
        for mw in &self.middlewares {
            mw.on_step_error(info, error, is_final_attempt).await;
        }
    }

    pub async fn on_memoization_end(&self) {
        for mw in &self.middlewares {
            mw.on_memoization_end().await;
        }
    }

    // ---- transform: sequential pipeline, first error wins and propagates ----

    pub async fn transform_function_input(&self, mut input: FunctionInputTransform) -> Result<FunctionInputTransform> {
        for mw in &self.middlewares {
            input = mw.transform_function_input(input).await?;
        }
        Ok(input)
    }

    pub async fn transform_step_input(&self, mut input: StepTransformInput) -> Result<StepTransformInput> {
        for mw in &self.middlewares {
            input = mw.transform_step_input(input).await?;
        }
        Ok(input)
    }

    pub async fn transform_send_event(&self, mut events: Vec<inngest_core::EventPayload>) -> Result<Vec<inngest_core::EventPayload>> {
        for mw in &self.middlewares {
            events = mw.transform_send_event(events).await?;
        }
        Ok(events)
    }

    // ---- wrap: onion composition, outermost = first-registered ----

    pub async fn wrap_request(
        &self,
        info: RequestInfo,
        guard: ReentrancyGuard,
        core: BoxFut<Result<ExecutionResult>>,
    ) -> Result<ExecutionResult> {
        self.fold_onion(guard, core, move |mw, next| mw.wrap_request(info.clone(), next))
            .await
    }

    pub async fn wrap_function_handler(
        &self,
        guard: ReentrancyGuard,
        core: BoxFut<Result<serde_json::Value>>,
    ) -> Result<serde_json::Value> {
        self.fold_onion(guard, core, move |mw, next| mw.wrap_function_handler(next))
            .await
    }

    pub async fn wrap_step(&self, info: StepInfo, guard: ReentrancyGuard, core: BoxFut<StepOutcome>) -> StepOutcome {
        self.fold_onion(guard, core, move |mw, next| mw.wrap_step(info.clone(), next))
            .await
    }

    pub async fn wrap_step_handler(&self, info: StepInfo, guard: ReentrancyGuard, core: BoxFut<StepOutcome>) -> StepOutcome {
        self.fold_onion(guard, core, move |mw, next| mw.wrap_step_handler(info.clone(), next))
            .await
    }

    pub async fn wrap_send_event(
        &self,
        events: Vec<inngest_core::EventPayload>,
        guard: ReentrancyGuard,
        core: BoxFut<Result<Vec<String>>>,
    ) -> Result<Vec<String>> {
        self.fold_onion(guard, core, move |mw, next| mw.wrap_send_event(events.clone(), next))
            .await
    }

    /// Fold the middleware list (in reverse registration order, so the
    /// first-registered ends up outermost) into one nested future. A
    /// middleware already marked active in `guard` is skipped entirely —
    /// this is how a middleware's own `wrapStep`-injected step avoids being
    /// re-wrapped by that same middleware.
    async fn fold_onion<T, F>(&self, guard: ReentrancyGuard, core: BoxFut<T>, call: F) -> T
    where
        T: Send + 'static,
        F: Fn(Arc<dyn Middleware>, BoxFut<T>) -> BoxFut<T> + Send + Sync + 'static,
    {
        let call = Arc::new(call);
        let mut next = core;
        for (idx, mw) in self.middlewares.iter().enumerate().rev() {
            if guard.lock().unwrap().contains(&idx) {
                continue;
            }
            let mw = mw.clone();
            let call = call.clone();
            let guard = guard.clone();
            let inner = next;
            next = Box::pin(async move {
                guard.lock().unwrap().insert(idx);
                let result = call(mw, inner).await;
                guard.lock().unwrap().remove(&idx);
                result
            });
        }
        next.await
    }
}

/// Allow pattern-matching the hashed-id keyed memoized map into a
/// `FunctionInputTransform` without the caller needing to know the
/// internal shape.
pub fn function_input(ctx: serde_json::Value, steps: std::collections::HashMap<String, IncomingOp>) -> FunctionInputTransform {
    FunctionInputTransform { ctx, steps }
}

/// Build an `OutgoingOp` from a transformed step-input, used once the
/// middleware chain has had its say on id/name.
pub fn outgoing_planned(hashed_id: &str, transformed: &StepTransformInput, op: inngest_core::OpCode) -> OutgoingOp {
    OutgoingOp::planned(hashed_id, transformed.name.clone(), op)
}

#[cfg(test)]
mod tests {
    use super::*;
    use inngest_core::StepKind;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Recorder {
        order: Arc<Mutex<Vec<&'static str>>>,
        label: &'static str,
    }

    impl Middleware for Recorder {
        fn wrap_step(&self, _info: StepInfo, next: BoxFut<StepOutcome>) -> BoxFut<StepOutcome> {
            let order = self.order.clone();
            let label = self.label;
            Box::pin(async move {
                order.lock().unwrap().push(label);
                let result = next.await;
                order.lock().unwrap().push(label);
                result
            })
        }
    }

    fn step_info() -> StepInfo {
        StepInfo {
            hashed_id: "h".into(),
            options: inngest_core::StepOptions { id: "s".into(), name: "s".into() },
            input: None,
            memoized: false,
            step_type: StepKind::Run,
        }
    }

    #[tokio::test]
    async fn first_registered_middleware_is_outermost() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mw_a = Arc::new(Recorder { order: order.clone(), label: "a" });
        let mw_b = Arc::new(Recorder { order: order.clone(), label: "b" });
        let pipeline = MiddlewarePipeline::new(vec![mw_a, mw_b]);

        let core: BoxFut<StepOutcome> = Box::pin(async { Ok(serde_json::json!(1)) });
        let guard = new_reentrancy_guard();
        let _ = pipeline.wrap_step(step_info(), guard, core).await;

        assert_eq!(*order.lock().unwrap(), vec!["a", "b", "b", "a"]);
    }

    struct SelfInjecting {
        calls: Arc<AtomicUsize>,
    }

    impl Middleware for SelfInjecting {
        fn name(&self) -> &'static str {
            "self-injecting"
        }

        fn wrap_step(&self, _info: StepInfo, next: BoxFut<StepOutcome>) -> BoxFut<StepOutcome> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            next
        }
    }

    #[tokio::test]
    async fn reentrancy_guard_skips_middleware_wrapping_its_own_injection() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mw = Arc::new(SelfInjecting { calls: calls.clone() });
        let pipeline = MiddlewarePipeline::new(vec![mw]);
        let guard = new_reentrancy_guard();

        // Simulate: middleware at index 0 is already active (as if we're
        // inside its own wrap_step body) when a nested step wrap happens.
        guard.lock().unwrap().insert(0);
        let core: BoxFut<StepOutcome> = Box::pin(async { Ok(serde_json::json!(2)) });
        let result = pipeline.wrap_step(step_info(), guard, core).await;

        assert_eq!(result.unwrap(), serde_json::json!(2));
        assert_eq!(calls.load(Ordering::SeqCst), 0, "guarded middleware must not be invoked again");
    }
}
