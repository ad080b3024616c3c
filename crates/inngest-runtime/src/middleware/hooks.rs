//! The middleware hook surface: lifecycle (fire-and-forget), transform
//! (pipeline), and wrap (onion) hooks. See spec §4.3.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use inngest_core::{IncomingOp, OutgoingOp, SerializedError, StepInfo, StepOutcome};

pub type BoxFut<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// Minimal, framework-agnostic description of the inbound HTTP request,
/// passed to `wrapRequest`. Framework adapters (Express, Lambda, ...) are
/// out of scope (spec §1); this is the shape the comm handler builds from
/// whatever it's fronted by.
#[derive(Debug, Clone)]
pub struct RequestInfo {
    pub method: String,
    pub path: String,
    pub headers: HashMap<String, String>,
}

/// What the core loop eventually decided for a request. The terminal
/// value `wrapRequest` and `wrapFunctionHandler` ultimately produce.
#[derive(Debug, Clone)]
pub enum ExecutionResult {
    FunctionResolved {
        data: serde_json::Value,
    },
    StepRan {
        op: OutgoingOp,
    },
    StepsFound {
        ops: Vec<OutgoingOp>,
    },
    FunctionRejected {
        error: SerializedError,
        retriable: bool,
    },
    StepNotFound {
        hashed_id: String,
    },
}

/// Input to `transformFunctionInput`: the handler's context object plus the
/// memoized steps the Executor sent, before replay begins.
#[derive(Debug, Clone)]
pub struct FunctionInputTransform {
    pub ctx: serde_json::Value,
    pub steps: HashMap<String, IncomingOp>,
}

/// Input to `transformStepInput`: a step's id/name/input, on every reach of
/// the step (memoized and fresh).
#[derive(Debug, Clone)]
pub struct StepTransformInput {
    pub id: String,
    pub name: String,
    pub input: serde_json::Value,
}

/// A middleware implementation. Every hook has a no-op default so
/// implementors only override what they need, matching the teacher
/// framework's optional-hook-methods pattern (`ForgeWorkflow`,
/// `ForgeJob`, ...) generalized to an onion-and-pipeline shape.
///
/// Hook methods take owned values and return boxed futures rather than
/// using `async fn` directly so `Middleware` stays object-safe (`Arc<dyn
/// Middleware>` is stored in the registration-ordered list the pipeline
/// walks).
pub trait Middleware: Send + Sync {
    /// Stable identity used by the `wrapStep` reentrancy guard. Defaults to
    /// the type name.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    // ---- lifecycle hooks (fire-and-forget; errors are caught and logged) ----

    fn on_run_start(&self) -> BoxFut<()> {
        Box::pin(async {})
    }

    fn on_run_end(&self, _output: &serde_json::Value) -> BoxFut<()> {
        Box::pin(async {})
    }

    fn on_run_error(&self, _error: &SerializedError, _is_final_attempt: bool) -> BoxFut<()> {
        Box::pin(async {})
    }

    fn on_step_start(&self, _info: &StepInfo) -> BoxFut<()> {
        Box::pin(async {})
    }

    fn on_step_end(&self, _info: &StepInfo, _output: &serde_json::Value) -> BoxFut<()> {
        Box::pin(async {})
    }

    fn on_step_error(&self, _info: &StepInfo, _error: &SerializedError, _is_final_attempt: bool) -> BoxFut<()> {
        Box::pin(async {})
    }

    fn on_memoization_end(&self) -> BoxFut<()> {
        Box::pin(async {})
    }

    // ---- transform hooks (pipeline; may error, which propagates) ----

    fn transform_function_input(
        &self,
        input: FunctionInputTransform,
    ) -> BoxFut<inngest_core::Result<FunctionInputTransform>> {
        Box::pin(async move { Ok(input) })
    }

    fn transform_step_input(
        &self,
        input: StepTransformInput,
    ) -> BoxFut<inngest_core::Result<StepTransformInput>> {
        Box::pin(async move { Ok(input) })
    }

    fn transform_send_event(
        &self,
        events: Vec<inngest_core::EventPayload>,
    ) -> BoxFut<inngest_core::Result<Vec<inngest_core::EventPayload>>> {
        Box::pin(async move { Ok(events) })
    }

    // ---- wrap hooks (onion; must await `next` exactly once, or not at all to short-circuit) ----

    fn wrap_request(&self, _info: RequestInfo, next: BoxFut<inngest_core::Result<ExecutionResult>>) -> BoxFut<inngest_core::Result<ExecutionResult>> {
        next
    }

    fn wrap_function_handler(&self, next: BoxFut<inngest_core::Result<serde_json::Value>>) -> BoxFut<inngest_core::Result<serde_json::Value>> {
        next
    }

    fn wrap_step(&self, _info: StepInfo, next: BoxFut<StepOutcome>) -> BoxFut<StepOutcome> {
        next
    }

    fn wrap_step_handler(&self, _info: StepInfo, next: BoxFut<StepOutcome>) -> BoxFut<StepOutcome> {
        next
    }

    fn wrap_send_event(
        &self,
        _events: Vec<inngest_core::EventPayload>,
        next: BoxFut<inngest_core::Result<Vec<String>>>,
    ) -> BoxFut<inngest_core::Result<Vec<String>>> {
        next
    }
}
