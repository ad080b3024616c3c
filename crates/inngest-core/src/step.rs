//! In-run step bookkeeping: the record created when a user handler awaits a
//! step tool. See spec §3 "FoundStep" / "StepInfo" and §9 "Deferred
//! handlers / step thunks".

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;

use crate::model::{OpCode, SerializedError};

/// The kind of step a tool call represents, passed to middleware as
/// `StepInfo.stepType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    Run,
    SendEvent,
    Sleep,
    WaitForEvent,
    Invoke,
    AiInfer,
    AiWrap,
    RealtimePublish,
    Fetch,
    Unknown,
}

impl StepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Run => "run",
            Self::SendEvent => "sendEvent",
            Self::Sleep => "sleep",
            Self::WaitForEvent => "waitForEvent",
            Self::Invoke => "invoke",
            Self::AiInfer => "ai.infer",
            Self::AiWrap => "ai.wrap",
            Self::RealtimePublish => "realtime.publish",
            Self::Fetch => "fetch",
            Self::Unknown => "unknown",
        }
    }

    /// The default op code a fresh discovery of this kind carries, before
    /// any execution takes place.
    pub fn discovery_op(&self) -> OpCode {
        match self {
            Self::Run | Self::SendEvent => OpCode::StepPlanned,
            Self::Sleep => OpCode::Sleep,
            Self::WaitForEvent => OpCode::WaitForEvent,
            Self::Invoke => OpCode::InvokeFunction,
            Self::AiInfer | Self::AiWrap => OpCode::AiGateway,
            Self::RealtimePublish | Self::Fetch | Self::Unknown => OpCode::StepPlanned,
        }
    }
}

/// The user-facing id/name pair for a step, as seen (and possibly
/// rewritten) by `transformStepInput`.
#[derive(Debug, Clone)]
pub struct StepOptions {
    pub id: String,
    pub name: String,
}

/// Snapshot handed to middleware lifecycle/transform hooks.
#[derive(Debug, Clone)]
pub struct StepInfo {
    pub hashed_id: String,
    pub options: StepOptions,
    pub input: Option<serde_json::Value>,
    pub memoized: bool,
    pub step_type: StepKind,
}

/// The outcome a step tool's suspended promise ultimately resolves with.
pub type StepOutcome = std::result::Result<serde_json::Value, SerializedError>;

type BoxedThunkFuture = Pin<Box<dyn Future<Output = StepOutcome> + Send>>;
type ThunkFn = Box<dyn FnOnce() -> BoxedThunkFuture + Send>;

/// A slot the step's execution thunk is deposited into. Modeled explicitly
/// (rather than as a captured mutable closure) so the data flow between
/// "tool call discovers a step" and "engine later executes it, once
/// middleware has seen the final `StepInfo`" stays auditable.
#[derive(Clone)]
pub struct HandlerSlot {
    inner: Arc<Mutex<Option<ThunkFn>>>,
}

impl Default for HandlerSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl HandlerSlot {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(None)),
        }
    }

    pub fn set<F, Fut>(&self, f: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = StepOutcome> + Send + 'static,
    {
        let boxed: ThunkFn = Box::new(move || Box::pin(f()));
        *self.inner.lock().unwrap() = Some(boxed);
    }

    /// Entry point the engine calls to run whatever thunk was deposited.
    /// Returns `None` if nothing was ever set (e.g. a non-`run` step).
    pub async fn take_and_run(&self) -> Option<StepOutcome> {
        let thunk = self.inner.lock().unwrap().take()?;
        Some(thunk().await)
    }
}

impl std::fmt::Debug for HandlerSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerSlot")
            .field("set", &self.inner.lock().unwrap().is_some())
            .finish()
    }
}

/// A per-run record created when the user handler awaits a step tool.
/// Lives only for the duration of one request.
pub struct FoundStep {
    pub hashed_id: String,
    /// The rewritten, collision-disambiguated id (e.g. `"x:1"`) — what's
    /// hashed into `hashed_id` and what middleware sees as
    /// `StepOptions.id`.
    pub id: String,
    /// The stable, never-rewritten display name (e.g. `"x"`) — what
    /// middleware sees as `StepOptions.name`, and what appears in
    /// `OutgoingOp.displayName` regardless of collision index.
    pub display_name: String,
    pub op: OpCode,
    pub opts: Option<serde_json::Value>,
    pub kind: StepKind,
    pub fulfilled: bool,
    pub handler: HandlerSlot,
    pub resolver: Option<oneshot::Sender<StepOutcome>>,
}

impl FoundStep {
    pub fn new(hashed_id: String, id: String, kind: StepKind) -> Self {
        let display_name = id.clone();
        Self {
            op: kind.discovery_op(),
            hashed_id,
            id,
            display_name,
            opts: None,
            kind,
            fulfilled: false,
            handler: HandlerSlot::new(),
            resolver: None,
        }
    }

    /// Override the display name when the rewritten `id` differs from the
    /// user's original (collision occurred). See spec §4.1 Scenario D.
    pub fn with_display_name(mut self, display_name: String) -> Self {
        self.display_name = display_name;
        self
    }

    pub fn with_opts(mut self, opts: serde_json::Value) -> Self {
        self.opts = Some(opts);
        self
    }

    /// Resolve the suspended awaiter, marking the step fulfilled. A no-op
    /// if the resolver was already consumed (e.g. the awaiter was dropped).
    pub fn resolve(&mut self, outcome: StepOutcome) {
        self.fulfilled = true;
        if let Some(tx) = self.resolver.take() {
            let _ = tx.send(outcome);
        }
    }
}
