//! The execution request body the Executor POSTs for a step run. See spec
//! §6 "Request body schema".

use std::collections::HashMap;

use serde::Deserialize;

use inngest_core::{EventPayload, IncomingOp, StepValue};

#[derive(Debug, Deserialize)]
pub struct RunCtx {
    #[serde(rename = "runId")]
    pub run_id: String,
    pub attempt: u32,
    pub stack: Option<RunStack>,
}

#[derive(Debug, Deserialize)]
pub struct RunStack {
    pub current: Vec<String>,
}

/// The raw request body, before step-state normalization. `steps` is kept
/// as opaque JSON per entry since its shape depends on the execution
/// version (V0 vs V1/V2); [`ExecutionRequest::into_steps`] normalizes it.
#[derive(Debug, Deserialize)]
pub struct ExecutionRequest {
    pub ctx: RunCtx,
    pub event: EventPayload,
    #[serde(default)]
    pub events: Vec<EventPayload>,
    pub steps: HashMap<String, serde_json::Value>,
    #[serde(default, rename = "use_api")]
    pub use_api: bool,
}

impl ExecutionRequest {
    /// Normalize `steps` into hashed-id-keyed [`IncomingOp`]s. The V0/V1/V2
    /// parse is auto-detected per entry by [`StepValue::parse`] rather than
    /// selected up front — nothing in the request body names a schema
    /// version explicitly.
    pub fn into_steps(self) -> inngest_core::Result<HashMap<String, IncomingOp>> {
        self.steps
            .into_iter()
            .map(|(id, raw)| {
                let parsed = StepValue::parse(raw)?;
                Ok((id.clone(), parsed.into_incoming_op(id)))
            })
            .collect()
    }
}
