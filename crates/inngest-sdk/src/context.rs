//! The typed view of a handler's `{event, events, runId, attempt}` context
//! object (spec §3, §6). Built from the raw JSON the comm handler passes
//! into the engine, after `transformFunctionInput` has had its say.

use inngest_core::EventPayload;
use serde::Deserialize;

/// What a registered function's handler receives on every invocation.
#[derive(Debug, Clone, Deserialize)]
pub struct Context {
    pub event: EventPayload,
    #[serde(default)]
    pub events: Vec<EventPayload>,
    #[serde(rename = "runId")]
    pub run_id: String,
    #[serde(default)]
    pub attempt: u32,
}
