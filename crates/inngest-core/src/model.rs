//! The wire data model: events, memoized step state, and discovery/execution
//! results exchanged with the Executor. See spec §3 and §6.

use serde::{Deserialize, Serialize};

/// The event that triggered a function run. Immutable from the SDK's
/// perspective.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventPayload {
    pub name: String,
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ts: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "v")]
    pub version: Option<String>,
}

/// A serialized JS-style error, preserved recursively through `cause`
/// chains so the handler can reconstruct an equivalent rejection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerializedError {
    pub name: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<Box<SerializedError>>,
}

impl SerializedError {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            stack: None,
            cause: None,
        }
    }

    pub fn with_cause(mut self, cause: SerializedError) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }
}

impl std::fmt::Display for SerializedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.name, self.message)
    }
}

/// A memoized step entry as sent by the Executor for every previously-seen
/// step, keyed by hashed step id. See spec §3 "IncomingOp".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomingOp {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<SerializedError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<serde_json::Value>,
}

impl IncomingOp {
    /// A step is eligible to run this request if only its `input` (not
    /// `data`/`error`) is memoized.
    pub fn is_unfulfilled(&self) -> bool {
        self.data.is_none() && self.error.is_none()
    }
}

/// The two step-state wire shapes, selected by execution version (spec §6).
/// V0 is a legacy compatibility shim; V1/V2 is the default.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StepValueTyped {
    Data { data: serde_json::Value },
    Error { error: SerializedError },
    Input { input: serde_json::Value },
}

/// A single entry of the `steps` map in the execution request body. Parses
/// either the legacy V0 shape (a raw JSON value is the data) or the V1/V2
/// tagged shape, normalizing both into an [`IncomingOp`].
#[derive(Debug, Clone)]
pub enum StepValue {
    V0(serde_json::Value),
    V1(StepValueTyped),
}

impl StepValue {
    /// Parse one `steps` map entry, auto-detecting the execution version
    /// from its shape rather than requiring an explicit flag: a V1/V2 entry
    /// is always a `{type: ..., ...}` object, so anything that doesn't parse
    /// against [`StepValueTyped`] is a V0 entry (the value itself is the
    /// data).
    pub fn parse(raw: serde_json::Value) -> crate::Result<Self> {
        match serde_json::from_value::<StepValueTyped>(raw.clone()) {
            Ok(typed) => Ok(StepValue::V1(typed)),
            Err(_) => Ok(StepValue::V0(raw)),
        }
    }

    /// Normalize into the id-keyed [`IncomingOp`] the engine consumes.
    pub fn into_incoming_op(self, id: impl Into<String>) -> IncomingOp {
        let id = id.into();
        match self {
            StepValue::V0(value) => IncomingOp {
                id,
                data: Some(value),
                error: None,
                input: None,
            },
            StepValue::V1(StepValueTyped::Data { data }) => IncomingOp {
                id,
                data: Some(data),
                error: None,
                input: None,
            },
            StepValue::V1(StepValueTyped::Error { error }) => IncomingOp {
                id,
                data: None,
                error: Some(error),
                input: None,
            },
            StepValue::V1(StepValueTyped::Input { input }) => IncomingOp {
                id,
                data: None,
                error: None,
                input: Some(input),
            },
        }
    }
}

/// The operation a discovered or executed step represents. See spec §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpCode {
    StepRun,
    StepPlanned,
    Sleep,
    WaitForEvent,
    InvokeFunction,
    #[serde(rename = "AIGateway")]
    AiGateway,
    StepNotFound,
    StepError,
}

/// A discovery/execution result sent back to the Executor. See spec §3
/// "OutgoingOp".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutgoingOp {
    pub id: String,
    pub op: OpCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "displayName")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opts: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<SerializedError>,
}

impl OutgoingOp {
    pub fn planned(id: impl Into<String>, name: impl Into<String>, op: OpCode) -> Self {
        let name = name.into();
        Self {
            id: id.into(),
            op,
            display_name: Some(name.clone()),
            name: Some(name),
            opts: None,
            data: None,
            error: None,
        }
    }

    pub fn ran(id: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            op: OpCode::StepRun,
            name: None,
            display_name: None,
            opts: None,
            data: Some(data),
            error: None,
        }
    }

    pub fn ran_error(id: impl Into<String>, error: SerializedError) -> Self {
        Self {
            id: id.into(),
            op: OpCode::StepRun,
            name: None,
            display_name: None,
            opts: None,
            data: None,
            error: Some(error),
        }
    }
}
