//! The `RegisterRequest` payload pushed to the control plane on `PUT /`.
//! See spec §4.5.

use serde::Serialize;

/// What triggers a function run.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Trigger {
    Event {
        event: String,
        #[serde(skip_serializing_if = "Option::is_none", rename = "if")]
        condition: Option<String>,
    },
    Cron {
        cron: String,
    },
}

/// Per-function scheduling/throttling configuration. Every field is
/// optional — functions opt into whichever policies they need.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FunctionConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retries: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "rateLimit")]
    pub rate_limit: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub throttle: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub singleton: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debounce: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeouts: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "cancelOn")]
    pub cancel_on: Option<serde_json::Value>,
}

/// One function's entry in the registration payload.
#[derive(Debug, Clone, Serialize)]
pub struct FunctionManifest {
    pub id: String,
    pub name: String,
    pub triggers: Vec<Trigger>,
    #[serde(rename = "stepsUrl")]
    pub steps_url: String,
    #[serde(flatten)]
    pub config: FunctionConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegisterRequest {
    #[serde(rename = "appId")]
    pub app_id: String,
    pub url: String,
    #[serde(rename = "sdk")]
    pub sdk_version: String,
    #[serde(rename = "v")]
    pub protocol_version: String,
    pub functions: Vec<FunctionManifest>,
}
