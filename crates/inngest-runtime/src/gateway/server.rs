//! Framework-agnostic entry point, implemented as an Axum router: parse
//! request, authenticate, dispatch to the engine, serialize response. See
//! spec §4.5.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};

use inngest_core::InngestConfig;

use crate::engine::{Engine, HandlerFn};
use crate::middleware::{new_reentrancy_guard, BoxFut, ExecutionResult, MiddlewarePipeline, RequestInfo};

use super::auth::{verify_signature, AuthConfig};
use super::registration::{FunctionConfig, FunctionManifest, RegisterRequest, Trigger};
use super::request::ExecutionRequest;
use super::response::into_http_response;
use super::tracing::TracingState;

/// A function registered with the comm handler: its manifest metadata plus
/// the boxed handler the engine invokes.
#[derive(Clone)]
pub struct RegisteredFunction {
    pub id: String,
    pub name: String,
    pub triggers: Vec<Trigger>,
    pub config: FunctionConfig,
    pub handler: HandlerFn,
}

pub struct CommHandlerState {
    pub config: InngestConfig,
    pub app_id: String,
    pub serve_origin: String,
    pub functions: HashMap<String, RegisteredFunction>,
    pub middleware: MiddlewarePipeline,
}

/// Builds the Axum router exposing `GET /`, `PUT /`, and `POST /`.
#[derive(Clone)]
pub struct CommHandler {
    state: Arc<CommHandlerState>,
}

impl CommHandler {
    pub fn new(state: CommHandlerState) -> Self {
        Self {
            state: Arc::new(state),
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/", get(introspect).put(register).post(run_step))
            .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
            .with_state(self.state.clone())
    }
}

#[derive(Debug, Serialize)]
struct IntrospectResponse {
    function_count: usize,
    has_signing_key: bool,
    mode: &'static str,
    env: Option<String>,
}

async fn introspect(State(state): State<Arc<CommHandlerState>>) -> impl IntoResponse {
    Json(IntrospectResponse {
        function_count: state.functions.len(),
        has_signing_key: state.config.signing_key.is_some(),
        mode: if state.config.is_dev { "dev" } else { "cloud" },
        env: state.config.env.clone(),
    })
}

async fn register(State(state): State<Arc<CommHandlerState>>) -> Response {
    let functions = state
        .functions
        .values()
        .map(|f| FunctionManifest {
            id: f.id.clone(),
            name: f.name.clone(),
            triggers: f.triggers.clone(),
            steps_url: format!("{}?fnId={}", state.serve_origin, f.id),
            config: f.config.clone(),
        })
        .collect();

    let payload = RegisterRequest {
        app_id: state.app_id.clone(),
        url: state.serve_origin.clone(),
        sdk_version: format!("rust:{}", env!("CARGO_PKG_VERSION")),
        protocol_version: "1".into(),
        functions,
    };

    let client = reqwest::Client::new();
    let register_url = format!("{}/fn/register", state.config.base_url);
    match client.put(register_url).json(&payload).send().await {
        Ok(resp) if resp.status().is_success() => StatusCode::OK.into_response(),
        Ok(resp) => resp.status().into_response(),
        Err(e) => {
            tracing::error!(error = %e, "failed to register functions with the control plane");
            StatusCode::BAD_GATEWAY.into_response()
        }
    }
}

#[derive(Debug, serde::Deserialize)]
struct RunQuery {
    #[serde(rename = "fnId")]
    fn_id: String,
    #[serde(rename = "stepId")]
    step_id: Option<String>,
}

async fn run_step(
    State(state): State<Arc<CommHandlerState>>,
    Query(query): Query<RunQuery>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Response {
    let mut timing = TracingState::new();

    let Some(function) = state.functions.get(&query.fn_id) else {
        return StatusCode::GONE.into_response();
    };

    let auth = AuthConfig::new(
        state.config.signing_key.clone(),
        state.config.signing_key_fallback.clone(),
        state.config.is_dev,
    );
    let signature_header = headers
        .get("X-Inngest-Signature")
        .and_then(|v| v.to_str().ok());
    let now = chrono::Utc::now().timestamp();
    if let Err(e) = verify_signature(&auth, signature_header, &body, now) {
        tracing::warn!(error = %e, "request signature verification failed");
        return StatusCode::UNAUTHORIZED.into_response();
    }
    timing.mark("auth");

    let req: ExecutionRequest = match serde_json::from_slice(&body) {
        Ok(req) => req,
        Err(e) => {
            tracing::warn!(error = %e, "malformed execution request body");
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    let attempt = req.ctx.attempt;
    let ctx = serde_json::json!({
        "event": req.event.clone(),
        "events": req.events.clone(),
        "runId": req.ctx.run_id.clone(),
        "attempt": attempt,
    });

    let steps = match req.into_steps() {
        Ok(steps) => steps,
        Err(e) => {
            tracing::warn!(error = %e, "failed to parse step state");
            return StatusCode::BAD_REQUEST.into_response();
        }
    };
    timing.mark("parse");

    let engine = Engine::new(
        ctx,
        attempt,
        steps,
        query.step_id,
        function.handler.clone(),
        state.middleware.clone(),
        state.config.step_not_found_timeout,
    );

    let request_info = RequestInfo {
        method: "POST".to_string(),
        path: format!("/?fnId={}", query.fn_id),
        headers: headers
            .iter()
            .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str().to_string(), v.to_string())))
            .collect(),
    };
    let guard = new_reentrancy_guard();
    let middleware = state.middleware.clone();
    let core: BoxFut<inngest_core::Result<ExecutionResult>> = Box::pin(engine.start());

    let result = match middleware.wrap_request(request_info, guard, core).await {
        Ok(result) => result,
        Err(e) => {
            tracing::error!(error = %e, "engine run failed");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    timing.mark("execute");

    into_http_response(result, &timing.header_value())
}
