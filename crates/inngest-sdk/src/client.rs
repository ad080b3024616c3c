//! The `Inngest` client: holds configuration, registered middleware and
//! functions, and builds the comm handler that serves them (spec §2, §4.5).

use std::collections::HashMap;
use std::sync::Arc;

use inngest_core::{EventPayload, ExecutionState, InngestConfig};
use inngest_runtime::middleware::new_reentrancy_guard;
use inngest_runtime::{BoxFut, CommHandler, CommHandlerState, Middleware, MiddlewarePipeline, RegisteredFunction};

use crate::context::Context;
use crate::error::to_serialized;
use crate::events::send_events;
use crate::function::Function;
use crate::steps::StepTools;

/// The SDK's entry point: configure once, register functions, then mount
/// the resulting [`CommHandler`]'s router in a host web framework.
pub struct Inngest {
    app_id: String,
    config: Arc<InngestConfig>,
    middlewares: Vec<Arc<dyn Middleware>>,
    http: reqwest::Client,
    functions: Vec<Function>,
}

impl Inngest {
    /// Build a client from `INNGEST_*` environment variables.
    pub fn new(app_id: impl Into<String>) -> Self {
        Self::with_config(app_id, InngestConfig::from_env())
    }

    pub fn with_config(app_id: impl Into<String>, config: InngestConfig) -> Self {
        Self {
            app_id: app_id.into(),
            config: Arc::new(config),
            middlewares: Vec::new(),
            http: reqwest::Client::new(),
            functions: Vec::new(),
        }
    }

    pub fn config(&self) -> &InngestConfig {
        &self.config
    }

    /// Register a middleware. Earlier registrations are outermost in the
    /// `wrap*` onion (spec §4.3).
    pub fn middleware(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middlewares.push(middleware);
        self
    }

    fn pipeline(&self) -> MiddlewarePipeline {
        MiddlewarePipeline::new(self.middlewares.clone())
    }

    /// Register a function. Call once per function before building the
    /// comm handler.
    pub fn register(mut self, function: Function) -> Self {
        self.functions.push(function);
        self
    }

    /// Send one or more events through the configured event key,
    /// independent of any step tooling (spec §4.2 `sendEvent`, used
    /// outside a handler).
    pub async fn send_event(&self, events: Vec<EventPayload>) -> inngest_core::Result<Vec<String>> {
        let pipeline = self.pipeline();
        let events = pipeline.transform_send_event(events).await?;
        let guard = new_reentrancy_guard();
        let http = self.http.clone();
        let base_url = self.config.base_url.clone();
        let event_key = self.config.event_key.clone();
        let core: BoxFut<inngest_core::Result<Vec<String>>> = Box::pin({
            let events = events.clone();
            async move { send_events(&http, &base_url, event_key.as_deref(), &events).await }
        });
        pipeline.wrap_send_event(events, guard, core).await
    }

    /// Build the Axum-backed [`CommHandler`] serving every registered
    /// function at `serve_origin` (the externally-reachable URL the
    /// Executor will call back).
    pub fn comm_handler(&self, serve_origin: impl Into<String>) -> CommHandler {
        let functions = self
            .functions
            .iter()
            .map(|f| (f.id.clone(), self.to_registered(f)))
            .collect::<HashMap<_, _>>();

        let state = CommHandlerState {
            config: (*self.config).clone(),
            app_id: self.app_id.clone(),
            serve_origin: serve_origin.into(),
            functions,
            middleware: self.pipeline(),
        };
        CommHandler::new(state)
    }

    fn to_registered(&self, function: &Function) -> RegisteredFunction {
        let middleware = self.pipeline();
        let http = self.http.clone();
        let base_url = self.config.base_url.clone();
        let event_key = self.config.event_key.clone();
        let handler = function.handler.clone();

        let raw: inngest_runtime::HandlerFn = Arc::new(move |ctx, state: Arc<ExecutionState>| {
            let handler = handler.clone();
            let middleware = middleware.clone();
            let http = http.clone();
            let base_url = base_url.clone();
            let event_key = event_key.clone();
            Box::pin(async move {
                let context: Context = serde_json::from_value(ctx)
                    .map_err(|e| inngest_core::SerializedError::new("Error", format!("malformed context: {e}")))?;
                let tools = StepTools::new(state, middleware, http, base_url, event_key);
                let output = handler(context, tools).await;
                output.map_err(to_serialized)
            })
        });

        RegisteredFunction {
            id: function.id.clone(),
            name: function.name.clone(),
            triggers: function.triggers.clone(),
            config: function.config.clone(),
            handler: raw,
        }
    }
}
