//! The function builder: a fluent API over `inngest_runtime::gateway`'s
//! registration types, producing the user-facing [`Function`] a client
//! registers with [`crate::client::Inngest`].

use std::future::Future;
use std::sync::Arc;

use inngest_runtime::gateway::{FunctionConfig, Trigger};
use inngest_runtime::BoxFut;

use crate::context::Context;
use crate::error::StepError;
use crate::steps::StepTools;

pub type HandlerOutput = std::result::Result<serde_json::Value, StepError>;
pub(crate) type UserHandler = Arc<dyn Fn(Context, StepTools) -> BoxFut<HandlerOutput> + Send + Sync>;

/// A registered function: triggers, scheduling config, and the handler
/// closure, ready to be handed to [`crate::client::Inngest::register`].
pub struct Function {
    pub(crate) id: String,
    pub(crate) name: String,
    pub(crate) triggers: Vec<Trigger>,
    pub(crate) config: FunctionConfig,
    pub(crate) handler: UserHandler,
}

/// Builds a [`Function`] fluently, mirroring how `step.run`'s options are
/// assembled in the teacher's builder-pattern APIs (`ForgeBuilder`,
/// `ParallelBuilder`).
pub struct FunctionBuilder {
    id: String,
    name: Option<String>,
    triggers: Vec<Trigger>,
    config: FunctionConfig,
}

impl FunctionBuilder {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            triggers: Vec::new(),
            config: FunctionConfig::default(),
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn trigger_event(mut self, event: impl Into<String>) -> Self {
        self.triggers.push(Trigger::Event { event: event.into(), condition: None });
        self
    }

    pub fn trigger_event_if(mut self, event: impl Into<String>, condition: impl Into<String>) -> Self {
        self.triggers.push(Trigger::Event { event: event.into(), condition: Some(condition.into()) });
        self
    }

    pub fn trigger_cron(mut self, cron: impl Into<String>) -> Self {
        self.triggers.push(Trigger::Cron { cron: cron.into() });
        self
    }

    pub fn retries(mut self, retries: u32) -> Self {
        self.config.retries = Some(retries);
        self
    }

    pub fn concurrency(mut self, value: serde_json::Value) -> Self {
        self.config.concurrency = Some(value);
        self
    }

    pub fn rate_limit(mut self, value: serde_json::Value) -> Self {
        self.config.rate_limit = Some(value);
        self
    }

    pub fn throttle(mut self, value: serde_json::Value) -> Self {
        self.config.throttle = Some(value);
        self
    }

    pub fn singleton(mut self, value: serde_json::Value) -> Self {
        self.config.singleton = Some(value);
        self
    }

    pub fn debounce(mut self, value: serde_json::Value) -> Self {
        self.config.debounce = Some(value);
        self
    }

    pub fn timeouts(mut self, value: serde_json::Value) -> Self {
        self.config.timeouts = Some(value);
        self
    }

    pub fn priority(mut self, value: serde_json::Value) -> Self {
        self.config.priority = Some(value);
        self
    }

    pub fn cancel_on(mut self, value: serde_json::Value) -> Self {
        self.config.cancel_on = Some(value);
        self
    }

    /// Finish the builder, providing the async handler. Its return value is
    /// serialized as the function's final result; a returned
    /// [`StepError`] rejects the run (non-retriably if constructed via
    /// `StepError::non_retriable`).
    pub fn handle<F, Fut>(self, handler: F) -> Function
    where
        F: Fn(Context, StepTools) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerOutput> + Send + 'static,
    {
        let id = self.id.clone();
        Function {
            name: self.name.unwrap_or(id),
            id: self.id,
            triggers: self.triggers,
            config: self.config,
            handler: Arc::new(move |ctx, tools| Box::pin(handler(ctx, tools))),
        }
    }
}
