//! inngest-sdk: the public-facing crate for writing durable functions.
//!
//! Build an [`Inngest`] client, register functions built with
//! [`FunctionBuilder`], and mount the resulting comm handler in a host web
//! framework. Inside a handler, [`StepTools`] exposes `run`, `sleep`,
//! `sleep_until`, `wait_for_event`, `invoke` and `send_event` — each a
//! suspension point in the replay/discovery loop (spec §4).

mod client;
mod context;
mod error;
mod events;
mod function;
mod steps;

pub use client::Inngest;
pub use context::Context;
pub use error::StepError;
pub use function::{Function, FunctionBuilder, HandlerOutput};
pub use steps::{parallel, InvokeOpts, StepTools, WaitForEventOpts};

/// Re-exports covering a typical handler: the client, builder, step tools
/// and the core/runtime types their signatures reference.
pub mod prelude {
    pub use chrono::{DateTime, Utc};

    pub use inngest_core::{EventPayload, InngestConfig};
    pub use inngest_runtime::gateway::{FunctionConfig, Trigger};
    pub use inngest_runtime::{BoxFut, CommHandler, Middleware};

    pub use crate::{
        parallel, Context, Function, FunctionBuilder, HandlerOutput, Inngest, InvokeOpts, StepError, StepTools,
        WaitForEventOpts,
    };
}
