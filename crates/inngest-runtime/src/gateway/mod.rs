mod auth;
mod registration;
mod request;
mod response;
mod server;
mod tracing;

pub use auth::{sign, verify_signature, AuthConfig, MAX_SIGNATURE_AGE_SECS};
pub use registration::{FunctionConfig, FunctionManifest, RegisterRequest, Trigger};
pub use request::{ExecutionRequest, RunCtx, RunStack};
pub use response::into_http_response;
pub use server::{CommHandler, CommHandlerState, RegisteredFunction};
pub use tracing::TracingState;
