mod hooks;
mod pipeline;

pub use hooks::{BoxFut, ExecutionResult, FunctionInputTransform, Middleware, RequestInfo, StepTransformInput};
pub use pipeline::{function_input, new_reentrancy_guard, outgoing_planned, MiddlewarePipeline, ReentrancyGuard};
