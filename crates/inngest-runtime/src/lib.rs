pub mod engine;
pub mod gateway;
pub mod middleware;

pub use engine::{Engine, HandlerFn, HandlerOutcome};
pub use gateway::{CommHandler, CommHandlerState, RegisteredFunction};
pub use middleware::{
    BoxFut, ExecutionResult, FunctionInputTransform, Middleware, MiddlewarePipeline, RequestInfo,
    StepTransformInput,
};
