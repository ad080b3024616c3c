pub mod config;
pub mod error;
pub mod execution_state;
pub mod identity;
pub mod model;
pub mod step;
pub mod time;

// Testing utilities - available when the "testing" feature is enabled or in test mode
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use config::InngestConfig;
pub use error::{InngestError, Result};
pub use execution_state::{checkpoint_channel, Checkpoint, CheckpointReceiver, CheckpointSender, ExecutionState};
pub use identity::{hash_step_id, StepIdAllocator};
pub use model::{EventPayload, IncomingOp, OpCode, OutgoingOp, SerializedError, StepValue};
pub use step::{FoundStep, HandlerSlot, StepInfo, StepKind, StepOptions, StepOutcome};
pub use time::parse_duration_string;
