//! 核心层：错误类型与 Run State

pub mod error;
pub mod state;

pub use error::AgentError;
pub use state::{PendingAction, PlanStep, RunState, StepResults};
