//! 工作流：类型化的有限状态机（Node + 纯转移函数）与驱动它的引擎

pub mod engine;
pub mod route;

pub use engine::{RunOutcome, Workflow};
pub use route::{entry, next, Node};
