//! 规划执行控制环的各节点：Planner / Executor / Approval Handler / Replanner / Formatter
//!
//! 每个节点只读写 RunState，不向外抛错：故障折叠进 needs_replan / error，由路由决定下一步。

pub mod approval;
pub mod args;
pub mod executor;
pub mod extract;
pub mod formatter;
pub mod planner;
pub mod replanner;

pub use approval::{keyword_decision, ApprovalDecision, ApprovalHandler};
pub use args::{resolve_args, resolve_available_args};
pub use executor::Executor;
pub use extract::{extract_json, first_json_span, parse_json};
pub use formatter::{summarize_results, Formatter};
pub use planner::Planner;
pub use replanner::Replanner;
