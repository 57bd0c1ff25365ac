//! 路由：节点类型与纯转移函数
//!
//! `next(after, state)` 只读 RunState，按固定优先级决定下一个节点：
//! error > awaiting_approval > needs_replan > execution_complete > 计划耗尽 > 继续执行。

use serde::Serialize;

use crate::core::RunState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Node {
    Planner,
    ApprovalHandler,
    Executor,
    Replanner,
    Formatter,
    /// 等待用户审批：状态外置，本次调用结束
    Suspend,
    End,
}

impl Node {
    pub fn is_terminal(self) -> bool {
        matches!(self, Node::Suspend | Node::End)
    }
}

/// 入口：从审批暂停恢复的状态交给 Approval Handler，否则从 Planner 开始
pub fn entry(state: &RunState) -> Node {
    if state.awaiting_approval {
        Node::ApprovalHandler
    } else {
        Node::Planner
    }
}

fn after_executor(state: &RunState) -> Node {
    if state.error.is_some() {
        Node::Formatter
    } else if state.awaiting_approval {
        Node::Suspend
    } else if state.needs_replan {
        Node::Replanner
    } else if state.execution_complete || state.plan_exhausted() {
        Node::Formatter
    } else {
        Node::Executor
    }
}

pub fn next(after: Node, state: &RunState) -> Node {
    match after {
        Node::Planner => {
            if state.error.is_some() {
                Node::Formatter
            } else if state.awaiting_approval {
                Node::Suspend
            } else {
                Node::Executor
            }
        }
        Node::ApprovalHandler => {
            if state.awaiting_approval {
                Node::Suspend
            } else if state.error.is_some() || state.execution_complete {
                Node::Formatter
            } else {
                Node::Executor
            }
        }
        Node::Executor => after_executor(state),
        Node::Replanner => {
            if state.error.is_some() || state.execution_complete {
                Node::Formatter
            } else {
                Node::Executor
            }
        }
        Node::Formatter | Node::Suspend | Node::End => Node::End,
    }
}
