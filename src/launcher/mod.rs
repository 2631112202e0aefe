//! Orchestrator-side launching of bridge processes.
//!
//! Each node invocation gets its own working directory and its own bridge
//! process. The launcher only supervises: scheduling, retries and execution
//! persistence belong to the caller.

mod materialize;
mod process;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    BridgeError,
    messages::{PlanInput, PlanResult, TaskInput, TaskResult},
    model::{NodeKind, NodeModel},
};

pub use materialize::{MaterializedNode, Materializer};
pub use process::ProcessLauncher;

/// Longest error message kept on an execution record.
pub const MAX_ERROR_MESSAGE_LEN: usize = 1000;

/// Where an invocation runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub tenant_id: String,
    pub graph_id: String,
    pub lifetime_id: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, strum::AsRefStr, strum::Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Succeeded,
    Failed,
}

/// Outcome of one node invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeExecution<R> {
    pub exec_id: String,
    pub node_name: String,
    pub kind: NodeKind,
    pub context: ExecutionContext,
    pub status: ExecutionStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub result: Option<R>,
    pub error: Option<BridgeError>,
    /// error text, truncated to [`MAX_ERROR_MESSAGE_LEN`] characters
    pub error_message: Option<String>,
}

impl<R> NodeExecution<R> {
    pub(crate) fn finish(
        exec_id: String,
        node: &NodeModel,
        kind: NodeKind,
        context: &ExecutionContext,
        started_at: DateTime<Utc>,
        outcome: crate::Result<R>,
    ) -> Self {
        let (status, result, error) = match outcome {
            Ok(result) => (ExecutionStatus::Succeeded, Some(result), None),
            Err(err) => (ExecutionStatus::Failed, None, Some(err)),
        };
        let error_message = error.as_ref().map(compact_error_message);

        Self {
            exec_id,
            node_name: node.name.clone(),
            kind,
            context: context.clone(),
            status,
            started_at,
            completed_at: Utc::now(),
            result,
            error,
            error_message,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Succeeded
    }
}

fn compact_error_message(error: &BridgeError) -> String {
    let message = error.to_string();
    if message.trim().is_empty() {
        return error.class().to_string();
    }
    message.chars().take(MAX_ERROR_MESSAGE_LEN).collect()
}

/// Runs plan and task nodes to completion.
#[async_trait]
pub trait NodeExecutor: Send + Sync {
    async fn execute_plan(
        &self,
        ctx: &ExecutionContext,
        node: &NodeModel,
        input: PlanInput,
    ) -> NodeExecution<PlanResult>;

    async fn execute_task(
        &self,
        ctx: &ExecutionContext,
        node: &NodeModel,
        input: TaskInput,
    ) -> NodeExecution<TaskResult>;
}

#[cfg(test)]
mod test {
    use super::*;

    fn node() -> NodeModel {
        NodeModel {
            name: "Plan1".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_finish_success() {
        let execution = NodeExecution::finish(
            "exec-1".to_string(),
            &node(),
            NodeKind::Plan,
            &ExecutionContext::default(),
            Utc::now(),
            Ok(PlanResult::default()),
        );
        assert!(execution.is_success());
        assert_eq!(execution.result, Some(PlanResult::default()));
        assert!(execution.error_message.is_none());
        assert!(execution.completed_at >= execution.started_at);
    }

    #[test]
    fn test_finish_failure_truncates_message() {
        let execution = NodeExecution::<PlanResult>::finish(
            "exec-1".to_string(),
            &node(),
            NodeKind::Plan,
            &ExecutionContext::default(),
            Utc::now(),
            Err(BridgeError::Execution("x".repeat(5000))),
        );
        assert_eq!(execution.status, ExecutionStatus::Failed);
        assert!(execution.result.is_none());
        assert_eq!(execution.error_message.unwrap().chars().count(), MAX_ERROR_MESSAGE_LEN);
        assert!(matches!(execution.error, Some(BridgeError::Execution(_))));
    }
}
