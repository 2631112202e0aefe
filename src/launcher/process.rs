use std::{path::PathBuf, process::Stdio, time::Duration};

use async_trait::async_trait;
use chrono::Utc;
use tokio::{io::AsyncWriteExt, process::Command};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    BridgeError, Result,
    config::LauncherConfig,
    messages::{Envelope, PlanInput, PlanResult, TaskInput, TaskResult},
    model::{NodeKind, NodeModel},
    runtime::{Contract, Mode, PlanContract, TaskContract},
};

use super::{ExecutionContext, MaterializedNode, Materializer, NodeExecution, NodeExecutor};

/// Runs every invocation in a fresh `planbridge` child process.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    command: PathBuf,
    timeout: Duration,
    materializer: Materializer,
}

impl ProcessLauncher {
    pub fn new(config: &LauncherConfig) -> Self {
        Self {
            command: config.command.clone(),
            timeout: config.timeout(),
            materializer: Materializer::new(config.working_root()),
        }
    }

    pub fn materializer(&self) -> &Materializer {
        &self.materializer
    }

    async fn execute<C: Contract>(
        &self,
        ctx: &ExecutionContext,
        node: &NodeModel,
        input: C::Input,
    ) -> NodeExecution<C::Output> {
        let exec_id = Uuid::new_v4().to_string();
        let kind = NodeKind::from(C::MODE);
        let started_at = Utc::now();
        info!(graph = %ctx.graph_id, lifetime = %ctx.lifetime_id, node = %node.name, %exec_id, "executing {}", kind);

        let outcome = async {
            let materialized = self.materializer.materialize(node, kind, ctx, &exec_id)?;
            let stdout = self.run_bridge(C::MODE, &materialized, &ctx.tenant_id, input.to_base64()).await?;
            C::Output::from_base64(&stdout)
        }
        .await;

        if let Err(err) = &outcome {
            warn!(node = %node.name, %exec_id, class = err.class(), "{}", err);
        }
        NodeExecution::finish(exec_id, node, kind, ctx, started_at, outcome)
    }

    /// Spawns the bridge, feeds it `payload` and returns its trimmed stdout.
    async fn run_bridge(
        &self,
        mode: Mode,
        node: &MaterializedNode,
        tenant_id: &str,
        payload: String,
    ) -> Result<String> {
        let mut child = Command::new(&self.command)
            .arg("--mode")
            .arg(mode.as_ref())
            .arg("--script")
            .arg(&node.script_path)
            .current_dir(&node.working_dir)
            .env("TENANT_ID", tenant_id)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| BridgeError::Launch(format!("failed to start {}: {}", self.command.display(), e)))?;

        let mut stdin = child.stdin.take().ok_or_else(|| BridgeError::Launch("bridge stdin is not piped".to_string()))?;
        let run = async move {
            // a bridge that fails to load exits without reading stdin
            if let Err(e) = stdin.write_all(payload.as_bytes()).await {
                debug!("bridge closed stdin early: {}", e);
            }
            drop(stdin);
            child.wait_with_output().await
        };

        // dropping the timed-out future kills the child
        let output = match tokio::time::timeout(self.timeout, run).await {
            Ok(output) => output?,
            Err(_) => {
                return Err(BridgeError::Aborted(format!(
                    "{} bridge timed out after {} seconds",
                    mode,
                    self.timeout.as_secs()
                )));
            },
        };

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if !output.status.success() {
            return Err(match output.status.code() {
                Some(code) => BridgeError::from_exit_code(code, stderr),
                None => BridgeError::Aborted(format!("bridge was terminated by a signal: {}", stderr)),
            });
        }

        let stdout = String::from_utf8(output.stdout)?;
        let stdout = stdout.trim();
        if stdout.is_empty() {
            return Err(BridgeError::Launch("bridge produced empty output".to_string()));
        }
        Ok(stdout.to_string())
    }
}

#[async_trait]
impl NodeExecutor for ProcessLauncher {
    async fn execute_plan(
        &self,
        ctx: &ExecutionContext,
        node: &NodeModel,
        input: PlanInput,
    ) -> NodeExecution<PlanResult> {
        self.execute::<PlanContract>(ctx, node, input).await
    }

    async fn execute_task(
        &self,
        ctx: &ExecutionContext,
        node: &NodeModel,
        input: TaskInput,
    ) -> NodeExecution<TaskResult> {
        self.execute::<TaskContract>(ctx, node, input).await
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::FileModel;

    #[tokio::test]
    async fn test_missing_command_is_launch_error() {
        let root = tempfile::tempdir().unwrap();
        let config = LauncherConfig {
            command: PathBuf::from("/nonexistent/planbridge"),
            timeout_secs: 5,
            working_root: Some(root.path().to_path_buf()),
        };
        let node = NodeModel {
            name: "Task1A".to_string(),
            label: String::new(),
            files: vec![FileModel {
                name: "task.py".to_string(),
                contents: "def task(t):\n    return TaskResult()\n".to_string(),
            }],
        };

        let execution = ProcessLauncher::new(&config).execute_task(&ExecutionContext::default(), &node, TaskInput::default()).await;
        assert!(!execution.is_success());
        assert!(matches!(execution.error, Some(BridgeError::Launch(_))));
        assert_eq!(execution.kind, NodeKind::Task);
    }

    #[tokio::test]
    async fn test_materialize_failure_is_recorded() {
        let root = tempfile::tempdir().unwrap();
        let config = LauncherConfig {
            working_root: Some(root.path().to_path_buf()),
            ..Default::default()
        };
        let node = NodeModel {
            name: "Plan1".to_string(),
            ..Default::default()
        };

        let execution = ProcessLauncher::new(&config).execute_plan(&ExecutionContext::default(), &node, PlanInput::default()).await;
        assert!(matches!(execution.error, Some(BridgeError::Launch(msg)) if msg.contains("no entry point")));
        assert_eq!(execution.node_name, "Plan1");
    }
}
