use serde::{Deserialize, Serialize};

use super::Envelope;
use crate::{BridgeError, Result};

/// Placeholder substituted by [`FallbackIdPolicy`].
pub const TASK_NAME_PLACEHOLDER: &str = "{task_name}";

const DEFAULT_FALLBACK_TEMPLATE: &str = "{task_name}-result";

/// Input handed to a task's entry point.
#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TaskInput {
    /// May be empty, in which case the task falls back to a derived id.
    #[prost(string, tag = "1")]
    pub input_id: String,
    #[prost(string, tag = "2")]
    pub graph_id: String,
    #[prost(string, tag = "3")]
    pub lifetime_id: String,
    #[prost(string, tag = "4")]
    pub task_name: String,
    #[prost(string, tag = "5")]
    pub parent_plan_name: String,
    #[prost(string, tag = "6")]
    pub parent_plan_exec_id: String,
}

impl Envelope for TaskInput {
    const TYPE_URL: &'static str = "type.googleapis.com/planbridge.v1.TaskInput";
}

/// Output of a task.
#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TaskResult {
    #[prost(string, tag = "1")]
    pub id: String,
    #[prost(string, tag = "2")]
    pub error_message: String,
}

impl Envelope for TaskResult {
    const TYPE_URL: &'static str = "type.googleapis.com/planbridge.v1.TaskResult";
}

/// Derives the id a task reports when its input carries no `input_id`.
///
/// The template must contain `{task_name}`, which keeps the derived id
/// stable per task name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FallbackIdPolicy {
    template: String,
}

impl Default for FallbackIdPolicy {
    fn default() -> Self {
        Self {
            template: DEFAULT_FALLBACK_TEMPLATE.to_string(),
        }
    }
}

impl FallbackIdPolicy {
    pub fn new(template: impl Into<String>) -> Result<Self> {
        let template = template.into();
        if !template.contains(TASK_NAME_PLACEHOLDER) {
            return Err(BridgeError::Config(format!(
                "fallback id template '{template}' must contain {TASK_NAME_PLACEHOLDER}"
            )));
        }
        Ok(Self {
            template,
        })
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    /// Renders the fallback id for `task_name`.
    pub fn render(
        &self,
        task_name: &str,
    ) -> String {
        self.template.replace(TASK_NAME_PLACEHOLDER, task_name)
    }

    /// Returns the input's id, or the fallback when it is empty.
    pub fn resolve(
        &self,
        input: &TaskInput,
    ) -> String {
        if input.input_id.is_empty() {
            self.render(&input.task_name)
        } else {
            input.input_id.clone()
        }
    }
}

impl TryFrom<String> for FallbackIdPolicy {
    type Error = BridgeError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<FallbackIdPolicy> for String {
    fn from(val: FallbackIdPolicy) -> Self {
        val.template
    }
}
