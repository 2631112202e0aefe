use serde::{Deserialize, Serialize};

use super::Envelope;

/// Input handed to a plan's entry point.
#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlanInput {
    #[prost(string, tag = "1")]
    pub input_id: String,
    #[prost(string, tag = "2")]
    pub graph_id: String,
    #[prost(string, tag = "3")]
    pub lifetime_id: String,
    #[prost(string, tag = "4")]
    pub plan_name: String,
    /// Names of the upstream tasks whose completion triggered this plan.
    #[prost(string, repeated, tag = "5")]
    pub parent_task_names: Vec<String>,
    #[prost(string, repeated, tag = "6")]
    pub parent_task_exec_ids: Vec<String>,
}

impl Envelope for PlanInput {
    const TYPE_URL: &'static str = "type.googleapis.com/planbridge.v1.PlanInput";
}

/// Output of a plan: the task nodes to fan out to, in order.
///
/// `next_task_names` is the dynamic edge set discovered at run time and is
/// authoritative over the graph's declared edges.
#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlanResult {
    #[prost(string, repeated, tag = "1")]
    pub next_task_names: Vec<String>,
    #[prost(string, tag = "2")]
    pub error_message: String,
}

impl Envelope for PlanResult {
    const TYPE_URL: &'static str = "type.googleapis.com/planbridge.v1.PlanResult";
}
