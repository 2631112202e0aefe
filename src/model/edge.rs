use serde::{Deserialize, Serialize};

use super::NodeKind;

/// A declared edge. Only used for validation and visualization; plan
/// results decide fan-out at run time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeModel {
    pub from_name: String,
    pub from_type: NodeKind,
    pub to_name: String,
    pub to_type: NodeKind,
}

impl EdgeModel {
    pub fn new(
        from_name: impl Into<String>,
        from_type: NodeKind,
        to_name: impl Into<String>,
        to_type: NodeKind,
    ) -> Self {
        Self {
            from_name: from_name.into(),
            from_type,
            to_name: to_name.into(),
            to_type,
        }
    }

    pub fn is_plan_to_task(&self) -> bool {
        self.from_type == NodeKind::Plan && self.to_type == NodeKind::Task
    }

    pub fn is_task_to_plan(&self) -> bool {
        self.from_type == NodeKind::Task && self.to_type == NodeKind::Plan
    }
}
