use std::{
    collections::{HashMap, HashSet},
    sync::LazyLock,
};

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    BridgeError, Result,
    messages::PlanResult,
    model::{EdgeModel, NodeKind, NodeModel},
};

/// Node names double as identifiers inside user code.
const NODE_NAME_PATTERN: &str = r"^[A-Za-z_][A-Za-z0-9_]*$";

const PYTHON_KEYWORDS: [&str; 35] = [
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class", "continue", "def", "del", "elif", "else", "except", "finally", "for", "from",
    "global", "if", "import", "in", "is", "lambda", "nonlocal", "not", "or", "pass", "raise", "return", "try", "while", "with", "yield",
];

static NODE_NAME_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(NODE_NAME_PATTERN).unwrap());

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, strum::AsRefStr, strum::Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum GraphStatus {
    /// created, never executed
    #[default]
    New,
    /// loaded and ready to execute
    Active,
    /// retired, cannot be executed
    Archived,
}

impl GraphStatus {
    pub fn can_transition_to(
        &self,
        target: GraphStatus,
    ) -> bool {
        if *self == target {
            return true;
        }
        match self {
            GraphStatus::New => matches!(target, GraphStatus::Active | GraphStatus::Archived),
            GraphStatus::Active => target == GraphStatus::Archived,
            GraphStatus::Archived => false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphModel {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub tenant_id: String,
    #[serde(default)]
    pub status: GraphStatus,
    #[serde(default)]
    pub plans: Vec<NodeModel>,
    #[serde(default)]
    pub tasks: Vec<NodeModel>,
    #[serde(default)]
    pub edges: Vec<EdgeModel>,
}

impl GraphModel {
    pub fn from_json(s: &str) -> Result<Self> {
        let graph = serde_json::from_str::<GraphModel>(s);
        match graph {
            Ok(v) => Ok(v),
            Err(e) => Err(BridgeError::Graph(format!("{}", e))),
        }
    }

    pub fn plan(
        &self,
        name: &str,
    ) -> Option<&NodeModel> {
        self.plans.iter().find(|p| p.name == name)
    }

    pub fn task(
        &self,
        name: &str,
    ) -> Option<&NodeModel> {
        self.tasks.iter().find(|t| t.name == name)
    }

    pub fn node(
        &self,
        kind: NodeKind,
        name: &str,
    ) -> Option<&NodeModel> {
        match kind {
            NodeKind::Plan => self.plan(name),
            NodeKind::Task => self.task(name),
        }
    }

    /// Declared edges with duplicates removed, in declaration order.
    pub fn canonical_edges(&self) -> Vec<&EdgeModel> {
        let mut seen = HashSet::new();
        self.edges.iter().filter(|edge| seen.insert(*edge)).collect()
    }

    /// Tasks a plan is declared to fan out to.
    pub fn downstream_tasks(
        &self,
        plan_name: &str,
    ) -> Vec<&NodeModel> {
        self.canonical_edges()
            .into_iter()
            .filter(|e| e.is_plan_to_task() && e.from_name == plan_name)
            .filter_map(|e| self.task(&e.to_name))
            .collect()
    }

    pub fn upstream_plan(
        &self,
        task_name: &str,
    ) -> Option<&NodeModel> {
        self.canonical_edges()
            .into_iter()
            .find(|e| e.is_plan_to_task() && e.to_name == task_name)
            .and_then(|e| self.plan(&e.from_name))
    }

    /// Tasks whose results feed into a plan.
    pub fn upstream_tasks(
        &self,
        plan_name: &str,
    ) -> Vec<&NodeModel> {
        self.canonical_edges()
            .into_iter()
            .filter(|e| e.is_task_to_plan() && e.to_name == plan_name)
            .filter_map(|e| self.task(&e.from_name))
            .collect()
    }

    pub fn downstream_plans(
        &self,
        task_name: &str,
    ) -> Vec<&NodeModel> {
        self.canonical_edges()
            .into_iter()
            .filter(|e| e.is_task_to_plan() && e.from_name == task_name)
            .filter_map(|e| self.plan(&e.to_name))
            .collect()
    }

    /// Checks the graph's structure and reports every problem at once.
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();

        if self.name.trim().is_empty() {
            errors.push("Graph name cannot be empty".to_string());
        }
        self.validate_names(&mut errors);
        self.validate_edges(&mut errors);
        self.validate_upstream(&mut errors);
        self.validate_entry_points(&mut errors);

        debug!(graph = %self.id, errors = errors.len(), "validated graph");
        if errors.is_empty() {
            Ok(())
        } else {
            Err(BridgeError::Graph(errors.join("; ")))
        }
    }

    /// Checks the dynamic edge set a plan produced against this graph.
    pub fn check_next_tasks(
        &self,
        result: &PlanResult,
    ) -> Result<()> {
        let unknown: Vec<&str> = result.next_task_names.iter().filter(|name| self.task(name).is_none()).map(String::as_str).collect();
        if unknown.is_empty() {
            return Ok(());
        }
        Err(BridgeError::Graph(format!("Plan result references tasks not in graph '{}': {}", self.id, unknown.join(", "))))
    }

    fn nodes(&self) -> impl Iterator<Item = (NodeKind, &NodeModel)> {
        self.plans.iter().map(|p| (NodeKind::Plan, p)).chain(self.tasks.iter().map(|t| (NodeKind::Task, t)))
    }

    fn validate_names(
        &self,
        errors: &mut Vec<String>,
    ) {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for (_, node) in self.nodes() {
            let name = node.name.as_str();
            if name.trim().is_empty() {
                errors.push("Node name cannot be empty".to_string());
                continue;
            }
            if !NODE_NAME_RE.is_match(name) {
                errors.push(format!("Node name '{}' must start with a letter or underscore and contain only letters, digits, and underscores", name));
            } else if PYTHON_KEYWORDS.contains(&name) {
                errors.push(format!("Node name '{}' is a reserved keyword", name));
            }
            *counts.entry(name).or_default() += 1;
        }

        let mut duplicates: Vec<&str> = counts.into_iter().filter(|(_, n)| *n > 1).map(|(name, _)| name).collect();
        duplicates.sort();
        for name in duplicates {
            errors.push(format!("Node name '{}' is used multiple times in the graph", name));
        }
    }

    fn validate_edges(
        &self,
        errors: &mut Vec<String>,
    ) {
        for edge in self.canonical_edges() {
            if edge.from_name.trim().is_empty() || edge.to_name.trim().is_empty() {
                errors.push("Edge endpoints cannot be blank".to_string());
                continue;
            }
            if edge.from_type == edge.to_type {
                errors.push(format!("Edge '{}' -> '{}' must connect PLAN to TASK or TASK to PLAN", edge.from_name, edge.to_name));
                continue;
            }
            for (kind, name) in [(edge.from_type, &edge.from_name), (edge.to_type, &edge.to_name)] {
                if self.node(kind, name).is_none() {
                    errors.push(format!("{} '{}' references non-existent node", kind, name));
                }
            }
        }
    }

    fn validate_upstream(
        &self,
        errors: &mut Vec<String>,
    ) {
        let edges = self.canonical_edges();
        for task in &self.tasks {
            let upstream = edges.iter().filter(|e| e.is_plan_to_task() && e.to_name == task.name).count();
            match upstream {
                0 => errors.push(format!("Task '{}' has no upstream plan", task.name)),
                1 => {},
                _ => errors.push(format!("Task '{}' has multiple upstream plans", task.name)),
            }
        }
        for plan in &self.plans {
            if !edges.iter().any(|e| e.is_plan_to_task() && e.from_name == plan.name) {
                errors.push(format!("Plan '{}' does not feed into any tasks", plan.name));
            }
        }
    }

    fn validate_entry_points(
        &self,
        errors: &mut Vec<String>,
    ) {
        for (kind, node) in self.nodes() {
            if node.entry_point(kind).is_none() {
                errors.push(format!(
                    "{} '{}' has no entry point script, expected '{}.py' or '{}.js'",
                    kind,
                    node.name,
                    kind.mode().entry_point(),
                    kind.mode().entry_point()
                ));
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const GRAPH_JSON: &str = r#"
    {
        "id": "graph-1",
        "name": "research",
        "tenantId": "tenant-a",
        "status": "ACTIVE",
        "plans": [
            {"name": "Plan1", "label": "Fan out", "files": [{"name": "plan.py", "contents": "def plan(plan_input):\n    return PlanResult()\n"}]},
            {"name": "Plan2", "files": [{"name": "plan.js", "contents": "function plan(planInput) { return new PlanResult(); }"}]}
        ],
        "tasks": [
            {"name": "Task1A", "files": [{"name": "task.py", "contents": ""}, {"name": "requirements.txt", "contents": "requests\n"}]},
            {"name": "Task1B", "files": [{"name": "task.py", "contents": ""}]},
            {"name": "Task2", "files": [{"name": "task.py", "contents": ""}]}
        ],
        "edges": [
            {"fromName": "Plan1", "fromType": "PLAN", "toName": "Task1A", "toType": "TASK"},
            {"fromName": "Plan1", "fromType": "PLAN", "toName": "Task1B", "toType": "TASK"},
            {"fromName": "Task1A", "fromType": "TASK", "toName": "Plan2", "toType": "PLAN"},
            {"fromName": "Task1B", "fromType": "TASK", "toName": "Plan2", "toType": "PLAN"},
            {"fromName": "Plan2", "fromType": "PLAN", "toName": "Task2", "toType": "TASK"},
            {"fromName": "Task2", "fromType": "TASK", "toName": "Plan1", "toType": "PLAN"}
        ]
    }
    "#;

    fn graph() -> GraphModel {
        GraphModel::from_json(GRAPH_JSON).unwrap()
    }

    fn graph_error(graph: &GraphModel) -> String {
        match graph.validate() {
            Err(BridgeError::Graph(msg)) => msg,
            other => panic!("expected graph error, got {:?}", other),
        }
    }

    #[test]
    fn test_graph_from_json() {
        let graph = graph();
        assert_eq!(graph.tenant_id, "tenant-a");
        assert_eq!(graph.status, GraphStatus::Active);
        assert_eq!(graph.plans.len(), 2);
        assert_eq!(graph.tasks.len(), 3);
        assert_eq!(graph.plan("Plan1").unwrap().label, "Fan out");
    }

    #[test]
    fn test_graph_from_invalid_json() {
        assert!(matches!(GraphModel::from_json("{\"id\": 1}"), Err(BridgeError::Graph(_))));
    }

    #[test]
    fn test_validate_graph_with_cycle() {
        graph().validate().unwrap();
    }

    #[test]
    fn test_neighbours() {
        let graph = graph();
        let names = |nodes: Vec<&NodeModel>| nodes.into_iter().map(|n| n.name.clone()).collect::<Vec<_>>();
        assert_eq!(names(graph.downstream_tasks("Plan1")), vec!["Task1A", "Task1B"]);
        assert_eq!(graph.upstream_plan("Task2").unwrap().name, "Plan2");
        assert_eq!(names(graph.upstream_tasks("Plan2")), vec!["Task1A", "Task1B"]);
        assert_eq!(names(graph.downstream_plans("Task2")), vec!["Plan1"]);
        assert!(graph.upstream_plan("Missing").is_none());
    }

    #[test]
    fn test_duplicate_names() {
        let mut graph = graph();
        graph.tasks[2].name = "Plan1".to_string();
        assert!(graph_error(&graph).contains("Node name 'Plan1' is used multiple times"));
    }

    #[test]
    fn test_dangling_edge() {
        let mut graph = graph();
        graph.edges.push(EdgeModel::new("Plan1", NodeKind::Plan, "Ghost", NodeKind::Task));
        assert!(graph_error(&graph).contains("TASK 'Ghost' references non-existent node"));
    }

    #[test]
    fn test_edge_between_same_kinds() {
        let mut graph = graph();
        graph.edges.push(EdgeModel::new("Plan1", NodeKind::Plan, "Plan2", NodeKind::Plan));
        assert!(graph_error(&graph).contains("must connect PLAN to TASK or TASK to PLAN"));
    }

    #[test]
    fn test_task_with_multiple_upstream_plans() {
        let mut graph = graph();
        graph.edges.push(EdgeModel::new("Plan2", NodeKind::Plan, "Task1A", NodeKind::Task));
        assert!(graph_error(&graph).contains("Task 'Task1A' has multiple upstream plans"));
    }

    #[test]
    fn test_duplicate_edges_are_collapsed() {
        let mut graph = graph();
        graph.edges.push(EdgeModel::new("Plan1", NodeKind::Plan, "Task1A", NodeKind::Task));
        graph.validate().unwrap();
    }

    #[test]
    fn test_task_without_upstream_plan() {
        let mut graph = graph();
        graph.edges.retain(|e| e.to_name != "Task2");
        let msg = graph_error(&graph);
        assert!(msg.contains("Task 'Task2' has no upstream plan"));
        assert!(msg.contains("Plan 'Plan2' does not feed into any tasks"));
    }

    #[test]
    fn test_invalid_node_names() {
        let mut graph = graph();
        graph.tasks[0].name = "Task 1A".to_string();
        graph.tasks[1].name = "class".to_string();
        let msg = graph_error(&graph);
        assert!(msg.contains("Node name 'Task 1A' must start with a letter or underscore"));
        assert!(msg.contains("Node name 'class' is a reserved keyword"));
    }

    #[test]
    fn test_missing_entry_point() {
        let mut graph = graph();
        graph.tasks[1].files.clear();
        assert!(graph_error(&graph).contains("TASK 'Task1B' has no entry point script"));
    }

    #[test]
    fn test_check_next_tasks() {
        let graph = graph();
        let result = PlanResult {
            next_task_names: vec!["Task1A".to_string(), "Task1B".to_string()],
            ..Default::default()
        };
        graph.check_next_tasks(&result).unwrap();

        let result = PlanResult {
            next_task_names: vec!["Task1A".to_string(), "Plan2".to_string(), "Nope".to_string()],
            ..Default::default()
        };
        let err = graph.check_next_tasks(&result).unwrap_err();
        assert!(matches!(err, BridgeError::Graph(msg) if msg.ends_with("Plan2, Nope")));
    }

    #[test]
    fn test_status_transitions() {
        assert!(GraphStatus::New.can_transition_to(GraphStatus::Active));
        assert!(GraphStatus::New.can_transition_to(GraphStatus::Archived));
        assert!(GraphStatus::Active.can_transition_to(GraphStatus::Archived));
        assert!(GraphStatus::Archived.can_transition_to(GraphStatus::Archived));
        assert!(!GraphStatus::Active.can_transition_to(GraphStatus::New));
        assert!(!GraphStatus::Archived.can_transition_to(GraphStatus::Active));
    }
}
