use std::{
    fs,
    path::{Component, Path, PathBuf},
    sync::LazyLock,
};

use regex::Regex;
use tracing::debug;

use crate::{
    BridgeError, Result,
    model::{NodeKind, NodeModel},
};

use super::ExecutionContext;

static UNSAFE_SEGMENT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^A-Za-z0-9._-]").unwrap());

/// A node's files written out for one execution.
#[derive(Debug, Clone, PartialEq)]
pub struct MaterializedNode {
    pub exec_id: String,
    pub working_dir: PathBuf,
    pub script_path: PathBuf,
}

/// Writes node files into per-execution working directories.
#[derive(Debug, Clone)]
pub struct Materializer {
    working_root: PathBuf,
}

impl Materializer {
    pub fn new(working_root: impl Into<PathBuf>) -> Self {
        Self {
            working_root: working_root.into(),
        }
    }

    pub fn working_root(&self) -> &Path {
        &self.working_root
    }

    /// Directory used for `exec_id` of `node`:
    /// `<root>/<tenant>/<graph>/<plan|task>/<node>/<exec_id>`.
    pub fn working_dir(
        &self,
        node: &NodeModel,
        kind: NodeKind,
        ctx: &ExecutionContext,
        exec_id: &str,
    ) -> PathBuf {
        self.working_root
            .join(sanitize_segment(&ctx.tenant_id))
            .join(sanitize_segment(&ctx.graph_id))
            .join(kind.dir_name())
            .join(sanitize_segment(&node.name))
            .join(sanitize_segment(exec_id))
    }

    pub fn materialize(
        &self,
        node: &NodeModel,
        kind: NodeKind,
        ctx: &ExecutionContext,
        exec_id: &str,
    ) -> Result<MaterializedNode> {
        let entry = node
            .entry_point(kind)
            .ok_or_else(|| BridgeError::Launch(format!("{} '{}' has no entry point script", kind, node.name)))?;

        let working_dir = self.working_dir(node, kind, ctx, exec_id);
        fs::create_dir_all(&working_dir)?;

        for file in node.sorted_files() {
            let path = resolve_safe_path(&working_dir, &file.name)?;
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&path, file.contents.as_bytes())?;
        }

        let script_path = resolve_safe_path(&working_dir, &entry.name)?;
        if !script_path.is_file() {
            return Err(BridgeError::Launch(format!("Resolved script '{}' was not materialized for {}", entry.name, kind)));
        }

        debug!(
            tenant = %ctx.tenant_id,
            graph = %ctx.graph_id,
            lifetime = %ctx.lifetime_id,
            %kind,
            node = %node.name,
            working_dir = %working_dir.display(),
            "materialized node"
        );

        Ok(MaterializedNode {
            exec_id: exec_id.to_string(),
            working_dir,
            script_path,
        })
    }
}

/// Replaces anything outside `[A-Za-z0-9._-]` with `_`.
pub(crate) fn sanitize_segment(value: &str) -> String {
    let sanitized = UNSAFE_SEGMENT_RE.replace_all(value, "_").to_string();
    match sanitized.as_str() {
        "" | "." | ".." => "_".to_string(),
        _ => sanitized,
    }
}

/// Joins a relative file name onto `base`, refusing anything that leaves it.
pub(crate) fn resolve_safe_path(
    base: &Path,
    file_name: &str,
) -> Result<PathBuf> {
    let illegal = || BridgeError::Launch(format!("Illegal file path outside working directory: {}", file_name));

    let mut relative = PathBuf::new();
    for component in Path::new(file_name).components() {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::CurDir => {},
            Component::ParentDir => {
                if !relative.pop() {
                    return Err(illegal());
                }
            },
            Component::RootDir | Component::Prefix(_) => return Err(illegal()),
        }
    }
    if relative.as_os_str().is_empty() {
        return Err(illegal());
    }
    Ok(base.join(relative))
}

#[cfg(test)]
mod test {
    use std::fs;

    use super::*;
    use crate::model::FileModel;

    fn ctx() -> ExecutionContext {
        ExecutionContext {
            tenant_id: "tenant/a".to_string(),
            graph_id: "graph-1".to_string(),
            lifetime_id: "life-1".to_string(),
        }
    }

    fn node(files: &[(&str, &str)]) -> NodeModel {
        NodeModel {
            name: "Task1A".to_string(),
            label: String::new(),
            files: files
                .iter()
                .map(|(name, contents)| FileModel {
                    name: name.to_string(),
                    contents: contents.to_string(),
                })
                .collect(),
        }
    }

    #[test]
    fn test_sanitize_segment() {
        assert_eq!(sanitize_segment("tenant/a b"), "tenant_a_b");
        assert_eq!(sanitize_segment("graph-1.v2"), "graph-1.v2");
        assert_eq!(sanitize_segment(".."), "_");
        assert_eq!(sanitize_segment(""), "_");
    }

    #[test]
    fn test_resolve_safe_path() {
        let base = Path::new("/work");
        assert_eq!(resolve_safe_path(base, "src/./task.py").unwrap(), PathBuf::from("/work/src/task.py"));
        assert_eq!(resolve_safe_path(base, "src/../task.py").unwrap(), PathBuf::from("/work/task.py"));
        assert!(matches!(resolve_safe_path(base, "../escape.py"), Err(BridgeError::Launch(_))));
        assert!(matches!(resolve_safe_path(base, "/etc/passwd"), Err(BridgeError::Launch(_))));
        assert!(matches!(resolve_safe_path(base, "."), Err(BridgeError::Launch(_))));
    }

    #[test]
    fn test_materialize_writes_files() {
        let root = tempfile::tempdir().unwrap();
        let materializer = Materializer::new(root.path());
        let node = node(&[("task.py", "def task(t):\n    pass\n"), ("lib/helper.py", "X = 1\n"), ("requirements.txt", "")]);

        let materialized = materializer.materialize(&node, NodeKind::Task, &ctx(), "exec-1").unwrap();
        let expected_dir = root.path().join("tenant_a").join("graph-1").join("task").join("Task1A").join("exec-1");
        assert_eq!(materialized.working_dir, expected_dir);
        assert_eq!(materialized.script_path, expected_dir.join("task.py"));
        assert_eq!(fs::read_to_string(expected_dir.join("lib/helper.py")).unwrap(), "X = 1\n");
        assert!(expected_dir.join("requirements.txt").is_file());
    }

    #[test]
    fn test_materialize_rejects_escaping_file() {
        let root = tempfile::tempdir().unwrap();
        let materializer = Materializer::new(root.path());
        let node = node(&[("task.py", ""), ("../../outside.py", "")]);

        let err = materializer.materialize(&node, NodeKind::Task, &ctx(), "exec-1").unwrap_err();
        assert!(matches!(err, BridgeError::Launch(msg) if msg.contains("outside working directory")));
    }

    #[test]
    fn test_materialize_requires_entry_point() {
        let root = tempfile::tempdir().unwrap();
        let materializer = Materializer::new(root.path());
        let node = node(&[("requirements.txt", "")]);

        let err = materializer.materialize(&node, NodeKind::Plan, &ctx(), "exec-1").unwrap_err();
        assert!(matches!(err, BridgeError::Launch(_)));
    }
}
