use serde::{Deserialize, Serialize};

use crate::runtime::{Mode, ScriptLanguage};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, strum::AsRefStr, strum::Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeKind {
    Plan,
    Task,
}

impl NodeKind {
    pub fn mode(&self) -> Mode {
        match self {
            NodeKind::Plan => Mode::Plan,
            NodeKind::Task => Mode::Task,
        }
    }

    /// Lower-case directory segment for materialized files.
    pub fn dir_name(&self) -> &'static str {
        match self {
            NodeKind::Plan => "plan",
            NodeKind::Task => "task",
        }
    }
}

impl From<Mode> for NodeKind {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Plan => NodeKind::Plan,
            Mode::Task => NodeKind::Task,
        }
    }
}

/// A file attached to a node. Names may contain `/` for sub-directories.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileModel {
    pub name: String,
    #[serde(default)]
    pub contents: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeModel {
    pub name: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub files: Vec<FileModel>,
}

impl NodeModel {
    /// Files with a non-blank name, sorted by name.
    pub fn sorted_files(&self) -> Vec<&FileModel> {
        let mut files: Vec<&FileModel> = self.files.iter().filter(|f| !f.name.trim().is_empty()).collect();
        files.sort_by(|a, b| a.name.cmp(&b.name));
        files
    }

    /// Resolves the file the bridge should load for `kind`.
    ///
    /// `plan.py` / `task.py` (or a `.js` / `.mjs` equivalent, at any depth)
    /// wins; otherwise the first script file by name is used.
    pub fn entry_point(
        &self,
        kind: NodeKind,
    ) -> Option<&FileModel> {
        let files = self.sorted_files();
        let stem = kind.mode().entry_point();

        let preferred = ScriptLanguage::ALL.iter().flat_map(|lang| lang.extensions().iter()).find_map(|ext| {
            let wanted = format!("{}.{}", stem, ext);
            let nested = format!("/{}", wanted);
            files.iter().find(|f| f.name == wanted || f.name.ends_with(&nested)).copied()
        });

        preferred.or_else(|| files.iter().find(|f| ScriptLanguage::from_file_name(&f.name).is_some()).copied())
    }
}
