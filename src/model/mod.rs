mod edge;
mod graph;
mod node;

pub use edge::EdgeModel;
pub use graph::{GraphModel, GraphStatus};
pub use node::{FileModel, NodeKind, NodeModel};
