//! # planbridge
//!
//! planbridge runs user-authored plan and task code for a workflow
//! orchestrator, one node invocation per process.
//!
//! ## Core Features
//!
//! - **Typed Message Contracts**: `PlanInput`, `PlanResult`, `TaskInput` and `TaskResult` travel as framed protobuf records, base64 encoded
//! - **Single-Shot Bridge**: load one script, decode one input, call one entry point, encode one output
//! - **Embedded Runtimes**: Python (`rustpython-vm`) and JavaScript (`rquickjs`) behind cargo features
//! - **Distinct Failure Classes**: load, empty input, decode, execution and contract violations each have their own exit code
//! - **Async Launcher**: materialize a node's files and supervise a bridge process with a timeout
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use planbridge::{Bridge, Mode};
//!
//! let bridge = Bridge::default();
//! bridge.run(Mode::Plan, "plan.py".as_ref(), std::io::stdin().lock(), std::io::stdout().lock())?;
//! ```

mod bridge;
mod config;
mod error;
mod launcher;
mod messages;
mod model;
mod runtime;

pub use bridge::Bridge;
pub use config::{BridgeConfig, Config, LauncherConfig};
pub use error::BridgeError;
pub use launcher::{ExecutionContext, ExecutionStatus, MaterializedNode, Materializer, NodeExecution, NodeExecutor, ProcessLauncher};
pub use messages::{Envelope, FallbackIdPolicy, PlanInput, PlanResult, TaskInput, TaskResult};
pub use model::*;
pub use runtime::{Contract, EntryPoint, Mode, PlanContract, Script, ScriptLanguage, ScriptModule, TaskContract, load_script};

/// Result type alias for planbridge operations.
pub type Result<T> = std::result::Result<T, BridgeError>;
