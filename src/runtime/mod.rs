//! Script runtimes that host user-authored plan and task code.
//!
//! A script is loaded into a fresh interpreter for every invocation. The
//! interpreter first evaluates a prelude that defines the four message
//! classes and a `fallback_id` helper, then the user source under a
//! mode-qualified module name. Nothing is cached between loads.

mod contract;
#[cfg(feature = "javascript")]
mod javascript;
#[cfg(feature = "python")]
mod python;

use std::{
    fs,
    io::{self, Write},
    path::Path,
};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::{
    BridgeError, Result,
    messages::{Envelope, FallbackIdPolicy, PlanInput, PlanResult, TaskInput, TaskResult},
};

pub use contract::{Contract, EntryPoint, Mode, PlanContract, TaskContract};

/// Language of a user script, picked from its file extension.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, strum::AsRefStr, strum::EnumString, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ScriptLanguage {
    Python3,
    Javascript,
}

impl ScriptLanguage {
    pub const ALL: [ScriptLanguage; 2] = [ScriptLanguage::Python3, ScriptLanguage::Javascript];

    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            ScriptLanguage::Python3 => &["py"],
            ScriptLanguage::Javascript => &["js", "mjs"],
        }
    }

    /// Returns the language whose extensions include `file_name`'s.
    pub fn from_file_name(file_name: &str) -> Option<Self> {
        let ext = Path::new(file_name).extension()?.to_str()?;
        Self::ALL.into_iter().find(|lang| lang.extensions().contains(&ext))
    }

    /// Whether a runtime for this language was compiled in.
    pub fn is_available(&self) -> bool {
        match self {
            ScriptLanguage::Python3 => cfg!(feature = "python"),
            ScriptLanguage::Javascript => cfg!(feature = "javascript"),
        }
    }

    /// Languages compiled into this build.
    pub fn available() -> Vec<Self> {
        Self::ALL.into_iter().filter(|lang| lang.is_available()).collect()
    }
}

/// A loaded script module with its entry point resolved.
pub trait ScriptModule {
    fn language(&self) -> ScriptLanguage;

    /// Calls the entry point once with the input's fields.
    ///
    /// Returns the output's fields after checking the returned value is an
    /// instance of the mode's output class.
    fn invoke(
        &self,
        input: Value,
    ) -> Result<Value>;
}

/// A user script loaded for one mode.
pub struct Script {
    mode: Mode,
    path: String,
    module: Box<dyn ScriptModule>,
}

impl Script {
    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn language(&self) -> ScriptLanguage {
        self.module.language()
    }
}

impl<C: Contract> EntryPoint<C> for Script {
    fn call(
        &self,
        input: C::Input,
    ) -> Result<C::Output> {
        if self.mode != C::MODE {
            return Err(BridgeError::Load(format!(
                "{} was loaded for {} mode but invoked in {} mode",
                self.path,
                self.mode,
                C::MODE
            )));
        }
        let fields = serde_json::to_value(&input).map_err(|e| BridgeError::Decode(format!("failed to expose {}: {}", C::Input::type_name(), e)))?;
        let output = self.module.invoke(fields)?;
        serde_json::from_value::<C::Output>(output).map_err(|e| {
            BridgeError::ContractViolation(format!(
                "{}(...) returned an invalid {}: {}",
                C::MODE.entry_point(),
                C::Output::type_name(),
                e
            ))
        })
    }
}

/// Loads `path` for `mode` into a fresh interpreter.
pub fn load_script(
    path: &Path,
    mode: Mode,
    policy: &FallbackIdPolicy,
) -> Result<Script> {
    if !path.is_file() {
        return Err(BridgeError::Load(format!("Script does not exist: {}", path.display())));
    }
    let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
    let language = ScriptLanguage::from_file_name(file_name).ok_or_else(|| BridgeError::Load(format!("Unsupported script type: {}", path.display())))?;
    if !language.is_available() {
        return Err(BridgeError::Load(format!(
            "{} scripts are not supported by this build (available: {:?})",
            language,
            ScriptLanguage::available()
        )));
    }

    let source = fs::read_to_string(path).map_err(|e| BridgeError::Load(format!("Unable to read {}: {}", path.display(), e)))?;
    let prelude = Prelude::new(policy);
    debug!(script = %path.display(), %mode, %language, "loading script");

    let module: Box<dyn ScriptModule> = match language {
        #[cfg(feature = "python")]
        ScriptLanguage::Python3 => Box::new(python::PythonModule::load(&source, path, mode, &prelude)?),
        #[cfg(feature = "javascript")]
        ScriptLanguage::Javascript => Box::new(javascript::JavascriptModule::load(&source, path, mode, &prelude)?),
        #[allow(unreachable_patterns)]
        _ => return Err(BridgeError::Load(format!("no runtime for {language}"))),
    };

    Ok(Script {
        mode,
        path: path.display().to_string(),
        module,
    })
}

/// Module names user code can import the message classes from.
pub(crate) const MESSAGE_MODULES: [&str; 3] = ["agentic_common.pb", "planbridge.pb", "planbridge"];

/// Sink for `print` / `console.log` output of user code.
///
/// stdout carries the payload, so script output goes to stderr.
pub(crate) fn write_script_output(text: &str) {
    let mut stderr = io::stderr().lock();
    if let Err(e) = stderr.write_all(text.as_bytes()).and_then(|_| stderr.flush()) {
        debug!("dropped script output: {}", e);
    }
}

/// Field layout of one message class exposed to scripts.
pub(crate) struct MessageSchema {
    pub name: &'static str,
    /// `(field, repeated)`, sorted by field name.
    pub fields: Vec<(String, bool)>,
}

impl MessageSchema {
    fn of<T: Envelope + Serialize>() -> Self {
        let fields = match serde_json::to_value(T::default()) {
            Ok(Value::Object(map)) => map.into_iter().map(|(name, value)| (name, value.is_array())).collect(),
            _ => Vec::new(),
        };
        Self {
            name: T::type_name(),
            fields,
        }
    }
}

/// Inputs every runtime needs to build its prelude.
pub(crate) struct Prelude {
    pub schemas: Vec<MessageSchema>,
    pub fallback_template: String,
}

impl Prelude {
    pub fn new(policy: &FallbackIdPolicy) -> Self {
        Self {
            schemas: vec![
                MessageSchema::of::<PlanInput>(),
                MessageSchema::of::<PlanResult>(),
                MessageSchema::of::<TaskInput>(),
                MessageSchema::of::<TaskResult>(),
            ],
            fallback_template: policy.template().to_string(),
        }
    }

    /// The template as a quoted literal, valid in both Python and JavaScript.
    pub fn quoted_template(&self) -> String {
        serde_json::to_string(&self.fallback_template).unwrap_or_else(|_| "\"\"".to_string())
    }
}
