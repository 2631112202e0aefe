use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{
    Result,
    messages::{Envelope, PlanInput, PlanResult, TaskInput, TaskResult},
};

/// Which kind of node a bridge invocation runs.
#[derive(
    Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, strum::AsRefStr, strum::EnumString, strum::Display, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Mode {
    Plan,
    Task,
}

impl Mode {
    /// Name of the callable the script must define.
    pub fn entry_point(&self) -> &'static str {
        match self {
            Mode::Plan => "plan",
            Mode::Task => "task",
        }
    }

    pub fn input_type(&self) -> &'static str {
        match self {
            Mode::Plan => PlanInput::type_name(),
            Mode::Task => TaskInput::type_name(),
        }
    }

    pub fn output_type(&self) -> &'static str {
        match self {
            Mode::Plan => PlanResult::type_name(),
            Mode::Task => TaskResult::type_name(),
        }
    }

    /// Synthetic module name user code is evaluated under.
    pub fn module_name(&self) -> String {
        format!("planbridge_user_{}", self.as_ref())
    }
}

/// Binds a [`Mode`] to its input and output message types.
pub trait Contract {
    const MODE: Mode;
    type Input: Envelope + Serialize + DeserializeOwned;
    type Output: Envelope + Serialize + DeserializeOwned;
}

pub struct PlanContract;

impl Contract for PlanContract {
    const MODE: Mode = Mode::Plan;
    type Input = PlanInput;
    type Output = PlanResult;
}

pub struct TaskContract;

impl Contract for TaskContract {
    const MODE: Mode = Mode::Task;
    type Input = TaskInput;
    type Output = TaskResult;
}

/// The capability a plan or task implementation exposes to the bridge.
///
/// Loaded scripts implement it for both contracts; plain closures implement
/// it for the contract matching their signature.
pub trait EntryPoint<C: Contract> {
    fn call(
        &self,
        input: C::Input,
    ) -> Result<C::Output>;
}

impl<C, F> EntryPoint<C> for F
where
    C: Contract,
    F: Fn(C::Input) -> Result<C::Output>,
{
    fn call(
        &self,
        input: C::Input,
    ) -> Result<C::Output> {
        self(input)
    }
}

#[cfg(test)]
mod test {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn test_mode_names() {
        assert_eq!(Mode::from_str("plan").unwrap(), Mode::Plan);
        assert_eq!(Mode::Task.to_string(), "task");
        assert_eq!(Mode::Plan.entry_point(), "plan");
        assert_eq!(Mode::Task.output_type(), "TaskResult");
        assert_ne!(Mode::Plan.module_name(), Mode::Task.module_name());
    }

    #[test]
    fn test_closure_entry_point() {
        let entry = |input: TaskInput| -> Result<TaskResult> {
            Ok(TaskResult {
                id: input.input_id,
                ..Default::default()
            })
        };
        let output = EntryPoint::<TaskContract>::call(
            &entry,
            TaskInput {
                input_id: "abc".to_string(),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(output.id, "abc");
    }
}
