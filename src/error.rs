//! Error types for planbridge.
//!
//! Every failure of a bridge invocation is represented by [`BridgeError`].
//! The five structural classes (load, empty input, decode, execution,
//! contract violation) each map to their own process exit code so a
//! supervisor can tell them apart without parsing stderr.

use std::{io::ErrorKind, string::FromUtf8Error};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Exit code for failures outside the five bridge classes.
pub const EXIT_GENERIC: i32 = 1;
pub const EXIT_LOAD: i32 = 3;
pub const EXIT_EMPTY_INPUT: i32 = 4;
pub const EXIT_DECODE: i32 = 5;
pub const EXIT_EXECUTION: i32 = 6;
pub const EXIT_CONTRACT_VIOLATION: i32 = 7;

/// Unified error type for all planbridge operations.
#[derive(Deserialize, Serialize, Error, Debug, Clone, PartialEq)]
pub enum BridgeError {
    /// The script is missing, failed to evaluate, or lacks the entry point.
    #[error("load error: {0}")]
    Load(String),

    /// Nothing but whitespace arrived on the ingress channel.
    #[error("empty input: {0}")]
    EmptyInput(String),

    /// Malformed base64 or malformed message bytes.
    #[error("decode error: {0}")]
    Decode(String),

    /// User code raised while running the entry point.
    #[error("execution error: {0}")]
    Execution(String),

    /// The entry point returned something other than the mode's output type.
    #[error("contract violation: {0}")]
    ContractViolation(String),

    /// Configuration parsing or validation errors.
    #[error("{0}")]
    Config(String),

    /// Graph definition errors.
    #[error("{0}")]
    Graph(String),

    /// Failures starting or talking to a bridge process.
    #[error("{0}")]
    Launch(String),

    /// The bridge process was killed by its supervisor.
    #[error("aborted: {0}")]
    Aborted(String),

    /// I/O operation errors.
    #[error("{0}")]
    IoError(String),
}

impl BridgeError {
    /// Process exit code reported for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            BridgeError::Load(_) => EXIT_LOAD,
            BridgeError::EmptyInput(_) => EXIT_EMPTY_INPUT,
            BridgeError::Decode(_) => EXIT_DECODE,
            BridgeError::Execution(_) => EXIT_EXECUTION,
            BridgeError::ContractViolation(_) => EXIT_CONTRACT_VIOLATION,
            _ => EXIT_GENERIC,
        }
    }

    /// Rebuilds the error class of a bridge process from its exit code.
    pub fn from_exit_code(
        code: i32,
        diagnostics: String,
    ) -> Self {
        match code {
            EXIT_LOAD => BridgeError::Load(diagnostics),
            EXIT_EMPTY_INPUT => BridgeError::EmptyInput(diagnostics),
            EXIT_DECODE => BridgeError::Decode(diagnostics),
            EXIT_EXECUTION => BridgeError::Execution(diagnostics),
            EXIT_CONTRACT_VIOLATION => BridgeError::ContractViolation(diagnostics),
            _ => BridgeError::Launch(format!("bridge exited with status {code}: {diagnostics}")),
        }
    }

    /// Short class name used in diagnostics.
    pub fn class(&self) -> &'static str {
        match self {
            BridgeError::Load(_) => "LoadError",
            BridgeError::EmptyInput(_) => "EmptyInputError",
            BridgeError::Decode(_) => "DecodeError",
            BridgeError::Execution(_) => "ExecutionError",
            BridgeError::ContractViolation(_) => "ContractViolationError",
            BridgeError::Config(_) => "ConfigError",
            BridgeError::Graph(_) => "GraphError",
            BridgeError::Launch(_) => "LaunchError",
            BridgeError::Aborted(_) => "AbortedError",
            BridgeError::IoError(_) => "IoError",
        }
    }
}

impl From<BridgeError> for String {
    fn from(val: BridgeError) -> Self {
        val.to_string()
    }
}

impl From<std::io::Error> for BridgeError {
    fn from(error: std::io::Error) -> Self {
        BridgeError::IoError(error.to_string())
    }
}

impl From<BridgeError> for std::io::Error {
    fn from(val: BridgeError) -> Self {
        #[allow(clippy::io_other_error)]
        std::io::Error::new(ErrorKind::Other, val.to_string())
    }
}

impl From<FromUtf8Error> for BridgeError {
    fn from(_: FromUtf8Error) -> Self {
        BridgeError::Decode("Error with utf-8 string convert".to_string())
    }
}

impl From<prost::DecodeError> for BridgeError {
    fn from(error: prost::DecodeError) -> Self {
        BridgeError::Decode(error.to_string())
    }
}

impl From<base64::DecodeError> for BridgeError {
    fn from(error: base64::DecodeError) -> Self {
        BridgeError::Decode(format!("invalid base64 payload: {}", error))
    }
}

impl From<toml::de::Error> for BridgeError {
    fn from(error: toml::de::Error) -> Self {
        BridgeError::Config(error.to_string())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_exit_code_round_trip() {
        let errors = [
            BridgeError::Load("x".to_string()),
            BridgeError::EmptyInput("x".to_string()),
            BridgeError::Decode("x".to_string()),
            BridgeError::Execution("x".to_string()),
            BridgeError::ContractViolation("x".to_string()),
        ];
        for err in errors {
            assert_eq!(BridgeError::from_exit_code(err.exit_code(), "x".to_string()), err);
        }
    }

    #[test]
    fn test_unknown_exit_code_is_launch_error() {
        let err = BridgeError::from_exit_code(137, "killed".to_string());
        assert!(matches!(err, BridgeError::Launch(_)));
        assert_eq!(err.exit_code(), EXIT_GENERIC);
    }
}
