//! Message contracts shared by the orchestrator, the bridge and user code.
//!
//! Every record is encoded as its protobuf body wrapped in a small frame that
//! carries the record's type URL. Decoding checks the URL and requires the
//! body field to be present, so foreign-type, empty and truncated payloads are
//! rejected instead of turning into zero-valued messages.

mod plan;
mod task;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use prost::Message;

use crate::{BridgeError, Result};

pub use plan::{PlanInput, PlanResult};
pub use task::{FallbackIdPolicy, TaskInput, TaskResult};

/// Wire frame around an encoded record, compatible with `google.protobuf.Any`.
#[derive(Clone, PartialEq, Message)]
struct Frame {
    #[prost(string, tag = "1")]
    type_url: String,
    #[prost(bytes = "vec", optional, tag = "2")]
    body: Option<Vec<u8>>,
}

/// A record that can cross the bridge's ingress and egress channels.
pub trait Envelope: Message + Default + Sized {
    /// Type URL written into the frame.
    const TYPE_URL: &'static str;

    /// Short type name, used in diagnostics.
    fn type_name() -> &'static str {
        Self::TYPE_URL.rsplit('.').next().unwrap_or(Self::TYPE_URL)
    }

    /// Serializes the record into framed bytes.
    fn to_bytes(&self) -> Vec<u8> {
        Frame {
            type_url: Self::TYPE_URL.to_string(),
            body: Some(self.encode_to_vec()),
        }
        .encode_to_vec()
    }

    /// Deserializes framed bytes, failing on any other record type.
    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let frame = Frame::decode(bytes).map_err(|e| BridgeError::Decode(format!("malformed {} frame: {}", Self::type_name(), e)))?;
        if frame.type_url != Self::TYPE_URL {
            return Err(BridgeError::Decode(format!(
                "expected message type '{}', found '{}'",
                Self::TYPE_URL,
                frame.type_url
            )));
        }
        let body = frame.body.ok_or_else(|| BridgeError::Decode(format!("{} frame has no body", Self::type_name())))?;
        Self::decode(body.as_slice()).map_err(|e| BridgeError::Decode(format!("malformed {}: {}", Self::type_name(), e)))
    }

    /// Serializes the record and base64-encodes it.
    fn to_base64(&self) -> String {
        STANDARD.encode(self.to_bytes())
    }

    /// Decodes a base64 payload, ignoring surrounding whitespace.
    fn from_base64(encoded: &str) -> Result<Self> {
        let bytes = STANDARD.decode(encoded.trim())?;
        Self::from_bytes(&bytes)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn plan_input() -> PlanInput {
        PlanInput {
            input_id: "in-1".to_string(),
            graph_id: "g-1".to_string(),
            lifetime_id: "life-1".to_string(),
            plan_name: "PlanA".to_string(),
            parent_task_names: vec!["Task1A".to_string()],
            parent_task_exec_ids: vec!["exec-9".to_string()],
        }
    }

    #[test]
    fn test_round_trip() {
        let input = plan_input();
        assert_eq!(PlanInput::from_bytes(&input.to_bytes()).unwrap(), input);

        let result = PlanResult {
            next_task_names: vec!["Task1A".to_string(), "Task1B".to_string()],
            error_message: String::new(),
        };
        assert_eq!(PlanResult::from_base64(&result.to_base64()).unwrap(), result);

        let task = TaskInput {
            input_id: String::new(),
            task_name: "Task2".to_string(),
            ..Default::default()
        };
        assert_eq!(TaskInput::from_bytes(&task.to_bytes()).unwrap(), task);

        let done = TaskResult {
            id: "abc".to_string(),
            error_message: String::new(),
        };
        assert_eq!(TaskResult::from_bytes(&done.to_bytes()).unwrap(), done);
    }

    #[test]
    fn test_default_message_round_trip() {
        let empty = TaskResult::default();
        assert_eq!(TaskResult::from_bytes(&empty.to_bytes()).unwrap(), empty);
    }

    #[test]
    fn test_foreign_type_rejected() {
        let bytes = TaskInput::default().to_bytes();
        let err = PlanInput::from_bytes(&bytes).unwrap_err();
        assert!(matches!(err, BridgeError::Decode(_)));

        let bytes = PlanResult::default().to_bytes();
        assert!(matches!(TaskResult::from_bytes(&bytes), Err(BridgeError::Decode(_))));
    }

    #[test]
    fn test_truncated_payload_rejected() {
        let bytes = plan_input().to_bytes();
        for len in 0..bytes.len() {
            assert!(PlanInput::from_bytes(&bytes[..len]).is_err(), "prefix of length {len} decoded");
        }
    }

    #[test]
    fn test_unframed_bytes_rejected() {
        // a bare protobuf body without the frame
        let raw = plan_input().encode_to_vec();
        assert!(matches!(PlanInput::from_bytes(&raw), Err(BridgeError::Decode(_))));
        assert!(matches!(PlanInput::from_bytes(b"hello world"), Err(BridgeError::Decode(_))));
    }

    #[test]
    fn test_invalid_base64_rejected() {
        let err = PlanInput::from_base64("not base64!!").unwrap_err();
        assert!(matches!(err, BridgeError::Decode(_)));
    }

    #[test]
    fn test_base64_input_is_trimmed() {
        let input = plan_input();
        let encoded = format!("  {}\n", input.to_base64());
        assert_eq!(PlanInput::from_base64(&encoded).unwrap(), input);
    }

    #[test]
    fn test_type_name() {
        assert_eq!(PlanInput::type_name(), "PlanInput");
        assert_eq!(TaskResult::type_name(), "TaskResult");
    }
}
