//! Message envelope exchanged between executors
//!
//! Every message carries a string `kind` discriminant next to a JSON payload.
//! The edge router checks the kind against each target's declared input kinds;
//! it never inspects payload shape.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::WorkflowError;
use super::executor::ExecutorId;

/// Kind used for plain text messages.
pub const TEXT_KIND: &str = "text";

/// Kind used for untyped JSON messages.
pub const JSON_KIND: &str = "json";

/// A payload type with a fixed message kind.
///
/// ```ignore
/// #[derive(Serialize, Deserialize)]
/// struct DetectionResult { spam_decision: String, reason: String }
///
/// impl MessagePayload for DetectionResult {
///     const KIND: &'static str = "detection_result";
/// }
///
/// let msg = Message::from_payload(&result)?;
/// let back: DetectionResult = msg.decode()?;
/// ```
pub trait MessagePayload: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Discriminant stored in [`Message::kind`]
    const KIND: &'static str;
}

impl MessagePayload for String {
    const KIND: &'static str = TEXT_KIND;
}

impl MessagePayload for Value {
    const KIND: &'static str = JSON_KIND;
}

/// The unit exchanged on edges: typed payload plus provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Payload discriminant
    pub kind: String,
    /// Payload body
    pub payload: Value,
    /// Executor that emitted the message (`None` for external input)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<ExecutorId>,
    /// Explicit destination requested by the sender
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<ExecutorId>,
    /// Run-wide sequence number assigned when the message is enqueued
    #[serde(default)]
    pub seq: u64,
}

impl Message {
    /// Create a message with an explicit kind
    pub fn new(kind: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: kind.into(),
            payload,
            source_id: None,
            target_id: None,
            seq: 0,
        }
    }

    /// Create a text message
    pub fn text(text: impl Into<String>) -> Self {
        Self::new(TEXT_KIND, Value::String(text.into()))
    }

    /// Create an untyped JSON message
    pub fn json(value: Value) -> Self {
        Self::new(JSON_KIND, value)
    }

    /// Encode a typed payload
    pub fn from_payload<T: MessagePayload>(payload: &T) -> Result<Self, WorkflowError> {
        let value = serde_json::to_value(payload)
            .map_err(|e| WorkflowError::serialization(format!("encoding {}: {}", T::KIND, e)))?;
        Ok(Self::new(T::KIND, value))
    }

    /// Check whether this message carries payload type `T`
    pub fn is<T: MessagePayload>(&self) -> bool {
        self.kind == T::KIND
    }

    /// Decode the payload as `T`, checking the kind first
    pub fn decode<T: MessagePayload>(&self) -> Result<T, WorkflowError> {
        if self.kind != T::KIND {
            return Err(WorkflowError::serialization(format!(
                "expected message kind '{}', found '{}'",
                T::KIND,
                self.kind
            )));
        }
        serde_json::from_value(self.payload.clone())
            .map_err(|e| WorkflowError::serialization(format!("decoding {}: {}", T::KIND, e)))
    }

    /// Borrow the payload as text when it is a JSON string
    pub fn as_text(&self) -> Option<&str> {
        self.payload.as_str()
    }

    /// Set the emitting executor
    pub fn with_source(mut self, source: impl Into<ExecutorId>) -> Self {
        self.source_id = Some(source.into());
        self
    }

    /// Request delivery to one specific downstream executor
    pub fn with_target(mut self, target: impl Into<ExecutorId>) -> Self {
        self.target_id = Some(target.into());
        self
    }

    pub(crate) fn with_seq(mut self, seq: u64) -> Self {
        self.seq = seq;
        self
    }
}

impl From<&str> for Message {
    fn from(text: &str) -> Self {
        Message::text(text)
    }
}

impl From<String> for Message {
    fn from(text: String) -> Self {
        Message::text(text)
    }
}

/// Aggregated results delivered to a fan-in target, one entry per source in
/// declared source order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FanInMessage {
    /// Round number for this aggregator, starting at 0
    pub round: u64,
    /// Sources in declaration order
    pub sources: Vec<ExecutorId>,
    /// One result per source, aligned with `sources`
    pub results: Vec<Message>,
}

impl MessagePayload for FanInMessage {
    const KIND: &'static str = "fan_in";
}

impl FanInMessage {
    /// Decode every result as `T`
    pub fn payloads<T: MessagePayload>(&self) -> Result<Vec<T>, WorkflowError> {
        self.results.iter().map(|m| m.decode::<T>()).collect()
    }

    /// Raw payload values in source order
    pub fn values(&self) -> Vec<&Value> {
        self.results.iter().map(|m| &m.payload).collect()
    }

    /// Result produced by a given source
    pub fn result_from(&self, source: &str) -> Option<&Message> {
        self.sources
            .iter()
            .position(|s| s.as_str() == source)
            .and_then(|idx| self.results.get(idx))
    }
}
