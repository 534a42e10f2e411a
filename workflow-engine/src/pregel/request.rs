//! Outstanding external requests
//!
//! Requests raised in the same superstep form a batch. A batch is released
//! back into the run only once every request in it has been answered.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};

use super::error::WorkflowError;
use super::events::RequestInfoEvent;
use super::message::{Message, MessagePayload};

/// A request as raised by an executor, before batch assignment
#[derive(Debug, Clone)]
pub(crate) struct RaisedRequest {
    pub event: RequestInfoEvent,
    pub request: Message,
}

/// An outstanding request plus the answer collected so far
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingRequest {
    pub event: RequestInfoEvent,
    /// Original request message
    pub request: Message,
    /// Superstep batch the request belongs to
    pub batch: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<Value>,
}

impl PendingRequest {
    pub fn request_id(&self) -> &str {
        &self.event.request_id
    }

    pub fn is_answered(&self) -> bool {
        self.answer.is_some()
    }

    /// Build the response message routed back out of the gate
    pub(crate) fn into_response(self) -> Result<Message, WorkflowError> {
        let response = RequestResponse {
            request_id: self.event.request_id,
            original_kind: self.request.kind,
            original_request: self.request.payload,
            data: self.answer.unwrap_or(Value::Null),
        };
        Ok(Message::from_payload(&response)?.with_source(self.event.source_executor_id))
    }
}

/// Answer to an external request, delivered downstream of the gate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestResponse {
    pub request_id: String,
    /// Kind of the original request message
    pub original_kind: String,
    /// Original request payload
    pub original_request: Value,
    /// Answer supplied by the caller
    pub data: Value,
}

impl MessagePayload for RequestResponse {
    const KIND: &'static str = "request_response";
}

impl RequestResponse {
    /// Decode the original request
    pub fn request_as<T: MessagePayload>(&self) -> Result<T, WorkflowError> {
        Message::new(self.original_kind.clone(), self.original_request.clone()).decode()
    }

    /// Decode the answer
    pub fn data_as<T: DeserializeOwned>(&self) -> Result<T, WorkflowError> {
        serde_json::from_value(self.data.clone())
            .map_err(|e| WorkflowError::serialization(format!("response {}: {}", self.request_id, e)))
    }

    /// Whether this answers a request of payload type `T`
    pub fn answers<T: MessagePayload>(&self) -> bool {
        self.original_kind == T::KIND
    }
}

/// Outstanding requests of one run in registration order
#[derive(Debug, Clone, Default)]
pub(crate) struct RequestLedger {
    requests: Vec<PendingRequest>,
}

impl RequestLedger {
    pub fn from_pending(requests: Vec<PendingRequest>) -> Self {
        Self { requests }
    }

    pub fn register(&mut self, raised: RaisedRequest, batch: u64) {
        self.requests.push(PendingRequest {
            event: raised.event,
            request: raised.request,
            batch,
            answer: None,
        });
    }

    /// Fail on the first id that is not outstanding, without recording anything
    pub fn validate(&self, answers: &HashMap<String, Value>) -> Result<(), WorkflowError> {
        let mut ids: Vec<&String> = answers.keys().collect();
        ids.sort();
        for id in ids {
            if !self.requests.iter().any(|r| r.request_id() == id) {
                return Err(WorkflowError::UnknownRequest(id.clone()));
            }
        }
        Ok(())
    }

    pub fn record(&mut self, answers: HashMap<String, Value>) {
        for (id, answer) in answers {
            if let Some(request) = self.requests.iter_mut().find(|r| r.request_id() == id) {
                request.answer = Some(answer);
            }
        }
    }

    /// Remove and return every request whose batch is fully answered
    pub fn take_ready(&mut self) -> Vec<PendingRequest> {
        let incomplete: BTreeSet<u64> = self
            .requests
            .iter()
            .filter(|r| !r.is_answered())
            .map(|r| r.batch)
            .collect();

        let (ready, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut self.requests)
            .into_iter()
            .partition(|r| !incomplete.contains(&r.batch));
        self.requests = waiting;
        ready
    }

    /// Requests still awaiting an answer
    pub fn unanswered(&self) -> Vec<RequestInfoEvent> {
        self.requests
            .iter()
            .filter(|r| !r.is_answered())
            .map(|r| r.event.clone())
            .collect()
    }

    pub fn all(&self) -> &[PendingRequest] {
        &self.requests
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Remove every request, answered or not
    pub fn drain(&mut self) -> Vec<PendingRequest> {
        std::mem::take(&mut self.requests)
    }
}
