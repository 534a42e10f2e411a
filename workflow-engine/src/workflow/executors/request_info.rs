//! Request gate
//!
//! Every message reaching the gate becomes an outstanding external request.
//! The run suspends once idle; answers supplied through
//! `Workflow::send_responses` leave the gate as [`RequestResponse`] messages.
//!
//! [`RequestResponse`]: crate::pregel::request::RequestResponse

use async_trait::async_trait;
use tracing::debug;

use crate::pregel::context::WorkflowContext;
use crate::pregel::error::WorkflowError;
use crate::pregel::executor::{Executor, ExecutorId, ExecutorKind};
use crate::pregel::message::{Message, MessagePayload};

/// Turns incoming messages into external requests
#[derive(Debug, Clone)]
pub struct RequestInfoExecutor {
    id: ExecutorId,
    request_kinds: Vec<String>,
}

impl RequestInfoExecutor {
    /// Gate accepting every request kind
    pub fn new(id: impl Into<ExecutorId>) -> Self {
        Self {
            id: id.into(),
            request_kinds: Vec::new(),
        }
    }

    /// Gate accepting only the listed request kinds
    pub fn accepting<I, S>(mut self, kinds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.request_kinds = kinds.into_iter().map(Into::into).collect();
        self
    }

    /// Gate for requests of payload type `T`
    pub fn for_payload<T: MessagePayload>(id: impl Into<ExecutorId>) -> Self {
        Self::new(id).accepting([T::KIND])
    }
}

#[async_trait]
impl Executor for RequestInfoExecutor {
    fn id(&self) -> &ExecutorId {
        &self.id
    }

    fn input_kinds(&self) -> Vec<String> {
        self.request_kinds.clone()
    }

    fn kind(&self) -> ExecutorKind {
        ExecutorKind::RequestGate
    }

    async fn handle(&self, message: Message, ctx: &mut WorkflowContext) -> Result<(), WorkflowError> {
        let kind = message.kind.clone();
        let request_id = ctx.request_info(message);
        debug!(gate = %self.id, request_id = %request_id, kind = %kind, "External input requested");
        Ok(())
    }
}
