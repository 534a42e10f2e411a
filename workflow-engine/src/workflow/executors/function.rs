//! Closure-backed executors

use async_trait::async_trait;
use futures::future::BoxFuture;
use std::sync::Arc;

use crate::pregel::context::WorkflowContext;
use crate::pregel::error::WorkflowError;
use crate::pregel::executor::{Executor, ExecutorId, ExecutorKind};
use crate::pregel::message::{Message, MessagePayload};

type SyncHandler = Arc<dyn Fn(Message, &mut WorkflowContext) -> Result<(), WorkflowError> + Send + Sync>;
type AsyncHandler =
    Arc<dyn for<'a> Fn(Message, &'a mut WorkflowContext) -> BoxFuture<'a, Result<(), WorkflowError>> + Send + Sync>;

#[derive(Clone)]
enum Handler {
    Sync(SyncHandler),
    Async(AsyncHandler),
}

/// Executor whose behaviour is a closure.
///
/// ```ignore
/// let upper = FunctionExecutor::typed::<String, _>("upper", |text, ctx| {
///     ctx.send(&text.to_uppercase())
/// });
///
/// let store = FunctionExecutor::new_async("store", |message, ctx| {
///     Box::pin(async move {
///         ctx.set_shared_state("last", &message.payload).await?;
///         ctx.send_message(message);
///         Ok(())
///     })
/// });
/// ```
#[derive(Clone)]
pub struct FunctionExecutor {
    id: ExecutorId,
    input_kinds: Vec<String>,
    kind: ExecutorKind,
    handler: Handler,
}

impl FunctionExecutor {
    /// Executor accepting every message kind
    pub fn new<F>(id: impl Into<ExecutorId>, f: F) -> Self
    where
        F: Fn(Message, &mut WorkflowContext) -> Result<(), WorkflowError> + Send + Sync + 'static,
    {
        Self {
            id: id.into(),
            input_kinds: Vec::new(),
            kind: ExecutorKind::Function,
            handler: Handler::Sync(Arc::new(f)),
        }
    }

    /// Executor whose closure awaits, for shared state access or I/O
    pub fn new_async<F>(id: impl Into<ExecutorId>, f: F) -> Self
    where
        F: for<'a> Fn(Message, &'a mut WorkflowContext) -> BoxFuture<'a, Result<(), WorkflowError>>
            + Send
            + Sync
            + 'static,
    {
        Self {
            id: id.into(),
            input_kinds: Vec::new(),
            kind: ExecutorKind::Function,
            handler: Handler::Async(Arc::new(f)),
        }
    }

    /// Executor that decodes `T` and accepts only `T::KIND`
    pub fn typed<T, F>(id: impl Into<ExecutorId>, f: F) -> Self
    where
        T: MessagePayload,
        F: Fn(T, &mut WorkflowContext) -> Result<(), WorkflowError> + Send + Sync + 'static,
    {
        Self::new(id, move |message: Message, ctx: &mut WorkflowContext| {
            let payload = message.decode::<T>()?;
            f(payload, ctx)
        })
        .accepting([T::KIND])
    }

    /// Restrict the accepted message kinds
    pub fn accepting<I, S>(mut self, kinds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.input_kinds = kinds.into_iter().map(Into::into).collect();
        self
    }

    /// Override the executor category shown in diagrams
    pub fn with_kind(mut self, kind: ExecutorKind) -> Self {
        self.kind = kind;
        self
    }
}

#[async_trait]
impl Executor for FunctionExecutor {
    fn id(&self) -> &ExecutorId {
        &self.id
    }

    fn input_kinds(&self) -> Vec<String> {
        self.input_kinds.clone()
    }

    fn kind(&self) -> ExecutorKind {
        self.kind
    }

    async fn handle(&self, message: Message, ctx: &mut WorkflowContext) -> Result<(), WorkflowError> {
        match &self.handler {
            Handler::Sync(f) => f(message, ctx),
            Handler::Async(f) => f(message, ctx).await,
        }
    }
}

impl std::fmt::Debug for FunctionExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionExecutor")
            .field("id", &self.id)
            .field("input_kinds", &self.input_kinds)
            .field("kind", &self.kind)
            .finish()
    }
}
