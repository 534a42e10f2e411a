//! Built-in executors
//!
//! - [`FunctionExecutor`]: closure-backed computation
//! - [`AgentExecutor`]: runs a [`ChatAgent`](crate::agent::ChatAgent)
//! - [`RequestInfoExecutor`]: suspends the run pending external answers

pub mod agent;
pub mod function;
pub mod request_info;

pub use agent::{AgentExecutor, AgentExecutorRequest, AgentExecutorResponse};
pub use function::FunctionExecutor;
pub use request_info::RequestInfoExecutor;
