//! Workflow graphs
//!
//! This module provides the building blocks for declaring executor graphs
//! and running them on the superstep runtime.
//!
//! # Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     WorkflowGraph                            │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │                  Executors                           │    │
//! │  │  ┌─────────┐  ┌─────────┐  ┌─────────┐              │    │
//! │  │  │  Agent  │→ │ Switch  │→ │Function │              │    │
//! │  │  └─────────┘  └────┬────┘  └─────────┘              │    │
//! │  │                    │                                 │    │
//! │  │              ┌─────▼─────┐                           │    │
//! │  │              │   Gate    │                           │    │
//! │  │              └───────────┘                           │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! │                                                              │
//! │  Validate via WorkflowBuilder::build → Workflow              │
//! │  Execute via Workflow::run / run_streaming                   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use workflow_engine::workflow::{WorkflowBuilder, Case, Predicate, Condition};
//! use workflow_engine::workflow::executors::FunctionExecutor;
//!
//! let workflow = WorkflowBuilder::new()
//!     .with_name("spam_filter")
//!     .add_executor(detector)
//!     .add_executor(spam_handler)
//!     .add_executor(assistant)
//!     .set_start("detector")
//!     .add_switch_case(
//!         "detector",
//!         vec![Case::new("spam_handler", Predicate::field("spam_decision", Condition::equals("Spam")))],
//!         Some("assistant".into()),
//!     )
//!     .build()?;
//! ```

pub mod compiled;
pub mod edge;
pub mod executors;
pub mod graph;
pub mod router;

pub use compiled::{Workflow, WorkflowEventStream};
pub use edge::{Case, Condition, EdgeGroup, Predicate};
pub use graph::{GraphValidationError, WorkflowBuilder, WorkflowGraph};
pub use router::FanInBuffer;
