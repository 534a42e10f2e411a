//! Workflow runtime configuration
//!
//! Configuration for the superstep scheduler including parallelism,
//! checkpoint cadence and termination behavior.

use serde::{Deserialize, Serialize};

/// Workflow runtime configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Maximum supersteps before the run fails
    pub max_supersteps: usize,

    /// Maximum concurrent executor invocations within a superstep
    pub parallelism: usize,

    /// Checkpoint frequency (every N supersteps, 0 = disabled)
    pub checkpoint_interval: usize,

    /// Complete the run at the end of the superstep that yielded output
    pub stop_on_output: bool,

    /// Enable per-superstep and per-executor debug tracing
    pub tracing_enabled: bool,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_supersteps: 100,
            parallelism: num_cpus::get(),
            checkpoint_interval: 1,
            stop_on_output: true,
            tracing_enabled: true,
        }
    }
}

impl WorkflowConfig {
    /// Create a new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set maximum supersteps
    pub fn with_max_supersteps(mut self, max: usize) -> Self {
        self.max_supersteps = max;
        self
    }

    /// Set parallelism level
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism.max(1);
        self
    }

    /// Set checkpoint interval (0 to disable)
    pub fn with_checkpoint_interval(mut self, interval: usize) -> Self {
        self.checkpoint_interval = interval;
        self
    }

    /// Keep running after an output is yielded
    pub fn with_stop_on_output(mut self, stop: bool) -> Self {
        self.stop_on_output = stop;
        self
    }

    /// Enable or disable tracing
    pub fn with_tracing(mut self, enabled: bool) -> Self {
        self.tracing_enabled = enabled;
        self
    }

    /// Check if periodic checkpointing is enabled
    pub fn checkpointing_enabled(&self) -> bool {
        self.checkpoint_interval > 0
    }

    /// Check if a checkpoint should be taken after this superstep
    pub fn should_checkpoint(&self, superstep: usize) -> bool {
        self.checkpointing_enabled() && superstep > 0 && superstep % self.checkpoint_interval == 0
    }

    /// Parallelism clamped to at least one permit
    pub(crate) fn effective_parallelism(&self) -> usize {
        self.parallelism.max(1)
    }
}
