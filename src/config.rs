//! # Configuration Module
//!
//! Loads settings for the sample runner from three layers, later layers
//! winning:
//! - built-in defaults
//! - environment variables (and a `.env` file, via dotenvy)
//! - an optional YAML file overlaying the runtime `WorkflowConfig`

use anyhow::{Context, Result};
use std::env;
use std::path::{Path, PathBuf};

use workflow_engine::WorkflowConfig;

// =============================================================================
// CONFIGURATION STRUCT
// =============================================================================
/// Settings shared by every sample command.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory of the file checkpoint store
    pub checkpoint_dir: PathBuf,

    /// Compress checkpoint files with zstd
    pub checkpoint_compression: bool,

    /// Runtime settings handed to every workflow
    pub workflow: WorkflowConfig,

    /// Log filter used when RUST_LOG is not set
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            checkpoint_dir: PathBuf::from("workflow_checkpoints_storage"),
            checkpoint_compression: false,
            workflow: WorkflowConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

// =============================================================================
// CONFIGURATION LOADING
// =============================================================================
impl Config {
    /// Load configuration from environment variables.
    ///
    /// A `.env` file in the working directory is read first if present.
    pub fn from_env() -> Result<Self> {
        // Silently ignore a missing .env file
        let _ = dotenvy::dotenv();

        let mut config = Config::default();

        if let Ok(val) = env::var("WORKFLOW_CHECKPOINT_DIR") {
            config.checkpoint_dir = PathBuf::from(val);
        }

        if let Ok(val) = env::var("WORKFLOW_CHECKPOINT_COMPRESSION") {
            config.checkpoint_compression = parse_bool(&val)
                .context("WORKFLOW_CHECKPOINT_COMPRESSION must be true or false")?;
        }

        if let Ok(val) = env::var("WORKFLOW_MAX_SUPERSTEPS") {
            config.workflow.max_supersteps = val
                .parse()
                .context("WORKFLOW_MAX_SUPERSTEPS must be a positive integer")?;
        }

        if let Ok(val) = env::var("WORKFLOW_PARALLELISM") {
            let parallelism: usize = val
                .parse()
                .context("WORKFLOW_PARALLELISM must be a positive integer")?;
            config.workflow = config.workflow.with_parallelism(parallelism);
        }

        if let Ok(val) = env::var("LOG_LEVEL") {
            config.log_level = val;
        }

        Ok(config)
    }

    /// Overlay runtime settings from a YAML file.
    pub fn load_yaml(&mut self, path: &Path) -> Result<()> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        self.overlay_yaml(&text)
            .with_context(|| format!("invalid config file {}", path.display()))
    }

    /// Overlay the keys present in `text` onto the current runtime settings.
    ///
    /// Keys absent from the document keep their current value, so a file may
    /// set only `max_supersteps` without resetting values taken from the
    /// environment.
    pub fn overlay_yaml(&mut self, text: &str) -> Result<()> {
        let overlay: serde_yaml::Value = serde_yaml::from_str(text)?;
        let overlay = match overlay {
            serde_yaml::Value::Mapping(map) => map,
            serde_yaml::Value::Null => return Ok(()),
            _ => anyhow::bail!("expected a mapping of workflow settings"),
        };

        let mut current = match serde_yaml::to_value(&self.workflow)? {
            serde_yaml::Value::Mapping(map) => map,
            _ => anyhow::bail!("workflow settings did not serialize to a mapping"),
        };
        for (key, value) in overlay {
            current.insert(key, value);
        }

        self.workflow = serde_yaml::from_value(serde_yaml::Value::Mapping(current))?;
        Ok(())
    }

    /// Validate the configuration before any workflow is built.
    pub fn validate(&self) -> Result<()> {
        if self.workflow.max_supersteps == 0 {
            anyhow::bail!("max_supersteps must be at least 1");
        }

        if self.workflow.parallelism == 0 {
            anyhow::bail!("parallelism must be at least 1");
        }

        if self.checkpoint_dir.as_os_str().is_empty() {
            anyhow::bail!("checkpoint directory cannot be empty");
        }

        Ok(())
    }
}

fn parse_bool(val: &str) -> Result<bool> {
    match val.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => anyhow::bail!("not a boolean: {}", other),
    }
}
