//! Optional TOML run configuration. Every section and key may be omitted;
//! command-line flags override whatever the file sets.
//!
//! ```toml
//! [pipeline]
//! threads = 8
//!
//! [blocking]
//! width_millis = 3600000
//!
//! [descent]
//! learning_rate = 0.05
//! lambda = 0.1
//! max_iterations = 50000
//! ```

use crate::bayes::blocking::{Blocker, BlockingError, ONE_DAY_MILLIS};
use crate::dataflow::PipelineConfig;
use crate::learn::descent::DescentConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration file: {0}")]
    Io(#[from] io::Error),

    #[error("Configuration file is not valid: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BlockingConfig {
    pub width_millis: i64,
}

impl Default for BlockingConfig {
    fn default() -> Self {
        Self {
            width_millis: ONE_DAY_MILLIS,
        }
    }
}

impl BlockingConfig {
    pub fn blocker(&self) -> Result<Blocker, BlockingError> {
        Blocker::new(self.width_millis)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OmenConfig {
    pub pipeline: PipelineConfig,
    pub blocking: BlockingConfig,
    pub descent: DescentConfig,
}

impl OmenConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        let config = Self::from_toml_str(&text)?;
        log::info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }
}
