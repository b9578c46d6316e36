//! TOML run configuration.
//!
//! ```toml
//! method = "P94"
//!
//! [ctf]
//! defocus = 1.5
//! pixel_size = 0.6575
//! image_size = 440
//!
//! [sampling]
//! phi_range = [0.0, 360.0]
//! theta_range = [0.1, 179.9]
//! step_size = 6.0
//! ```
//!
//! Every section and key is optional.

use crate::ctf::CtfParams;
use crate::orientation::{OrientationSampler, SamplingMethod};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub method: SamplingMethod,
    pub ctf: CtfParams,
    pub sampling: OrientationSampler,
}

impl Config {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }
}
