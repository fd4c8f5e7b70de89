//! Kernel configuration.
//!
//! Read from a TOML file, with a handful of environment overrides on top.
//! Every field has a default, so an empty file is a valid configuration.
//!
//! ```toml
//! capture_output = true
//! log_filter = "jitcell=debug"
//! prelude = ['#include "support.hpp"']
//!
//! [language]
//! version = "17"
//!
//! [timeit]
//! repeat = 5
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

pub const LOG_ENV: &str = "JITCELL_LOG";
pub const SHELL_ENV: &str = "JITCELL_SHELL";
pub const CAPTURE_ENV: &str = "JITCELL_CAPTURE";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Language metadata reported in kernel info
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LanguageInfo {
    pub name: String,
    pub version: String,
    pub mimetype: String,
    pub codemirror_mode: String,
    pub file_extension: String,
}

impl Default for LanguageInfo {
    fn default() -> Self {
        LanguageInfo {
            name: "c++".to_string(),
            version: String::new(),
            mimetype: "text/x-c++src".to_string(),
            codemirror_mode: "text/x-c++src".to_string(),
            file_extension: ".cpp".to_string(),
        }
    }
}

/// Defaults for the `timeit` magic
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TimeitConfig {
    pub repeat: u32,
    pub precision: usize,
    /// Upper bound when the loop count is chosen automatically
    pub max_loops: u32,
}

impl Default for TimeitConfig {
    fn default() -> Self {
        TimeitConfig {
            repeat: 7,
            precision: 3,
            max_loops: 10_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    pub implementation: String,
    pub implementation_version: String,
    pub protocol_version: String,
    pub language: LanguageInfo,
    /// Blocks submitted once by `Kernel::configure`
    pub prelude: Vec<String>,
    pub capture_output: bool,
    pub log_filter: String,
    /// Program used for `!command`, invoked as `<shell> -c <command>`
    pub shell: String,
    pub timeit: TimeitConfig,
}

impl Default for KernelConfig {
    fn default() -> Self {
        KernelConfig {
            implementation: "jitcell".to_string(),
            implementation_version: env!("CARGO_PKG_VERSION").to_string(),
            protocol_version: "5.0.0".to_string(),
            language: LanguageInfo::default(),
            prelude: Vec::new(),
            capture_output: true,
            log_filter: "info".to_string(),
            shell: "sh".to_string(),
            timeit: TimeitConfig::default(),
        }
    }
}

impl KernelConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Apply `JITCELL_*` overrides from the process environment
    pub fn apply_env(self) -> Self {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides looked up through `lookup`
    pub fn apply_env_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(filter) = lookup(LOG_ENV).filter(|v| !v.trim().is_empty()) {
            self.log_filter = filter;
        }
        if let Some(shell) = lookup(SHELL_ENV).filter(|v| !v.trim().is_empty()) {
            self.shell = shell;
        }
        if let Some(capture) = lookup(CAPTURE_ENV) {
            self.capture_output = !matches!(
                capture.trim().to_ascii_lowercase().as_str(),
                "0" | "false" | "no" | "off"
            );
        }
        self
    }
}
