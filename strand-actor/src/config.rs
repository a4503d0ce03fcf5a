//! Actor system configuration (`strand.yml`)

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemConfig {
    #[serde(default = "default_name")]
    pub name: String,

    /// Worker threads of the owned runtime; 0 means one per core
    #[serde(default)]
    pub worker_threads: usize,

    /// Log every kernel step of every actor
    #[serde(default)]
    pub trace: bool,

    /// Directory searched for `*.strand` modules
    #[serde(default)]
    pub module_root: Option<PathBuf>,

    #[serde(default = "default_collect_timeout_ms")]
    pub collect_timeout_ms: u64,

    // Internal: path to config file (for relative path resolution)
    #[serde(skip)]
    config_path: Option<PathBuf>,
}

fn default_name() -> String {
    String::from("strand")
}

fn default_collect_timeout_ms() -> u64 {
    5_000
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            worker_threads: 0,
            trace: false,
            module_root: None,
            collect_timeout_ms: default_collect_timeout_ms(),
            config_path: None,
        }
    }
}

impl SystemConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::from_yaml_str(&content)?;
        config.config_path = Some(path.to_path_buf());
        Ok(config)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn collect_timeout(&self) -> Duration {
        Duration::from_millis(self.collect_timeout_ms)
    }

    /// Module root resolved against the config file's directory
    pub fn module_dir(&self) -> Option<PathBuf> {
        let root = self.module_root.as_ref()?;
        if root.is_absolute() {
            return Some(root.clone());
        }
        match self.config_path.as_ref().and_then(|p| p.parent()) {
            Some(base) => Some(base.join(root)),
            None => Some(root.clone()),
        }
    }
}
