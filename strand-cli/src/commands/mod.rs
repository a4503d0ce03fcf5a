//! CLI command implementations.

pub mod ask;
pub mod lower;
pub mod modules;
pub mod routes;
pub mod run;

pub use ask::{ask_actor, AskOptions};
pub use lower::lower_source;
pub use modules::list_modules;
pub use routes::resolve_routes;
pub use run::run_program;

use anyhow::{Context, Result};
use std::path::Path;
use strand_actor::SystemConfig;
use strand_lang::{ErrorContext, LangError};

pub(crate) fn read_source(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

/// Attach the source position to a language error
pub(crate) fn lang_error(source: &str, error: &LangError) -> anyhow::Error {
    anyhow::anyhow!("{}", ErrorContext::new(source, error).to_string().trim_end())
}

/// Load the config file if present, defaults otherwise
pub(crate) fn load_config(path: &Path) -> Result<SystemConfig> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "no config file, using defaults");
        return Ok(SystemConfig::default());
    }
    SystemConfig::from_file(path).context("Failed to load configuration")
}
