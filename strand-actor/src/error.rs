//! Error types for the actor runtime

use strand_kernel::KernelError;
use strand_lang::LangError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ActorError {
    #[error("Invalid address `{0}`")]
    InvalidAddress(String),

    #[error("Ambiguous route `{0}` overlaps `{1}`")]
    AmbiguousRoute(String, String),

    #[error("Module {0} not found")]
    ModuleNotFound(String),

    #[error("Module {module} has no member {member}")]
    ModuleMemberNotFound { module: String, member: String },

    #[error("Invalid module {module}: {message}")]
    InvalidModule { module: String, message: String },

    #[error("Address {0} is already in use")]
    AddressInUse(String),

    #[error("Actor {actor} expects {expected} argument(s), got {got}")]
    Arity {
        actor: String,
        expected: usize,
        got: usize,
    },

    #[error(transparent)]
    Lang(#[from] LangError),

    #[error(transparent)]
    Kernel(#[from] KernelError),

    #[error("Actor {0} is stopped")]
    Stopped(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    Config(#[from] serde_yaml::Error),

    #[error("Runtime error: {0}")]
    Runtime(String),
}

pub type Result<T> = std::result::Result<T, ActorError>;
