use std::path::PathBuf;

use thiserror::Error;

use crate::TargetName;

/// Errors raised while turning configuration and arguments into target specs.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read port map {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse port map {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Invalid port `{value}` for target `{target}`")]
    InvalidPort { target: TargetName, value: String },

    #[error("Please specify a port for target `{0}`")]
    MissingPort(TargetName),

    #[error("Please provide target names")]
    NoTargets,
}

/// A target name that cannot be resolved without guessing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("Target `{prefix}` is ambiguous, candidates: {}", .candidates.join(", "))]
    Ambiguous {
        prefix: String,
        candidates: Vec<String>,
    },
}

/// Failure of the external listing command.
#[derive(Debug, Error)]
pub enum ListingError {
    #[error("Failed to run listing command: {0}")]
    Io(#[from] std::io::Error),

    #[error("Listing command failed: {0}")]
    Command(String),
}

impl ListingError {
    /// Text the outage detector inspects.
    pub fn message(&self) -> String {
        match self {
            Self::Io(err) => err.to_string(),
            Self::Command(stderr) => stderr.clone(),
        }
    }
}

#[derive(Debug, Error)]
#[error("Failed to spawn forwarding process for `{target}`: {source}")]
pub struct SpawnError {
    pub target: TargetName,
    pub source: std::io::Error,
}

/// Reasons the supervisor stops with a failure.
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Could not resolve any target: {0}")]
    Resolution(String),

    #[error(transparent)]
    Listing(#[from] ListingError),

    #[error(transparent)]
    Spawn(#[from] SpawnError),

    #[error("Failed to initialize port forwarding for `{target}` on port {port}: {line}")]
    InitializationFailed {
        target: TargetName,
        port: u16,
        line: String,
    },

    #[error("Permission denied binding port {port} for `{target}`")]
    PermissionDenied { target: TargetName, port: u16 },

    #[error("Failed to resume forwarding for `{target}` after {attempts} attempts")]
    RecoveryExhausted { target: TargetName, attempts: u32 },

    #[error("Supervisor task crashed: {0}")]
    Crashed(String),
}
