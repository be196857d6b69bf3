//! Error types for hipsleep.

use std::io;

use thiserror::Error;

/// Gating or configuration referenced something the network does not have,
/// or a configuration value is out of range.
///
/// Fatal for the trial: it is raised before any cycling starts.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("unknown layer `{0}`")]
    UnknownLayer(String),

    #[error("unknown projection `{send}` -> `{recv}`")]
    UnknownProjection { send: String, recv: String },

    #[error("no mode configuration is applied")]
    NoModeApplied,

    #[error("mode `{mode}` was applied with train={applied} but run with train={requested}")]
    TrainMismatch {
        mode: &'static str,
        applied: bool,
        requested: bool,
    },

    #[error("unknown mode `{0}`")]
    UnknownMode(String),

    #[error("invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Failures reported by a network engine.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    #[error("invalid layer handle {0}")]
    InvalidLayer(usize),

    #[error("invalid projection handle {0}")]
    InvalidProjection(usize),

    #[error("shape mismatch on layer `{layer}`: expected {expected} values, got {got}")]
    ShapeMismatch {
        layer: String,
        expected: usize,
        got: usize,
    },

    #[error("topology error: {0}")]
    Topology(String),
}

#[derive(Debug, Error)]
pub enum SimError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[cfg(feature = "serde")]
    #[error("config parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SimError>;
