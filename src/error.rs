//! Domain error types.
//!
//! Startup and service orchestration use `anyhow`; the failures below are the
//! ones callers need to tell apart (fatal at startup vs. dropped per action).

use thiserror::Error;

/// Failures of the discovery collaborator.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The feed could not be initialized. Fatal to startup.
    #[error("failed to initialize light discovery: {0}")]
    Init(String),

    /// The feed's background loop failed after startup. Ends discovery only.
    #[error("light discovery stopped: {0}")]
    Run(String),
}

/// Per-action device I/O failures. Never fatal: the action is dropped.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("failed to fetch state of '{device}': {reason}")]
    Fetch { device: String, reason: String },

    #[error("failed to write state of '{device}': {reason}")]
    Write { device: String, reason: String },

    #[error("device '{device}' reported no lights")]
    NoLights { device: String },
}

/// Malformed temperature calibration table. Fatal to startup.
#[derive(Debug, Error, PartialEq)]
pub enum CalibrationError {
    #[error("calibration table needs at least 2 anchors, got {0}")]
    TooFewAnchors(usize),

    #[error("calibration {axis} values must be strictly {order} (anchor {index})")]
    NotMonotonic {
        axis: &'static str,
        order: &'static str,
        index: usize,
    },
}
