// src/error.rs
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for fleet setup, transfers and statistics.

use thiserror::Error;

/// Errors raised while setting up, driving or reducing a benchmark configuration.
#[derive(Debug, Error)]
pub enum Error {
    /// The fleet could not be sized as requested.
    #[error("fleet allocation failed: {0}")]
    Allocation(String),

    /// The program image was rejected.
    #[error("program load failed: {0}")]
    Load(String),

    /// A symbol expected in the loaded program is absent.
    #[error("symbol `{0}` not found in loaded program")]
    NotFound(String),

    /// The device-side run failed or trapped.
    #[error("execution failed: {0}")]
    Execution(String),

    /// A configuration value is unusable.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Statistics were requested over zero samples.
    #[error("statistics requested over an empty sample set")]
    EmptySampleSet,

    /// A chunk push or pull was rejected by the collaborator.
    #[error("transfer rejected: {0}")]
    Transfer(String),

    /// The handle was released or belongs to another fleet.
    #[error("unknown fleet handle {0}")]
    UnknownHandle(u64),

    /// Report persistence failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Errors that belong to fleet setup rather than to a running trial.
    #[must_use]
    pub fn is_setup_failure(&self) -> bool {
        matches!(
            self,
            Error::Allocation(_) | Error::Load(_) | Error::NotFound(_) | Error::InvalidConfiguration(_)
        )
    }
}

/// Result type for benchmark operations.
pub type Result<T> = std::result::Result<T, Error>;
