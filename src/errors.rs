// Copyright (c) 2025 - Cowboy AI, Inc.
//! Error types for topology operations

use thiserror::Error;

use crate::domain::{NetworkError, ValidationError};
use crate::driver::DriverError;
use crate::state_machine::TransitionError;

/// Errors surfaced by the topology client
#[derive(Debug, Error)]
pub enum TopologyError {
    /// Remote state violates an invariant the core relies on
    #[error("Bad environment state: {0}")]
    BadEnvironmentState(String),

    /// The caller asked for something the model forbids
    #[error("Disallowed operation: {0}")]
    DisallowedOperation(String),

    /// The allocator ran out of candidate blocks
    #[error("Not enough address space in {parent}: requested {requested} /{prefix_len} blocks, {available} available")]
    NotEnoughAddressSpace {
        parent: String,
        prefix_len: u8,
        requested: usize,
        available: usize,
    },

    /// A convergence wait exhausted its attempts
    #[error("Operation timed out after {attempts} attempts: {operation}")]
    OperationTimedOut { operation: String, attempts: u32 },

    /// A named network, service or instance does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Caller-supplied address could not be parsed
    #[error("Invalid address: {0}")]
    InvalidAddress(#[from] NetworkError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Error returned by the cloud driver
    #[error("Provider error: {0}")]
    Provider(#[from] DriverError),
}

impl TopologyError {
    /// Whether a convergence wait should treat this error as "not yet converged"
    pub fn is_transient(&self) -> bool {
        matches!(self, TopologyError::Provider(e) if e.is_transient())
    }
}

/// Result type for topology operations
pub type TopologyResult<T> = Result<T, TopologyError>;

impl From<ValidationError> for TopologyError {
    fn from(err: ValidationError) -> Self {
        TopologyError::DisallowedOperation(err.to_string())
    }
}

impl From<TransitionError> for TopologyError {
    fn from(err: TransitionError) -> Self {
        TopologyError::DisallowedOperation(err.to_string())
    }
}
