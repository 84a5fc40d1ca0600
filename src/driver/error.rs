// Copyright (c) 2025 - Cowboy AI, Inc.
//! Provider-boundary error type

use std::fmt;
use thiserror::Error;

/// Classification of a provider failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriverErrorKind {
    /// Referenced object does not exist (or is not visible yet)
    NotFound,
    /// Object or rule already exists
    Duplicate,
    /// Object is still referenced by another object
    DependencyViolation,
    /// Request rejected as malformed or conflicting
    InvalidParameter,
    /// Anything else
    Internal,
}

impl fmt::Display for DriverErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotFound => "not found",
            Self::Duplicate => "duplicate",
            Self::DependencyViolation => "dependency violation",
            Self::InvalidParameter => "invalid parameter",
            Self::Internal => "internal",
        };
        f.write_str(name)
    }
}

/// Error returned by a [`super::CloudDriver`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct DriverError {
    pub kind: DriverErrorKind,
    pub message: String,
}

impl DriverError {
    pub fn new(kind: DriverErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(DriverErrorKind::NotFound, message)
    }

    pub fn duplicate(message: impl Into<String>) -> Self {
        Self::new(DriverErrorKind::Duplicate, message)
    }

    pub fn dependency_violation(message: impl Into<String>) -> Self {
        Self::new(DriverErrorKind::DependencyViolation, message)
    }

    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        Self::new(DriverErrorKind::InvalidParameter, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(DriverErrorKind::Internal, message)
    }

    /// "Not converged yet" rather than a real failure
    pub fn is_transient(&self) -> bool {
        self.kind == DriverErrorKind::NotFound
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == DriverErrorKind::NotFound
    }
}

/// Result type for driver calls
pub type DriverResult<T> = Result<T, DriverError>;
