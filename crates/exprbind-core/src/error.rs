#![forbid(unsafe_code)]

//! Error taxonomy for expression evaluation.
//!
//! | Error | Raised by | Meaning |
//! |-------|-----------|---------|
//! | [`BindError::NameResolution`] | scope lookup | name in no layer and not reserved |
//! | [`BindError::Evaluation`] | expression bodies | failure inside user code |
//! | [`BindError::Access`] | owner objects | attribute or item access the object refuses |
//! | [`BindError::Inversion`] | inverted-write path only | no assignment derivable |
//! | [`BindError::OperatorMismatch`] | handler dispatch | read invoked as write, or vice versa |
//! | [`BindError::RecursionLimit`] | invocation harness | nesting exceeded the depth limit |
//!
//! Errors are never recovered locally. They surface to the binding
//! subsystem, which decides whether to log and continue or abort.

use thiserror::Error;

/// Result alias used throughout the runtime.
pub type Result<T> = std::result::Result<T, BindError>;

/// Errors produced while binding expressions to object attributes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BindError {
    #[error("name '{name}' is not defined")]
    NameResolution { name: String },

    #[error("{message}")]
    Evaluation { message: String },

    #[error(transparent)]
    Access(#[from] AccessError),

    #[error("can't assign to expression: {reason}")]
    Inversion { reason: String },

    #[error("{handler} handler cannot service a {invocation} invocation")]
    OperatorMismatch {
        handler: &'static str,
        invocation: &'static str,
    },

    #[error("maximum binding depth {depth} exceeded evaluating '{name}' on {object}")]
    RecursionLimit {
        object: String,
        name: String,
        depth: usize,
    },
}

impl BindError {
    pub fn name_resolution(name: impl Into<String>) -> Self {
        Self::NameResolution { name: name.into() }
    }

    pub fn evaluation(message: impl Into<String>) -> Self {
        Self::Evaluation {
            message: message.into(),
        }
    }

    pub fn inversion(reason: impl Into<String>) -> Self {
        Self::Inversion {
            reason: reason.into(),
        }
    }

    /// The offending name for a resolution failure.
    #[must_use]
    pub fn unresolved_name(&self) -> Option<&str> {
        match self {
            Self::NameResolution { name } => Some(name),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_inversion(&self) -> bool {
        matches!(self, Self::Inversion { .. })
    }
}

/// Failures raised by an object or container refusing an access.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccessError {
    #[error("'{type_name}' object has no attribute '{name}'")]
    NoSuchAttribute { type_name: String, name: String },

    #[error("attribute '{name}' of '{type_name}' object is read-only")]
    ReadOnly { type_name: String, name: String },

    #[error("'{type_name}' object does not support item assignment")]
    NotSubscriptable { type_name: String },

    #[error("invalid key {key} for '{type_name}' object")]
    BadKey { type_name: String, key: String },
}

impl AccessError {
    pub fn no_such_attribute(type_name: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NoSuchAttribute {
            type_name: type_name.into(),
            name: name.into(),
        }
    }

    pub fn read_only(type_name: impl Into<String>, name: impl Into<String>) -> Self {
        Self::ReadOnly {
            type_name: type_name.into(),
            name: name.into(),
        }
    }
}
