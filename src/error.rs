use thiserror::Error;

use crate::mapping::ValueKind;

/// Errors surfaced by the store and the materializer.
#[derive(Debug, Error)]
pub enum DrainError {
    #[error("cache key `{key}` already exists")]
    DuplicateKey { key: String },
    #[error("field `{field}` of `{entity}` has no writable setter")]
    UnsupportedField { entity: &'static str, field: &'static str },
    #[error(transparent)]
    Coercion(#[from] CoercionError),
    #[error("invalid argument `{name}`: {reason}")]
    ArgumentInvalid { name: &'static str, reason: String },
    #[error("row source failed: {message}")]
    Cursor { message: String },
    #[error("cache store has been disposed")]
    Disposed,
}

impl DrainError {
    pub fn duplicate_key(key: impl Into<String>) -> Self {
        Self::DuplicateKey { key: key.into() }
    }

    pub fn unsupported_field(entity: &'static str, field: &'static str) -> Self {
        Self::UnsupportedField { entity, field }
    }

    pub fn argument_invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Self::ArgumentInvalid {
            name,
            reason: reason.into(),
        }
    }

    pub fn cursor(message: impl Into<String>) -> Self {
        Self::Cursor {
            message: message.into(),
        }
    }
}

/// A raw column value could not be converted into its field's declared type.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("cannot coerce {observed} value into `{entity}.{field}` ({target}): {reason}")]
pub struct CoercionError {
    pub entity: &'static str,
    pub field: &'static str,
    pub target: String,
    pub observed: ValueKind,
    pub reason: String,
}
