//! Error taxonomy
//!
//! - `ValidationError`: rejected locally, never sent to the service
//! - `ServiceError`: what a persistence service reports, keyed by a stable code
//! - `EngineError`: what every engine operation returns across the UI boundary

use glam::Vec2;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::records::{LockReason, StickerId};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("point {0} is outside the placeable region")]
    OutsideRegion(Vec2),
    #[error("note is empty")]
    EmptyNote,
    #[error("note is {len} characters, maximum is {max}")]
    NoteTooLong { len: usize, max: usize },
    #[error("rejected by server: {0}")]
    Rejected(String),
}

/// Machine-checkable error codes a persistence service reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    PositionConflict,
    Unauthorized,
    NotFound,
    InvalidInput,
    Transport,
    Internal,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::PositionConflict => "position_conflict",
            ErrorCode::Unauthorized => "unauthorized",
            ErrorCode::NotFound => "not_found",
            ErrorCode::InvalidInput => "invalid_input",
            ErrorCode::Transport => "transport",
            ErrorCode::Internal => "internal",
        }
    }

    /// Exact match only; unknown codes are not guessed at
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "position_conflict" => Some(ErrorCode::PositionConflict),
            "unauthorized" => Some(ErrorCode::Unauthorized),
            "not_found" => Some(ErrorCode::NotFound),
            "invalid_input" => Some(ErrorCode::InvalidInput),
            "transport" => Some(ErrorCode::Transport),
            "internal" => Some(ErrorCode::Internal),
            _ => None,
        }
    }
}

/// Failure reported by a `PersistenceService`
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ServiceError {
    #[error("position conflict: {0}")]
    Conflict(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid input: {0}")]
    Invalid(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("{message}")]
    Other {
        code: Option<String>,
        message: String,
    },
}

impl ServiceError {
    /// Classify a raw `{code, message}` pair from a backend by its code
    pub fn from_raw(code: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        match ErrorCode::from_code(code) {
            Some(ErrorCode::PositionConflict) => ServiceError::Conflict(message),
            Some(ErrorCode::Unauthorized) => ServiceError::Unauthorized(message),
            Some(ErrorCode::NotFound) => ServiceError::NotFound(message),
            Some(ErrorCode::InvalidInput) => ServiceError::Invalid(message),
            Some(ErrorCode::Transport) => ServiceError::Transport(message),
            Some(ErrorCode::Internal) | None => ServiceError::Other {
                code: Some(code.to_string()),
                message,
            },
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            ServiceError::Conflict(_) => ErrorCode::PositionConflict,
            ServiceError::Unauthorized(_) => ErrorCode::Unauthorized,
            ServiceError::NotFound(_) => ErrorCode::NotFound,
            ServiceError::Invalid(_) => ErrorCode::InvalidInput,
            ServiceError::Transport(_) => ErrorCode::Transport,
            ServiceError::Other { .. } => ErrorCode::Internal,
        }
    }

    #[inline]
    pub fn is_conflict(&self) -> bool {
        matches!(self, ServiceError::Conflict(_))
    }
}

/// Coarse error category, for UI decisions (retry? relocate? show message?)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Conflict,
    Auth,
    Network,
    Other,
}

/// Result error of every engine operation
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// Server rejected the position; `relocated_to` is where the draft moved
    #[error("position conflict after {attempts} attempt(s)")]
    Conflict {
        relocated_to: Option<Vec2>,
        attempts: u32,
    },
    #[error("no free spot found")]
    NoFreeSpot,
    #[error("sticker is locked ({0})")]
    Locked(LockReason),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("sticker {0} not found")]
    NotFound(StickerId),
    #[error("another operation on this sticker is in flight")]
    Busy,
    #[error("no draft placement")]
    NoDraft,
    #[error("network error: {0}")]
    Network(String),
    #[error("{0}")]
    Other(String),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Validation(_) | EngineError::NoFreeSpot | EngineError::NoDraft => {
                ErrorKind::Validation
            }
            EngineError::Conflict { .. } => ErrorKind::Conflict,
            EngineError::Locked(_) | EngineError::Unauthorized(_) => ErrorKind::Auth,
            EngineError::Network(_) => ErrorKind::Network,
            EngineError::NotFound(_) | EngineError::Busy | EngineError::Other(_) => {
                ErrorKind::Other
            }
        }
    }
}

impl From<ServiceError> for EngineError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Conflict(_) => EngineError::Conflict {
                relocated_to: None,
                attempts: 1,
            },
            ServiceError::Unauthorized(msg) => EngineError::Unauthorized(msg),
            ServiceError::Invalid(msg) => ValidationError::Rejected(msg).into(),
            ServiceError::Transport(msg) => EngineError::Network(msg),
            ServiceError::NotFound(msg) | ServiceError::Other { message: msg, .. } => {
                EngineError::Other(msg)
            }
        }
    }
}
