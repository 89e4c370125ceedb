//! Service-level error taxonomy and its HTTP status mapping.

use crate::executor::DbError;
use crate::transaction::TransactionError;
use std::fmt;

/// Errors surfaced by the domain services
#[derive(Debug)]
pub enum ServiceError {
    /// Missing or malformed input (400)
    InvalidArgument(String),
    /// The referenced record does not exist (404)
    NotFound(String),
    /// The request is well formed but the current state forbids it (400)
    InvalidState(String),
    /// Uniqueness violation, e.g. a username already taken (409)
    Conflict(String),
    /// Unexpected database failure (500)
    Database(DbError),
}

impl ServiceError {
    /// HTTP status code for this error
    pub fn status(&self) -> u16 {
        match self {
            ServiceError::InvalidArgument(_) | ServiceError::InvalidState(_) => 400,
            ServiceError::NotFound(_) => 404,
            ServiceError::Conflict(_) => 409,
            ServiceError::Database(_) => 500,
        }
    }

    /// Message safe to return to a client; database details stay in the logs
    pub fn public_message(&self) -> String {
        match self {
            ServiceError::InvalidArgument(m)
            | ServiceError::NotFound(m)
            | ServiceError::InvalidState(m)
            | ServiceError::Conflict(m) => m.clone(),
            ServiceError::Database(_) => "Internal server error".to_string(),
        }
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        ServiceError::InvalidArgument(msg.into())
    }
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceError::InvalidArgument(m) => write!(f, "Invalid argument: {m}"),
            ServiceError::NotFound(m) => write!(f, "Not found: {m}"),
            ServiceError::InvalidState(m) => write!(f, "Invalid state: {m}"),
            ServiceError::Conflict(m) => write!(f, "Conflict: {m}"),
            ServiceError::Database(e) => write!(f, "Database error: {e}"),
        }
    }
}

impl std::error::Error for ServiceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ServiceError::Database(e) => Some(e),
            _ => None,
        }
    }
}

impl From<DbError> for ServiceError {
    fn from(err: DbError) -> Self {
        ServiceError::Database(err)
    }
}

impl From<TransactionError> for ServiceError {
    fn from(err: TransactionError) -> Self {
        ServiceError::Database(err.into())
    }
}
