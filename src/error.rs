//! Transfer Error Types
//!
//! Request-level errors surfaced by admission and the HTTP boundary.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::gateway::types::{ApiResponse, error_codes};
use crate::ledger::LedgerError;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    // === Authentication ===
    #[error("Missing Authorization header")]
    MissingAuthorization,

    #[error("Invalid Authorization header format")]
    InvalidAuthorization,

    #[error("Invalid token")]
    InvalidToken,

    // === Validation ===
    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    #[error("Missing target account")]
    MissingTarget,

    #[error("Invalid target account id")]
    InvalidTargetId,

    #[error("Amount must be a positive number")]
    InvalidAmount,

    #[error("Source and target account cannot be the same")]
    SameAccount,

    // === Business ===
    #[error("Insufficient balance")]
    InsufficientFunds,

    #[error("Target account not found")]
    TargetNotFound,

    #[error("Transaction not found")]
    TransactionNotFound,

    // === Saturation ===
    #[error("Server busy try again")]
    ServerBusy,

    #[error("Server is shutting down")]
    ShuttingDown,

    // === System ===
    #[error("Storage error: {0}")]
    Storage(String),
}

impl TransferError {
    /// Numeric code carried in the response body
    pub fn code(&self) -> i32 {
        match self {
            TransferError::MissingAuthorization => error_codes::MISSING_AUTH,
            TransferError::InvalidAuthorization | TransferError::InvalidToken => {
                error_codes::AUTH_FAILED
            }
            TransferError::MalformedRequest(_)
            | TransferError::MissingTarget
            | TransferError::InvalidTargetId
            | TransferError::InvalidAmount
            | TransferError::SameAccount => error_codes::INVALID_PARAMETER,
            TransferError::InsufficientFunds => error_codes::INSUFFICIENT_BALANCE,
            TransferError::TargetNotFound => error_codes::ACCOUNT_NOT_FOUND,
            TransferError::TransactionNotFound => error_codes::TRANSACTION_NOT_FOUND,
            TransferError::ServerBusy | TransferError::ShuttingDown => {
                error_codes::SERVICE_UNAVAILABLE
            }
            TransferError::Storage(_) => error_codes::INTERNAL_ERROR,
        }
    }

    pub fn http_status(&self) -> StatusCode {
        match self {
            TransferError::MissingAuthorization
            | TransferError::InvalidAuthorization
            | TransferError::InvalidToken => StatusCode::UNAUTHORIZED,
            TransferError::MalformedRequest(_)
            | TransferError::MissingTarget
            | TransferError::InvalidTargetId
            | TransferError::InvalidAmount
            | TransferError::SameAccount => StatusCode::BAD_REQUEST,
            TransferError::InsufficientFunds | TransferError::TargetNotFound => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            TransferError::TransactionNotFound => StatusCode::NOT_FOUND,
            TransferError::ServerBusy | TransferError::ShuttingDown => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            TransferError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<LedgerError> for TransferError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::InsufficientFunds { .. } => TransferError::InsufficientFunds,
            LedgerError::TransactionNotFound(_) => TransferError::TransactionNotFound,
            other => TransferError::Storage(other.to_string()),
        }
    }
}

impl IntoResponse for TransferError {
    fn into_response(self) -> Response {
        // Storage details stay in the logs
        let msg = match &self {
            TransferError::Storage(_) => "Internal server error".to_string(),
            other => other.to_string(),
        };
        let body = ApiResponse::<()>::error(self.code(), msg);
        (self.http_status(), Json(body)).into_response()
    }
}
