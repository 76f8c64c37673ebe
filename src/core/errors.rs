//! Error types for the allocation service.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Service-level error taxonomy. Every internal failure maps onto one of
/// these variants; messages carry the failing operation and wallet name but
/// never token or seed material.
#[derive(Debug, Error)]
pub enum VaultError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unauthorized")]
    Unauthorized,

    /// A token resolved to a wallet that no longer exists. This is a
    /// server-side inconsistency, not a caller mistake.
    #[error("Wallet not found: {0}")]
    WalletNotFound(String),

    /// A persisted counter record failed to decode. Allocations for that
    /// wallet must stop until the record is repaired; defaulting to index 0
    /// would silently reuse indices.
    #[error("Corrupt allocation record for wallet {0}: {1}")]
    CorruptState(String, String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Derivation error: {0}")]
    Derivation(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl VaultError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::WalletNotFound(_)
            | Self::CorruptState(_, _)
            | Self::Storage(_)
            | Self::Derivation(_)
            | Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable error code for clients.
    pub fn error_code(&self) -> &str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::Unauthorized => "unauthorized",
            Self::WalletNotFound(_) => "internal_error",
            Self::CorruptState(_, _) => "corrupt_state",
            Self::Storage(_) => "storage_error",
            Self::Derivation(_) => "derivation_error",
            Self::Config(_) => "config_error",
        }
    }

    /// Message safe to return to callers. Server-side inconsistencies are
    /// collapsed to a generic message; details stay in the logs.
    pub fn user_message(&self) -> String {
        match self {
            Self::InvalidInput(msg) => msg.clone(),
            Self::Unauthorized => "token not found".to_string(),
            Self::WalletNotFound(_) => "internal error".to_string(),
            Self::CorruptState(wallet, _) => {
                format!("allocation state for wallet '{}' is corrupt", wallet)
            }
            Self::Storage(_) => "storage failure".to_string(),
            Self::Derivation(_) => "derivation failure".to_string(),
            Self::Config(_) => "configuration failure".to_string(),
        }
    }

    /// Safe to retry by the caller: no partial mutation happens before a
    /// committed write. Surfaced in the response body so clients need not
    /// hardcode which codes are transient.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}

impl IntoResponse for VaultError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({
            "error": self.user_message(),
            "code": self.error_code(),
            "retryable": self.is_retryable(),
        }));
        (status, body).into_response()
    }
}

impl From<sqlx::Error> for VaultError {
    fn from(err: sqlx::Error) -> Self {
        VaultError::Storage(err.to_string())
    }
}
