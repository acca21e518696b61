//! Error taxonomy shared by both services' HTTP boundary.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum WalletError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("wallet not found: {0}")]
    WalletNotFound(String),

    #[error("wallet is not active: {0}")]
    WalletNotActive(String),

    #[error("insufficient funds: required {required}, available {available}")]
    InsufficientFunds {
        required: rust_decimal::Decimal,
        available: rust_decimal::Decimal,
    },

    #[error("reference {reference_id} already used with a different payload")]
    DuplicateReference { reference_id: String },

    #[error("optimistic lock retries exhausted")]
    OptimisticLockExhausted,

    #[error("transient-failure retries exhausted")]
    TransientFailureExhausted,

    #[error("internal error {error_id}")]
    Internal {
        error_id: Uuid,
        #[source]
        cause: anyhow::Error,
    },
}

impl WalletError {
    pub fn internal(cause: impl Into<anyhow::Error>) -> Self {
        let error_id = Uuid::new_v4();
        let cause = cause.into();
        tracing::error!(error_id = %error_id, cause = ?cause, "internal error");
        WalletError::Internal { error_id, cause }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            WalletError::Validation(_) => "VALIDATION",
            WalletError::WalletNotFound(_) => "WALLET_NOT_FOUND",
            WalletError::WalletNotActive(_) => "WALLET_NOT_ACTIVE",
            WalletError::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            WalletError::DuplicateReference { .. } => "DUPLICATE_REFERENCE",
            WalletError::OptimisticLockExhausted => "OPTIMISTIC_LOCK_EXHAUSTED",
            WalletError::TransientFailureExhausted => "TRANSIENT_FAILURE_EXHAUSTED",
            WalletError::Internal { .. } => "INTERNAL",
        }
    }

    /// True for failures that are safe to retry automatically — surfaced to
    /// clients as 503s they may retry.
    pub fn is_retriable_class(&self) -> bool {
        matches!(
            self,
            WalletError::OptimisticLockExhausted | WalletError::TransientFailureExhausted
        )
    }
}

impl From<sqlx::Error> for WalletError {
    fn from(e: sqlx::Error) -> Self {
        WalletError::internal(e)
    }
}

impl IntoResponse for WalletError {
    fn into_response(self) -> Response {
        // Domain conflicts and validation are reported directly, without error-level
        // logging; the two exhaustion kinds and INTERNAL are logged already by the
        // resilience wrapper / `WalletError::internal` respectively.
        let status = match &self {
            WalletError::Validation(_) => StatusCode::BAD_REQUEST,
            WalletError::WalletNotFound(_) => StatusCode::NOT_FOUND,
            WalletError::WalletNotActive(_) => StatusCode::CONFLICT,
            WalletError::InsufficientFunds { .. } => StatusCode::CONFLICT,
            WalletError::DuplicateReference { .. } => StatusCode::CONFLICT,
            WalletError::OptimisticLockExhausted => StatusCode::SERVICE_UNAVAILABLE,
            WalletError::TransientFailureExhausted => StatusCode::SERVICE_UNAVAILABLE,
            WalletError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = match &self {
            WalletError::Internal { error_id, .. } => json!({
                "success": false,
                "kind": self.kind(),
                "errorId": error_id.to_string(),
                "message": "an internal error occurred",
            }),
            _ => json!({
                "success": false,
                "kind": self.kind(),
                "message": self.to_string(),
            }),
        };

        (status, Json(body)).into_response()
    }
}

pub type WalletResult<T> = Result<T, WalletError>;
