use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, BridgeError>;

/// Error taxonomy for the identity bridge
///
/// Provider-side failures are translated into these kinds before they reach
/// a caller; raw provider error codes are never passed through.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Email already in use")]
    EmailAlreadyInUse,

    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Provider and local directory disagree about this account
    #[error("Account state inconsistent")]
    AccountInconsistent,

    #[error("Notification consent is required for this flow")]
    ConsentRequired,

    #[error("Verification code expired or not found")]
    CodeExpired,

    #[error("Verification code already used")]
    CodeAlreadyConsumed,

    #[error("Invalid verification code")]
    CodeMismatch,

    #[error("Too many verification attempts")]
    TooManyAttempts,

    #[error("Identity provider timed out")]
    ProviderTimeout,

    #[error("Identity provider unavailable")]
    ProviderUnavailable,

    /// Compensation for a partially completed operation failed; journaled
    /// for out-of-band reconciliation, never surfaced as the primary error
    #[error("Compensation failed for {operation} ({provider_uid})")]
    CompensationFailed {
        operation: String,
        provider_uid: String,
    },

    #[error("Session invalid")]
    SessionInvalid,

    #[error("Token expired")]
    TokenExpired,

    #[error("Invalid token")]
    TokenInvalid,

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl BridgeError {
    /// HTTP status for the wire protocol
    pub fn status_code(&self) -> StatusCode {
        match self {
            BridgeError::InvalidInput(_) | BridgeError::CodeMismatch => StatusCode::BAD_REQUEST,
            BridgeError::EmailAlreadyInUse => StatusCode::CONFLICT,
            BridgeError::InvalidCredentials
            | BridgeError::SessionInvalid
            | BridgeError::TokenExpired
            | BridgeError::TokenInvalid => StatusCode::UNAUTHORIZED,
            BridgeError::AccountInconsistent => StatusCode::UNAUTHORIZED,
            BridgeError::ConsentRequired => StatusCode::PRECONDITION_FAILED,
            BridgeError::CodeExpired | BridgeError::CodeAlreadyConsumed => StatusCode::GONE,
            BridgeError::TooManyAttempts => StatusCode::TOO_MANY_REQUESTS,
            BridgeError::ProviderTimeout => StatusCode::GATEWAY_TIMEOUT,
            BridgeError::ProviderUnavailable => StatusCode::BAD_GATEWAY,
            BridgeError::CompensationFailed { .. }
            | BridgeError::Database(_)
            | BridgeError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// User-safe message; never leaks which system of record failed
    pub fn public_message(&self) -> &'static str {
        match self {
            BridgeError::InvalidInput(_) => "Invalid input",
            BridgeError::EmailAlreadyInUse => "This email address is already registered",
            // One message for both: a caller must not learn whether the
            // provider rejected the credential or the local lookup failed
            BridgeError::InvalidCredentials | BridgeError::AccountInconsistent => {
                "Unable to sign in with the provided credentials"
            }
            BridgeError::ConsentRequired => "Notification consent is required to continue",
            BridgeError::CodeExpired => "Verification code expired or not found",
            BridgeError::CodeAlreadyConsumed => "Verification code already used",
            BridgeError::CodeMismatch => "Invalid verification code",
            BridgeError::TooManyAttempts => "Too many attempts; request a new code",
            BridgeError::ProviderTimeout | BridgeError::ProviderUnavailable => {
                "Authentication service is temporarily unavailable"
            }
            BridgeError::SessionInvalid
            | BridgeError::TokenExpired
            | BridgeError::TokenInvalid => "Session expired or invalid",
            BridgeError::CompensationFailed { .. }
            | BridgeError::Database(_)
            | BridgeError::Internal(_) => "Internal server error",
        }
    }
}

impl IntoResponse for BridgeError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = Json(json!({
            "status": "error",
            "message": self.public_message(),
        }));
        (status, body).into_response()
    }
}

// Conversions from external error types

impl From<sqlx::Error> for BridgeError {
    fn from(err: sqlx::Error) -> Self {
        if let Some(db_err) = err.as_database_error() {
            // Unique-constraint violation is the source of truth for races
            // between concurrent sign-ups on the same email
            if db_err.is_unique_violation() {
                return BridgeError::EmailAlreadyInUse;
            }
        }
        tracing::error!(error = %err, "database error");
        BridgeError::Database(err.to_string())
    }
}

impl From<reqwest::Error> for BridgeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            BridgeError::ProviderTimeout
        } else if err.is_connect() {
            BridgeError::ProviderUnavailable
        } else {
            tracing::error!(error = %err, "provider request error");
            BridgeError::ProviderUnavailable
        }
    }
}

impl From<jsonwebtoken::errors::Error> for BridgeError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;
        match err.kind() {
            ErrorKind::ExpiredSignature => BridgeError::TokenExpired,
            _ => BridgeError::TokenInvalid,
        }
    }
}

impl From<validator::ValidationErrors> for BridgeError {
    fn from(err: validator::ValidationErrors) -> Self {
        BridgeError::InvalidInput(err.to_string())
    }
}
