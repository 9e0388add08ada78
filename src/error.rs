//! Gateway error types with HTTP status code mapping.
//!
//! [`GatewayError`] is the central error type for the gateway. Each
//! variant maps to a specific HTTP status code and structured JSON
//! error response.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::RecordError;
use crate::ledger::LedgerError;
use crate::provider::ProviderError;

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 2002,
///     "message": "donation already paid: d-1",
///     "details": null
///   }
/// }
/// ```
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Numeric error code.
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Server-side error enum with HTTP status code mapping.
///
/// # Error Code Ranges
///
/// | Range     | Category        | HTTP Status               |
/// |-----------|-----------------|---------------------------|
/// | 1000–1999 | Validation      | 400 Bad Request           |
/// | 2000–2999 | State / Auth    | 404 / 409 / 401           |
/// | 3000–3999 | Server / Ledger | 500 Internal Server Error |
/// | 4000–4999 | Provider        | 502 Bad Gateway           |
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Request validation failed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Donation with the given id does not exist.
    #[error("donation not found: {0}")]
    DonationNotFound(String),

    /// The donation is already paid; no further intents may be issued.
    #[error("donation already paid: {0}")]
    DonationAlreadyPaid(String),

    /// PIX transaction with the given id has no polling state.
    #[error("pix transaction not found: {0}")]
    ChargeNotFound(String),

    /// Missing or wrong access key on a gated endpoint.
    #[error("invalid access key")]
    Unauthorized,

    /// Payment or PIX provider call failed; nothing was written.
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    /// The provider returned a checkout session with no attached
    /// payment intent.
    #[error("checkout session {0} has no payment intent")]
    SessionWithoutIntent(String),

    /// Ledger backend failure.
    #[error("ledger error: {0}")]
    Store(String),

    /// A transaction aborted on a guard that signals missing or
    /// diverged rows — not the idempotency fence. Eligible for
    /// redelivery retry upstream.
    #[error("ledger inconsistency: {0}")]
    Inconsistency(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::InvalidRequest(_) => 1001,
            Self::DonationNotFound(_) => 2001,
            Self::DonationAlreadyPaid(_) => 2002,
            Self::Unauthorized => 2003,
            Self::ChargeNotFound(_) => 2004,
            Self::Internal(_) => 3000,
            Self::Store(_) => 3001,
            Self::Inconsistency(_) => 3002,
            Self::Provider(_) => 4001,
            Self::SessionWithoutIntent(_) => 4002,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::DonationNotFound(_) | Self::ChargeNotFound(_) => StatusCode::NOT_FOUND,
            Self::DonationAlreadyPaid(_) => StatusCode::CONFLICT,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Provider(_) | Self::SessionWithoutIntent(_) => StatusCode::BAD_GATEWAY,
            Self::Store(_) | Self::Inconsistency(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<LedgerError> for GatewayError {
    /// Default mapping for call sites that did not already bifurcate
    /// on the failing operation index.
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::ConditionFailed(_) => Self::Inconsistency(err.to_string()),
            LedgerError::Backend(msg) => Self::Store(msg),
        }
    }
}

impl From<RecordError> for GatewayError {
    fn from(err: RecordError) -> Self {
        Self::Inconsistency(err.to_string())
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
                details: None,
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}
