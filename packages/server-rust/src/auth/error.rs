//! Authentication error taxonomy and its wire representation.
//!
//! Every rejection is rendered as `{"error": {"message": "<code>"}}` with a
//! 401 for an absent credential and a 403 for one that is present but invalid.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tollgate_core::ClaimsError;

/// Machine-readable codes carried in the error body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    MissingJwt,
    InvalidJwt,
    InvalidJwtSigning,
    InvalidJwtAlgo,
}

impl ErrorCode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MissingJwt => "missing_jwt",
            Self::InvalidJwt => "invalid_jwt",
            Self::InvalidJwtSigning => "invalid_jwt_signing",
            Self::InvalidJwtAlgo => "invalid_jwt_algo",
        }
    }
}

/// Why the JWT middleware refused a request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("no bearer token in request")]
    MissingToken,
    #[error("token signing method is not HMAC")]
    InvalidSigningMethod,
    #[error("token is malformed or its signature does not verify")]
    Unverified,
    #[error("token algorithm is not the allow-listed one")]
    InvalidAlgorithm,
    #[error("token claims are not a JSON object")]
    ClaimsNotObject,
    #[error("token claims are not valid: {0}")]
    InvalidClaims(#[from] ClaimsError),
}

impl AuthError {
    /// Code describing the failure itself.
    #[must_use]
    pub fn reason(&self) -> ErrorCode {
        match self {
            Self::MissingToken | Self::Unverified => ErrorCode::MissingJwt,
            Self::InvalidSigningMethod => ErrorCode::InvalidJwtSigning,
            Self::InvalidAlgorithm => ErrorCode::InvalidJwtAlgo,
            Self::ClaimsNotObject | Self::InvalidClaims(_) => ErrorCode::InvalidJwt,
        }
    }

    /// Code sent to the client.
    ///
    /// A signing-method rejection is reported as `missing_jwt`, like any other
    /// parse or signature failure; clients have always seen it that way.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self.reason() {
            ErrorCode::InvalidJwtSigning => ErrorCode::MissingJwt,
            other => other,
        }
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingToken => StatusCode::UNAUTHORIZED,
            _ => StatusCode::FORBIDDEN,
        }
    }
}

/// JSON error envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorMessage,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorMessage {
    pub message: String,
}

impl ErrorBody {
    #[must_use]
    pub fn new(code: ErrorCode) -> Self {
        Self {
            error: ErrorMessage {
                message: code.as_str().to_string(),
            },
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        (self.status(), Json(ErrorBody::new(self.code()))).into_response()
    }
}
