//! JWT claim set handling: reserved names, time validation, issuance merge.

use serde_json::{Map, Value};

/// Issued-at claim, set on issuance and never propagated.
pub const CLAIM_ISSUED_AT: &str = "iat";
/// Expiration claim, set on issuance and never propagated.
pub const CLAIM_EXPIRES_AT: &str = "exp";
/// Not-before claim. Validated when present, propagated like any other claim.
pub const CLAIM_NOT_BEFORE: &str = "nbf";

/// Claim names that are excluded from request-local propagation.
pub const RESERVED_CLAIMS: [&str; 2] = [CLAIM_ISSUED_AT, CLAIM_EXPIRES_AT];

/// A decoded claim set: claim name to arbitrary JSON value.
pub type Claims = Map<String, Value>;

/// Why a claim set failed time validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClaimsError {
    #[error("token expired")]
    Expired,
    #[error("token issued in the future")]
    IssuedInFuture,
    #[error("token not valid yet")]
    NotYetValid,
    #[error("claim {0:?} is not a numeric date")]
    NotNumeric(&'static str),
}

#[must_use]
pub fn is_reserved(name: &str) -> bool {
    RESERVED_CLAIMS.contains(&name)
}

/// Iterates the claims that should be copied into request-local storage.
pub fn propagated(claims: &Claims) -> impl Iterator<Item = (&String, &Value)> {
    claims.iter().filter(|(name, _)| !is_reserved(name))
}

/// Checks `exp`, `iat` and `nbf` against `now` (seconds since the Unix epoch).
///
/// Absent claims are accepted. Present ones must be JSON numbers with
/// `now <= exp`, `iat <= now` and `nbf <= now`; no leeway is applied.
///
/// # Errors
///
/// Returns the first failing check.
pub fn validate_time_claims(claims: &Claims, now: u64) -> Result<(), ClaimsError> {
    #[allow(clippy::cast_precision_loss)]
    let now = now as f64;

    if let Some(exp) = numeric_date(claims, CLAIM_EXPIRES_AT)? {
        if now > exp {
            return Err(ClaimsError::Expired);
        }
    }
    if let Some(iat) = numeric_date(claims, CLAIM_ISSUED_AT)? {
        if iat > now {
            return Err(ClaimsError::IssuedInFuture);
        }
    }
    if let Some(nbf) = numeric_date(claims, CLAIM_NOT_BEFORE)? {
        if nbf > now {
            return Err(ClaimsError::NotYetValid);
        }
    }
    Ok(())
}

fn numeric_date(claims: &Claims, name: &'static str) -> Result<Option<f64>, ClaimsError> {
    match claims.get(name) {
        None => Ok(None),
        Some(value) => value
            .as_f64()
            .map(Some)
            .ok_or(ClaimsError::NotNumeric(name)),
    }
}

/// Builds the claim set for a new token.
///
/// Custom claims are copied first; `iat` and `exp` are then always overwritten,
/// so a caller can never choose its own validity window.
#[must_use]
pub fn merge_for_issuance(custom: &Claims, issued_at: u64, expires_at: u64) -> Claims {
    let mut claims = custom.clone();
    claims.insert(CLAIM_ISSUED_AT.to_string(), Value::from(issued_at));
    claims.insert(CLAIM_EXPIRES_AT.to_string(), Value::from(expires_at));
    claims
}
