//! Bearer-token verification and issuance.
//!
//! Verification runs as a fixed sequence, each step with its own rejection:
//!
//! 1. **Parse**: split the compact token and decode its header.
//! 2. **Resolve key**: only the HMAC family may reach the signing key.
//! 3. **Verify signature** against the resolved key.
//! 4. **Pin algorithm**: the verified algorithm must be `HS512`.
//! 5. **Validate claims**: a JSON object with sound `exp`/`iat`/`nbf`.

pub mod error;
pub mod token;

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::http::{HeaderMap, HeaderName};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use jsonwebtoken::{crypto, decode_header, Algorithm, DecodingKey, Header};
use serde_json::Value;
use tollgate_core::claims::validate_time_claims;
use tollgate_core::Claims;

pub use error::{AuthError, ErrorBody, ErrorCode};
pub use token::{TokenError, TokenIssuer};

/// The only algorithm a verified token may declare.
pub const ALLOWED_ALGORITHM: Algorithm = Algorithm::HS512;

/// Authorization scheme prefix, including the separating space.
pub const BEARER_PREFIX: &str = "Bearer ";

// ---------------------------------------------------------------------------
// Signing keys
// ---------------------------------------------------------------------------

/// Supplies the secret used to verify token signatures.
pub trait SigningKeySource: Send + Sync {
    fn signing_key(&self) -> &[u8];
}

/// A fixed secret, set once per server instance.
#[derive(Clone)]
pub struct StaticKey(Arc<[u8]>);

impl StaticKey {
    #[must_use]
    pub fn new(key: impl AsRef<[u8]>) -> Self {
        Self(Arc::from(key.as_ref()))
    }
}

impl SigningKeySource for StaticKey {
    fn signing_key(&self) -> &[u8] {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// Extraction and verification
// ---------------------------------------------------------------------------

/// Returns the token from a `Bearer <token>` header value, if there is one.
///
/// The scheme is matched case-sensitively and the token must be non-empty.
#[must_use]
pub fn extract_bearer<'a>(headers: &'a HeaderMap, name: &HeaderName) -> Option<&'a str> {
    headers
        .get(name)?
        .to_str()
        .ok()?
        .strip_prefix(BEARER_PREFIX)
        .filter(|token| !token.is_empty())
}

/// Picks the verification key for a parsed header.
///
/// Non-HMAC algorithms are refused before `keys` is consulted.
fn resolve_key(header: &Header, keys: &dyn SigningKeySource) -> Result<DecodingKey, AuthError> {
    if !matches!(
        header.alg,
        Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512
    ) {
        return Err(AuthError::InvalidSigningMethod);
    }
    Ok(DecodingKey::from_secret(keys.signing_key()))
}

/// Verifies `token` and returns its full claim set.
///
/// `now` is the current time in Unix seconds, used for `exp`/`iat`/`nbf`.
///
/// # Errors
///
/// Returns the [`AuthError`] of the first step that fails.
pub fn verify_token(
    token: &str,
    keys: &dyn SigningKeySource,
    now: u64,
) -> Result<Claims, AuthError> {
    if token.split('.').count() != 3 {
        return Err(AuthError::Unverified);
    }
    let (message, signature) = token.rsplit_once('.').ok_or(AuthError::Unverified)?;
    let (_, payload) = message.split_once('.').ok_or(AuthError::Unverified)?;

    let header = decode_header(token).map_err(|_| AuthError::Unverified)?;
    let key = resolve_key(&header, keys)?;

    let verified = crypto::verify(signature, message.as_bytes(), &key, header.alg)
        .map_err(|_| AuthError::Unverified)?;
    if !verified {
        return Err(AuthError::Unverified);
    }

    if header.alg != ALLOWED_ALGORITHM {
        return Err(AuthError::InvalidAlgorithm);
    }

    let raw = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|_| AuthError::Unverified)?;
    let value: Value = serde_json::from_slice(&raw).map_err(|_| AuthError::Unverified)?;
    let Value::Object(claims) = value else {
        return Err(AuthError::ClaimsNotObject);
    };

    validate_time_claims(&claims, now)?;
    Ok(claims)
}

/// Current time in Unix seconds. A clock before the epoch reads as 0.
pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs())
}
