//! Token issuance: merges caller claims with a fresh `iat`/`exp` window and
//! signs with `HS512`.

use std::time::Duration;

use jsonwebtoken::{encode, EncodingKey, Header};
use tollgate_core::claims::merge_for_issuance;
use tollgate_core::Claims;

use super::{unix_now, ALLOWED_ALGORITHM};

/// Errors from issuing a token.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("JWT support is disabled")]
    Disabled,
    #[error("failed to sign token: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),
}

/// Signs tokens accepted by the JWT middleware configured with the same key.
#[derive(Clone)]
pub struct TokenIssuer {
    key: EncodingKey,
    expiration: Duration,
}

impl TokenIssuer {
    #[must_use]
    pub fn new(signing_key: &[u8], expiration: Duration) -> Self {
        Self {
            key: EncodingKey::from_secret(signing_key),
            expiration,
        }
    }

    #[must_use]
    pub fn expiration(&self) -> Duration {
        self.expiration
    }

    /// Issues a token valid from now for the configured expiration.
    ///
    /// `iat` and `exp` in `custom` are overwritten.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::Signing`] if the claims cannot be encoded.
    pub fn issue(&self, custom: &Claims) -> Result<String, TokenError> {
        self.issue_at(custom, unix_now())
    }

    /// Issues a token as if the current time were `now` (Unix seconds).
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::Signing`] if the claims cannot be encoded.
    pub fn issue_at(&self, custom: &Claims, now: u64) -> Result<String, TokenError> {
        let expires_at = now.saturating_add(self.expiration.as_secs());
        let claims = merge_for_issuance(custom, now, expires_at);
        Ok(encode(&Header::new(ALLOWED_ALGORITHM), &claims, &self.key)?)
    }
}

#[cfg(test)]
mod tests {
    use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
    use serde_json::{json, Value};

    use super::*;

    const KEY: &[u8] = b"issuer-test-key";

    fn custom(value: Value) -> Claims {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn issued_token_uses_hs512() {
        let issuer = TokenIssuer::new(KEY, Duration::from_secs(60));
        let token = issuer.issue(&Claims::new()).unwrap();

        assert_eq!(decode_header(&token).unwrap().alg, Algorithm::HS512);
    }

    #[test]
    fn issued_token_carries_custom_claims_and_window() {
        let issuer = TokenIssuer::new(KEY, Duration::from_secs(3_600));
        let now = unix_now();
        let token = issuer
            .issue_at(&custom(json!({"sub": "42", "exp": 1, "iat": 1})), now)
            .unwrap();

        let data = decode::<Value>(
            &token,
            &DecodingKey::from_secret(KEY),
            &Validation::new(Algorithm::HS512),
        )
        .unwrap();

        assert_eq!(data.claims["sub"], "42");
        assert_eq!(data.claims["iat"], now);
        assert_eq!(data.claims["exp"], now + 3_600);
    }
}
