//! Signed bearer token issuance and verification.
//!
//! A provider that both issues and verifies tokens whose claim is a single
//! sub-queue name rather than a user id with roles.

use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};

use crate::config::TokenConfig;
use crate::error::AppError;

use super::claims::QueueClaims;

pub struct TokenProvider {
    keys: Option<(EncodingKey, DecodingKey)>,
    default_ttl_seconds: u64,
}

impl TokenProvider {
    pub fn new(config: &TokenConfig) -> Self {
        let keys = config.secret.as_ref().map(|secret| {
            (
                EncodingKey::from_secret(secret.as_bytes()),
                DecodingKey::from_secret(secret.as_bytes()),
            )
        });

        Self {
            keys,
            default_ttl_seconds: config.default_ttl_seconds,
        }
    }

    fn validation() -> Validation {
        let mut validation = Validation::new(Algorithm::HS256);
        // `exp` is optional on our claims; jsonwebtoken requires us to say
        // so explicitly or it demands the claim be present.
        validation.required_spec_claims.clear();
        validation
    }

    /// Issue a token scoped to `sub_queue`. `ttl` overrides the
    /// configured default; `None` TTL means the token never expires.
    pub fn issue(&self, sub_queue: &str, ttl_seconds: Option<u64>) -> Result<String, AppError> {
        let (encoding_key, _) = self
            .keys
            .as_ref()
            .ok_or_else(|| AppError::Internal("token signing secret is not configured".into()))?;

        let now = Utc::now().timestamp();
        let ttl = ttl_seconds.unwrap_or(self.default_ttl_seconds);
        let claims = QueueClaims {
            sub_queue: sub_queue.to_string(),
            iat: now,
            exp: if ttl == 0 { None } else { Some(now + ttl as i64) },
        };

        encode(&Header::new(Algorithm::HS256), &claims, encoding_key)
            .map_err(|e| AppError::Internal(format!("failed to sign token: {e}")))
    }

    /// Validate signature and expiry, returning the claimed sub-queue.
    pub fn verify(&self, token: &str) -> Result<String, AppError> {
        let (_, decoding_key) = self.keys.as_ref().ok_or(AppError::AuthInvalid)?;

        let data = decode::<QueueClaims>(token, decoding_key, &Self::validation())
            .map_err(|_| AppError::AuthInvalid)?;

        if let Some(exp) = data.claims.exp {
            if exp < Utc::now().timestamp() {
                return Err(AppError::AuthInvalid);
            }
        }

        Ok(data.claims.sub_queue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(secret: Option<&str>) -> TokenConfig {
        TokenConfig {
            secret: secret.map(str::to_string),
            default_ttl_seconds: 3600,
        }
    }

    #[test]
    fn issue_then_verify_round_trips_the_sub_queue_claim() {
        let provider = TokenProvider::new(&config(Some("test-secret")));
        let token = provider.issue("secure", None).unwrap();
        assert_eq!(provider.verify(&token).unwrap(), "secure");
    }

    #[test]
    fn verify_rejects_a_token_signed_with_a_different_secret() {
        let issuer = TokenProvider::new(&config(Some("secret-a")));
        let verifier = TokenProvider::new(&config(Some("secret-b")));
        let token = issuer.issue("secure", None).unwrap();
        assert!(matches!(verifier.verify(&token), Err(AppError::AuthInvalid)));
    }

    #[test]
    fn verify_rejects_an_expired_token() {
        let provider = TokenProvider::new(&config(Some("test-secret")));
        let token = provider.issue("secure", Some(0)).unwrap();
        // ttl of 0 means "never expires" per issue()'s convention; use a
        // negative-in-effect ttl by issuing then waiting isn't feasible in
        // a unit test, so exercise expiry via a token already in the past.
        let _ = token;

        let past_claims = QueueClaims {
            sub_queue: "secure".to_string(),
            iat: Utc::now().timestamp() - 7200,
            exp: Some(Utc::now().timestamp() - 3600),
        };
        let (encoding_key, _) = provider.keys.as_ref().unwrap();
        let expired = encode(&Header::new(Algorithm::HS256), &past_claims, encoding_key).unwrap();
        assert!(matches!(provider.verify(&expired), Err(AppError::AuthInvalid)));
    }

    #[test]
    fn issue_fails_without_a_configured_secret() {
        let provider = TokenProvider::new(&config(None));
        assert!(provider.issue("secure", None).is_err());
    }

    #[test]
    fn verify_rejects_everything_without_a_configured_secret() {
        let issuer = TokenProvider::new(&config(Some("test-secret")));
        let token = issuer.issue("secure", None).unwrap();

        let no_secret_provider = TokenProvider::new(&config(None));
        assert!(matches!(
            no_secret_provider.verify(&token),
            Err(AppError::AuthInvalid)
        ));
    }
}
