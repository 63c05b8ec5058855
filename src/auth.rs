//! Bearer token verification (Auth Verifier, C4).
//!
//! Verifies HS256-signed JWTs the same way the original system's issuer
//! signs them: `HS256` only, `sub`/`exp`/`iat` claims, non-empty subject.

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::error::AuthError;

/// Claims carried by a gateway access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: u64,
    pub iat: u64,
}

/// Verifies bearer tokens against a single HMAC signing key.
#[derive(Clone)]
pub struct AuthVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl std::fmt::Debug for AuthVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthVerifier").finish_non_exhaustive()
    }
}

impl AuthVerifier {
    #[must_use]
    pub fn new(signing_key: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        Self {
            key: DecodingKey::from_secret(signing_key),
            validation,
        }
    }

    /// Verify a bearer token, returning its claims on success.
    ///
    /// Rejects: empty/missing tokens, malformed tokens, tokens signed with
    /// an algorithm other than HS256, expired tokens, and tokens whose
    /// `sub` claim is empty.
    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }

        let data = decode::<Claims>(token, &self.key, &self.validation).map_err(|e| {
            use jsonwebtoken::errors::ErrorKind;
            match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::Expired,
                ErrorKind::InvalidAlgorithm => AuthError::UnsupportedAlgorithm,
                _ => AuthError::Malformed(e),
            }
        })?;

        if data.claims.sub.is_empty() {
            return Err(AuthError::EmptySubject);
        }

        Ok(data.claims)
    }

    /// Extract the bearer token from the `token` query parameter — the
    /// gateway's only token-carrying surface (`GET /ws?token=<bearer>`).
    /// An absent or empty value is treated as no token.
    #[must_use]
    pub fn extract_token(query_token: Option<&str>) -> Option<&str> {
        query_token.filter(|t| !t.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    const KEY: &[u8] = b"test-signing-key";

    fn sign(claims: &Claims) -> String {
        encode(&Header::new(Algorithm::HS256), claims, &EncodingKey::from_secret(KEY)).unwrap()
    }

    fn now() -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs()
    }

    #[test]
    fn test_valid_token_verifies() {
        let verifier = AuthVerifier::new(KEY);
        let claims = Claims {
            sub: "user-1".into(),
            iat: now(),
            exp: now() + 3600,
        };
        let token = sign(&claims);
        let verified = verifier.verify(&token).unwrap();
        assert_eq!(verified.sub, "user-1");
    }

    #[test]
    fn test_empty_token_rejected() {
        let verifier = AuthVerifier::new(KEY);
        assert!(matches!(verifier.verify(""), Err(AuthError::MissingToken)));
    }

    #[test]
    fn test_expired_token_rejected() {
        let verifier = AuthVerifier::new(KEY);
        let claims = Claims {
            sub: "user-1".into(),
            iat: now() - 7200,
            exp: now() - 3600,
        };
        let token = sign(&claims);
        assert!(matches!(verifier.verify(&token), Err(AuthError::Expired)));
    }

    #[test]
    fn test_empty_subject_rejected() {
        let verifier = AuthVerifier::new(KEY);
        let claims = Claims {
            sub: String::new(),
            iat: now(),
            exp: now() + 3600,
        };
        let token = sign(&claims);
        assert!(matches!(verifier.verify(&token), Err(AuthError::EmptySubject)));
    }

    #[test]
    fn test_wrong_key_rejected() {
        let verifier = AuthVerifier::new(KEY);
        let claims = Claims {
            sub: "user-1".into(),
            iat: now(),
            exp: now() + 3600,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"wrong-key"),
        )
        .unwrap();
        assert!(verifier.verify(&token).is_err());
    }

    #[test]
    fn test_non_hs256_algorithm_rejected() {
        let verifier = AuthVerifier::new(KEY);
        let claims = Claims {
            sub: "user-1".into(),
            iat: now(),
            exp: now() + 3600,
        };
        let token = encode(&Header::new(Algorithm::HS384), &claims, &EncodingKey::from_secret(KEY)).unwrap();
        assert!(verifier.verify(&token).is_err());
    }

    #[test]
    fn test_extract_token_returns_query_value() {
        let t = AuthVerifier::extract_token(Some("abc"));
        assert_eq!(t, Some("abc"));
    }

    #[test]
    fn test_extract_token_treats_empty_as_missing() {
        assert_eq!(AuthVerifier::extract_token(Some("")), None);
        assert_eq!(AuthVerifier::extract_token(None), None);
    }
}
