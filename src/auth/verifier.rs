//! HS256 bearer token verification

use anyhow::{Context, Result};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use std::sync::Arc;

use super::Claims;

/// Verifies tokens signed with the shared `AUTH_JWT_SECRET`
#[derive(Clone)]
pub struct TokenVerifier {
    key: Arc<DecodingKey>,
    validation: Validation,
}

impl TokenVerifier {
    pub fn new(secret: &str, audience: &str, issuer: Option<&str>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[audience]);
        if let Some(issuer) = issuer {
            validation.set_issuer(&[issuer]);
        }
        validation.validate_exp = true;
        validation.leeway = 30;

        Self {
            key: Arc::new(DecodingKey::from_secret(secret.as_bytes())),
            validation,
        }
    }

    /// Verify a JWT and return its claims
    pub fn verify(&self, token: &str) -> Result<Claims> {
        let data = decode::<Claims>(token, &self.key, &self.validation)
            .context("Token verification failed")?;
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn token(secret: &str, aud: &str, iss: Option<&str>, exp_offset: i64) -> String {
        let claims = Claims {
            sub: "staff-1".to_string(),
            aud: aud.to_string(),
            exp: chrono::Utc::now().timestamp() + exp_offset,
            iat: Some(chrono::Utc::now().timestamp()),
            iss: iss.map(String::from),
            name: Some("Tom".to_string()),
            email: None,
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn accepts_valid_token() {
        let verifier = TokenVerifier::new("s3cret", "authenticated", None);
        let claims = verifier
            .verify(&token("s3cret", "authenticated", None, 3600))
            .unwrap();
        assert_eq!(claims.sub, "staff-1");
        assert_eq!(claims.name.as_deref(), Some("Tom"));
    }

    #[test]
    fn rejects_wrong_secret_audience_or_expiry() {
        let verifier = TokenVerifier::new("s3cret", "authenticated", None);
        assert!(verifier.verify(&token("other", "authenticated", None, 3600)).is_err());
        assert!(verifier.verify(&token("s3cret", "someone-else", None, 3600)).is_err());
        assert!(verifier.verify(&token("s3cret", "authenticated", None, -3600)).is_err());
        assert!(verifier.verify("not-a-jwt").is_err());
    }

    #[test]
    fn enforces_issuer_when_configured() {
        let verifier = TokenVerifier::new("s3cret", "authenticated", Some("grizzle"));
        assert!(verifier
            .verify(&token("s3cret", "authenticated", Some("grizzle"), 3600))
            .is_ok());
        assert!(verifier
            .verify(&token("s3cret", "authenticated", Some("elsewhere"), 3600))
            .is_err());
    }
}
