//! Signed-token verification.
//!
//! [`TokenVerifier`] is the seam the dispatcher calls for auth-gated methods.
//! [`JwtVerifier`] is the production implementation on top of `jsonwebtoken`.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde_json::Value;
use wsi_settings::AuthSettings;

use crate::errors::AuthError;

/// Decoded token claims as delivered to handlers.
pub type Claims = Value;

/// Verifies a signed token and returns its decoded claims.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    /// Verify `token`. Any failure means the request is unauthorized.
    async fn verify(&self, token: &str) -> Result<Claims, AuthError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum KeyFamily {
    Hmac,
    Rsa,
    Ec,
    Ed,
}

fn family(alg: Algorithm) -> KeyFamily {
    match alg {
        Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => KeyFamily::Hmac,
        Algorithm::RS256
        | Algorithm::RS384
        | Algorithm::RS512
        | Algorithm::PS256
        | Algorithm::PS384
        | Algorithm::PS512 => KeyFamily::Rsa,
        Algorithm::ES256 | Algorithm::ES384 => KeyFamily::Ec,
        Algorithm::EdDSA => KeyFamily::Ed,
    }
}

/// Parse algorithm names and check they share one key family.
fn parse_algorithms(names: &[String]) -> Result<(Vec<Algorithm>, KeyFamily), AuthError> {
    let algorithms = names
        .iter()
        .map(|name| {
            Algorithm::from_str(name.trim())
                .map_err(|_| AuthError::Config(format!("unknown algorithm: {name}")))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let Some(first) = algorithms.first() else {
        return Err(AuthError::Config("no algorithms configured".into()));
    };
    let expected = family(*first);
    if let Some(other) = algorithms.iter().find(|a| family(**a) != expected) {
        return Err(AuthError::Config(format!(
            "algorithms must share one key type: {first:?} and {other:?}"
        )));
    }
    Ok((algorithms, expected))
}

/// Read a PEM public key for an asymmetric family.
fn public_key(key_family: KeyFamily, path: &str) -> Result<DecodingKey, AuthError> {
    let pem = std::fs::read(path)
        .map_err(|e| AuthError::Config(format!("failed to read {path}: {e}")))?;
    let decoded = match key_family {
        KeyFamily::Rsa => DecodingKey::from_rsa_pem(&pem),
        KeyFamily::Ec => DecodingKey::from_ec_pem(&pem),
        KeyFamily::Ed => DecodingKey::from_ed_pem(&pem),
        KeyFamily::Hmac => {
            return Err(AuthError::Config("HMAC algorithms take a secret, not a key file".into()));
        }
    };
    decoded.map_err(|e| AuthError::Config(format!("invalid public key {path}: {e}")))
}

/// JWT verifier bound to one key and a fixed validation policy.
pub struct JwtVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    /// Build from a decoding key and the accepted algorithms.
    ///
    /// `exp` and `nbf` are checked when present but not required.
    pub fn new(key: DecodingKey, algorithms: &[Algorithm]) -> Result<Self, AuthError> {
        let Some(first) = algorithms.first() else {
            return Err(AuthError::Config("no algorithms configured".into()));
        };
        let mut validation = Validation::new(*first);
        validation.algorithms = algorithms.to_vec();
        validation.required_spec_claims = HashSet::new();
        validation.validate_nbf = true;
        validation.validate_aud = false;
        Ok(Self { key, validation })
    }

    /// Shared-secret verifier for HMAC algorithms.
    pub fn hmac(secret: &[u8], algorithms: &[Algorithm]) -> Result<Self, AuthError> {
        if let Some(alg) = algorithms.iter().find(|a| family(**a) != KeyFamily::Hmac) {
            return Err(AuthError::Config(format!("{alg:?} is not an HMAC algorithm")));
        }
        Self::new(DecodingKey::from_secret(secret), algorithms)
    }

    /// Build from auth settings.
    ///
    /// Returns [`AuthError::NotConfigured`] when no key material is set for
    /// the configured algorithm family.
    pub fn from_settings(settings: &AuthSettings) -> Result<Self, AuthError> {
        let (algorithms, key_family) = parse_algorithms(&settings.algorithms)?;

        let key = if key_family == KeyFamily::Hmac {
            match settings.secret.as_deref().filter(|s| !s.is_empty()) {
                Some(secret) => DecodingKey::from_secret(secret.as_bytes()),
                None => return Err(AuthError::NotConfigured),
            }
        } else {
            let Some(path) = settings.public_key_path.as_deref().filter(|p| !p.is_empty())
            else {
                return Err(AuthError::NotConfigured);
            };
            public_key(key_family, path)?
        };

        let mut verifier = Self::new(key, &algorithms)?;
        verifier.validation.leeway = settings.leeway_secs;
        if let Some(issuer) = settings.issuer.as_deref() {
            verifier.validation.set_issuer(&[issuer]);
        }
        if let Some(audience) = settings.audience.as_deref() {
            verifier.validation.set_audience(&[audience]);
            verifier.validation.validate_aud = true;
        }
        Ok(verifier)
    }

    /// Verify without going through the async trait.
    pub fn verify_sync(&self, token: &str) -> Result<Claims, AuthError> {
        decode::<Value>(token, &self.key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::Expired,
                _ => AuthError::Invalid(e.to_string()),
            })
    }
}

impl fmt::Debug for JwtVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtVerifier")
            .field("algorithms", &self.validation.algorithms)
            .field("leeway", &self.validation.leeway)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl TokenVerifier for JwtVerifier {
    async fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        self.verify_sync(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use jsonwebtoken::{EncodingKey, Header, encode};
    use serde_json::json;
    use std::time::{SystemTime, UNIX_EPOCH};

    const SECRET: &str = "test-secret";

    fn now() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs()
            .try_into()
            .unwrap()
    }

    fn sign(claims: &Value, secret: &str, alg: Algorithm) -> String {
        encode(
            &Header::new(alg),
            claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn settings() -> AuthSettings {
        AuthSettings {
            secret: Some(SECRET.into()),
            ..AuthSettings::default()
        }
    }

    #[test]
    fn valid_token_returns_claims() {
        let verifier = JwtVerifier::from_settings(&settings()).unwrap();
        let claims = json!({"sub": "user-1", "exp": now() + 300, "role": "admin"});
        let token = sign(&claims, SECRET, Algorithm::HS256);
        assert_eq!(verifier.verify_sync(&token).unwrap(), claims);
    }

    #[test]
    fn exp_is_optional() {
        let verifier = JwtVerifier::from_settings(&settings()).unwrap();
        let token = sign(&json!({"sub": "user-1"}), SECRET, Algorithm::HS512);
        assert_eq!(verifier.verify_sync(&token).unwrap()["sub"], "user-1");
    }

    #[test]
    fn expired_token() {
        let verifier = JwtVerifier::from_settings(&settings()).unwrap();
        let token = sign(&json!({"sub": "u", "exp": now() - 600}), SECRET, Algorithm::HS256);
        assert_matches!(verifier.verify_sync(&token), Err(AuthError::Expired));
    }

    #[test]
    fn leeway_accepts_recently_expired() {
        let mut s = settings();
        s.leeway_secs = 3600;
        let verifier = JwtVerifier::from_settings(&s).unwrap();
        let token = sign(&json!({"sub": "u", "exp": now() - 600}), SECRET, Algorithm::HS256);
        assert!(verifier.verify_sync(&token).is_ok());
    }

    #[test]
    fn not_yet_valid_token() {
        let verifier = JwtVerifier::from_settings(&settings()).unwrap();
        let token = sign(&json!({"sub": "u", "nbf": now() + 600}), SECRET, Algorithm::HS256);
        assert_matches!(verifier.verify_sync(&token), Err(AuthError::Invalid(_)));
    }

    #[test]
    fn wrong_secret() {
        let verifier = JwtVerifier::from_settings(&settings()).unwrap();
        let token = sign(&json!({"sub": "u"}), "other-secret", Algorithm::HS256);
        assert_matches!(verifier.verify_sync(&token), Err(AuthError::Invalid(_)));
    }

    #[test]
    fn garbage_token() {
        let verifier = JwtVerifier::from_settings(&settings()).unwrap();
        for token in ["", "abc", "a.b.c", "Bearer xyz"] {
            assert_matches!(verifier.verify_sync(token), Err(AuthError::Invalid(_)));
        }
    }

    #[test]
    fn disallowed_algorithm() {
        let mut s = settings();
        s.algorithms = vec!["HS256".into()];
        let verifier = JwtVerifier::from_settings(&s).unwrap();
        let token = sign(&json!({"sub": "u"}), SECRET, Algorithm::HS384);
        assert_matches!(verifier.verify_sync(&token), Err(AuthError::Invalid(_)));
    }

    #[test]
    fn issuer_and_audience_checked_when_configured() {
        let mut s = settings();
        s.issuer = Some("wsi".into());
        s.audience = Some("clients".into());
        let verifier = JwtVerifier::from_settings(&s).unwrap();

        let good = sign(
            &json!({"sub": "u", "iss": "wsi", "aud": "clients"}),
            SECRET,
            Algorithm::HS256,
        );
        assert!(verifier.verify_sync(&good).is_ok());

        let bad_iss = sign(
            &json!({"sub": "u", "iss": "other", "aud": "clients"}),
            SECRET,
            Algorithm::HS256,
        );
        assert_matches!(verifier.verify_sync(&bad_iss), Err(AuthError::Invalid(_)));

        let bad_aud = sign(
            &json!({"sub": "u", "iss": "wsi", "aud": "someone"}),
            SECRET,
            Algorithm::HS256,
        );
        assert_matches!(verifier.verify_sync(&bad_aud), Err(AuthError::Invalid(_)));
    }

    #[test]
    fn audience_claim_ignored_without_configured_audience() {
        let verifier = JwtVerifier::from_settings(&settings()).unwrap();
        let token = sign(&json!({"sub": "u", "aud": "anyone"}), SECRET, Algorithm::HS256);
        assert!(verifier.verify_sync(&token).is_ok());
    }

    #[test]
    fn no_key_is_not_configured() {
        assert_matches!(
            JwtVerifier::from_settings(&AuthSettings::default()),
            Err(AuthError::NotConfigured)
        );
        let s = AuthSettings {
            algorithms: vec!["RS256".into()],
            secret: Some(SECRET.into()),
            ..AuthSettings::default()
        };
        assert_matches!(JwtVerifier::from_settings(&s), Err(AuthError::NotConfigured));
        let empty = AuthSettings {
            secret: Some(String::new()),
            ..AuthSettings::default()
        };
        assert_matches!(JwtVerifier::from_settings(&empty), Err(AuthError::NotConfigured));
    }

    #[test]
    fn mixed_key_families_rejected() {
        let mut s = settings();
        s.algorithms = vec!["HS256".into(), "RS256".into()];
        assert_matches!(JwtVerifier::from_settings(&s), Err(AuthError::Config(_)));
    }

    #[test]
    fn unknown_algorithm_rejected() {
        let mut s = settings();
        s.algorithms = vec!["none".into()];
        assert_matches!(JwtVerifier::from_settings(&s), Err(AuthError::Config(_)));
    }

    #[test]
    fn unreadable_public_key_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let s = AuthSettings {
            algorithms: vec!["RS256".into()],
            public_key_path: Some(dir.path().join("missing.pem").display().to_string()),
            ..AuthSettings::default()
        };
        assert_matches!(JwtVerifier::from_settings(&s), Err(AuthError::Config(_)));
    }

    #[test]
    fn malformed_public_key_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("key.pem");
        std::fs::write(&path, "not a pem").unwrap();
        let s = AuthSettings {
            algorithms: vec!["ES256".into()],
            public_key_path: Some(path.display().to_string()),
            ..AuthSettings::default()
        };
        assert_matches!(JwtVerifier::from_settings(&s), Err(AuthError::Config(_)));
    }

    #[test]
    fn hmac_constructor_rejects_asymmetric() {
        assert_matches!(
            JwtVerifier::hmac(b"k", &[Algorithm::RS256]),
            Err(AuthError::Config(_))
        );
        assert_matches!(JwtVerifier::hmac(b"k", &[]), Err(AuthError::Config(_)));
    }

    #[tokio::test]
    async fn trait_object_verify() {
        let verifier: Box<dyn TokenVerifier> =
            Box::new(JwtVerifier::hmac(SECRET.as_bytes(), &[Algorithm::HS256]).unwrap());
        let token = sign(&json!({"sub": "u"}), SECRET, Algorithm::HS256);
        assert_eq!(verifier.verify(&token).await.unwrap()["sub"], "u");
    }
}
