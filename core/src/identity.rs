//! Google ID token verification.
//!
//! Claims are only read after the signature, audience, issuer and expiry
//! have been checked.

use anyhow::{Context, Result, bail};
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header};
use serde::{Deserialize, Serialize};

use crate::models::{AuthMethod, UserProfile};

pub const GOOGLE_ISSUERS: [&str; 2] = ["accounts.google.com", "https://accounts.google.com"];
pub const GOOGLE_JWKS_URL: &str = "https://www.googleapis.com/oauth2/v3/certs";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoogleClaims {
    pub sub: String,
    pub aud: String,
    pub iss: String,
    pub exp: i64,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub email_verified: bool,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub picture: Option<String>,
}

impl GoogleClaims {
    /// Starting profile for a first sign-in. The rest is filled in by profile completion.
    #[must_use]
    pub fn new_profile(&self, user_id: &str) -> UserProfile {
        UserProfile {
            id: user_id.to_string(),
            email: self.email.clone().unwrap_or_default(),
            auth_method: AuthMethod::Google,
            display_name: self.name.clone(),
            picture: self.picture.clone(),
            ..UserProfile::default()
        }
    }
}

/// Verify a Google-issued RS256 ID token against the provider's key set.
pub fn verify_google_id_token(token: &str, jwks: &JwkSet, client_id: &str) -> Result<GoogleClaims> {
    let header = decode_header(token).context("Malformed ID token header")?;
    if header.alg != Algorithm::RS256 {
        bail!("Unexpected ID token algorithm {:?}", header.alg);
    }
    let kid = header.kid.context("ID token has no key id")?;
    let jwk = jwks
        .find(&kid)
        .with_context(|| format!("No signing key '{kid}' in the Google key set"))?;
    let key = DecodingKey::from_jwk(jwk).context("Unusable Google signing key")?;
    verify_with_key(token, &key, Algorithm::RS256, client_id)
}

/// Verify signature, audience, issuer and expiry with an explicit key.
pub fn verify_with_key(
    token: &str,
    key: &DecodingKey,
    algorithm: Algorithm,
    client_id: &str,
) -> Result<GoogleClaims> {
    let mut validation = Validation::new(algorithm);
    validation.set_audience(&[client_id]);
    validation.set_issuer(&GOOGLE_ISSUERS);
    validation.set_required_spec_claims(&["exp", "aud", "iss", "sub"]);

    let data = decode::<GoogleClaims>(token, key, &validation).context("ID token rejected")?;
    if data.claims.email.is_some() && !data.claims.email_verified {
        bail!("Google account email is not verified");
    }
    Ok(data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use jsonwebtoken::{EncodingKey, Header, encode};

    const SECRET: &[u8] = b"test-secret";
    const CLIENT_ID: &str = "1234.apps.googleusercontent.com";

    fn claims() -> GoogleClaims {
        GoogleClaims {
            sub: "10987".to_string(),
            aud: CLIENT_ID.to_string(),
            iss: "https://accounts.google.com".to_string(),
            exp: Utc::now().timestamp() + 3600,
            email: Some("rina@example.com".to_string()),
            email_verified: true,
            name: Some("Rina".to_string()),
            picture: None,
        }
    }

    fn sign(c: &GoogleClaims) -> String {
        encode(&Header::default(), c, &EncodingKey::from_secret(SECRET)).unwrap()
    }

    fn verify(token: &str) -> Result<GoogleClaims> {
        verify_with_key(
            token,
            &DecodingKey::from_secret(SECRET),
            Algorithm::HS256,
            CLIENT_ID,
        )
    }

    #[test]
    fn test_valid_token_accepted() {
        let c = verify(&sign(&claims())).unwrap();
        assert_eq!(c.sub, "10987");
        let p = c.new_profile("u-1");
        assert_eq!(p.auth_method, AuthMethod::Google);
        assert_eq!(p.email, "rina@example.com");
        assert!(!p.profile_completed);
    }

    #[test]
    fn test_short_issuer_accepted() {
        let mut c = claims();
        c.iss = "accounts.google.com".to_string();
        assert!(verify(&sign(&c)).is_ok());
    }

    #[test]
    fn test_wrong_audience_rejected() {
        let mut c = claims();
        c.aud = "someone-else".to_string();
        assert!(verify(&sign(&c)).is_err());
    }

    #[test]
    fn test_wrong_issuer_rejected() {
        let mut c = claims();
        c.iss = "https://evil.example".to_string();
        assert!(verify(&sign(&c)).is_err());
    }

    #[test]
    fn test_expired_rejected() {
        let mut c = claims();
        c.exp = Utc::now().timestamp() - 3600;
        assert!(verify(&sign(&c)).is_err());
    }

    #[test]
    fn test_bad_signature_rejected() {
        let token = encode(
            &Header::default(),
            &claims(),
            &EncodingKey::from_secret(b"other"),
        )
        .unwrap();
        assert!(verify(&token).is_err());
    }

    #[test]
    fn test_unverified_email_rejected() {
        let mut c = claims();
        c.email_verified = false;
        assert!(verify(&sign(&c)).is_err());
    }

    #[test]
    fn test_google_path_requires_rs256() {
        let jwks: JwkSet = serde_json::from_str(r#"{"keys":[]}"#).unwrap();
        let err = verify_google_id_token(&sign(&claims()), &jwks, CLIENT_ID).unwrap_err();
        assert!(err.to_string().contains("algorithm"));
    }
}
