use anyhow::{Context, Result};
use jsonwebtoken::jwk::JwkSet;

use calori_core::identity::{GOOGLE_JWKS_URL, GoogleClaims, verify_google_id_token};

/// Verifies Google ID tokens against the published signing keys.
pub struct GoogleVerifier {
    client: reqwest::Client,
    jwks_url: String,
}

impl GoogleVerifier {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            jwks_url: GOOGLE_JWKS_URL.to_string(),
        })
    }

    #[cfg(test)]
    fn with_jwks_url(mut self, url: &str) -> Self {
        self.jwks_url = url.to_string();
        self
    }

    async fn fetch_keys(&self) -> Result<JwkSet> {
        self.client
            .get(&self.jwks_url)
            .send()
            .await
            .context("Failed to reach Google key endpoint")?
            .error_for_status()
            .context("Google key endpoint returned an error")?
            .json()
            .await
            .context("Failed to parse Google key set")
    }

    pub async fn verify(&self, id_token: &str, client_id: &str) -> Result<GoogleClaims> {
        let keys = self.fetch_keys().await?;
        verify_google_id_token(id_token, &keys, client_id)
    }
}
