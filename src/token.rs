use anyhow::{Context, Result};

use crate::api::TokenGrant;

/// Obtains short-lived credentials from the directory/auth proxy on behalf
/// of the session client. No caching: every call hits the proxy, which
/// relays the backend's answer verbatim.
#[derive(Debug, Clone)]
pub struct TokenProvider {
    url: String,
    http: reqwest::Client,
}

impl TokenProvider {
    pub fn new(authenticate_url: impl Into<String>, http: reqwest::Client) -> Self {
        Self {
            url: authenticate_url.into(),
            http,
        }
    }

    pub async fn fetch(&self, user_id: &str) -> Result<TokenGrant> {
        let response = self
            .http
            .get(&self.url)
            .query(&[("user_id", user_id)])
            .send()
            .await
            .with_context(|| format!("failed to reach token endpoint {}", self.url))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("token request for '{user_id}' failed with {status}: {body}");
        }

        response
            .json::<TokenGrant>()
            .await
            .context("token endpoint returned an unexpected payload")
    }
}
