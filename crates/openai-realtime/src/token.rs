//! Short-lived credentials from the local token endpoint.

use crate::error::{NegotiationError, Result};
use async_trait::async_trait;
use s2s_core::S2sModel;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument};

/// A scoped, time-limited bearer credential for realtime signaling.
#[derive(Debug)]
pub struct EphemeralKey {
    value: SecretString,
    /// Unix timestamp after which the key is rejected, when the issuer says.
    pub expires_at: Option<i64>,
}

impl EphemeralKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: SecretString::from(value.into()),
            expires_at: None,
        }
    }

    pub fn expose(&self) -> &str {
        self.value.expose_secret()
    }
}

/// Issues short-lived credentials scoped to a model.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn issue(&self, model: S2sModel) -> Result<EphemeralKey>;
}

#[derive(Deserialize)]
struct TokenResponse {
    client_secret: Option<ClientSecret>,
}

#[derive(Deserialize)]
struct ClientSecret {
    value: Option<String>,
    expires_at: Option<i64>,
}

/// Requests credentials with `POST {"model": ...}` from an HTTP token endpoint.
pub struct HttpTokenProvider {
    client: reqwest::Client,
    url: String,
}

impl HttpTokenProvider {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl TokenProvider for HttpTokenProvider {
    #[instrument(skip(self), fields(url = %self.url))]
    async fn issue(&self, model: S2sModel) -> Result<EphemeralKey> {
        let response = self
            .client
            .post(&self.url)
            .json(&json!({ "model": model.as_str() }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(NegotiationError::TokenEndpoint {
                status: status.as_u16(),
            });
        }

        let body = response.text().await?;
        let parsed: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| NegotiationError::MalformedToken(e.to_string()))?;
        let secret = parsed
            .client_secret
            .ok_or_else(|| NegotiationError::MalformedToken("missing client_secret".into()))?;
        let value = secret
            .value
            .filter(|v| !v.is_empty())
            .ok_or_else(|| NegotiationError::MalformedToken("missing client_secret.value".into()))?;

        debug!(expires_at = ?secret.expires_at, "Issued short-lived credential");
        Ok(EphemeralKey {
            value: SecretString::from(value),
            expires_at: secret.expires_at,
        })
    }
}
