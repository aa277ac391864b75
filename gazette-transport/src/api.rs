//! Transactional-email HTTP API transport (SendGrid v3 request shape).

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use gazette_common::tracing;

use crate::{SendOutcome, Transport, TransportError};

/// Longest provider response body kept as a rejection reason.
const MAX_REASON_LEN: usize = 512;

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub from: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_endpoint() -> String {
    "https://api.sendgrid.com/v3/mail/send".to_string()
}

const fn default_timeout_secs() -> u64 {
    30
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            api_key: String::new(),
            from: String::new(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl std::fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiConfig")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"<redacted>")
            .field("from", &self.from)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl ApiConfig {
    pub fn is_configured(&self) -> bool {
        !self.api_key.trim().is_empty() && !self.from.trim().is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct ApiTransport {
    client: reqwest::Client,
    config: ApiConfig,
}

impl ApiTransport {
    /// # Errors
    /// If the HTTP client cannot be built (e.g. no TLS backend).
    pub fn new(config: ApiConfig) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("gazette/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client, config })
    }

    fn payload(&self, to: &str, subject: &str, body: &str) -> serde_json::Value {
        json!({
            "personalizations": [{ "to": [{ "email": to }] }],
            "from": { "email": self.config.from },
            "subject": subject,
            "content": [{ "type": "text/html", "value": body }],
        })
    }
}

#[async_trait]
impl Transport for ApiTransport {
    fn name(&self) -> &'static str {
        "api"
    }

    fn is_configured(&self) -> bool {
        self.config.is_configured()
    }

    /// The provider wraps bodies in its own templates.
    fn template_free(&self) -> bool {
        false
    }

    async fn send(
        &self,
        to: &str,
        subject: &str,
        body: &str,
    ) -> Result<SendOutcome, TransportError> {
        if !self.is_configured() {
            return Err(TransportError::NotConfigured(
                "API key and from address are required".to_string(),
            ));
        }

        let response = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(&self.config.api_key)
            .json(&self.payload(to, subject, body))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout(format!("API request ({}s)", self.config.timeout_secs))
                } else if e.is_connect() {
                    TransportError::Connection(e.to_string())
                } else {
                    TransportError::Http(e)
                }
            })?;

        let status = response.status();
        tracing::debug!(status = status.as_u16(), "Email API responded");

        if matches!(status.as_u16(), 200 | 202) {
            return Ok(SendOutcome::Accepted);
        }

        let mut reason = response.text().await.unwrap_or_default();
        if reason.trim().is_empty() {
            reason = status.canonical_reason().unwrap_or("rejected").to_string();
        }
        if reason.len() > MAX_REASON_LEN {
            let mut cut = MAX_REASON_LEN;
            while !reason.is_char_boundary(cut) {
                cut -= 1;
            }
            reason.truncate(cut);
        }

        Ok(SendOutcome::rejected(Some(status.as_u16()), reason))
    }
}
