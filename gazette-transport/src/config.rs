use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{ApiConfig, ApiTransport, SmtpConfig, SmtpTransport, Transport, TransportError};

/// Fills an empty SMTP password.
pub const SMTP_PASSWORD_ENV: &str = "GAZETTE_SMTP_PASSWORD";
/// Fills an empty API key.
pub const API_KEY_ENV: &str = "GAZETTE_API_KEY";

/// Which transport the delivery core sends through.
///
/// ```ron
/// transport: Smtp(host: "smtp.example.com", from: "news@example.com"),
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportConfig {
    Smtp(SmtpConfig),
    Api(ApiConfig),
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self::Smtp(SmtpConfig::default())
    }
}

impl TransportConfig {
    /// Fill empty secrets from the environment.
    ///
    /// The SMTP password is only filled when a username is configured.
    #[must_use]
    pub fn with_env_secrets(self) -> Self {
        self.with_secrets(|key| std::env::var(key).ok())
    }

    fn with_secrets(self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        match self {
            Self::Smtp(mut smtp) => {
                if smtp.username.is_some()
                    && smtp.password.as_deref().is_none_or(str::is_empty)
                    && let Some(password) = lookup(SMTP_PASSWORD_ENV).filter(|p| !p.is_empty())
                {
                    smtp.password = Some(password);
                }
                Self::Smtp(smtp)
            }
            Self::Api(mut api) => {
                if api.api_key.is_empty()
                    && let Some(key) = lookup(API_KEY_ENV).filter(|k| !k.is_empty())
                {
                    api.api_key = key;
                }
                Self::Api(api)
            }
        }
    }

    /// Build the configured transport, applying environment secrets first.
    ///
    /// # Errors
    /// If the HTTP client for the API transport cannot be built.
    pub fn into_transport(self) -> Result<Arc<dyn Transport>, TransportError> {
        Ok(match self.with_env_secrets() {
            Self::Smtp(smtp) => Arc::new(SmtpTransport::new(smtp)),
            Self::Api(api) => Arc::new(ApiTransport::new(api)?),
        })
    }
}
