//! Direct SMTP submission.

mod client;
mod error;
mod message;
mod response;
mod session;
mod timeouts;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use gazette_common::tracing;

pub use self::{
    client::SmtpClient,
    error::ClientError,
    message::MessageBuilder,
    response::{Response, ResponseLine},
    session::SmtpSession,
    timeouts::SmtpTimeouts,
};
use crate::{SendOutcome, Transport, TransportError};

/// Settings for an authenticated SMTP relay.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmtpConfig {
    #[serde(default)]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Envelope sender and `From:` header
    #[serde(default)]
    pub from: String,
    /// Require STARTTLS before authenticating. Default: true
    #[serde(default = "default_starttls")]
    pub starttls: bool,
    /// Skip certificate verification. Testing only.
    #[serde(default)]
    pub accept_invalid_certs: bool,
    /// Name sent with EHLO
    #[serde(default = "default_helo_name")]
    pub helo_name: String,
    #[serde(default)]
    pub timeouts: SmtpTimeouts,
}

const fn default_port() -> u16 {
    587
}

const fn default_starttls() -> bool {
    true
}

fn default_helo_name() -> String {
    "localhost".to_string()
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_port(),
            username: None,
            password: None,
            from: String::new(),
            starttls: default_starttls(),
            accept_invalid_certs: false,
            helo_name: default_helo_name(),
            timeouts: SmtpTimeouts::default(),
        }
    }
}

impl std::fmt::Debug for SmtpConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("from", &self.from)
            .field("starttls", &self.starttls)
            .field("accept_invalid_certs", &self.accept_invalid_certs)
            .field("helo_name", &self.helo_name)
            .field("timeouts", &self.timeouts)
            .finish()
    }
}

impl SmtpConfig {
    /// Host and sender are set, and credentials come as a pair or not at all.
    pub fn is_configured(&self) -> bool {
        !self.host.trim().is_empty()
            && !self.from.trim().is_empty()
            && self.username.is_some() == self.password.is_some()
    }
}

/// Sends each message over its own SMTP session.
#[derive(Debug, Clone)]
pub struct SmtpTransport {
    config: SmtpConfig,
}

impl SmtpTransport {
    #[must_use]
    pub const fn new(config: SmtpConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub const fn config(&self) -> &SmtpConfig {
        &self.config
    }
}

#[async_trait]
impl Transport for SmtpTransport {
    fn name(&self) -> &'static str {
        "smtp"
    }

    fn is_configured(&self) -> bool {
        self.config.is_configured()
    }

    async fn send(
        &self,
        to: &str,
        subject: &str,
        body: &str,
    ) -> Result<SendOutcome, TransportError> {
        if !self.is_configured() {
            return Err(TransportError::NotConfigured(
                "SMTP host and from address are required".to_string(),
            ));
        }

        let message = MessageBuilder::new()
            .from(&self.config.from)
            .to(to)
            .subject(subject)
            .body(body)
            .build()?;

        match SmtpSession::new(&self.config).deliver(to, &message).await {
            Ok(response) => {
                tracing::trace!(code = response.code, "Message accepted by relay");
                Ok(SendOutcome::Accepted)
            }
            Err(ClientError::Rejected { code, message }) => {
                Ok(SendOutcome::rejected(Some(code), message))
            }
            Err(e) => Err(e.into()),
        }
    }
}
