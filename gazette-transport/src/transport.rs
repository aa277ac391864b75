use async_trait::async_trait;

use crate::TransportError;

/// What the remote side said about one message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Accepted,
    /// The provider refused the message (bad address, policy, rate limit...)
    Rejected { code: Option<u16>, reason: String },
}

impl SendOutcome {
    #[must_use]
    pub const fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }

    pub fn rejected(code: Option<u16>, reason: impl Into<String>) -> Self {
        Self::Rejected {
            code,
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for SendOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Accepted => f.write_str("accepted"),
            Self::Rejected {
                code: Some(code),
                reason,
            } => write!(f, "rejected ({code}): {reason}"),
            Self::Rejected { code: None, reason } => write!(f, "rejected: {reason}"),
        }
    }
}

/// Sends one email message to one recipient.
///
/// Ordinary refusals come back as [`SendOutcome::Rejected`]; `Err` is reserved
/// for faults where the outcome is unknown (network, TLS, timeouts).
#[async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Whether credentials and addresses needed to send are present
    fn is_configured(&self) -> bool;

    /// Whether bodies are sent as-is, without provider-side templating.
    ///
    /// The executor wraps bodies in a plain header and footer for these.
    fn template_free(&self) -> bool {
        true
    }

    async fn send(
        &self,
        to: &str,
        subject: &str,
        body: &str,
    ) -> Result<SendOutcome, TransportError>;
}
