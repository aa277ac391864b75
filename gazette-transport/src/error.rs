//! Transport faults.

use thiserror::Error;

use crate::smtp::ClientError;

/// A send that could not be completed for reasons other than a refusal.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection refused, reset or closed mid-session.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// A protocol step exceeded its timeout.
    #[error("Timed out during {0}")]
    Timeout(String),

    /// TLS negotiation failed.
    #[error("TLS error: {0}")]
    Tls(String),

    /// The remote side spoke something we could not parse.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// HTTP request to the email API failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Required settings are missing.
    #[error("Transport not configured: {0}")]
    NotConfigured(String),
}

/// Classify SMTP client failures that are not server refusals.
///
/// Refusals (`ClientError::Rejected`) are turned into
/// [`crate::SendOutcome::Rejected`] by the SMTP transport before this runs.
impl From<ClientError> for TransportError {
    fn from(error: ClientError) -> Self {
        match error {
            ClientError::Io(e) => Self::Connection(format!("I/O error: {e}")),
            ClientError::Closed => Self::Connection("Connection closed unexpectedly".to_string()),
            ClientError::Timeout(phase) => Self::Timeout(phase),
            ClientError::Tls(msg) => Self::Tls(msg),
            ClientError::Malformed(msg) => Self::Protocol(msg),
            ClientError::Utf8(e) => Self::Protocol(format!("UTF-8 decoding error: {e}")),
            ClientError::InvalidMessage(msg) => Self::NotConfigured(msg),
            ClientError::Rejected { code, message }
            | ClientError::Unexpected { code, message } => {
                Self::Protocol(format!("Unexpected SMTP response: {code} {message}"))
            }
        }
    }
}
