use thiserror::Error;

/// Failures of a single SMTP conversation.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed reply: {0}")]
    Malformed(String),

    /// A non-error reply that the current command did not expect, such as
    /// `354` where `250` was required.
    #[error("unexpected reply {code}: {message}")]
    Unexpected { code: u16, message: String },

    /// A 4xx or 5xx reply.
    #[error("server replied {code}: {message}")]
    Rejected { code: u16, message: String },

    #[error("TLS failure: {0}")]
    Tls(String),

    /// Holds the name of the phase that ran out of time.
    #[error("timed out during {0}")]
    Timeout(String),

    #[error("cannot build message: {0}")]
    InvalidMessage(String),

    #[error("server closed the connection")]
    Closed,

    #[error("reply is not UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),
}

pub type Result<T> = std::result::Result<T, ClientError>;
