//! Outbound email transports.
//!
//! The delivery core sends through the [`Transport`] trait and never learns
//! which implementation is behind it. [`TransportConfig`] chooses between a
//! direct SMTP session ([`SmtpTransport`]) and a transactional-email HTTP API
//! ([`ApiTransport`]); [`MockTransport`] records calls for tests.

pub mod api;
pub mod config;
pub mod error;
pub mod mock;
pub mod smtp;
mod transport;

pub use api::{ApiConfig, ApiTransport};
pub use config::TransportConfig;
pub use error::TransportError;
pub use mock::{MockTransport, SentMessage};
pub use smtp::{SmtpConfig, SmtpTimeouts, SmtpTransport};
pub use transport::{SendOutcome, Transport};
