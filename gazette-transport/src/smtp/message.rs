//! RFC 5322 message assembly for newsletter issues.

use std::fmt::Write;

use chrono::{DateTime, Utc};

use super::error::{ClientError, Result};

/// Builds a single-part `text/plain` message.
///
/// ```
/// use gazette_transport::smtp::MessageBuilder;
///
/// let message = MessageBuilder::new()
///     .from("news@example.com")
///     .to("reader@example.com")
///     .subject("Newsletter: Rust")
///     .body("Hello")
///     .build()
///     .unwrap();
/// assert!(message.contains("Subject: Newsletter: Rust\r\n"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct MessageBuilder {
    from: Option<String>,
    to: Option<String>,
    subject: Option<String>,
    date: Option<DateTime<Utc>>,
    message_id: Option<String>,
    body: Option<String>,
}

impl MessageBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from(mut self, email: impl Into<String>) -> Self {
        self.from = Some(email.into());
        self
    }

    #[must_use]
    pub fn to(mut self, email: impl Into<String>) -> Self {
        self.to = Some(email.into());
        self
    }

    #[must_use]
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Defaults to the time of [`Self::build`].
    #[must_use]
    pub const fn date(mut self, date: DateTime<Utc>) -> Self {
        self.date = Some(date);
        self
    }

    /// Defaults to a fresh ULID at the sender's domain.
    #[must_use]
    pub fn message_id(mut self, id: impl Into<String>) -> Self {
        self.message_id = Some(id.into());
        self
    }

    #[must_use]
    pub fn body(mut self, content: impl Into<String>) -> Self {
        self.body = Some(content.into());
        self
    }

    /// # Errors
    /// Returns `ClientError::InvalidMessage` if the sender or recipient is missing.
    pub fn build(self) -> Result<String> {
        let from = self
            .from
            .ok_or_else(|| ClientError::InvalidMessage("Missing From address".to_string()))?;
        let to = self
            .to
            .ok_or_else(|| ClientError::InvalidMessage("Missing To address".to_string()))?;

        let date = self.date.unwrap_or_else(Utc::now);
        let message_id = self.message_id.unwrap_or_else(|| {
            let domain = from.rsplit_once('@').map_or("localhost", |(_, d)| d);
            format!("{}@{domain}", ulid::Ulid::new())
        });

        let mut message = String::with_capacity(512);
        let _ = write!(message, "From: {}\r\n", header_value(&from));
        let _ = write!(message, "To: {}\r\n", header_value(&to));
        if let Some(subject) = &self.subject {
            let _ = write!(message, "Subject: {}\r\n", header_value(subject));
        }
        let _ = write!(message, "Date: {}\r\n", date.to_rfc2822());
        let _ = write!(message, "Message-ID: <{message_id}>\r\n");
        message.push_str("MIME-Version: 1.0\r\n");
        message.push_str("Content-Type: text/plain; charset=utf-8\r\n");
        message.push_str("Content-Transfer-Encoding: 8bit\r\n");
        message.push_str("\r\n");

        if let Some(body) = &self.body {
            message.push_str(body);
        }

        Ok(message)
    }
}

/// Header values must not carry line breaks.
fn header_value(value: &str) -> String {
    value.replace(['\r', '\n'], " ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headers_and_body() {
        let message = MessageBuilder::new()
            .from("news@example.com")
            .to("reader@example.org")
            .subject("Newsletter: Rust")
            .message_id("fixed@example.com")
            .body("Line one\nLine two")
            .build()
            .unwrap();

        assert!(message.starts_with("From: news@example.com\r\nTo: reader@example.org\r\n"));
        assert!(message.contains("Subject: Newsletter: Rust\r\n"));
        assert!(message.contains("Message-ID: <fixed@example.com>\r\n"));
        assert!(message.contains("Content-Type: text/plain; charset=utf-8\r\n"));
        assert!(message.ends_with("\r\n\r\nLine one\nLine two"));
    }

    #[test]
    fn test_subject_cannot_inject_headers() {
        let message = MessageBuilder::new()
            .from("news@example.com")
            .to("reader@example.org")
            .subject("Hi\r\nBcc: evil@example.com")
            .build()
            .unwrap();

        assert!(!message.contains("\r\nBcc:"));
    }

    #[test]
    fn test_missing_addresses() {
        assert!(matches!(
            MessageBuilder::new().to("a@b.c").build(),
            Err(ClientError::InvalidMessage(_))
        ));
        assert!(matches!(
            MessageBuilder::new().from("a@b.c").build(),
            Err(ClientError::InvalidMessage(_))
        ));
    }
}
