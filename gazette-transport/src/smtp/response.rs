//! SMTP response parsing and representation.

use super::error::{ClientError, Result};

/// A single line in an SMTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseLine {
    pub code: u16,
    /// Whether this is the last line in a multi-line response.
    pub is_last: bool,
    pub message: String,
}

/// A complete SMTP response, which may be multi-line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub code: u16,
    pub lines: Vec<String>,
}

impl Response {
    #[must_use]
    pub const fn new(code: u16, lines: Vec<String>) -> Self {
        Self { code, lines }
    }

    /// The complete message with lines joined by newlines.
    #[must_use]
    pub fn message(&self) -> String {
        self.lines.join("\n")
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.code >= 200 && self.code < 300
    }

    /// 3xx, e.g. `354` after DATA or `334` during AUTH.
    #[must_use]
    pub const fn is_intermediate(&self) -> bool {
        self.code >= 300 && self.code < 400
    }

    #[must_use]
    pub const fn is_error(&self) -> bool {
        self.code >= 400 && self.code < 600
    }

    /// Whether an EHLO response advertises `keyword` (case-insensitive).
    #[must_use]
    pub fn has_extension(&self, keyword: &str) -> bool {
        self.lines.iter().skip(1).any(|line| {
            line.split_whitespace()
                .next()
                .is_some_and(|word| word.eq_ignore_ascii_case(keyword))
        })
    }

    /// Turn an error reply into [`ClientError::Rejected`].
    ///
    /// # Errors
    /// If the reply is a 4xx or 5xx, or not one of the `expected` codes.
    pub fn expect(self, expected: &[u16]) -> Result<Self> {
        if expected.contains(&self.code) {
            Ok(self)
        } else if self.is_error() {
            Err(ClientError::Rejected {
                code: self.code,
                message: self.message(),
            })
        } else {
            Err(ClientError::Unexpected {
                code: self.code,
                message: self.message(),
            })
        }
    }

    /// Parses a single response line.
    ///
    /// # Errors
    /// Returns `ClientError::Malformed` if the line doesn't match SMTP format.
    pub fn parse_line(line: &str) -> Result<ResponseLine> {
        let code_str = line.get(..3).ok_or_else(|| {
            ClientError::Malformed(format!("Response line too short: '{line}'"))
        })?;

        let code = code_str
            .parse::<u16>()
            .map_err(|_| ClientError::Malformed(format!("Invalid status code: '{code_str}'")))?;

        let is_last = match line[3..].chars().next() {
            Some(' ') | None => true,
            Some('-') => false,
            Some(c) => {
                return Err(ClientError::Malformed(format!(
                    "Invalid separator character: '{c}'"
                )));
            }
        };

        let message = line.get(4..).unwrap_or_default().to_string();

        Ok(ResponseLine {
            code,
            is_last,
            message,
        })
    }

    /// Parses a complete multi-line SMTP response from a buffer.
    ///
    /// Returns the parsed `Response` and the number of bytes consumed, or
    /// `None` if the buffer does not hold a complete response yet.
    ///
    /// # Errors
    /// Returns `ClientError::Malformed` if the response is malformed.
    pub fn parse_response(buffer: &[u8]) -> Result<Option<(Self, usize)>> {
        let text = std::str::from_utf8(buffer)?;
        let mut lines = Vec::new();
        let mut consumed = 0;
        let mut first_code = None;

        while let Some(end) = text[consumed..].find('\n') {
            let raw = &text[consumed..consumed + end];
            consumed += end + 1;

            let line = raw.strip_suffix('\r').unwrap_or(raw);
            if line.is_empty() {
                continue;
            }

            let parsed = Self::parse_line(line)?;

            match first_code {
                Some(code) if parsed.code != code => {
                    return Err(ClientError::Malformed(format!(
                        "Status code mismatch in multi-line response: expected {code}, got {}",
                        parsed.code
                    )));
                }
                Some(_) => {}
                None => first_code = Some(parsed.code),
            }

            lines.push(parsed.message);

            if parsed.is_last {
                return Ok(first_code.map(|code| (Self::new(code, lines), consumed)));
            }
        }

        // Need more data
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_line() {
        let line = ResponseLine {
            code: 220,
            is_last: true,
            message: "mail.example.com ESMTP".to_string(),
        };
        assert_eq!(
            Response::parse_line("220 mail.example.com ESMTP").unwrap(),
            line
        );
    }

    #[test]
    fn test_parse_multi_line_ehlo() {
        let buffer = b"250-mail.example.com\r\n250-STARTTLS\r\n250 AUTH PLAIN LOGIN\r\n";
        let (response, consumed) = Response::parse_response(buffer).unwrap().unwrap();

        assert_eq!(consumed, buffer.len());
        assert_eq!(response.code, 250);
        assert!(response.has_extension("starttls"));
        assert!(response.has_extension("AUTH"));
        assert!(!response.has_extension("SIZE"));
    }

    #[test]
    fn test_incomplete_response_needs_more_data() {
        assert!(Response::parse_response(b"250-first\r\n250 sec").unwrap().is_none());
    }

    #[test]
    fn test_code_mismatch_is_error() {
        assert!(Response::parse_response(b"250-first\r\n251 second\r\n").is_err());
    }

    #[test]
    fn test_expect_classifies_replies() {
        let ok = Response::new(250, vec!["OK".to_string()]);
        assert!(ok.expect(&[250]).is_ok());

        let refused = Response::new(550, vec!["invalid address".to_string()]);
        assert!(matches!(
            refused.expect(&[250]),
            Err(ClientError::Rejected { code: 550, message }) if message == "invalid address"
        ));

        let odd = Response::new(354, vec!["go ahead".to_string()]);
        assert!(matches!(
            odd.expect(&[250]),
            Err(ClientError::Unexpected { code: 354, .. })
        ));
    }
}
