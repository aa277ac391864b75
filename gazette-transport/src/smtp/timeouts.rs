use serde::{Deserialize, Serialize};

/// How long each SMTP phase may take, in seconds.
///
/// Omitted fields keep their defaults, so `(data_secs: 300)` only raises the
/// message transfer limit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmtpTimeouts {
    /// Connecting and reading the greeting
    pub connect_secs: u64,
    /// EHLO and AUTH
    pub ehlo_secs: u64,
    pub starttls_secs: u64,
    pub mail_from_secs: u64,
    pub rcpt_to_secs: u64,
    /// DATA plus the body itself
    pub data_secs: u64,
    pub quit_secs: u64,
}

const COMMAND_SECS: u64 = 30;

impl Default for SmtpTimeouts {
    fn default() -> Self {
        Self {
            connect_secs: COMMAND_SECS,
            ehlo_secs: COMMAND_SECS,
            starttls_secs: COMMAND_SECS,
            mail_from_secs: COMMAND_SECS,
            rcpt_to_secs: COMMAND_SECS,
            data_secs: 120,
            quit_secs: 10,
        }
    }
}
