//! One SMTP session delivering one message.

use std::{future::Future, time::Duration};

use gazette_common::tracing;

use super::{
    SmtpConfig,
    client::SmtpClient,
    error::{ClientError, Result},
    response::Response,
};

/// A single connect-to-QUIT exchange with the relay.
///
/// Any 4xx/5xx reply surfaces as [`ClientError::Rejected`]; everything else
/// that goes wrong is a fault.
pub struct SmtpSession<'a> {
    config: &'a SmtpConfig,
}

impl<'a> SmtpSession<'a> {
    #[must_use]
    pub const fn new(config: &'a SmtpConfig) -> Self {
        Self { config }
    }

    fn server_address(&self) -> String {
        format!("{}:{}", self.config.host, self.config.port)
    }

    /// Deliver the already assembled `message` to `recipient`.
    #[tracing::instrument(level = "debug", skip(self, message), fields(server = %self.server_address()))]
    pub async fn deliver(&self, recipient: &str, message: &str) -> Result<Response> {
        let timeouts = &self.config.timeouts;

        let mut client = self.connect_and_greet().await?;
        self.negotiate_tls(&mut client).await?;

        if let (Some(username), Some(password)) = (&self.config.username, &self.config.password)
        {
            phase(
                "AUTH",
                timeouts.ehlo_secs,
                client.auth_plain(username, password),
            )
            .await?
            .expect(&[235])?;
        }

        phase(
            "MAIL FROM",
            timeouts.mail_from_secs,
            client.mail_from(&self.config.from),
        )
        .await?
        .expect(&[250])?;

        phase(
            "RCPT TO",
            timeouts.rcpt_to_secs,
            client.rcpt_to(recipient),
        )
        .await?
        .expect(&[250, 251])?;

        phase("DATA", timeouts.data_secs, client.data())
            .await?
            .expect(&[354])?;

        let accepted = phase("message data", timeouts.data_secs, client.send_data(message))
            .await?
            .expect(&[250])?;

        // The message is already accepted; a failed QUIT changes nothing.
        if let Err(e) = phase("QUIT", timeouts.quit_secs, client.quit()).await {
            tracing::debug!(error = %e, "QUIT failed after accepted message");
        }

        Ok(accepted)
    }

    async fn connect_and_greet(&self) -> Result<SmtpClient> {
        let address = self.server_address();

        let client = phase(
            "connect",
            self.config.timeouts.connect_secs,
            SmtpClient::connect(&address, self.config.host.clone()),
        )
        .await?;
        let mut client = client.accept_invalid_certs(self.config.accept_invalid_certs);

        phase(
            "greeting",
            self.config.timeouts.connect_secs,
            client.read_greeting(),
        )
        .await?
        .expect(&[220])?;

        Ok(client)
    }

    /// EHLO, then STARTTLS and a second EHLO when enabled.
    ///
    /// With `starttls` on, a server that does not offer it is a TLS error;
    /// we never fall back to plaintext with credentials configured.
    async fn negotiate_tls(&self, client: &mut SmtpClient) -> Result<()> {
        let timeouts = &self.config.timeouts;
        let helo = &self.config.helo_name;

        let ehlo = phase("EHLO", timeouts.ehlo_secs, client.ehlo(helo))
            .await?
            .expect(&[250])?;

        if !self.config.starttls {
            return Ok(());
        }

        if !ehlo.has_extension("STARTTLS") {
            return Err(ClientError::Tls(
                "Server does not advertise STARTTLS".to_string(),
            ));
        }

        if self.config.accept_invalid_certs {
            tracing::warn!(
                server = %self.server_address(),
                "TLS certificate validation is disabled for this connection"
            );
        }

        phase("STARTTLS", timeouts.starttls_secs, client.starttls())
            .await?
            .expect(&[220])
            .map_err(|e| ClientError::Tls(format!("STARTTLS refused: {e}")))?;

        phase("EHLO after STARTTLS", timeouts.ehlo_secs, client.ehlo(helo))
            .await?
            .expect(&[250])?;

        Ok(())
    }
}

/// Run one protocol step under its timeout.
async fn phase<T>(
    name: &str,
    secs: u64,
    step: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::time::timeout(Duration::from_secs(secs), step)
        .await
        .map_err(|_| ClientError::Timeout(format!("{name} (after {secs}s)")))?
}
