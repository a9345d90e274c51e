//! One SMTP transaction against a downstream relay.

use mailgate_common::tracing;
use mailgate_smtp::client::{ClientError, Response, SmtpClient};

use crate::{
    envelope::QueuedMessage,
    error::{DeliveryError, TemporaryError},
};

/// Outcome of offering STARTTLS to the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TlsNegotiationOutcome {
    Success,
    /// Not advertised, or declined by the relay.
    Skipped,
    /// The handshake failed; the connection is unusable and plaintext must be
    /// tried on a new one.
    RetryWithoutTls,
}

pub struct SmtpTransaction<'a> {
    message: &'a QueuedMessage,
    server_address: &'a str,
    helo_name: &'a str,
    accept_invalid_certs: bool,
}

impl<'a> SmtpTransaction<'a> {
    pub const fn new(
        message: &'a QueuedMessage,
        server_address: &'a str,
        helo_name: &'a str,
        accept_invalid_certs: bool,
    ) -> Self {
        Self {
            message,
            server_address,
            helo_name,
            accept_invalid_certs,
        }
    }

    /// Server name used for the certificate check: the host part of the
    /// relay address.
    fn server_name(&self) -> &str {
        self.server_address
            .rsplit_once(':')
            .map_or(self.server_address, |(host, _)| host)
            .trim_start_matches('[')
            .trim_end_matches(']')
    }

    async fn connect_and_greet(&self) -> Result<SmtpClient, DeliveryError> {
        let mut client = SmtpClient::connect(self.server_address, self.server_name())
            .await
            .map_err(|e| {
                TemporaryError::ConnectionFailed(format!(
                    "Failed to connect to {}: {e}",
                    self.server_address
                ))
            })?
            .accept_invalid_certs(self.accept_invalid_certs);

        let greeting = client.read_greeting().await?;
        if !greeting.is_success() {
            return Err(TemporaryError::ServerBusy(format!(
                "Server rejected connection: {} {}",
                greeting.code,
                greeting.message()
            ))
            .into());
        }

        Ok(client)
    }

    /// EHLO, falling back to HELO when EHLO is refused.
    async fn hello(&self, client: &mut SmtpClient) -> Result<Response, DeliveryError> {
        let ehlo = client.ehlo(self.helo_name).await?;
        if ehlo.is_success() {
            return Ok(ehlo);
        }

        tracing::debug!(
            server = %self.server_address,
            code = ehlo.code,
            "EHLO refused, falling back to HELO"
        );
        let helo = client.helo(self.helo_name).await?;
        expect(helo, &format!("HELO {}", self.helo_name), Response::is_success)
    }

    async fn negotiate_tls(
        &self,
        client: &mut SmtpClient,
        hello: &Response,
    ) -> Result<TlsNegotiationOutcome, DeliveryError> {
        if !hello.has_extension("STARTTLS") {
            return Ok(TlsNegotiationOutcome::Skipped);
        }

        match client.starttls().await {
            Ok(response) if response.is_success() => {
                self.hello(client).await?;
                Ok(TlsNegotiationOutcome::Success)
            }
            Ok(response) => {
                tracing::info!(
                    server = %self.server_address,
                    code = response.code,
                    "STARTTLS declined, continuing without TLS"
                );
                Ok(TlsNegotiationOutcome::Skipped)
            }
            Err(ClientError::TlsError(err)) => {
                tracing::warn!(server = %self.server_address, "STARTTLS handshake failed: {err}");
                Ok(TlsNegotiationOutcome::RetryWithoutTls)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Greeting, EHLO/HELO, opportunistic STARTTLS, MAIL, RCPT, DATA and QUIT.
    ///
    /// # Errors
    /// Connection problems and any non-positive reply, classified as
    /// temporary (4xx, network) or permanent (5xx).
    #[tracing::instrument(level = tracing::Level::DEBUG, skip(self), fields(server = %self.server_address))]
    pub async fn execute(self) -> Result<(), DeliveryError> {
        if self.accept_invalid_certs {
            tracing::warn!(
                server = %self.server_address,
                "TLS certificate validation is disabled for this connection"
            );
        }

        let mut client = self.connect_and_greet().await?;
        let hello = self.hello(&mut client).await?;

        if self.negotiate_tls(&mut client, &hello).await? == TlsNegotiationOutcome::RetryWithoutTls {
            drop(client);
            client = self.connect_and_greet().await?;
            self.hello(&mut client).await?;
        }

        let from = client.mail_from(&self.message.from).await?;
        expect(from, &format!("MAIL FROM:<{}>", self.message.from), Response::is_success)?;

        let to = client.rcpt_to(&self.message.to).await?;
        expect(to, &format!("RCPT TO:<{}>", self.message.to), Response::is_success)?;

        let data = client.data().await?;
        expect(data, "DATA", Response::is_intermediate)?;

        let accepted = client.send_data(&self.message.data).await?;
        expect(accepted, "message body", Response::is_success)?;

        if let Err(err) = client.quit().await {
            tracing::debug!(server = %self.server_address, "QUIT after delivery failed: {err}");
        }

        Ok(())
    }
}

/// Turn a reply that fails `accept` into the matching error.
fn expect(
    response: Response,
    command: &str,
    accept: impl Fn(&Response) -> bool,
) -> Result<Response, DeliveryError> {
    if accept(&response) {
        return Ok(response);
    }

    Err(ClientError::SmtpError {
        command: command.to_string(),
        code: response.code,
        message: response.message(),
    }
    .into())
}
