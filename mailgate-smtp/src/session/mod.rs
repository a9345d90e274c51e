use std::{net::SocketAddr, sync::Arc};

use mailgate_common::{
    config::Encryption, error::SessionError, incoming, internal, outgoing, traits::Relay, tracing,
};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::{
    connection::Connection, policy::PolicyFilter, rate_limiter::RateLimiter, tls::TlsMaterial,
};

mod response;
pub mod state;

pub use self::{
    response::Reply,
    state::{BodyLine, Effect, Envelope, State, Transition},
};

/// Everything a session needs from its listener. Shared by every session the
/// listener accepts.
pub struct SessionConfig {
    pub encryption: Encryption,
    pub tls: Option<TlsMaterial>,
    pub policy: Arc<PolicyFilter>,
    pub limiter: Arc<RateLimiter>,
    pub relay: Arc<dyn Relay>,
}

impl core::fmt::Debug for SessionConfig {
    fn fmt(&self, fmt: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        fmt.debug_struct("SessionConfig")
            .field("encryption", &self.encryption)
            .field("tls", &self.tls.is_some())
            .finish_non_exhaustive()
    }
}

pub struct Session<Stream: AsyncRead + AsyncWrite + Unpin + Send + Sync> {
    stream: Stream,
    peer: Option<SocketAddr>,
    config: Arc<SessionConfig>,
}

impl<Stream: AsyncRead + AsyncWrite + Unpin + Send + Sync> Session<Stream> {
    pub const fn new(stream: Stream, peer: Option<SocketAddr>, config: Arc<SessionConfig>) -> Self {
        Self {
            stream,
            peer,
            config,
        }
    }

    ///
    /// Drive the connection until QUIT, a policy rejection, or a read error.
    ///
    /// # Errors
    /// Returns the reason the session ended early. Rejections are reported
    /// to the client before returning; I/O errors end the session silently.
    ///
    #[tracing::instrument(level = tracing::Level::DEBUG, skip_all, fields(peer = ?self.peer))]
    pub async fn run(self) -> Result<(), SessionError> {
        let Self {
            stream,
            peer,
            config,
        } = self;

        let mut connection = match (config.encryption, config.tls.as_ref()) {
            (Encryption::Tls, Some(tls)) => {
                let (connection, info) = Connection::accept_tls(stream, tls).await?;
                internal!(
                    level = DEBUG,
                    "TLS established: {} {}",
                    info.protocol,
                    info.cipher
                );
                connection
            }
            (Encryption::Tls, None) => {
                return Err(SessionError::Handshake(
                    "No TLS material for implicit TLS listener".to_string(),
                ));
            }
            _ => Connection::plain(stream),
        };

        match admit(&config, peer) {
            Ok(()) => {
                internal!(level = INFO, "New connection from {peer:?}");
                converse(connection, &config).await
            }
            Err((reply, err)) => {
                internal!(level = WARN, "Rejected connection from {peer:?}: {reply}");
                send(&mut connection, &reply).await?;
                close(&mut connection).await;
                Err(err)
            }
        }
    }
}

/// Connection-level admission: a resolvable peer that is neither blocked nor
/// over its rate limit.
fn admit(
    config: &SessionConfig,
    peer: Option<SocketAddr>,
) -> Result<(), (Reply, SessionError)> {
    let Some(ip) = peer.map(|peer| peer.ip().to_canonical()) else {
        return Err((Reply::service_unavailable(), SessionError::UnresolvedPeer));
    };

    if config.policy.is_ip_blocked(ip) {
        return Err((
            Reply::connection_blocked(),
            SessionError::Rejected("blocked address"),
        ));
    }

    if !config.limiter.allow(ip) {
        return Err((Reply::rate_limited(), SessionError::Rejected("rate limited")));
    }

    Ok(())
}

async fn send<Stream: AsyncRead + AsyncWrite + Unpin + Send + Sync>(
    connection: &mut Connection<Stream>,
    reply: &Reply,
) -> Result<(), SessionError> {
    outgoing!("{reply}");
    Ok(connection.send(reply).await?)
}

async fn close<Stream: AsyncRead + AsyncWrite + Unpin + Send + Sync>(
    connection: &mut Connection<Stream>,
) {
    if let Err(err) = connection.shutdown().await {
        tracing::debug!("Error closing connection: {err}");
    }
}

async fn converse<Stream: AsyncRead + AsyncWrite + Unpin + Send + Sync>(
    mut connection: Connection<Stream>,
    config: &SessionConfig,
) -> Result<(), SessionError> {
    let mut envelope = Envelope::default();
    let greeting = state::greet(config.encryption);
    let mut current = greeting.state;

    if let Some(reply) = &greeting.reply {
        send(&mut connection, reply).await?;
    }

    loop {
        let line = connection.receive().await?;
        incoming!("{line}");

        let transition = state::step(current, &mut envelope, &line, &config.policy);
        if let Some(reply) = &transition.reply {
            send(&mut connection, reply).await?;
        }
        current = transition.state;

        match transition.effect {
            Effect::None => {}
            Effect::Close => {
                close(&mut connection).await;
                return Ok(());
            }
            Effect::UpgradeTls => {
                let tls = config.tls.as_ref().ok_or_else(|| {
                    SessionError::Handshake("No TLS material for STARTTLS listener".to_string())
                })?;

                // The greeting is not repeated; the client is expected to EHLO again.
                let (upgraded, info) = connection.upgrade(tls).await?;
                connection = upgraded;

                internal!(
                    level = INFO,
                    "Upgraded connection to STARTTLS: {} {}",
                    info.protocol,
                    info.cipher
                );
            }
            Effect::ReadData => {
                let body = read_body(&mut connection).await?;
                let (message, transition) = state::complete_data(&envelope, body);

                internal!(
                    level = INFO,
                    "Received email: From={}, To={}, Subject={}",
                    message.from,
                    message.to,
                    message.subject
                );
                config.relay.relay(message).await;

                if let Some(reply) = &transition.reply {
                    send(&mut connection, reply).await?;
                }
                current = transition.state;
            }
        }
    }
}

/// Read a dot-terminated body. Lines keep their CRLF; one leading dot is
/// removed.
async fn read_body<Stream: AsyncRead + AsyncWrite + Unpin + Send + Sync>(
    connection: &mut Connection<Stream>,
) -> Result<Vec<u8>, SessionError> {
    let mut body = Vec::new();

    loop {
        let line = connection.receive_bytes().await?;

        match BodyLine::from(line.as_slice()) {
            BodyLine::End => return Ok(body),
            BodyLine::Content(content) => {
                body.extend_from_slice(content);
                body.extend_from_slice(b"\r\n");
            }
        }
    }
}
