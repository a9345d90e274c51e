use std::{
    io,
    net::{Ipv4Addr, Ipv6Addr, SocketAddr},
    sync::Arc,
};

use futures_util::future::join_all;
use mailgate_common::{Signal, config::ListenerSpec, internal, tracing};
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use tokio::{net::TcpListener, sync::broadcast, task::JoinHandle};

use crate::{error::ServerError, session::Session, session::SessionConfig};

const BACKLOG: i32 = 1024;

/// An open listening socket together with the settings its sessions use.
pub struct Listener {
    spec: ListenerSpec,
    tcp: TcpListener,
    config: Arc<SessionConfig>,
}

impl Listener {
    pub(crate) const fn new(spec: ListenerSpec, tcp: TcpListener, config: Arc<SessionConfig>) -> Self {
        Self { spec, tcp, config }
    }

    /// Open the socket described by `spec`.
    ///
    /// A wildcard host prefers a single dual-stack socket, then IPv4 only, then
    /// IPv6 only.
    ///
    /// # Errors
    /// [`ServerError::Bind`] when no socket could be opened.
    pub async fn bind(spec: &ListenerSpec) -> Result<TcpListener, ServerError> {
        let bind_error = |source: io::Error| ServerError::Bind {
            address: spec.to_string(),
            source,
        };

        if !spec.is_wildcard() {
            let host = spec.host.trim_start_matches('[').trim_end_matches(']');
            return TcpListener::bind((host, spec.port)).await.map_err(bind_error);
        }

        match bind_v6(spec.port, false) {
            Ok(listener) => return Ok(listener),
            Err(err) => tracing::debug!("Dual-stack bind for {spec} failed: {err}"),
        }

        match TcpListener::bind((Ipv4Addr::UNSPECIFIED, spec.port)).await {
            Ok(listener) => return Ok(listener),
            Err(err) => tracing::debug!("IPv4 bind for {spec} failed: {err}"),
        }

        bind_v6(spec.port, true).map_err(bind_error)
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.tcp.local_addr()
    }

    ///
    /// Accept connections until `shutdown` fires, spawning a session per
    /// connection. The socket is closed as soon as the loop ends; the call then
    /// waits for every session it spawned to finish.
    ///
    pub async fn serve(self, mut shutdown: broadcast::Receiver<Signal>) {
        let Self { spec, tcp, config } = self;
        let mut sessions: Vec<JoinHandle<()>> = Vec::new();

        internal!(level = INFO, "Listening on {spec}");

        loop {
            tokio::select! {
                sig = shutdown.recv() => {
                    if let Err(err) = sig {
                        tracing::debug!("Shutdown channel for {spec} closed: {err}");
                    }
                    internal!(level = INFO, "Listener {spec} received shutdown signal, finishing sessions ...");
                    break;
                }

                connection = tcp.accept() => {
                    match connection {
                        Ok((stream, peer)) => {
                            tracing::debug!("Connection received on {spec} from {peer}");
                            sessions.retain(|session| !session.is_finished());

                            let session = Session::new(stream, Some(peer), Arc::clone(&config));
                            sessions.push(tokio::spawn(async move {
                                match session.run().await {
                                    Ok(()) => {}
                                    Err(err) if err.is_rejection() => {
                                        internal!(level = INFO, "Session ended: {err}");
                                    }
                                    Err(err) => internal!(level = ERROR, "Error: {err}"),
                                }
                            }));
                        }
                        Err(err) => {
                            internal!(level = ERROR, "Failed to accept connection on {spec}: {err}");
                        }
                    }
                }
            }
        }

        drop(tcp);
        join_all(sessions).await;
        internal!(level = INFO, "Listener {spec} stopped");
    }
}

fn bind_v6(port: u16, only_v6: bool) -> io::Result<TcpListener> {
    let socket = Socket::new(Domain::IPV6, Type::STREAM, Some(Protocol::TCP))?;
    socket.set_only_v6(only_v6)?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&SockAddr::from(SocketAddr::from((Ipv6Addr::UNSPECIFIED, port))))?;
    socket.listen(BACKLOG)?;

    TcpListener::from_std(socket.into())
}

#[cfg(test)]
mod tests {
    use mailgate_common::config::Encryption;

    use super::*;

    #[tokio::test]
    async fn binds_specific_host() {
        let spec = ListenerSpec::new("127.0.0.1", 0, Encryption::None);
        let listener = Listener::bind(&spec).await.unwrap();

        assert!(listener.local_addr().unwrap().ip().is_loopback());
    }

    #[tokio::test]
    async fn binds_wildcard_host() {
        let spec = ListenerSpec::new("0.0.0.0", 0, Encryption::None);
        let listener = Listener::bind(&spec).await.unwrap();

        assert!(listener.local_addr().unwrap().ip().is_unspecified());
    }

    #[tokio::test]
    async fn reports_port_in_use() {
        let first = Listener::bind(&ListenerSpec::new("127.0.0.1", 0, Encryption::None))
            .await
            .unwrap();
        let port = first.local_addr().unwrap().port();

        let err = Listener::bind(&ListenerSpec::new("127.0.0.1", port, Encryption::None))
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::Bind { .. }));
    }
}
