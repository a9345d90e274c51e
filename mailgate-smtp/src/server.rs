use core::fmt::{self, Display, Formatter};
use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use futures_util::future::join_all;
use mailgate_common::{
    Signal,
    config::{Config, ListenerSpec},
    internal,
    traits::Relay,
    tracing,
};
use tokio::{
    sync::{RwLock, broadcast},
    task::JoinHandle,
};

use crate::{
    error::ServerError,
    listener::Listener,
    policy::PolicyFilter,
    rate_limiter::RateLimiter,
    session::SessionConfig,
    tls::TlsMaterial,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerStatus {
    Running,
    Stopped,
}

impl Display for ServerStatus {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> fmt::Result {
        fmt.write_str(match self {
            Self::Running => "running",
            Self::Stopped => "stopped",
        })
    }
}

#[derive(Default)]
struct ServerState {
    running: bool,
    shutdown: Option<broadcast::Sender<Signal>>,
    loops: Vec<JoinHandle<()>>,
    local_addrs: Vec<SocketAddr>,
}

/// A set of SMTP listeners started and stopped together.
pub struct Server {
    listeners: Vec<ListenerSpec>,
    tls_paths: Option<(PathBuf, PathBuf)>,
    policy: Arc<PolicyFilter>,
    limiter: Arc<RateLimiter>,
    relay: Arc<dyn Relay>,
    state: RwLock<ServerState>,
}

impl Server {
    pub fn new(config: &Config, relay: Arc<dyn Relay>) -> Self {
        Self {
            listeners: config.listeners.clone(),
            tls_paths: config.tls_cert_file.clone().zip(config.tls_key_file.clone()),
            policy: Arc::new(PolicyFilter::new(&config.block_list, &config.allow_list)),
            limiter: Arc::new(RateLimiter::new(config.rate_limiting.clone())),
            relay,
            state: RwLock::new(ServerState::default()),
        }
    }

    fn load_tls(&self) -> Result<Option<TlsMaterial>, ServerError> {
        if !self.listeners.iter().any(|l| l.encryption.needs_tls()) {
            return Ok(None);
        }

        let Some((cert, key)) = self.tls_paths.as_ref() else {
            let listener = self
                .listeners
                .iter()
                .find(|l| l.encryption.needs_tls())
                .map(ToString::to_string)
                .unwrap_or_default();
            return Err(ServerError::MissingTlsMaterial(listener));
        };

        Ok(Some(TlsMaterial::load(cert, key)?))
    }

    ///
    /// Open every listener and start accepting connections.
    ///
    /// Either every listener is opened or none is: if one fails, those already
    /// opened by this call are closed before the error is returned.
    ///
    /// # Errors
    /// [`ServerError::AlreadyRunning`] without side effects if the server is
    /// running; otherwise TLS loading or bind failures.
    ///
    #[tracing::instrument(level = tracing::Level::DEBUG, skip_all)]
    pub async fn start(&self) -> Result<(), ServerError> {
        let mut state = self.state.write().await;
        if state.running {
            return Err(ServerError::AlreadyRunning);
        }

        if self.listeners.is_empty() {
            return Err(ServerError::NoListeners);
        }

        let tls = self.load_tls()?;

        let mut bound = Vec::with_capacity(self.listeners.len());
        for spec in &self.listeners {
            if spec.require_auth {
                internal!(
                    level = WARN,
                    "Listener {spec} requests authentication, which is not supported; continuing without it"
                );
            }

            let tcp = Listener::bind(spec).await?;
            let address = tcp.local_addr().map_err(|source| ServerError::Bind {
                address: spec.to_string(),
                source,
            })?;
            bound.push((spec.clone(), tcp, address));
        }

        let (shutdown, _) = broadcast::channel(1);
        let mut loops = Vec::with_capacity(bound.len());
        let mut local_addrs = Vec::with_capacity(bound.len());

        for (spec, tcp, address) in bound {
            let config = Arc::new(SessionConfig {
                encryption: spec.encryption,
                tls: tls.clone().filter(|_| spec.encryption.needs_tls()),
                policy: Arc::clone(&self.policy),
                limiter: Arc::clone(&self.limiter),
                relay: Arc::clone(&self.relay),
            });

            local_addrs.push(address);
            loops.push(tokio::spawn(
                Listener::new(spec, tcp, config).serve(shutdown.subscribe()),
            ));
        }

        *state = ServerState {
            running: true,
            shutdown: Some(shutdown),
            loops,
            local_addrs,
        };

        internal!(level = INFO, "Server started with {} listener(s)", self.listeners.len());

        Ok(())
    }

    /// Stop accepting connections and wait for every in-flight session to
    /// finish. Does nothing if the server is not running.
    #[tracing::instrument(level = tracing::Level::DEBUG, skip_all)]
    pub async fn stop(&self) {
        let loops = {
            let mut state = self.state.write().await;
            if !state.running {
                return;
            }

            if let Some(shutdown) = state.shutdown.take()
                && shutdown.send(Signal::Shutdown).is_err()
            {
                tracing::debug!("No listener was waiting for the shutdown signal");
            }

            let loops = std::mem::take(&mut state.loops);
            *state = ServerState::default();
            loops
        };

        for result in join_all(loops).await {
            if let Err(err) = result {
                internal!(level = ERROR, "Listener task failed: {err}");
            }
        }

        internal!(level = INFO, "Server stopped");
    }

    ///
    /// Stop, then start again with a fresh shutdown channel.
    ///
    /// # Errors
    /// Any error [`Server::start`] can return.
    ///
    pub async fn restart(&self) -> Result<(), ServerError> {
        self.stop().await;
        self.start().await
    }

    pub async fn status(&self) -> ServerStatus {
        if self.state.read().await.running {
            ServerStatus::Running
        } else {
            ServerStatus::Stopped
        }
    }

    /// Bound addresses of the open listeners, in configuration order.
    pub async fn local_addrs(&self) -> Vec<SocketAddr> {
        self.state.read().await.local_addrs.clone()
    }
}
