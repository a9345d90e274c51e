use std::{net::SocketAddr, sync::Arc};

use futures_util::future::join_all;
use mailgate_common::{Signal, config::Config, internal, logging, traits::Relay};
use mailgate_delivery::{DeliveryProcessor, SmtpRelay};
use mailgate_queue::RetryQueue;
use mailgate_smtp::Server;
use tokio::{sync::broadcast, task::JoinHandle};

/// Everything a running relay is made of: the SMTP server, the onward relay
/// and, when configured, the retry queue with its delivery processor.
pub struct Mailgate {
    config: Config,
    server: Server,
    relay: Arc<SmtpRelay>,
    queue: Option<Arc<RetryQueue>>,
    shutdown: broadcast::Sender<Signal>,
    background: Vec<JoinHandle<()>>,
}

impl Mailgate {
    /// Wire the components described by `config`. The retry queue, if any, is
    /// opened here so a damaged queue stops startup.
    ///
    /// # Errors
    /// The retry queue cannot be opened.
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let queue = config
            .queue
            .clone()
            .map(RetryQueue::open)
            .transpose()?
            .map(Arc::new);

        let relay = Arc::new(SmtpRelay::from_config(&config, queue.clone()));
        let handle: Arc<dyn Relay> = relay.clone();
        let server = Server::new(&config, handle);
        let (shutdown, _) = broadcast::channel(8);

        Ok(Self {
            config,
            server,
            relay,
            queue,
            shutdown,
            background: Vec::new(),
        })
    }

    pub const fn server(&self) -> &Server {
        &self.server
    }

    pub fn queue(&self) -> Option<&Arc<RetryQueue>> {
        self.queue.as_ref()
    }

    pub async fn local_addrs(&self) -> Vec<SocketAddr> {
        self.server.local_addrs().await
    }

    /// Open the listeners and start the queue tasks.
    ///
    /// # Errors
    /// Any [`Server::start`] failure; nothing is left running in that case.
    pub async fn start(&mut self) -> anyhow::Result<()> {
        self.server.start().await?;

        if let Some(queue) = &self.queue {
            self.background.push(tokio::spawn(
                Arc::clone(queue).serve(self.shutdown.subscribe()),
            ));

            let processor = DeliveryProcessor::new(
                Arc::clone(&self.relay),
                Arc::clone(queue),
                self.config.relay.scan_interval,
            );
            self.background
                .push(tokio::spawn(processor.serve(self.shutdown.subscribe())));
        }

        internal!(level = INFO, "Mailgate running");
        Ok(())
    }

    /// Stop accepting mail, let open sessions finish, then stop the queue
    /// tasks (which persist the queue one last time).
    pub async fn shutdown(mut self) {
        internal!(level = INFO, "Shutting down...");

        self.server.stop().await;

        if self.shutdown.send(Signal::Shutdown).is_err() {
            tracing::debug!("No background task was waiting for the shutdown signal");
        }

        for result in join_all(std::mem::take(&mut self.background)).await {
            if let Err(err) = result {
                internal!(level = ERROR, "Background task failed: {err}");
            }
        }
    }

    /// Initialise logging, start everything and run until SIGINT or SIGTERM.
    ///
    /// # Errors
    /// Logging cannot be initialised, the server fails to start, or the
    /// signal handlers cannot be installed.
    pub async fn run(mut self) -> anyhow::Result<()> {
        logging::init(self.config.log_file.as_deref(), self.config.log_level.into())?;

        self.start().await?;
        let result = wait_for_signal().await;
        self.shutdown().await;

        result
    }
}

#[tracing::instrument(level = tracing::Level::TRACE)]
async fn wait_for_signal() -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        let mut terminate =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

        tokio::select! {
            r = tokio::signal::ctrl_c() => {
                r?;
                internal!(level = INFO, "CTRL+C entered, shutting down");
            }
            _ = terminate.recv() => {
                internal!(level = INFO, "Terminate signal received, shutting down");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        internal!(level = INFO, "CTRL+C entered, shutting down");
    }

    Ok(())
}
