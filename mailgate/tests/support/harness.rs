//! Runs a complete relay on loopback in front of a mock downstream server.
#![allow(dead_code)]

use std::{net::SocketAddr, path::Path, time::Duration};

use ahash::AHashMap;
use mailgate::Mailgate;
use mailgate_common::config::{Config, Encryption, ListenerSpec, QueueConfig};
use mailgate_smtp::client::{Response, SmtpClient};

pub struct Harness {
    pub mailgate: Mailgate,
    pub addr: SocketAddr,
}

/// A single plaintext listener on an ephemeral port relaying to `default_relay`.
pub fn config(default_relay: impl Into<String>) -> Config {
    let mut config = Config::new(
        vec![ListenerSpec::new("127.0.0.1", 0, Encryption::None)],
        default_relay,
    );
    config.relay.scan_interval = Duration::from_millis(50);
    config
}

/// A queue under `dir` that retries after an hour and persists every 50ms.
pub fn queue_config(dir: &Path) -> QueueConfig {
    let mut queue = QueueConfig::new(dir);
    queue.retry_interval = Duration::from_secs(3600);
    queue.persist_interval = Duration::from_millis(50);
    queue
}

pub fn routing(domain: &str, relay: SocketAddr) -> AHashMap<String, String> {
    let mut routing = AHashMap::new();
    routing.insert(domain.to_string(), relay.to_string());
    routing
}

impl Harness {
    pub async fn start(config: Config) -> anyhow::Result<Self> {
        let mut mailgate = Mailgate::new(config)?;
        mailgate.start().await?;

        let addr = mailgate
            .local_addrs()
            .await
            .first()
            .copied()
            .ok_or_else(|| anyhow::anyhow!("no listener was opened"))?;

        Ok(Self { mailgate, addr })
    }

    /// Run a full transaction and return the reply to the message body.
    pub async fn send_email(&self, from: &str, to: &str, body: &str) -> anyhow::Result<Response> {
        let mut client = SmtpClient::connect(&self.addr.to_string(), "localhost").await?;
        client.read_greeting().await?;
        client.ehlo("test-client").await?;
        client.mail_from(from).await?;

        let rcpt = client.rcpt_to(to).await?;
        if !rcpt.is_success() {
            client.quit().await?;
            return Ok(rcpt);
        }

        client.data().await?;
        let accepted = client.send_data(body.as_bytes()).await?;
        client.quit().await?;

        Ok(accepted)
    }

    pub async fn shutdown(self) {
        self.mailgate.shutdown().await;
    }
}

/// Poll `check` every 20ms until it holds or `limit` passes.
pub async fn eventually<F, Fut>(limit: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + limit;

    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() > deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
