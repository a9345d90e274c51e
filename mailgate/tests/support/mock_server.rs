//! Downstream relay for the end-to-end suites: accepts everything except
//! what it is told to refuse, and records commands and bodies.

use std::{net::SocketAddr, sync::Arc};

use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
    sync::RwLock,
    task::JoinHandle,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmtpCommand {
    Ehlo(String),
    MailFrom(String),
    RcptTo(String),
    Data,
    Body(Vec<u8>),
    Other(String),
}

type Log = Arc<RwLock<Vec<SmtpCommand>>>;

pub struct MockSmtpServer {
    addr: SocketAddr,
    log: Log,
    task: JoinHandle<()>,
}

impl MockSmtpServer {
    pub fn builder() -> MockSmtpServerBuilder {
        MockSmtpServerBuilder {
            rcpt_to: "250 OK".to_string(),
        }
    }

    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub async fn commands(&self) -> Vec<SmtpCommand> {
        self.log.read().await.clone()
    }

    /// Bodies received after DATA, in arrival order.
    pub async fn messages(&self) -> Vec<Vec<u8>> {
        self.log
            .read()
            .await
            .iter()
            .filter_map(|cmd| match cmd {
                SmtpCommand::Body(body) => Some(body.clone()),
                _ => None,
            })
            .collect()
    }
}

impl Drop for MockSmtpServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub struct MockSmtpServerBuilder {
    rcpt_to: String,
}

impl MockSmtpServerBuilder {
    #[must_use]
    pub fn with_rcpt_to_response(mut self, code: u16, message: &str) -> Self {
        self.rcpt_to = format!("{code} {message}");
        self
    }

    pub async fn build(self) -> std::io::Result<MockSmtpServer> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let rcpt_to: Arc<str> = self.rcpt_to.into();
        let log = Log::default();
        let recorded = Arc::clone(&log);

        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let rcpt_to = Arc::clone(&rcpt_to);
                let log = Arc::clone(&recorded);
                tokio::spawn(async move {
                    let _ = serve(stream, &rcpt_to, &log).await;
                });
            }
        });

        Ok(MockSmtpServer { addr, log, task })
    }
}

async fn serve(mut stream: TcpStream, rcpt_to: &str, log: &Log) -> std::io::Result<()> {
    let (reader, mut writer) = stream.split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    writer.write_all(b"220 downstream.test ESMTP\r\n").await?;

    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            return Ok(());
        }

        let trimmed = line.trim();
        let (verb, arg) = trimmed.split_once(' ').unwrap_or((trimmed, ""));

        let (command, reply) = match verb.to_ascii_uppercase().as_str() {
            "EHLO" => (SmtpCommand::Ehlo(arg.to_string()), "250 downstream.test"),
            "MAIL" => (SmtpCommand::MailFrom(arg.to_string()), "250 OK"),
            "RCPT" => (SmtpCommand::RcptTo(arg.to_string()), rcpt_to),
            "DATA" => (SmtpCommand::Data, "354 Go ahead"),
            "QUIT" => {
                writer.write_all(b"221 Bye\r\n").await?;
                return Ok(());
            }
            _ => (SmtpCommand::Other(trimmed.to_string()), "502 Not implemented"),
        };

        let is_data = command == SmtpCommand::Data;
        log.write().await.push(command);
        writer.write_all(format!("{reply}\r\n").as_bytes()).await?;

        if is_data {
            let mut body = Vec::new();
            loop {
                line.clear();
                if reader.read_line(&mut line).await? == 0 {
                    return Ok(());
                }
                if line == ".\r\n" {
                    break;
                }
                body.extend_from_slice(line.as_bytes());
            }

            log.write().await.push(SmtpCommand::Body(body));
            writer.write_all(b"250 OK: queued\r\n").await?;
        }
    }
}
