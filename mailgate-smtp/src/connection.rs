use core::fmt::Display;

use mailgate_common::tracing;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio_rustls::server::TlsStream;

use crate::{
    error::{ConnectionError, ConnectionResult, TlsError, TlsResult},
    tls::TlsMaterial,
};

/// Longest line accepted from a client, terminator included.
pub const MAX_LINE: usize = 64 * 1024;

/// Negotiated TLS parameters, for logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsInfo {
    pub protocol: String,
    pub cipher: String,
}

impl TlsInfo {
    fn of<Stream>(stream: &TlsStream<Stream>) -> Self {
        let (_, conn) = stream.get_ref();

        Self {
            protocol: conn
                .protocol_version()
                .and_then(|version| version.as_str())
                .map_or_else(String::new, str::to_string),
            cipher: conn
                .negotiated_cipher_suite()
                .and_then(|suite| suite.suite().as_str())
                .map_or_else(String::new, str::to_string),
        }
    }
}

/// A line-oriented SMTP transport, either plaintext or wrapped in TLS.
pub enum Connection<Stream: AsyncRead + AsyncWrite + Unpin + Send + Sync> {
    Plain { stream: BufReader<Stream> },
    Tls { stream: Box<BufReader<TlsStream<Stream>>> },
}

impl<Stream: AsyncRead + AsyncWrite + Unpin + Send + Sync> Connection<Stream> {
    pub fn plain(stream: Stream) -> Self {
        Self::Plain {
            stream: BufReader::new(stream),
        }
    }

    /// Perform the server side of a TLS handshake before any SMTP bytes are
    /// exchanged.
    pub async fn accept_tls(stream: Stream, tls: &TlsMaterial) -> TlsResult<(Self, TlsInfo)> {
        let stream = tls
            .acceptor()
            .accept(stream)
            .await
            .map_err(|err| TlsError::UpgradeFailed(err.to_string()))?;
        let info = TlsInfo::of(&stream);

        Ok((
            Self::Tls {
                stream: Box::new(BufReader::new(stream)),
            },
            info,
        ))
    }

    pub const fn is_tls(&self) -> bool {
        matches!(self, Self::Tls { .. })
    }

    /// Write a single reply line, terminated with CRLF.
    pub async fn send<S: Display + Send + Sync>(&mut self, response: &S) -> ConnectionResult<()> {
        let line = format!("{response}\r\n");

        match self {
            Self::Plain { stream } => {
                stream.write_all(line.as_bytes()).await?;
                stream.flush().await?;
            }
            Self::Tls { stream } => {
                stream.write_all(line.as_bytes()).await?;
                stream.flush().await?;
            }
        }

        Ok(())
    }

    /// Read one line as raw bytes, without its line terminator.
    ///
    /// # Errors
    /// [`ConnectionError::Closed`] if the peer closed the connection before a
    /// complete line arrived, [`ConnectionError::LineTooLong`] if no line
    /// terminator arrived within [`MAX_LINE`] bytes.
    pub async fn receive_bytes(&mut self) -> ConnectionResult<Vec<u8>> {
        let mut buf = Vec::with_capacity(128);
        let limit = MAX_LINE as u64;

        let read = match self {
            Self::Plain { stream } => (&mut *stream).take(limit).read_until(b'\n', &mut buf).await?,
            Self::Tls { stream } => (&mut **stream).take(limit).read_until(b'\n', &mut buf).await?,
        };

        if buf.last() != Some(&b'\n') {
            if read >= MAX_LINE {
                return Err(ConnectionError::LineTooLong(MAX_LINE));
            }
            return Err(ConnectionError::Closed);
        }

        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }

        Ok(buf)
    }

    /// Read one command line. Bytes that are not UTF-8 are replaced.
    ///
    /// # Errors
    /// As [`Self::receive_bytes`].
    pub async fn receive(&mut self) -> ConnectionResult<String> {
        let line = self.receive_bytes().await?;
        Ok(String::from_utf8_lossy(&line).into_owned())
    }

    /// Upgrade a plaintext connection in place (STARTTLS).
    ///
    /// Anything the client sent after the STARTTLS command and before the
    /// handshake is discarded.
    pub async fn upgrade(self, tls: &TlsMaterial) -> TlsResult<(Self, TlsInfo)> {
        tracing::debug!("Upgrading connection ...");

        match self {
            Self::Plain { stream } => {
                if !stream.buffer().is_empty() {
                    tracing::warn!(
                        bytes = stream.buffer().len(),
                        "Discarding data pipelined after STARTTLS"
                    );
                }

                Self::accept_tls(stream.into_inner(), tls).await
            }
            Self::Tls { .. } => Err(TlsError::UpgradeFailed(
                "Connection is already using TLS".to_string(),
            )),
        }
    }

    pub async fn shutdown(&mut self) -> ConnectionResult<()> {
        match self {
            Self::Plain { stream } => stream.shutdown().await?,
            Self::Tls { stream } => stream.shutdown().await?,
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::duplex;

    use super::*;

    #[tokio::test]
    async fn receive_strips_terminators() {
        let (mut client, server) = duplex(1024);
        let mut conn = Connection::plain(server);

        client.write_all(b"HELO there\r\nbare\nlast").await.unwrap();
        drop(client);

        assert_eq!(conn.receive().await.unwrap(), "HELO there");
        assert_eq!(conn.receive().await.unwrap(), "bare");
        // A partial line followed by EOF is a closed connection.
        assert!(matches!(conn.receive().await, Err(ConnectionError::Closed)));
    }

    #[tokio::test]
    async fn receive_bytes_keeps_non_utf8() {
        let (mut client, server) = duplex(1024);
        let mut conn = Connection::plain(server);

        client.write_all(b"caf\xe9\r\n").await.unwrap();

        assert_eq!(conn.receive_bytes().await.unwrap(), b"caf\xe9");
    }

    #[tokio::test]
    async fn overlong_line_is_refused() {
        let (mut client, server) = duplex(MAX_LINE * 2);
        let mut conn = Connection::plain(server);

        client.write_all(&vec![b'a'; MAX_LINE + 10]).await.unwrap();

        assert!(matches!(
            conn.receive().await,
            Err(ConnectionError::LineTooLong(MAX_LINE))
        ));
    }

    #[tokio::test]
    async fn line_at_the_limit_is_accepted() {
        let (mut client, server) = duplex(MAX_LINE * 2);
        let mut conn = Connection::plain(server);

        let mut line = vec![b'a'; MAX_LINE - 2];
        line.extend_from_slice(b"\r\n");
        client.write_all(&line).await.unwrap();

        assert_eq!(conn.receive_bytes().await.unwrap().len(), MAX_LINE - 2);
    }

    #[tokio::test]
    async fn send_appends_crlf() {
        let (mut client, server) = duplex(1024);
        let mut conn = Connection::plain(server);

        conn.send(&"250 OK").await.unwrap();
        drop(conn);

        let mut out = String::new();
        client.read_to_string(&mut out).await.unwrap();
        assert_eq!(out, "250 OK\r\n");
    }
}
