//! Low-level SMTP stream handling.

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use rustls::pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::{
    TlsConnector,
    client::TlsStream,
    rustls::{ClientConfig, RootCertStore},
};
use tracing::debug;

use super::transport::{Connector, Transport};
use crate::config::ServerEndpoint;
use crate::error::{Error, Result};
use crate::phase::Phase;

/// SMTP stream (TCP or TLS).
#[derive(Debug)]
pub enum SmtpStream {
    /// Plain TCP connection.
    Tcp(TcpStream),
    /// TLS-encrypted connection (boxed to reduce enum size).
    Tls(Box<TlsStream<TcpStream>>),
}

impl Transport for SmtpStream {
    async fn upgrade_to_tls(self, hostname: &str) -> io::Result<Self> {
        let tcp_stream = match self {
            Self::Tcp(stream) => stream,
            Self::Tls(_) => {
                return Err(io::Error::other("stream is already using TLS"));
            }
        };

        let connector = create_tls_connector();
        let server_name = ServerName::try_from(hostname.to_string()).map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid hostname for certificate validation: {hostname}"),
            )
        })?;

        let tls_stream = connector.connect(server_name, tcp_stream).await?;
        Ok(Self::Tls(Box::new(tls_stream)))
    }

    fn is_tls(&self) -> bool {
        matches!(self, Self::Tls(_))
    }
}

impl AsyncRead for SmtpStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Tcp(stream) => Pin::new(stream).poll_read(cx, buf),
            Self::Tls(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for SmtpStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Self::Tcp(stream) => Pin::new(stream).poll_write(cx, buf),
            Self::Tls(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Tcp(stream) => Pin::new(stream).poll_flush(cx),
            Self::Tls(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Tcp(stream) => Pin::new(stream).poll_shutdown(cx),
            Self::Tls(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}

/// Dials SMTP servers over TCP, optionally with implicit TLS.
#[derive(Debug, Clone, Copy)]
pub struct TcpConnector {
    connect_timeout: Duration,
}

impl TcpConnector {
    /// Creates a connector whose dial and TLS handshake are each bounded by
    /// `connect_timeout`.
    #[must_use]
    pub const fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Connector for TcpConnector {
    type Stream = SmtpStream;

    async fn connect(&self, endpoint: &ServerEndpoint) -> Result<SmtpStream> {
        let after = self.connect_timeout;
        debug!(host = %endpoint.host, port = endpoint.port, implicit_tls = endpoint.implicit_tls, "connecting");

        let tcp = tokio::time::timeout(
            after,
            TcpStream::connect((endpoint.host.as_str(), endpoint.port)),
        )
        .await
        .map_err(|_| Error::Timeout {
            phase: Phase::Connect,
            after,
        })?
        .map_err(|source| Error::connection(Phase::Connect, source))?;

        let stream = SmtpStream::Tcp(tcp);
        if !endpoint.implicit_tls {
            return Ok(stream);
        }

        tokio::time::timeout(after, stream.upgrade_to_tls(&endpoint.host))
            .await
            .map_err(|_| Error::Timeout {
                phase: Phase::TlsHandshake,
                after,
            })?
            .map_err(|source| Error::TlsUpgrade { source })
    }
}

/// Creates a TLS connector with the webpki root certificates.
fn create_tls_connector() -> TlsConnector {
    let root_store = RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    };

    let config = ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    TlsConnector::from(Arc::new(config))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn connects_plaintext() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let accept = tokio::spawn(async move { listener.accept().await.map(|_| ()) });

        let endpoint = ServerEndpoint::new("127.0.0.1", port, false);
        let stream = TcpConnector::new(Duration::from_secs(5))
            .connect(&endpoint)
            .await
            .unwrap();

        assert!(!stream.is_tls());
        accept.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn refused_connection_is_connection_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let endpoint = ServerEndpoint::new("127.0.0.1", port, false);
        let err = TcpConnector::new(Duration::from_secs(5))
            .connect(&endpoint)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            Error::Connection {
                phase: Phase::Connect,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn upgrade_rejects_invalid_hostname() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let _accept = tokio::spawn(async move { listener.accept().await.map(|(s, _)| s) });

        let tcp = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        let err = SmtpStream::Tcp(tcp)
            .upgrade_to_tls("not a hostname")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }
}
