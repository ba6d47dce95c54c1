//! The I/O seam between the session driver and real sockets.
//!
//! The driver only needs to read, write and upgrade to TLS. Anything that
//! provides those can carry a session, which is how the tests script a server
//! without touching the network.

use std::future::Future;
use std::io;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::config::ServerEndpoint;
use crate::error::Result;

/// A byte stream an SMTP session can run over.
pub trait Transport: AsyncRead + AsyncWrite + Unpin + Send + Sized {
    /// Performs a TLS handshake over this plaintext stream.
    ///
    /// Consumes the plaintext handle; the returned stream replaces it. The
    /// certificate is validated against `hostname`.
    fn upgrade_to_tls(self, hostname: &str) -> impl Future<Output = io::Result<Self>> + Send;

    /// Returns true if the stream is TLS-encrypted.
    fn is_tls(&self) -> bool;
}

/// Opens transports to an SMTP server.
pub trait Connector {
    /// Stream type produced by this connector.
    type Stream: Transport;

    /// Dials `endpoint`, negotiating TLS immediately when it asks for
    /// implicit TLS.
    fn connect(&self, endpoint: &ServerEndpoint) -> impl Future<Output = Result<Self::Stream>> + Send;
}
