//! The SMTP session driver.
//!
//! A [`Session`] walks the [`Phase`] table from the greeting to QUIT, one
//! command and one reply at a time. It owns the connection for its whole
//! life; [`Session::close`] releases it, and dropping the session (for
//! example when the surrounding future is cancelled) closes the socket
//! through the stream's own `Drop`.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use tokio::io::AsyncWriteExt;
use tracing::{debug, trace, warn};

use super::{ReplyReader, ServerInfo, Transport};
use crate::command::Command;
use crate::config::Credentials;
use crate::error::{Error, Result};
use crate::events::{SessionEvent, SessionObserver};
use crate::message::Envelope;
use crate::phase::Phase;
use crate::types::{AuthMechanism, Reply};

/// Largest slice of the DATA payload handed to a single write.
pub const DATA_CHUNK_SIZE: usize = 64 * 1024;

/// Upper bound for the graceful shutdown in [`Session::close`].
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Per-reply deadlines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Deadline for each command's reply (and the TLS handshake).
    pub reply: Duration,
    /// Deadline for the payload writes and the final DATA reply.
    pub data: Duration,
}

/// Everything one transaction needs.
#[derive(Debug, Clone, Copy)]
pub struct Delivery<'a> {
    /// Name announced in EHLO.
    pub helo_name: &'a str,
    /// Name the server certificate must match after STARTTLS.
    pub tls_hostname: &'a str,
    /// AUTH LOGIN credentials.
    pub credentials: &'a Credentials,
    /// Envelope addresses.
    pub envelope: &'a Envelope,
    /// Prepared DATA payload, terminator included.
    pub payload: &'a [u8],
}

/// A live SMTP session over a transport `T`.
pub struct Session<T: Transport> {
    /// `None` only while a TLS upgrade is swapping the handle, or after it
    /// failed.
    stream: Option<T>,
    reader: ReplyReader,
    server_info: ServerInfo,
    implicit_tls: bool,
    timeouts: Timeouts,
    observer: Arc<dyn SessionObserver>,
}

impl<T: Transport> Session<T> {
    /// Takes ownership of a freshly connected stream.
    ///
    /// A stream that is already encrypted (implicit TLS) skips the STARTTLS
    /// branch of the phase table.
    pub fn new(stream: T, timeouts: Timeouts, observer: Arc<dyn SessionObserver>) -> Self {
        Self {
            implicit_tls: stream.is_tls(),
            stream: Some(stream),
            reader: ReplyReader::new(),
            server_info: ServerInfo::default(),
            timeouts,
            observer,
        }
    }

    /// Returns what the server told us about itself so far.
    #[must_use]
    pub const fn server_info(&self) -> &ServerInfo {
        &self.server_info
    }

    /// Returns true if the connection is currently encrypted.
    #[must_use]
    pub fn is_tls(&self) -> bool {
        self.stream.as_ref().is_some_and(Transport::is_tls)
    }

    /// Runs the whole transaction, from the greeting to QUIT.
    ///
    /// A failed QUIT is logged but does not fail the delivery: by then the
    /// server has already accepted the message.
    ///
    /// # Errors
    ///
    /// Returns the first error of any phase; no phase is retried.
    pub async fn deliver(&mut self, delivery: &Delivery<'_>) -> Result<()> {
        let mut next = Some(Phase::FIRST);
        while let Some(phase) = next {
            self.observer.on_event(&SessionEvent::PhaseEntered(phase));
            if let Err(error) = self.run_phase(phase, delivery).await {
                self.observer
                    .on_event(&SessionEvent::Failed { phase, error: &error });
                return Err(error);
            }
            next = phase.next(self.implicit_tls);
        }
        Ok(())
    }

    /// Shuts the connection down. Errors are logged, never returned, so they
    /// cannot mask whatever ended the session.
    pub async fn close(mut self) {
        if let Some(mut stream) = self.stream.take() {
            match tokio::time::timeout(CLOSE_TIMEOUT, stream.shutdown()).await {
                Ok(Ok(())) => {}
                Ok(Err(error)) => warn!(%error, "error while closing connection"),
                Err(_) => warn!("timed out while closing connection"),
            }
        }
        self.observer.on_event(&SessionEvent::Closed);
    }

    async fn run_phase(&mut self, phase: Phase, delivery: &Delivery<'_>) -> Result<()> {
        match phase {
            Phase::Connect => {}
            Phase::Greeting => {
                let greeting = self.expect_reply(phase, self.timeouts.reply).await?;
                self.server_info.hostname = greeting
                    .lines
                    .first()
                    .and_then(|line| line.split_whitespace().next())
                    .unwrap_or("unknown")
                    .to_string();
            }
            Phase::Ehlo | Phase::EhloAfterTls => {
                let reply = self
                    .command(
                        phase,
                        Command::Ehlo {
                            hostname: delivery.helo_name.to_string(),
                        },
                    )
                    .await?;
                self.server_info.update_from_ehlo(&reply.lines);
            }
            Phase::StartTls => {
                if !self.server_info.supports_starttls() {
                    return Err(Error::Unsupported("STARTTLS".into()));
                }
                self.command(phase, Command::StartTls).await?;
                // Anything already buffered arrived in plaintext and must not
                // be read as if it came over TLS.
                if self.reader.has_buffered() {
                    return Err(Error::MalformedReply(
                        "server sent data after its STARTTLS reply".into(),
                    ));
                }
            }
            Phase::TlsHandshake => self.upgrade(delivery.tls_hostname).await?,
            Phase::AuthStart => {
                if let Some(offered) = self.server_info.auth_mechanisms() {
                    if !offered.contains(&AuthMechanism::Login) {
                        debug!(?offered, "AUTH LOGIN not advertised");
                        return Err(Error::Unsupported("AUTH LOGIN".into()));
                    }
                }
                self.command(
                    phase,
                    Command::Auth {
                        mechanism: AuthMechanism::Login,
                    },
                )
                .await?;
            }
            Phase::AuthUser => {
                let encoded = encode(&delivery.credentials.username);
                self.command(phase, Command::AuthResponse(encoded)).await?;
            }
            Phase::AuthPass => {
                let encoded = encode(&delivery.credentials.password);
                self.command(phase, Command::AuthResponse(encoded)).await?;
            }
            Phase::MailFrom => {
                let size = delivery.payload.len();
                if let Some(limit) = self
                    .server_info
                    .max_message_size()
                    .filter(|&limit| size > limit)
                {
                    return Err(Error::MessageTooLarge { size, limit });
                }
                let from = delivery.envelope.sender.clone();
                self.command(phase, Command::MailFrom { from }).await?;
            }
            Phase::RcptTo => {
                let to = delivery.envelope.recipient.clone();
                self.command(phase, Command::RcptTo { to }).await?;
            }
            Phase::DataStart => {
                self.command(phase, Command::Data).await?;
            }
            Phase::DataBody => self.send_payload(delivery.payload).await?,
            Phase::Quit => {
                if let Err(error) = self.command(phase, Command::Quit).await {
                    warn!(%error, "QUIT was not acknowledged; the message was already accepted");
                }
            }
        }
        Ok(())
    }

    async fn command(&mut self, phase: Phase, command: Command) -> Result<Reply> {
        trace!(%phase, ?command, "sending");
        let timeout = self.timeouts.reply;
        self.send(phase, &command.serialize(), timeout).await?;
        self.expect_reply(phase, timeout).await
    }

    async fn send(&mut self, phase: Phase, data: &[u8], timeout: Duration) -> Result<()> {
        let stream = self.stream.as_mut().ok_or_else(|| not_connected(phase))?;
        let write = async {
            stream.write_all(data).await?;
            stream.flush().await
        };

        tokio::time::timeout(timeout, write)
            .await
            .map_err(|_| Error::Timeout {
                phase,
                after: timeout,
            })?
            .map_err(|source| Error::connection(phase, source))
    }

    async fn expect_reply(&mut self, phase: Phase, timeout: Duration) -> Result<Reply> {
        let stream = self.stream.as_mut().ok_or_else(|| not_connected(phase))?;
        let reply = self.reader.read_reply(stream, phase, timeout).await?;
        self.observer.on_event(&SessionEvent::ReplyReceived {
            phase,
            reply: &reply,
        });

        match phase.expected_code() {
            Some(expected) if reply.code != expected => Err(Error::unexpected_reply(
                phase,
                expected,
                reply.code,
                reply.raw_text(),
            )),
            _ => Ok(reply),
        }
    }

    async fn upgrade(&mut self, hostname: &str) -> Result<()> {
        let plain = self
            .stream
            .take()
            .ok_or_else(|| not_connected(Phase::TlsHandshake))?;

        let timeout = self.timeouts.reply;
        let tls = tokio::time::timeout(timeout, plain.upgrade_to_tls(hostname))
            .await
            .map_err(|_| Error::Timeout {
                phase: Phase::TlsHandshake,
                after: timeout,
            })?
            .map_err(|source| Error::TlsUpgrade { source })?;

        self.stream = Some(tls);
        self.reader.clear();
        // Capabilities learned in plaintext are void (RFC 3207 section 4.2).
        self.server_info.extensions.clear();
        self.observer.on_event(&SessionEvent::TlsEstablished);
        Ok(())
    }

    async fn send_payload(&mut self, payload: &[u8]) -> Result<()> {
        let phase = Phase::DataBody;
        let timeout = self.timeouts.data;
        let total = payload.len();
        let mut sent = 0;

        for chunk in payload.chunks(DATA_CHUNK_SIZE) {
            self.send(phase, chunk, timeout).await?;
            sent += chunk.len();
            self.observer
                .on_event(&SessionEvent::DataProgress { sent, total });
        }

        self.expect_reply(phase, timeout).await?;
        self.observer.on_event(&SessionEvent::Completed);
        Ok(())
    }
}

impl<T: Transport> std::fmt::Debug for Session<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("connected", &self.stream.is_some())
            .field("tls", &self.is_tls())
            .field("server_info", &self.server_info)
            .field("timeouts", &self.timeouts)
            .finish_non_exhaustive()
    }
}

fn encode(value: &str) -> String {
    base64::engine::general_purpose::STANDARD.encode(value.as_bytes())
}

fn not_connected(phase: Phase) -> Error {
    Error::connection(
        phase,
        io::Error::new(io::ErrorKind::NotConnected, "connection already released"),
    )
}
