//! Scripted SMTP servers shared by the session and batch tests.
//!
//! A [`ScriptedStream`] wraps a `tokio_test` mock: every write the client
//! makes must match the script byte for byte, and the server's replies are
//! played back in order. The TLS upgrade is simulated; the conversation
//! simply continues on the same script.

#![allow(dead_code, clippy::unwrap_used)]

use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio_test::io::{Builder, Mock};

use emlforward_smtp::{
    Connector, Error, ForwardConfig, Phase, Result, ServerEndpoint, SessionEvent,
    SessionObserver, Transport,
};

pub const USERNAME: &str = "me@example.com";
pub const PASSWORD: &str = "hunter2";
pub const USERNAME_B64: &[u8] = b"bWVAZXhhbXBsZS5jb20=\r\n";
pub const PASSWORD_B64: &[u8] = b"aHVudGVyMg==\r\n";

/// A valid configuration with no pause between batch messages.
pub fn config() -> ForwardConfig {
    ForwardConfig::builder()
        .host("smtp.example.com")
        .username(USERNAME)
        .password(PASSWORD)
        .message_delay(Duration::ZERO)
        .build()
        .unwrap()
}

/// Greeting and first EHLO, advertising `extensions`.
pub fn greet<'a>(script: &'a mut Builder, extensions: &[&str]) -> &'a mut Builder {
    script
        .read(b"220 smtp.example.com ESMTP ready\r\n")
        .write(b"EHLO localhost\r\n")
        .read(&ehlo_reply(extensions))
}

/// STARTTLS and the second EHLO.
pub fn starttls<'a>(script: &'a mut Builder, extensions: &[&str]) -> &'a mut Builder {
    script
        .write(b"STARTTLS\r\n")
        .read(b"220 2.0.0 Ready to start TLS\r\n")
        .write(b"EHLO localhost\r\n")
        .read(&ehlo_reply(extensions))
}

/// A successful AUTH LOGIN exchange.
pub fn login(script: &mut Builder) -> &mut Builder {
    script
        .write(b"AUTH LOGIN\r\n")
        .read(b"334 VXNlcm5hbWU6\r\n")
        .write(USERNAME_B64)
        .read(b"334 UGFzc3dvcmQ6\r\n")
        .write(PASSWORD_B64)
        .read(b"235 2.7.0 Authentication successful\r\n")
}

/// MAIL FROM through the final DATA reply.
pub fn transaction<'a>(
    script: &'a mut Builder,
    sender: &str,
    recipient: &str,
    payload: &[u8],
) -> &'a mut Builder {
    script
        .write(format!("MAIL FROM:<{sender}>\r\n").as_bytes())
        .read(b"250 2.1.0 Ok\r\n")
        .write(format!("RCPT TO:<{recipient}>\r\n").as_bytes())
        .read(b"250 2.1.5 Ok\r\n")
        .write(b"DATA\r\n")
        .read(b"354 End data with <CR><LF>.<CR><LF>\r\n")
        .write(payload)
        .read(b"250 2.0.0 Ok: queued as 4F2A1\r\n")
}

/// A clean QUIT.
pub fn quit(script: &mut Builder) -> &mut Builder {
    script.write(b"QUIT\r\n").read(b"221 2.0.0 Bye\r\n")
}

/// Full implicit-TLS conversation delivering `payload`.
pub fn implicit_tls_delivery(sender: &str, recipient: &str, payload: &[u8]) -> ScriptedStream {
    let mut script = Builder::new();
    greet(&mut script, &["AUTH LOGIN PLAIN"]);
    login(&mut script);
    transaction(&mut script, sender, recipient, payload);
    quit(&mut script);
    ScriptedStream::implicit_tls(&mut script)
}

fn ehlo_reply(extensions: &[&str]) -> Vec<u8> {
    let mut lines = vec!["smtp.example.com".to_string()];
    lines.extend(extensions.iter().map(ToString::to_string));
    let last = lines.len() - 1;
    lines
        .iter()
        .enumerate()
        .map(|(i, line)| {
            let separator = if i == last { ' ' } else { '-' };
            format!("250{separator}{line}\r\n")
        })
        .collect::<String>()
        .into_bytes()
}

/// A scripted connection that can pretend to upgrade to TLS.
#[derive(Debug)]
pub struct ScriptedStream {
    inner: Mock,
    tls: bool,
    fail_upgrade: bool,
    fail_shutdown: bool,
}

impl ScriptedStream {
    /// A plaintext connection (STARTTLS flow).
    pub fn plain(script: &mut Builder) -> Self {
        Self {
            inner: script.build(),
            tls: false,
            fail_upgrade: false,
            fail_shutdown: false,
        }
    }

    /// A connection that is encrypted from the first byte.
    pub fn implicit_tls(script: &mut Builder) -> Self {
        Self {
            tls: true,
            ..Self::plain(script)
        }
    }

    /// Makes the STARTTLS handshake fail.
    pub fn failing_upgrade(mut self) -> Self {
        self.fail_upgrade = true;
        self
    }

    /// Makes the final `shutdown()` fail, as on a reset connection.
    pub fn failing_shutdown(mut self) -> Self {
        self.fail_shutdown = true;
        self
    }
}

impl Transport for ScriptedStream {
    async fn upgrade_to_tls(mut self, _hostname: &str) -> io::Result<Self> {
        if self.fail_upgrade {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "invalid peer certificate: UnknownIssuer",
            ));
        }
        self.tls = true;
        Ok(self)
    }

    fn is_tls(&self) -> bool {
        self.tls
    }
}

impl AsyncRead for ScriptedStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for ScriptedStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        if self.fail_shutdown {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "connection reset by peer",
            )));
        }
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

/// Hands out scripted streams in order and counts dials.
#[derive(Debug, Default)]
pub struct ScriptedConnector {
    streams: Mutex<VecDeque<ScriptedStream>>,
    dials: AtomicUsize,
}

impl ScriptedConnector {
    pub fn new(streams: impl IntoIterator<Item = ScriptedStream>) -> Self {
        Self {
            streams: Mutex::new(streams.into_iter().collect()),
            dials: AtomicUsize::new(0),
        }
    }

    pub fn dials(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }
}

impl Connector for ScriptedConnector {
    type Stream = ScriptedStream;

    async fn connect(&self, _endpoint: &ServerEndpoint) -> Result<ScriptedStream> {
        self.dials.fetch_add(1, Ordering::SeqCst);
        let next = self.streams.lock().unwrap().pop_front();
        next.ok_or_else(|| {
            Error::connection(
                Phase::Connect,
                io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused"),
            )
        })
    }
}

/// What an observer saw, without borrowed data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Seen {
    Phase(Phase),
    Reply(Phase, u16),
    Tls,
    Progress { sent: usize, total: usize },
    Completed,
    Failed(Phase),
    Closed,
}

/// Records every event it receives.
#[derive(Debug, Default)]
pub struct Recorder {
    events: Mutex<Vec<Seen>>,
}

impl Recorder {
    pub fn events(&self) -> Vec<Seen> {
        self.events.lock().unwrap().clone()
    }

    pub fn phases(&self) -> Vec<Phase> {
        self.events()
            .into_iter()
            .filter_map(|seen| match seen {
                Seen::Phase(phase) => Some(phase),
                _ => None,
            })
            .collect()
    }

    pub fn progress(&self) -> Vec<(usize, usize)> {
        self.events()
            .into_iter()
            .filter_map(|seen| match seen {
                Seen::Progress { sent, total } => Some((sent, total)),
                _ => None,
            })
            .collect()
    }
}

impl SessionObserver for Recorder {
    fn on_event(&self, event: &SessionEvent<'_>) {
        let seen = match event {
            SessionEvent::PhaseEntered(phase) => Seen::Phase(*phase),
            SessionEvent::ReplyReceived { phase, reply } => Seen::Reply(*phase, reply.code.as_u16()),
            SessionEvent::TlsEstablished => Seen::Tls,
            SessionEvent::DataProgress { sent, total } => Seen::Progress {
                sent: *sent,
                total: *total,
            },
            SessionEvent::Completed => Seen::Completed,
            SessionEvent::Failed { phase, .. } => Seen::Failed(*phase),
            SessionEvent::Closed => Seen::Closed,
        };
        self.events.lock().unwrap().push(seen);
    }
}
