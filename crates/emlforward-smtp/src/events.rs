//! Session events and observers.
//!
//! The session driver reports what it does through [`SessionObserver`]
//! instead of logging directly. [`TracingObserver`] turns events into
//! `tracing` records; tests register their own observer to assert on the
//! exact sequence.

use tracing::{debug, info, trace, warn};

use crate::error::Error;
use crate::phase::Phase;
use crate::types::Reply;

/// Something that happened during a session.
///
/// Events never carry credentials: AUTH phases report only the server's
/// replies, never what the client sent.
#[derive(Debug)]
pub enum SessionEvent<'a> {
    /// The driver entered `phase`.
    PhaseEntered(Phase),
    /// A complete reply arrived in `phase`.
    ReplyReceived {
        /// Phase that read the reply.
        phase: Phase,
        /// The reply.
        reply: &'a Reply,
    },
    /// STARTTLS completed; the channel is now encrypted.
    TlsEstablished,
    /// A chunk of the DATA payload was written.
    DataProgress {
        /// Bytes written so far.
        sent: usize,
        /// Total payload size.
        total: usize,
    },
    /// The server accepted the message.
    Completed,
    /// The session failed in `phase`.
    Failed {
        /// Phase that failed.
        phase: Phase,
        /// Cause.
        error: &'a Error,
    },
    /// The connection was closed.
    Closed,
}

/// Receives [`SessionEvent`]s.
pub trait SessionObserver: Send + Sync {
    /// Called synchronously for every event, in order.
    fn on_event(&self, event: &SessionEvent<'_>);
}

/// Discards all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl SessionObserver for NoopObserver {
    fn on_event(&self, _event: &SessionEvent<'_>) {}
}

/// Logs events through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl SessionObserver for TracingObserver {
    fn on_event(&self, event: &SessionEvent<'_>) {
        match event {
            SessionEvent::PhaseEntered(phase) => debug!(%phase, "entering phase"),
            SessionEvent::ReplyReceived { phase, reply } => {
                debug!(%phase, code = %reply.code, reply = reply.raw_text(), "reply");
            }
            SessionEvent::TlsEstablished => debug!("TLS established"),
            SessionEvent::DataProgress { sent, total } => trace!(sent, total, "data"),
            SessionEvent::Completed => info!("message accepted"),
            SessionEvent::Failed { phase, error } => {
                warn!(%phase, %error, hint = error.hint().unwrap_or(""), "session failed");
            }
            SessionEvent::Closed => trace!("connection closed"),
        }
    }
}
