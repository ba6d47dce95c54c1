//! Error types for SMTP forwarding.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use crate::phase::Phase;
use crate::types::ReplyCode;

/// Result type alias for SMTP operations.
pub type Result<T> = std::result::Result<T, Error>;

/// SMTP error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Missing or invalid configuration, detected before any network activity.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Dial failure, reset, refused or unexpected EOF.
    #[error("Connection error during {phase}: {source}")]
    Connection {
        /// Phase in which the connection failed.
        phase: Phase,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// TLS handshake or certificate validation failure.
    #[error("TLS handshake failed: {source}")]
    TlsUpgrade {
        /// Underlying handshake error.
        #[source]
        source: io::Error,
    },

    /// Server replied with a code other than the one the phase requires.
    #[error("Protocol error during {phase}: expected {expected}, got {actual}: {response}")]
    Protocol {
        /// Phase that received the reply.
        phase: Phase,
        /// Code the phase requires.
        expected: ReplyCode,
        /// Code the server sent.
        actual: ReplyCode,
        /// Raw reply text.
        response: String,
    },

    /// Reply code mismatch during the AUTH LOGIN exchange.
    #[error(
        "Authentication failed during {phase}: expected {expected}, got {actual}: {response} ({})",
        auth_hint(.phase, .actual)
    )]
    Authentication {
        /// AUTH phase that received the reply.
        phase: Phase,
        /// Code the phase requires.
        expected: ReplyCode,
        /// Code the server sent.
        actual: ReplyCode,
        /// Raw reply text.
        response: String,
    },

    /// No complete reply arrived before the deadline.
    #[error("Timed out during {phase} after {after:?}")]
    Timeout {
        /// Phase that was waiting.
        phase: Phase,
        /// Deadline that elapsed.
        after: Duration,
    },

    /// The server sent something that is not an SMTP reply.
    #[error("Malformed reply: {0}")]
    MalformedReply(String),

    /// Invalid email address.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Feature required by this client is not offered by the server.
    #[error("Server does not support {0}")]
    Unsupported(String),

    /// Message exceeds the size the server advertised.
    #[error("Message of {size} bytes exceeds server limit of {limit} bytes")]
    MessageTooLarge {
        /// Prepared payload size.
        size: usize,
        /// Limit from the EHLO `SIZE` extension.
        limit: usize,
    },

    /// An input message could not be read.
    #[error("Cannot read {}: {source}", .path.display())]
    ReadMessage {
        /// File that failed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
}

impl Error {
    /// Creates the mismatch error appropriate for `phase`.
    #[must_use]
    pub fn unexpected_reply(
        phase: Phase,
        expected: ReplyCode,
        actual: ReplyCode,
        response: impl Into<String>,
    ) -> Self {
        let response = response.into();
        if phase.is_auth() {
            Self::Authentication {
                phase,
                expected,
                actual,
                response,
            }
        } else {
            Self::Protocol {
                phase,
                expected,
                actual,
                response,
            }
        }
    }

    /// Wraps an I/O error raised in `phase`.
    #[must_use]
    pub const fn connection(phase: Phase, source: io::Error) -> Self {
        Self::Connection { phase, source }
    }

    /// Returns the phase the error belongs to, if it is tied to one.
    #[must_use]
    pub const fn phase(&self) -> Option<Phase> {
        match self {
            Self::Connection { phase, .. }
            | Self::Protocol { phase, .. }
            | Self::Authentication { phase, .. }
            | Self::Timeout { phase, .. } => Some(*phase),
            Self::TlsUpgrade { .. } => Some(Phase::TlsHandshake),
            _ => None,
        }
    }

    /// Returns the reply code the server sent, for reply mismatches.
    #[must_use]
    pub const fn reply_code(&self) -> Option<ReplyCode> {
        match self {
            Self::Protocol { actual, .. } | Self::Authentication { actual, .. } => Some(*actual),
            _ => None,
        }
    }

    /// Returns a hint separating credential problems from transport problems.
    #[must_use]
    pub const fn hint(&self) -> Option<&'static str> {
        match self {
            Self::Authentication { phase, actual, .. } => Some(auth_hint(phase, actual)),
            Self::Connection { .. } | Self::Timeout { .. } => {
                Some("network problem: check host, port and firewall")
            }
            Self::TlsUpgrade { .. } => {
                Some("TLS problem: check the hostname matches the server certificate")
            }
            _ => None,
        }
    }

    /// Returns true if this is a permanent error (5xx).
    #[must_use]
    pub fn is_permanent(&self) -> bool {
        self.reply_code().is_some_and(ReplyCode::is_permanent)
    }

    /// Returns true if this is a transient error (4xx).
    #[must_use]
    pub fn is_transient(&self) -> bool {
        self.reply_code().is_some_and(ReplyCode::is_transient)
    }
}

const fn auth_hint(phase: &Phase, actual: &ReplyCode) -> &'static str {
    match (*phase, actual.as_u16()) {
        (Phase::AuthStart, 502 | 504) => "server does not offer AUTH LOGIN",
        (Phase::AuthStart, _) => "server refused to start AUTH LOGIN",
        (Phase::AuthUser, _) => "server rejected the username",
        (_, 535) => "server rejected the credentials: check username and password",
        (_, 534 | 538) => "server requires a stronger mechanism or encryption",
        _ => "authentication was not accepted",
    }
}
