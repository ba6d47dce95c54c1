//! SMTP session phases and their transition table.
//!
//! ```text
//! Greeting ─→ Ehlo ─┬─ (STARTTLS) ─→ StartTls ─→ TlsHandshake ─→ EhloAfterTls ─┐
//!                   └─ (implicit TLS) ──────────────────────────────────────────┤
//!                                                                               ↓
//!   AuthStart ─→ AuthUser ─→ AuthPass ─→ MailFrom ─→ RcptTo ─→ DataStart ─→ DataBody ─→ Quit
//! ```

use crate::types::ReplyCode;

/// One step of an SMTP submission session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Dialing the server (before any SMTP traffic).
    Connect,
    /// Waiting for the 220 greeting.
    Greeting,
    /// First EHLO.
    Ehlo,
    /// STARTTLS command.
    StartTls,
    /// TLS handshake over the plaintext socket.
    TlsHandshake,
    /// EHLO repeated over the encrypted channel.
    EhloAfterTls,
    /// `AUTH LOGIN`.
    AuthStart,
    /// Base64 username.
    AuthUser,
    /// Base64 password.
    AuthPass,
    /// `MAIL FROM`.
    MailFrom,
    /// `RCPT TO`.
    RcptTo,
    /// `DATA`.
    DataStart,
    /// Message payload and the terminating dot.
    DataBody,
    /// `QUIT`.
    Quit,
}

impl Phase {
    /// The first phase driven over an established connection.
    pub const FIRST: Self = Self::Greeting;

    /// Returns the phase that follows this one, or `None` after QUIT.
    ///
    /// With implicit TLS the channel is already encrypted, so the
    /// STARTTLS/handshake/second-EHLO branch is skipped entirely.
    #[must_use]
    pub const fn next(self, implicit_tls: bool) -> Option<Self> {
        let next = match self {
            Self::Connect => Self::Greeting,
            Self::Greeting => Self::Ehlo,
            Self::Ehlo if implicit_tls => Self::AuthStart,
            Self::Ehlo => Self::StartTls,
            Self::StartTls => Self::TlsHandshake,
            Self::TlsHandshake => Self::EhloAfterTls,
            Self::EhloAfterTls => Self::AuthStart,
            Self::AuthStart => Self::AuthUser,
            Self::AuthUser => Self::AuthPass,
            Self::AuthPass => Self::MailFrom,
            Self::MailFrom => Self::RcptTo,
            Self::RcptTo => Self::DataStart,
            Self::DataStart => Self::DataBody,
            Self::DataBody => Self::Quit,
            Self::Quit => return None,
        };
        Some(next)
    }

    /// Reply code the server must answer with to leave this phase.
    ///
    /// `None` for phases that exchange no SMTP reply.
    #[must_use]
    pub const fn expected_code(self) -> Option<ReplyCode> {
        match self {
            Self::Connect | Self::TlsHandshake => None,
            Self::Greeting | Self::StartTls => Some(ReplyCode::SERVICE_READY),
            Self::Ehlo
            | Self::EhloAfterTls
            | Self::MailFrom
            | Self::RcptTo
            | Self::DataBody => Some(ReplyCode::OK),
            Self::AuthStart | Self::AuthUser => Some(ReplyCode::AUTH_CONTINUE),
            Self::AuthPass => Some(ReplyCode::AUTH_SUCCESS),
            Self::DataStart => Some(ReplyCode::START_DATA),
            Self::Quit => Some(ReplyCode::CLOSING),
        }
    }

    /// Returns true for the AUTH LOGIN exchange.
    #[must_use]
    pub const fn is_auth(self) -> bool {
        matches!(self, Self::AuthStart | Self::AuthUser | Self::AuthPass)
    }

    /// Short name used in logs and error messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "CONNECT",
            Self::Greeting => "GREETING",
            Self::Ehlo => "EHLO",
            Self::StartTls => "STARTTLS",
            Self::TlsHandshake => "TLS_HANDSHAKE",
            Self::EhloAfterTls => "EHLO_AFTER_TLS",
            Self::AuthStart => "AUTH_START",
            Self::AuthUser => "AUTH_USER",
            Self::AuthPass => "AUTH_PASS",
            Self::MailFrom => "MAIL_FROM",
            Self::RcptTo => "RCPT_TO",
            Self::DataStart => "DATA_START",
            Self::DataBody => "DATA_BODY",
            Self::Quit => "QUIT",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
