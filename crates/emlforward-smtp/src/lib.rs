//! # emlforward-smtp
//!
//! Forwards previously exported email messages (EML files) to a new recipient
//! over SMTP submission (RFC 5321), keeping the original content and only
//! rewriting the `To:` header.
//!
//! ## Features
//!
//! - **Explicit phase table**: greeting, EHLO, STARTTLS, AUTH LOGIN, MAIL
//!   FROM, RCPT TO, DATA and QUIT, each with the reply code it requires
//! - **TLS via rustls**: implicit TLS (port 465) or a STARTTLS upgrade
//!   (port 587), validated against the webpki roots
//! - **Typed failures**: every error names the phase and the raw server reply
//! - **Session events**: an observer sees every phase, reply and byte count
//! - **Batches**: one connection per message, a pause between messages, and a
//!   report that names each failed file
//!
//! ## Quick Start
//!
//! ```ignore
//! use emlforward_smtp::{Address, ForwardConfig, Forwarder};
//!
//! #[tokio::main]
//! async fn main() -> emlforward_smtp::Result<()> {
//!     let config = ForwardConfig::builder()
//!         .host("smtp.example.com")
//!         .username("me@example.com")
//!         .password("app-password")
//!         .build()?;
//!
//!     let forwarder = Forwarder::new(config);
//!     let recipient = Address::new("archive@example.org")?;
//!     let raw = std::fs::read("exported.eml").unwrap();
//!     forwarder.forward(&raw, &recipient).await
//! }
//! ```
//!
//! ## Session Phases
//!
//! ```text
//! GREETING ─→ EHLO ─┬─→ STARTTLS ─→ TLS_HANDSHAKE ─→ EHLO_AFTER_TLS ─┐
//!                   │ (implicit TLS)                                  │
//!                   └─────────────────────────────────────────────────┤
//!                                                                     ↓
//!   QUIT ←─ DATA_BODY ←─ DATA_START ←─ RCPT_TO ←─ MAIL_FROM ←─ AUTH_START/USER/PASS
//! ```
//!
//! ## Modules
//!
//! - [`command`]: SMTP command serialization
//! - [`config`]: Endpoint, credentials and timeouts
//! - [`connection`]: Transport, reply reader and session driver
//! - [`events`]: Session events and observers
//! - [`message`]: `To:` rewriting and DATA payload preparation
//! - [`parser`]: Reply parser
//! - [`types`]: Core SMTP types (addresses, extensions, replies)

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod command;
pub mod config;
pub mod connection;
mod error;
pub mod events;
mod forward;
pub mod message;
pub mod parser;
mod phase;
pub mod types;

pub use config::{Credentials, ForwardConfig, ForwardConfigBuilder, ServerEndpoint};
pub use connection::{Connector, ServerInfo, Session, SmtpStream, TcpConnector, Transport};
pub use error::{Error, Result};
pub use events::{NoopObserver, SessionEvent, SessionObserver, TracingObserver};
pub use forward::{BatchReport, FailedMessage, Forwarder};
pub use message::{Envelope, OutgoingMessage};
pub use phase::Phase;
pub use types::{Address, AuthMechanism, Extension, Mailbox, Reply, ReplyCode};
