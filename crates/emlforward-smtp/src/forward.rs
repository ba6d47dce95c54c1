//! Forwarding messages: one at a time or as a batch.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{Instrument, info, info_span, warn};

use crate::config::ForwardConfig;
use crate::connection::{Connector, Delivery, Session, TcpConnector, Timeouts};
use crate::error::{Error, Result};
use crate::events::{SessionEvent, SessionObserver, TracingObserver};
use crate::message::OutgoingMessage;
use crate::phase::Phase;
use crate::types::Address;

/// Sends exported messages to a new recipient through one SMTP server.
///
/// Every message gets its own connection; nothing is kept open between
/// messages.
pub struct Forwarder<C = TcpConnector> {
    connector: C,
    config: ForwardConfig,
    observer: Arc<dyn SessionObserver>,
}

impl Forwarder<TcpConnector> {
    /// Creates a forwarder that dials the configured endpoint over TCP.
    #[must_use]
    pub fn new(config: ForwardConfig) -> Self {
        Self::with_connector(TcpConnector::new(config.connect_timeout), config)
    }
}

impl<C: Connector> Forwarder<C> {
    /// Creates a forwarder that opens connections through `connector`.
    #[must_use]
    pub fn with_connector(connector: C, config: ForwardConfig) -> Self {
        Self {
            connector,
            config,
            observer: Arc::new(TracingObserver),
        }
    }

    /// Replaces the default [`TracingObserver`].
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn SessionObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &ForwardConfig {
        &self.config
    }

    /// Sends one raw message to `recipient`.
    ///
    /// The message is taken as bytes and is never decoded, so 8-bit bodies
    /// reach the server unchanged. The connection is closed before this
    /// returns, whatever the outcome.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] before any network activity if the
    /// configuration is incomplete, otherwise the first error the session
    /// hit.
    pub async fn forward(&self, raw: impl AsRef<[u8]>, recipient: &Address) -> Result<()> {
        // Session failures are reported through the observer; only what
        // happens before the first dial is logged here.
        let message = self
            .config
            .validate()
            .and_then(|()| {
                OutgoingMessage::prepare(
                    raw.as_ref(),
                    recipient.clone(),
                    &self.config.credentials.username,
                )
            })
            .inspect_err(|error| warn!(%error, "message not sent"))?;

        self.observer
            .on_event(&SessionEvent::PhaseEntered(Phase::Connect));
        let stream = match self.connector.connect(&self.config.endpoint).await {
            Ok(stream) => stream,
            Err(error) => {
                self.observer.on_event(&SessionEvent::Failed {
                    phase: error.phase().unwrap_or(Phase::Connect),
                    error: &error,
                });
                return Err(error);
            }
        };

        let timeouts = Timeouts {
            reply: self.config.reply_timeout,
            data: self.config.data_timeout,
        };
        let mut session = Session::new(stream, timeouts, Arc::clone(&self.observer));
        let delivery = Delivery {
            helo_name: &self.config.helo_name,
            tls_hostname: &self.config.endpoint.host,
            credentials: &self.config.credentials,
            envelope: &message.envelope,
            payload: &message.payload,
        };

        let result = session.deliver(&delivery).await;
        session.close().await;
        result
    }

    /// Reads and sends each file in order, pausing
    /// [`ForwardConfig::message_delay`] between messages.
    ///
    /// A failed message is recorded and the batch moves on.
    pub async fn forward_files(&self, paths: &[PathBuf], recipient: &Address) -> BatchReport {
        let mut report = BatchReport::default();

        for (index, path) in paths.iter().enumerate() {
            if index > 0 && !self.config.message_delay.is_zero() {
                tokio::time::sleep(self.config.message_delay).await;
            }

            let span = info_span!("message", path = %path.display());
            let result = self.forward_file(path, recipient).instrument(span).await;
            match result {
                Ok(()) => {
                    info!(path = %path.display(), "forwarded");
                    report.sent.push(path.clone());
                }
                Err(error) => {
                    report.failed.push(FailedMessage {
                        path: path.clone(),
                        error,
                    });
                }
            }
        }

        report
    }

    async fn forward_file(&self, path: &Path, recipient: &Address) -> Result<()> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| Error::ReadMessage {
                path: path.to_path_buf(),
                source,
            })
            .inspect_err(|error| warn!(%error, "message not sent"))?;

        self.forward(bytes, recipient).await
    }
}

impl<C: fmt::Debug> fmt::Debug for Forwarder<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Forwarder")
            .field("connector", &self.connector)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// A message that could not be forwarded.
#[derive(Debug)]
pub struct FailedMessage {
    /// Input file.
    pub path: PathBuf,
    /// Why it failed.
    pub error: Error,
}

/// Outcome of [`Forwarder::forward_files`].
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Files that were accepted by the server, in order.
    pub sent: Vec<PathBuf>,
    /// Files that failed, in order.
    pub failed: Vec<FailedMessage>,
}

impl BatchReport {
    /// Returns true if every message was sent.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// Total number of messages attempted.
    #[must_use]
    pub fn total(&self) -> usize {
        self.sent.len() + self.failed.len()
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} message(s) forwarded",
            self.sent.len(),
            self.total()
        )?;
        for failure in &self.failed {
            write!(f, "\n  {}: {}", failure.path.display(), failure.error)?;
            if let Some(hint) = failure.error.hint() {
                write!(f, " ({hint})")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ReplyCode;

    #[test]
    fn summary_names_failures() {
        let report = BatchReport {
            sent: vec![PathBuf::from("a.eml"), PathBuf::from("c.eml")],
            failed: vec![FailedMessage {
                path: PathBuf::from("b.eml"),
                error: Error::Protocol {
                    phase: Phase::RcptTo,
                    expected: ReplyCode::OK,
                    actual: ReplyCode::MAILBOX_UNAVAILABLE,
                    response: "550 no such user".into(),
                },
            }],
        };

        assert!(!report.is_success());
        assert_eq!(report.total(), 3);
        let summary = report.to_string();
        assert!(summary.starts_with("2 of 3 message(s) forwarded"));
        assert!(summary.contains("b.eml"));
        assert!(summary.contains("550 no such user"));
    }

    #[test]
    fn empty_report_is_success() {
        let report = BatchReport::default();
        assert!(report.is_success());
        assert_eq!(report.to_string(), "0 of 0 message(s) forwarded");
    }
}
