//! Batch forwarding tests: one connection per file, failures recorded and
//! skipped.

#![allow(clippy::unwrap_used)]

mod common;

use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_test::io::Builder;

use emlforward_smtp::{Address, Error, Forwarder, Phase, SessionObserver};

use common::{Recorder, ScriptedConnector, ScriptedStream, Seen};

fn message(n: usize) -> String {
    format!("From: sender{n}@x.com\nTo: old@x.com\nSubject: message {n}\n\nbody {n}\n")
}

fn payload(n: usize) -> Vec<u8> {
    format!(
        "From: sender{n}@x.com\r\nTo: new@y.com\r\nSubject: message {n}\r\n\r\nbody {n}\r\n.\r\n"
    )
    .into_bytes()
}

fn write_messages(dir: &tempfile::TempDir, count: usize) -> Vec<PathBuf> {
    (1..=count)
        .map(|n| {
            let path = dir.path().join(format!("{n}.eml"));
            std::fs::write(&path, message(n)).unwrap();
            path
        })
        .collect()
}

fn rejected_at_rcpt(n: usize) -> ScriptedStream {
    let mut script = Builder::new();
    common::greet(&mut script, &["AUTH LOGIN"]);
    common::login(&mut script);
    script
        .write(format!("MAIL FROM:<sender{n}@x.com>\r\n").as_bytes())
        .read(b"250 2.1.0 Ok\r\n")
        .write(b"RCPT TO:<new@y.com>\r\n")
        .read(b"550 5.1.1 <new@y.com>: mailbox unavailable\r\n");
    ScriptedStream::implicit_tls(&mut script)
}

#[tokio::test(start_paused = true)]
async fn failed_message_does_not_stop_the_batch() {
    let dir = tempfile::tempdir().unwrap();
    let paths = write_messages(&dir, 3);

    let connector = ScriptedConnector::new([
        common::implicit_tls_delivery("sender1@x.com", "new@y.com", &payload(1)),
        rejected_at_rcpt(2),
        common::implicit_tls_delivery("sender3@x.com", "new@y.com", &payload(3)),
    ]);
    let mut config = common::config();
    config.message_delay = Duration::from_secs(2);
    let recorder = Arc::new(Recorder::default());
    let observer: Arc<dyn SessionObserver> = recorder.clone();
    let forwarder = Forwarder::with_connector(connector, config).with_observer(observer);

    let started = tokio::time::Instant::now();
    let report = forwarder
        .forward_files(&paths, &Address::new("new@y.com").unwrap())
        .await;

    assert_eq!(report.sent, vec![paths[0].clone(), paths[2].clone()]);
    assert_eq!(report.failed.len(), 1);
    let failure = &report.failed[0];
    assert_eq!(failure.path, paths[1]);
    assert!(matches!(
        failure.error,
        Error::Protocol {
            phase: Phase::RcptTo,
            ..
        }
    ));
    assert!(!report.is_success());
    assert!(report.to_string().contains("2.eml"));
    assert!(report.to_string().contains("mailbox unavailable"));

    // Two pauses between three messages.
    assert!(started.elapsed() >= Duration::from_secs(4));
    let completed = recorder
        .events()
        .iter()
        .filter(|seen| **seen == Seen::Completed)
        .count();
    assert_eq!(completed, 2);
}

#[tokio::test]
async fn unreadable_file_is_reported_without_dialing() {
    let dir = tempfile::tempdir().unwrap();
    let mut paths = write_messages(&dir, 1);
    paths.insert(0, dir.path().join("missing.eml"));

    let forwarder = Forwarder::with_connector(
        ScriptedConnector::new([common::implicit_tls_delivery(
            "sender1@x.com",
            "new@y.com",
            &payload(1),
        )]),
        common::config(),
    );

    let report = forwarder
        .forward_files(&paths, &Address::new("new@y.com").unwrap())
        .await;

    assert_eq!(report.sent, vec![paths[1].clone()]);
    assert_eq!(report.failed.len(), 1);
    assert!(matches!(
        &report.failed[0].error,
        Error::ReadMessage { path, .. } if path.ends_with("missing.eml")
    ));
}

#[tokio::test]
async fn empty_batch() {
    let forwarder = Forwarder::with_connector(ScriptedConnector::default(), common::config());
    let report = forwarder
        .forward_files(&[], &Address::new("new@y.com").unwrap())
        .await;

    assert!(report.is_success());
    assert_eq!(report.total(), 0);
}

#[tokio::test]
async fn eight_bit_file_is_sent_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("latin1.eml");
    std::fs::write(
        &path,
        b"From: a@x.com\nTo: old@x.com\nContent-Type: text/plain; charset=iso-8859-1\n\ncaf\xE9\n",
    )
    .unwrap();
    let payload: &[u8] = b"From: a@x.com\r\nTo: new@y.com\r\n\
        Content-Type: text/plain; charset=iso-8859-1\r\n\r\ncaf\xE9\r\n.\r\n";

    let forwarder = Forwarder::with_connector(
        ScriptedConnector::new([common::implicit_tls_delivery("a@x.com", "new@y.com", payload)]),
        common::config(),
    );
    let report = forwarder
        .forward_files(&[path.clone()], &Address::new("new@y.com").unwrap())
        .await;

    assert_eq!(report.sent, vec![path]);
    assert!(report.is_success());
}

/// Log output collected in memory.
#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl io::Write for Captured {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn each_failure_is_logged_once() {
    let captured = Captured::default();
    let writer = captured.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::WARN)
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let dir = tempfile::tempdir().unwrap();
    let mut paths = write_messages(&dir, 1);
    paths.insert(0, dir.path().join("missing.eml"));

    let forwarder =
        Forwarder::with_connector(ScriptedConnector::new([rejected_at_rcpt(1)]), common::config());
    let report = forwarder
        .forward_files(&paths, &Address::new("new@y.com").unwrap())
        .await;
    assert_eq!(report.failed.len(), 2);

    let output = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
    let warnings: Vec<&str> = output.lines().filter(|line| line.contains("WARN")).collect();
    assert_eq!(warnings.len(), 2, "{output}");
    assert!(warnings[0].contains("missing.eml"));
    assert!(warnings[1].contains("session failed"));
}
