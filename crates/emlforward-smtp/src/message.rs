//! Preparing an exported message for resubmission.
//!
//! The message is treated as opaque bytes. Only the header block (everything
//! before the first empty line) is inspected: `From:` to pick the envelope
//! sender, `To:` to point the message at its new recipient.

use crate::error::{Error, Result};
use crate::types::{Address, Mailbox};

/// Envelope addresses for one transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// `MAIL FROM` address.
    pub sender: Address,
    /// `RCPT TO` address.
    pub recipient: Address,
}

/// A message ready for the DATA phase.
#[derive(Debug, Clone)]
pub struct OutgoingMessage {
    /// Envelope addresses.
    pub envelope: Envelope,
    /// Wire payload: CRLF line endings, dot-stuffed, terminated by `.` CRLF.
    pub payload: Vec<u8>,
}

impl OutgoingMessage {
    /// Rewrites the recipient header and builds the DATA payload.
    ///
    /// Line endings are normalized to CRLF first, so header lookups see the
    /// same lines the server will. The sender comes from the `From:` header.
    /// If none can be extracted, `fallback_sender` (the login name) is used
    /// instead. Bytes are never decoded: 8-bit bodies pass through as is.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if there is no `From:` address and
    /// the fallback is not a valid address either.
    pub fn prepare(raw: &[u8], recipient: Address, fallback_sender: &str) -> Result<Self> {
        let normalized = normalize_line_endings(raw);
        let sender = match sender_address(&normalized) {
            Some(sender) => sender,
            None => Address::new(fallback_sender).map_err(|_| {
                Error::Configuration(format!(
                    "message has no usable From: address and username {fallback_sender:?} \
                     is not an email address"
                ))
            })?,
        };

        let rewritten = replace_recipient(&normalized, &recipient);
        Ok(Self {
            envelope: Envelope { sender, recipient },
            payload: prepare_payload(&rewritten),
        })
    }
}

/// Returns the address from the first `From:` header, if there is one.
#[must_use]
pub fn sender_address(raw: &[u8]) -> Option<Address> {
    let mut lines = header_lines(raw).peekable();
    while let Some(line) = lines.next() {
        let Some(value) = header_value(line, "from") else {
            continue;
        };

        let mut value = String::from_utf8_lossy(value).into_owned();
        while let Some(next) = lines.next_if(|l| is_continuation(l)) {
            value.push(' ');
            value.push_str(String::from_utf8_lossy(next).trim());
        }
        return Mailbox::parse_header(&value).map(|mailbox| mailbox.address);
    }
    None
}

/// Replaces the first `To:` header with `To: <recipient>`.
///
/// Continuation lines of a folded `To:` header are dropped with it. Other
/// headers and the body are copied byte for byte. If the header block has no
/// `To:` header, one is added at the top.
#[must_use]
pub fn replace_recipient(raw: &[u8], recipient: &Address) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len() + recipient.as_str().len() + 6);
    let mut in_headers = true;
    let mut replaced = false;
    let mut skipping_fold = false;

    for line in raw.split_inclusive(|&b| b == b'\n') {
        let content = trim_line_end(line);
        if content.is_empty() {
            in_headers = false;
        }

        if in_headers {
            if skipping_fold && is_continuation(content) {
                continue;
            }
            skipping_fold = false;

            if !replaced && header_value(content, "to").is_some() {
                out.extend_from_slice(b"To: ");
                out.extend_from_slice(recipient.as_str().as_bytes());
                out.extend_from_slice(&line[content.len()..]);
                replaced = true;
                skipping_fold = true;
                continue;
            }
        }

        out.extend_from_slice(line);
    }

    if !replaced {
        let mut with_to = format!("To: {recipient}\r\n").into_bytes();
        with_to.append(&mut out);
        return with_to;
    }

    out
}

/// Builds the DATA payload.
///
/// 1. Every line ending (CRLF, bare LF, bare CR) becomes CRLF.
/// 2. Every line starting with `.` gets another `.`, including a line that
///    is exactly `.`.
/// 3. The payload ends with CRLF followed by `.` CRLF.
#[must_use]
pub fn prepare_payload(message: &[u8]) -> Vec<u8> {
    let normalized = normalize_line_endings(message);
    let mut payload = Vec::with_capacity(normalized.len() + normalized.len() / 64 + 5);

    for line in normalized.split_inclusive(|&b| b == b'\n') {
        if line.first() == Some(&b'.') {
            payload.push(b'.');
        }
        payload.extend_from_slice(line);
    }

    if !payload.ends_with(b"\r\n") {
        payload.extend_from_slice(b"\r\n");
    }
    payload.extend_from_slice(b".\r\n");
    payload
}

/// Converts CRLF, bare LF and bare CR line endings to CRLF.
#[must_use]
pub fn normalize_line_endings(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + data.len() / 32);
    let mut bytes = data.iter().copied().peekable();
    while let Some(b) = bytes.next() {
        match b {
            b'\r' => {
                bytes.next_if_eq(&b'\n');
                out.extend_from_slice(b"\r\n");
            }
            b'\n' => out.extend_from_slice(b"\r\n"),
            b => out.push(b),
        }
    }
    out
}

fn header_lines(raw: &[u8]) -> impl Iterator<Item = &[u8]> {
    raw.split(|&b| b == b'\n')
        .map(trim_line_end)
        .take_while(|line| !line.is_empty())
}

/// Returns the value of `line` if it is a `name:` header (case-insensitive).
fn header_value<'a>(line: &'a [u8], name: &str) -> Option<&'a [u8]> {
    let colon = line.iter().position(|&b| b == b':')?;
    line[..colon]
        .eq_ignore_ascii_case(name.as_bytes())
        .then_some(&line[colon + 1..])
}

fn trim_line_end(line: &[u8]) -> &[u8] {
    let end = line
        .iter()
        .rposition(|&b| b != b'\r' && b != b'\n')
        .map_or(0, |last| last + 1);
    &line[..end]
}

fn is_continuation(line: &[u8]) -> bool {
    matches!(line.first(), Some(b' ' | b'\t'))
}
