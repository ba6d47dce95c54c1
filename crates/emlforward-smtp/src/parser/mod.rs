//! SMTP response parser.
//!
//! Works on the raw receive buffer so replies split across arbitrary read
//! boundaries are reassembled before parsing.

use crate::error::{Error, Result};
use crate::types::{Reply, ReplyCode};

/// Largest reply accepted before the server is considered broken.
pub const MAX_REPLY_LENGTH: usize = 64 * 1024;

/// Parses an SMTP reply from response lines.
///
/// SMTP replies can be single-line or multi-line:
/// - Single: `250 OK\r\n`
/// - Multi: `250-First line\r\n250-Second line\r\n250 Last line\r\n`
///
/// The code is taken from the final line. `raw` is kept verbatim for error
/// reporting.
///
/// # Errors
///
/// Returns an error if the reply is malformed.
pub fn parse_reply(lines: &[&str], raw: &str) -> Result<Reply> {
    let Some(last) = lines.last() else {
        return Err(Error::MalformedReply("Empty reply".into()));
    };

    let code = reply_code(last)?;

    let mut message = Vec::with_capacity(lines.len());
    for line in lines {
        reply_code(line)?;
        message.push(line_text(line).to_string());
    }

    Ok(Reply::new(code, message, raw.to_string()))
}

/// Tries to take one complete reply from the front of `buf`.
///
/// Returns the reply and the number of bytes it occupied, or `None` if more
/// data is needed. Bytes after the reply are left for the next call.
///
/// # Errors
///
/// Returns an error if a complete line is not a reply line, or if the buffer
/// grows past [`MAX_REPLY_LENGTH`] without completing a reply.
pub fn parse_buffered(buf: &[u8]) -> Result<Option<(Reply, usize)>> {
    let mut lines = Vec::new();
    let mut start = 0;

    while let Some(offset) = buf[start..].iter().position(|&b| b == b'\n') {
        let end = start + offset + 1;
        let line = String::from_utf8_lossy(&buf[start..end]);
        let line = line.trim_end_matches(['\r', '\n']).to_string();
        start = end;

        if line.is_empty() {
            continue;
        }

        let is_last = is_last_reply_line(&line);
        lines.push(line);

        if is_last {
            let raw = String::from_utf8_lossy(&buf[..end]);
            let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
            return parse_reply(&refs, raw.trim_start_matches(['\r', '\n'])).map(|r| Some((r, end)));
        }
    }

    if buf.len() > MAX_REPLY_LENGTH {
        return Err(Error::MalformedReply(format!(
            "reply exceeds {MAX_REPLY_LENGTH} bytes"
        )));
    }

    Ok(None)
}

/// Checks if a line is the last line of a multi-line reply.
///
/// Continuation lines carry `-` after the code. Anything else ends the
/// reply: a space, text directly after the code, or nothing at all.
#[must_use]
pub fn is_last_reply_line(line: &str) -> bool {
    line.len() >= 3 && line.as_bytes().get(3) != Some(&b'-')
}

fn reply_code(line: &str) -> Result<ReplyCode> {
    let digits = line.as_bytes().get(..3).filter(|d| d.iter().all(u8::is_ascii_digit));
    let Some(digits) = digits else {
        return Err(Error::MalformedReply(format!("Malformed reply line: {line}")));
    };

    let code = digits
        .iter()
        .fold(0u16, |acc, d| acc * 10 + u16::from(d - b'0'));
    Ok(ReplyCode::new(code))
}

fn line_text(line: &str) -> &str {
    match line.as_bytes().get(3) {
        Some(b'-' | b' ') => &line[4..],
        Some(_) => &line[3..],
        None => "",
    }
}
