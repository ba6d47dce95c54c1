//! Deadline-bounded reply reading.

use std::io;
use std::time::Duration;

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::Instant;
use tracing::trace;

use crate::error::{Error, Result};
use crate::parser::parse_buffered;
use crate::phase::Phase;
use crate::types::Reply;

/// Bytes requested from the socket per read.
const READ_CHUNK: usize = 4096;

/// Accumulates received bytes and carves complete replies out of them.
#[derive(Debug, Default)]
pub struct ReplyReader {
    buffer: BytesMut,
}

impl ReplyReader {
    /// Creates an empty reader.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if bytes beyond the last reply are waiting in the buffer.
    #[must_use]
    pub fn has_buffered(&self) -> bool {
        !self.buffer.is_empty()
    }

    /// Drops any buffered bytes.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Reads one complete reply, waiting at most `timeout` in total.
    ///
    /// The deadline is fixed when the call starts; every read waits only for
    /// the time that remains. Interrupted reads are retried until then.
    ///
    /// # Errors
    ///
    /// - [`Error::Timeout`] when the deadline passes first.
    /// - [`Error::Connection`] on EOF or any other read error.
    /// - [`Error::MalformedReply`] when the bytes are not an SMTP reply.
    pub async fn read_reply<S>(
        &mut self,
        stream: &mut S,
        phase: Phase,
        timeout: Duration,
    ) -> Result<Reply>
    where
        S: AsyncRead + Unpin,
    {
        let deadline = Instant::now() + timeout;

        loop {
            if let Some((reply, used)) = parse_buffered(&self.buffer)? {
                self.buffer.advance(used);
                return Ok(reply);
            }

            self.buffer.reserve(READ_CHUNK);
            match tokio::time::timeout_at(deadline, stream.read_buf(&mut self.buffer)).await {
                Err(_) => {
                    return Err(Error::Timeout {
                        phase,
                        after: timeout,
                    });
                }
                Ok(Ok(0)) => {
                    return Err(Error::connection(
                        phase,
                        io::Error::new(
                            io::ErrorKind::UnexpectedEof,
                            "server closed the connection",
                        ),
                    ));
                }
                Ok(Ok(n)) => trace!(%phase, bytes = n, "received"),
                Ok(Err(e)) if e.kind() == io::ErrorKind::Interrupted => {
                    trace!(%phase, "read interrupted, retrying");
                }
                Ok(Err(e)) => return Err(Error::connection(phase, e)),
            }
        }
    }
}
