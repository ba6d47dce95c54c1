//! SMTP connection management.

mod reader;
mod session;
mod stream;
mod transport;

pub use reader::ReplyReader;
pub use session::{DATA_CHUNK_SIZE, Delivery, Session, Timeouts};
pub use stream::{SmtpStream, TcpConnector};
pub use transport::{Connector, Transport};

use crate::types::{AuthMechanism, Extension};
use std::collections::HashSet;

/// Server capabilities from EHLO response.
#[derive(Debug, Clone, Default)]
pub struct ServerInfo {
    /// Server hostname from greeting.
    pub hostname: String,
    /// Supported extensions.
    pub extensions: HashSet<Extension>,
}

impl ServerInfo {
    /// Replaces the extension set with the one advertised in an EHLO reply.
    ///
    /// The first line of the reply is the server's greeting, not an
    /// extension.
    pub fn update_from_ehlo(&mut self, lines: &[String]) {
        self.extensions = lines.iter().skip(1).map(|line| Extension::parse(line)).collect();
    }

    /// Checks if the server supports an extension.
    #[must_use]
    pub fn supports(&self, ext: &Extension) -> bool {
        self.extensions.contains(ext)
    }

    /// Checks if STARTTLS is supported.
    #[must_use]
    pub fn supports_starttls(&self) -> bool {
        self.supports(&Extension::StartTls)
    }

    /// Returns the maximum message size, if advertised.
    #[must_use]
    pub fn max_message_size(&self) -> Option<usize> {
        self.extensions.iter().find_map(|ext| match ext {
            Extension::Size(size) => *size,
            _ => None,
        })
    }

    /// Returns supported authentication mechanisms, or `None` if the server
    /// did not advertise AUTH at all.
    #[must_use]
    pub fn auth_mechanisms(&self) -> Option<&[AuthMechanism]> {
        self.extensions.iter().find_map(|ext| match ext {
            Extension::Auth(mechanisms) => Some(mechanisms.as_slice()),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ehlo(lines: &[&str]) -> ServerInfo {
        let lines: Vec<String> = lines.iter().map(ToString::to_string).collect();
        let mut info = ServerInfo::default();
        info.update_from_ehlo(&lines);
        info
    }

    #[test]
    fn greeting_line_is_not_an_extension() {
        let info = ehlo(&["STARTTLS"]);
        assert!(info.extensions.is_empty());
    }

    #[test]
    fn capabilities() {
        let info = ehlo(&["mx.example.com", "SIZE 1000", "STARTTLS", "AUTH PLAIN LOGIN"]);
        assert!(info.supports_starttls());
        assert_eq!(info.max_message_size(), Some(1000));
        assert_eq!(
            info.auth_mechanisms(),
            Some([AuthMechanism::Plain, AuthMechanism::Login].as_slice())
        );
    }

    #[test]
    fn nothing_advertised() {
        let info = ehlo(&["mx.example.com"]);
        assert!(!info.supports_starttls());
        assert_eq!(info.max_message_size(), None);
        assert_eq!(info.auth_mechanisms(), None);
    }
}
