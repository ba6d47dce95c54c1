//! Forwarding configuration types.

use std::time::Duration;

use crate::error::{Error, Result};

/// Where to submit mail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerEndpoint {
    /// Server hostname, also used for certificate validation.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// TLS from the first byte (port 465) instead of STARTTLS.
    pub implicit_tls: bool,
}

impl ServerEndpoint {
    /// Creates a new endpoint.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16, implicit_tls: bool) -> Self {
        Self {
            host: host.into(),
            port,
            implicit_tls,
        }
    }

    /// Returns the conventional submission port for the TLS mode.
    #[must_use]
    pub const fn default_port(implicit_tls: bool) -> u16 {
        if implicit_tls { 465 } else { 587 }
    }
}

/// AUTH LOGIN credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Login name; also the fallback envelope sender.
    pub username: String,
    /// Password. Never printed.
    pub password: String,
}

impl Credentials {
    /// Creates a new credential pair.
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Complete forwarding configuration.
#[derive(Debug, Clone)]
pub struct ForwardConfig {
    /// Server to submit to.
    pub endpoint: ServerEndpoint,
    /// AUTH LOGIN credentials.
    pub credentials: Credentials,
    /// Name announced in EHLO.
    pub helo_name: String,
    /// Dial and implicit TLS handshake timeout.
    pub connect_timeout: Duration,
    /// Per-reply timeout for every phase except the final DATA reply.
    pub reply_timeout: Duration,
    /// Timeout for writing the payload and reading the final DATA reply.
    pub data_timeout: Duration,
    /// Pause between two messages of a batch.
    pub message_delay: Duration,
}

impl ForwardConfig {
    /// Creates a configuration builder.
    #[must_use]
    pub fn builder() -> ForwardConfigBuilder {
        ForwardConfigBuilder::default()
    }

    /// Checks that host, username and password are present.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] naming every missing field.
    pub fn validate(&self) -> Result<()> {
        let missing: Vec<&str> = [
            ("host", self.endpoint.host.trim().is_empty()),
            ("username", self.credentials.username.is_empty()),
            ("password", self.credentials.password.is_empty()),
        ]
        .into_iter()
        .filter_map(|(name, absent)| absent.then_some(name))
        .collect();

        if !missing.is_empty() {
            return Err(Error::Configuration(format!(
                "missing required setting(s): {}",
                missing.join(", ")
            )));
        }

        if self.helo_name.trim().is_empty() || self.helo_name.contains(['\r', '\n', ' ']) {
            return Err(Error::Configuration(format!(
                "invalid EHLO name: {:?}",
                self.helo_name
            )));
        }

        Ok(())
    }
}

/// Builder for [`ForwardConfig`].
#[derive(Debug, Clone)]
pub struct ForwardConfigBuilder {
    host: Option<String>,
    port: Option<u16>,
    implicit_tls: bool,
    username: Option<String>,
    password: Option<String>,
    helo_name: String,
    connect_timeout: Duration,
    reply_timeout: Duration,
    data_timeout: Duration,
    message_delay: Duration,
}

impl Default for ForwardConfigBuilder {
    fn default() -> Self {
        Self {
            host: None,
            port: None,
            implicit_tls: false,
            username: None,
            password: None,
            helo_name: "localhost".to_string(),
            connect_timeout: Duration::from_secs(30),
            reply_timeout: Duration::from_secs(60),
            data_timeout: Duration::from_secs(300),
            message_delay: Duration::from_secs(2),
        }
    }
}

impl ForwardConfigBuilder {
    /// Sets the server hostname.
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Sets the port. Defaults to 465 with implicit TLS, 587 otherwise.
    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Selects implicit TLS instead of STARTTLS.
    #[must_use]
    pub const fn implicit_tls(mut self, implicit_tls: bool) -> Self {
        self.implicit_tls = implicit_tls;
        self
    }

    /// Sets the login name.
    #[must_use]
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Sets the password.
    #[must_use]
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Sets the name announced in EHLO.
    #[must_use]
    pub fn helo_name(mut self, helo_name: impl Into<String>) -> Self {
        self.helo_name = helo_name.into();
        self
    }

    /// Sets the connection timeout.
    #[must_use]
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the per-reply timeout.
    #[must_use]
    pub const fn reply_timeout(mut self, timeout: Duration) -> Self {
        self.reply_timeout = timeout;
        self
    }

    /// Sets the DATA transfer timeout.
    #[must_use]
    pub const fn data_timeout(mut self, timeout: Duration) -> Self {
        self.data_timeout = timeout;
        self
    }

    /// Sets the pause between batch messages.
    #[must_use]
    pub const fn message_delay(mut self, delay: Duration) -> Self {
        self.message_delay = delay;
        self
    }

    /// Builds and validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if host, username or password is
    /// missing.
    pub fn build(self) -> Result<ForwardConfig> {
        let config = ForwardConfig {
            endpoint: ServerEndpoint {
                host: self.host.unwrap_or_default(),
                port: self
                    .port
                    .unwrap_or_else(|| ServerEndpoint::default_port(self.implicit_tls)),
                implicit_tls: self.implicit_tls,
            },
            credentials: Credentials {
                username: self.username.unwrap_or_default(),
                password: self.password.unwrap_or_default(),
            },
            helo_name: self.helo_name,
            connect_timeout: self.connect_timeout,
            reply_timeout: self.reply_timeout,
            data_timeout: self.data_timeout,
            message_delay: self.message_delay,
        };
        config.validate()?;
        Ok(config)
    }
}
