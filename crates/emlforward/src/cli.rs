//! Command line arguments and input discovery.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use clap::builder::BoolishValueParser;
use emlforward_smtp::{Address, ForwardConfig};

/// Forward exported EML messages to a new recipient over SMTP.
#[derive(Parser)]
#[command(name = "emlforward", version, about, long_about = None)]
pub struct Cli {
    /// An .eml file, or a directory containing .eml files
    pub path: PathBuf,

    /// Destination address
    #[arg(long, value_name = "ADDRESS")]
    pub to: String,

    /// SMTP server hostname
    #[arg(long, env = "SMTP_HOST")]
    pub host: Option<String>,

    /// SMTP server port [default: 465 with --implicit-tls, otherwise 587]
    #[arg(long, env = "SMTP_PORT")]
    pub port: Option<u16>,

    /// Login name
    #[arg(long, env = "SMTP_USERNAME")]
    pub username: Option<String>,

    /// Password
    #[arg(long, env = "SMTP_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Use TLS from the first byte instead of STARTTLS
    #[arg(long, env = "SMTP_IMPLICIT_TLS", value_parser = BoolishValueParser::new())]
    pub implicit_tls: bool,

    /// Name announced in EHLO
    #[arg(long, value_name = "NAME", default_value = "localhost")]
    pub helo_name: String,

    /// Pause between two messages
    #[arg(long, value_name = "SECONDS", default_value_t = 2)]
    pub delay_secs: u64,

    /// Per-reply timeout
    #[arg(long, value_name = "SECONDS")]
    pub timeout_secs: Option<u64>,

    /// Log protocol details
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Builds the forwarding configuration from arguments and environment.
    pub fn forward_config(&self) -> emlforward_smtp::Result<ForwardConfig> {
        let mut builder = ForwardConfig::builder()
            .implicit_tls(self.implicit_tls)
            .helo_name(&self.helo_name)
            .message_delay(Duration::from_secs(self.delay_secs));

        if let Some(host) = &self.host {
            builder = builder.host(host);
        }
        if let Some(port) = self.port {
            builder = builder.port(port);
        }
        if let Some(username) = &self.username {
            builder = builder.username(username);
        }
        if let Some(password) = &self.password {
            builder = builder.password(password);
        }
        if let Some(secs) = self.timeout_secs {
            builder = builder.reply_timeout(Duration::from_secs(secs));
        }

        builder.build()
    }

    /// Parses `--to`.
    pub fn recipient(&self) -> emlforward_smtp::Result<Address> {
        Address::new(self.to.trim())
    }

    /// Log filter used when `RUST_LOG` is not set.
    pub const fn default_filter(&self) -> &'static str {
        if self.verbose {
            "emlforward=debug,emlforward_smtp=debug"
        } else {
            "emlforward=info,emlforward_smtp=info"
        }
    }
}

/// Returns the messages to send.
///
/// A file is returned as is. A directory is scanned (not recursively) for
/// files with an `.eml` extension in any case, sorted by name.
pub fn collect_inputs(path: &Path) -> io::Result<Vec<PathBuf>> {
    if !std::fs::metadata(path)?.is_dir() {
        return Ok(vec![path.to_path_buf()]);
    }

    let mut files = Vec::new();
    for entry in std::fs::read_dir(path)? {
        let entry = entry?;
        let candidate = entry.path();
        if entry.file_type()?.is_file() && is_eml(&candidate) {
            files.push(candidate);
        }
    }
    files.sort();
    Ok(files)
}

fn is_eml(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("eml"))
}
