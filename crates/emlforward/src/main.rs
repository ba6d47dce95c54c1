//! emlforward - resubmit exported EML messages to a new recipient.
//!
//! Exit status: 0 when every message was sent, 1 when any message failed,
//! 2 when nothing could be attempted (bad configuration, no input).

mod cli;

use std::process::ExitCode;

use anyhow::{Context, bail};
use clap::Parser;
use emlforward_smtp::Forwarder;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cli::{Cli, collect_inputs};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| cli.default_filter().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match run(&cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("{e:#}");
            ExitCode::from(2)
        }
    }
}

async fn run(cli: &Cli) -> anyhow::Result<ExitCode> {
    let config = cli.forward_config().context("invalid configuration")?;
    let recipient = cli.recipient().context("invalid --to address")?;
    let paths = collect_inputs(&cli.path)
        .with_context(|| format!("cannot read {}", cli.path.display()))?;
    if paths.is_empty() {
        bail!("no .eml files found in {}", cli.path.display());
    }

    info!(
        count = paths.len(),
        %recipient,
        host = %config.endpoint.host,
        port = config.endpoint.port,
        "forwarding messages"
    );

    let forwarder = Forwarder::new(config);
    let report = forwarder.forward_files(&paths, &recipient).await;

    if report.is_success() {
        println!("{report}");
        Ok(ExitCode::SUCCESS)
    } else {
        eprintln!("{report}");
        Ok(ExitCode::FAILURE)
    }
}
