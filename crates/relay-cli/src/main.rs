//! # Relay
//!
//! Demo broker for the Relay in-process pub/sub router.
//!
//! ## Usage
//!
//! ```bash
//! # Run the demo broker with default settings
//! relay
//!
//! # Run with a custom config
//! relay --config /path/to/relay.toml
//!
//! # Guided fan-out example
//! relay walkthrough
//!
//! # Run with environment variables
//! RELAY_TOPICS=users,orders RELAY_MESSAGE_COUNT=0 relay
//! ```

mod config;
mod demo;
mod metrics;

use anyhow::{bail, Result};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Default, PartialEq, Eq)]
enum Command {
    #[default]
    Run,
    Walkthrough,
}

#[derive(Debug, Default, PartialEq, Eq)]
struct Args {
    command: Command,
    config: Option<PathBuf>,
}

impl Args {
    fn parse(args: impl IntoIterator<Item = String>) -> Result<Self> {
        let mut parsed = Args::default();
        let mut args = args.into_iter();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "run" => parsed.command = Command::Run,
                "walkthrough" => parsed.command = Command::Walkthrough,
                "-c" | "--config" => match args.next() {
                    Some(path) => parsed.config = Some(PathBuf::from(path)),
                    None => bail!("{arg} requires a path"),
                },
                other => bail!("Unknown argument: {other}"),
            }
        }

        Ok(parsed)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "relay=debug,relay_core=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse(std::env::args().skip(1))?;

    // Load configuration
    let config = config::Config::load(args.config.as_deref())?;

    // Initialize metrics
    metrics::init_metrics();

    match args.command {
        Command::Run => {
            tracing::info!(topics = ?config.demo.topics, "Starting Relay broker");
            demo::run(config).await?;
        }
        Command::Walkthrough => {
            demo::walkthrough(config).await?;
        }
    }

    Ok(())
}
