#![warn(missing_docs)]

//! Coupon check CLI: build the quorum index from 2-3 lists and validate codes

mod cli;

use anyhow::Result;
use clap::Parser;
use cli::Cli;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.resolve_config()?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    tracing::info!(
        sources = config.sources.len(),
        cache_capacity = config.cache_capacity,
        "coupon-check starting"
    );

    cli.run(config).await
}
