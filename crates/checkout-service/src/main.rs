//! Main entry point for the token-checkout service.
//!
//! Loads configuration, initializes logging, assembles the engine, and
//! runs the reconciliation worker until interrupted.

use checkout_config::Config;
use checkout_service::CheckoutEngine;
use clap::Parser;
use std::path::PathBuf;

/// Command-line arguments for the checkout service.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
	/// Path to configuration file
	#[arg(short, long, default_value = "config/checkout.toml")]
	config: PathBuf,

	/// Log level (trace, debug, info, warn, error)
	#[arg(short, long, default_value = "info")]
	log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	use tracing_subscriber::{fmt, EnvFilter};
	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
	fmt().with_env_filter(env_filter).init();

	let config = Config::from_file(&args.config)?;
	tracing::info!(config = %args.config.display(), "configuration loaded");

	let engine = CheckoutEngine::from_config(config).await?;
	engine.run().await?;

	tracing::info!("checkout service stopped");
	Ok(())
}
