//! IP Filter CLI.

use anyhow::Result;
use clap::Parser;
use ip_filter::engine::CACHE_CLEANUP_INTERVAL;
use ip_filter::{server, Config, IpFilter};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "ip-filter")]
#[command(about = "IP reputation filter - aggregate geolocation, blacklist and fraud-scoring providers into one verdict")]
#[command(version)]
struct Args {
    /// Path to configuration file (defaults to IP_FILTER_* environment variables)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to serve on, overrides the configuration
    #[arg(long, value_name = "ADDR")]
    listen: Option<SocketAddr>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'L', long, default_value = "info")]
    log_level: String,

    /// Print example configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Validate configuration and exit
    #[arg(long)]
    validate: bool,

    /// Assess one IP, print the verdict as JSON and exit
    #[arg(long, value_name = "IP")]
    check: Option<String>,

    /// With --check: stop at the first disqualifying signal
    #[arg(long)]
    fast: bool,

    /// With --check: include fraud-scoring providers
    #[arg(long)]
    score: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        println!("{}", Config::example());
        return Ok(());
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let mut config = match &args.config {
        Some(path) => {
            info!(config = %path.display(), "Loading configuration");
            Config::load(path)?
        }
        None => {
            info!("Loading configuration from environment");
            Config::from_env()?
        }
    };

    if let Some(listen) = args.listen {
        config.server.listen = listen.to_string();
    }

    if args.validate {
        info!("Configuration is valid");
        return Ok(());
    }

    let listen: SocketAddr = config.server.listen.parse()?;
    let ip_extraction = config.server.ip_extraction.clone();
    let ip_filter = Arc::new(IpFilter::new(config)?);

    if let Some(ip) = args.check {
        let verdict = ip_filter.validate(&ip, args.fast, args.score).await;
        println!("{}", serde_json::to_string_pretty(&verdict)?);
        return Ok(());
    }

    ip_filter.spawn_cache_cleanup(CACHE_CLEANUP_INTERVAL);
    let router = server::router(ip_filter, ip_extraction);
    server::serve(router, listen).await?;

    Ok(())
}
