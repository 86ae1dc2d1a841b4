//! line-lookup: an exact line lookup server
//!
//! Clients send a query string over TCP (optionally TLS) and learn whether
//! it appears as a full line of the configured dataset.
//!
//! Features:
//! - Cached mode: dataset loaded once, scans on a bounded worker pool
//! - Reread mode: dataset streamed from disk on every query
//! - Benchmark harness comparing search algorithms and end-to-end latency
//! - Configuration via CLI arguments, environment or TOML file

mod bench;
mod config;
mod dataset;
mod pool;
mod protocol;
mod search;
mod server;
mod tls;

use config::{Command, Config};
use dataset::Dataset;
use server::Server;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    // All connections share one cooperative thread; scans go to the
    // blocking pool
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    match config.command.clone() {
        Command::Serve => runtime.block_on(serve(config)),
        Command::Bench(args) => runtime.block_on(bench(config, args.into())),
    }
}

async fn serve(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    info!(
        address = %config.listen_addr(),
        dataset = %config.dataset.display(),
        reread_on_query = config.reread_on_query,
        workers = config.workers,
        tls = config.tls.is_some(),
        "Starting line-lookup server"
    );

    let dataset = Dataset::open(&config.dataset, config.reread_on_query, config.workers)?;
    let server = Server::new(&config, dataset)?;
    server.run().await?;

    info!("Server stopped");
    Ok(())
}

async fn bench(config: Config, plan: bench::BenchPlan) -> Result<(), Box<dyn std::error::Error>> {
    info!(
        dataset = %config.dataset.display(),
        bench_target = ?plan.target,
        runs = plan.runs,
        "Starting benchmark"
    );

    let mut out = std::io::stdout();
    bench::run(&plan, &config.dataset, &config.listen_addr(), &mut out).await?;
    Ok(())
}
