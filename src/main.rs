use std::error::Error;
use std::sync::Arc;

use tokio::net::TcpListener;

pub mod config;
use config::app_config::{load_config, setup_resolver};
pub mod meter;
use meter::probe::ConcurrencyProber;
pub mod orchestrator;
use orchestrator::{BoundedQueryHandler, ProbeOrchestrator};
pub mod resolver;
pub mod server;

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for Ctrl+C: {e}");
        std::future::pending::<()>().await;
    }
}

async fn run() -> Result<(), Box<dyn Error>> {
    let app_config = load_config()?;
    let config = app_config.config;

    log::info!(
        "Request timeout {}ms, throttle multiplier {}, minimal margin {}ms",
        config.request_timeout_ms,
        config.throttle_multiplier,
        config.throttle_minimal_margin_ms
    );

    let resolver = setup_resolver(&config)?;
    let prober = ConcurrencyProber::http(
        config.request_timeout(),
        config.throttle_multiplier,
        config.throttle_minimal_margin(),
    )?;
    let orchestrator = Arc::new(ProbeOrchestrator::new(prober, resolver));
    let queries = BoundedQueryHandler::new(orchestrator, config.response_budget());

    let addr = config.socket_addr()?;
    let listener = TcpListener::bind(addr).await?;
    log::info!(
        "Listening on http://{addr}/sites with a {}ms response budget (config: {})",
        queries.budget().as_millis(),
        app_config.config_file
    );

    server::serve(listener, queries, shutdown_signal()).await;
    Ok(())
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run().await {
        log::error!("{}", meter::report(e.as_ref()));
        std::process::exit(1);
    }
}
