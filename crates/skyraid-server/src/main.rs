use tracing_subscriber::EnvFilter;

use skyraid_server::config::ServerConfig;
use skyraid_server::{build_server, spawn_event_logger};

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json")) {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let config = ServerConfig::load();
    if let Err(e) = config.validate() {
        tracing::error!("{e}");
        std::process::exit(1);
    }

    tracing::info!(
        tick_rate_ms = config.sim.tick_rate_ms,
        max_players = config.sim.room.max_players,
        "Skyraid server starting"
    );

    let server = build_server(config);
    let reaper = server.registry.spawn_reaper();
    let events = spawn_event_logger(server.events);

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }

    tracing::info!("Shutting down");
    reaper.abort();
    server.registry.shutdown().await;
    events.abort();
}
