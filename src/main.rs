mod aggregator;
mod buffer;
mod config;
mod ingest_listener;
mod publisher;
mod record;

#[cfg(test)]
mod testing;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use aggregator::{Aggregator, FlushOutcome, run_timer};
use publisher::EventApiPublisher;

/// Exceptional init failure — log and exit.
fn fatal(msg: &str, error: &dyn std::fmt::Display) -> ! {
    error!(%error, "{msg}");
    std::process::exit(1);
}

fn setup_logging() {
    use tracing_subscriber::filter::LevelFilter;
    use tracing_subscriber::prelude::*;

    let level = std::env::var("PACKET_RELAY_LOG_LEVEL")
        .ok()
        .and_then(|val| {
            val.parse::<LevelFilter>().ok().or_else(|| {
                eprintln!("invalid PACKET_RELAY_LOG_LEVEL: {val:?}, defaulting to INFO");
                None
            })
        })
        .unwrap_or(LevelFilter::INFO);

    tracing_subscriber::registry()
        .with(level)
        .with(tracing_microjson::JsonLayer::new(std::io::stderr).with_target(true))
        .init();
}

fn setup_rustls() {
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("failed to install rustls ring provider");
}

#[tokio::main]
async fn main() {
    setup_logging();
    setup_rustls();

    let config = config::Config::from_env().unwrap_or_else(|e| fatal("config error", &e));

    let publisher = EventApiPublisher::new(&config);
    let aggregator = Arc::new(Aggregator::new(publisher, &config));

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.listen_port))
        .await
        .unwrap_or_else(|e| fatal("failed to bind ingest listener", &e));

    info!(
        port = config.listen_port,
        endpoint = %config.endpoint,
        app_id = %config.app_id,
        flush_interval_ms = config.flush_interval.as_millis() as u64,
        "packet relay listening"
    );

    let cancel = CancellationToken::new();
    let serve_task = tokio::spawn(ingest_listener::serve(
        listener,
        Arc::clone(&aggregator),
        cancel.clone(),
    ));
    let timer_task = tokio::spawn(run_timer(Arc::clone(&aggregator), cancel.clone()));

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown signal received"),
        Err(e) => error!(%e, "failed to listen for shutdown signal"),
    }

    cancel.cancel();
    let _ = tokio::join!(serve_task, timer_task);

    // Both tasks are down; one last drain so buffered records aren't lost.
    if let FlushOutcome::Failed { dropped } = aggregator.on_shutdown().await {
        warn!(records = dropped, "final flush failed, records lost");
    }
}
