mod collector;
mod config;
mod error;
mod http;
mod kafka;
mod metrics;
mod publish;
mod scheduler;
#[cfg(test)]
mod test_strategies;
#[cfg(test)]
mod testing;

use crate::config::Config;
use crate::http::server::HttpServer;
use crate::kafka::client::KafkaClient;
use crate::metrics::registry::MetricsRegistry;
use crate::publish::json_lines::JsonLinesSink;
use crate::publish::{EventSink, FanoutSink};
use crate::scheduler::{Scheduler, resolve_targets};
use clap::Parser;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "kafkabeat")]
#[command(about = "Periodically samples Kafka log sizes and consumer group offsets")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "kafkabeat.toml")]
    config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level);

    info!("Starting kafkabeat");

    let config = Config::load(&args.config)?;
    info!(
        bootstrap_servers = %config.beat.bootstrap_servers,
        period = ?config.beat.period,
        "Configuration loaded"
    );

    let client = Arc::new(KafkaClient::new(&config.beat)?);
    let targets = resolve_targets(&config.beat, &*client, &*client).await?;

    let registry = Arc::new(MetricsRegistry::new());
    let mut sinks: Vec<Arc<dyn EventSink>> = Vec::new();
    if config.output.stdout {
        sinks.push(Arc::new(JsonLinesSink::stdout()));
    }
    if config.http.enabled {
        sinks.push(Arc::clone(&registry) as Arc<dyn EventSink>);
    }
    let fanout = FanoutSink::new(sinks);
    if fanout.is_empty() {
        warn!("No output enabled, events will be discarded");
    }
    info!(sinks = fanout.len(), "Event sinks configured");

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let server_handle = if config.http.enabled {
        let http_server = HttpServer::new(&config.http.host, config.http.port, Arc::clone(&registry))?;
        let shutdown_rx = shutdown_tx.subscribe();
        Some(tokio::spawn(async move {
            if let Err(e) = http_server.run(shutdown_rx).await {
                error!(error = %e, "HTTP server error");
            }
        }))
    } else {
        None
    };

    let scheduler = Scheduler::new(Arc::clone(&client), Arc::new(fanout), targets, &config.beat);
    let scheduler_handle = tokio::spawn(scheduler.run(shutdown_tx.subscribe()));

    shutdown_signal().await;
    info!("Shutdown signal received, stopping...");

    let _ = shutdown_tx.send(());

    if let Some(handle) = server_handle {
        let _ = handle.await;
    }

    // In-flight broker calls finish on their own; bound the wait on them.
    let shutdown_timeout = tokio::time::timeout(
        config.beat.kafka_timeout + config.beat.period,
        scheduler_handle,
    );

    match shutdown_timeout.await {
        Ok(_) => info!("Scheduler stopped"),
        Err(_) => error!("Timeout waiting for scheduler to stop"),
    }

    info!("kafkabeat stopped");
    Ok(())
}

fn init_logging(level: &str) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // stdout carries the JSON event stream
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
