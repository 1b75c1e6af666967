//! Event processing service entry point.

use std::process::ExitCode;

use event_store::{
    EventBufferStore, EventStore, InMemoryEventBuffer, InMemoryEventStore, PostgresEventBuffer,
    PostgresEventStore, run_migrations,
};
use processor::{Config, LogFormat, Processor};
use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn run<S, B>(events: S, buffer: B, config: &Config)
where
    S: EventStore + Clone + 'static,
    B: EventBufferStore + 'static,
{
    let processor = Processor::new(events, buffer, config).expect("failed to build event router");
    processor.run_until(shutdown_signal()).await;
}

#[tokio::main]
async fn main() -> ExitCode {
    // 1. Load configuration
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {e}");
            return ExitCode::FAILURE;
        }
    };

    // 2. Initialize tracing
    init_tracing(&config);

    // 3. Install Prometheus recorder with its own listener
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(config.metrics_addr)
        .install()
        .expect("failed to install Prometheus recorder");
    tracing::info!(addr = %config.metrics_addr, "metrics listener started");

    // 4. Select backends and run until shutdown
    match &config.database_url {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(config.database_max_connections)
                .connect(url)
                .await
                .expect("failed to connect to database");
            run_migrations(&pool)
                .await
                .expect("failed to run migrations");
            tracing::info!("using PostgreSQL backends");

            run(
                PostgresEventStore::new(pool.clone()),
                PostgresEventBuffer::new(pool),
                &config,
            )
            .await;
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory backends");
            run(InMemoryEventStore::new(), InMemoryEventBuffer::new(), &config).await;
        }
    }

    tracing::info!("processor shut down gracefully");
    ExitCode::SUCCESS
}
