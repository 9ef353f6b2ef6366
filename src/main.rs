//! kv-guard service entry point.
//!
//! # Architecture Overview
//!
//! ```text
//!     Callers (rate limiter, cache, sessions)
//!         │
//!         ▼
//!   ┌──────────────────┐     ┌─────────────────┐     ┌──────────────┐
//!   │ ResilientClient  │────▶│ CircuitBreaker  │────▶│ RedisBackend │────▶ Redis
//!   │ degraded defaults│     │ closed/open/half│     │ deadlines    │
//!   └────────┬─────────┘     └─────────────────┘     └──────▲───────┘
//!            │ disabled / unreachable                        │ reconnect
//!            ▼                                               │
//!   ┌──────────────────┐                            ┌────────┴───────┐
//!   │  FallbackStore   │                            │ health monitor │
//!   └──────────────────┘                            └────────────────┘
//!
//!   Cross-cutting: config (TOML), logging (tracing), metrics (Prometheus),
//!   admin API (health, breaker, reset), lifecycle (signals, shutdown)
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use kv_guard::admin::{self, AdminState};
use kv_guard::config::load_or_default;
use kv_guard::health::StoreHealthMonitor;
use kv_guard::lifecycle::{signals, startup, Shutdown};
use kv_guard::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "kv-guard")]
#[command(about = "Circuit-breaking key-value store guard", long_about = None)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, env = "KV_GUARD_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = load_or_default(args.config.as_deref())?;

    logging::init_logging(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "kv-guard starting");
    tracing::info!(
        store_enabled = config.store.enabled,
        failure_threshold = config.breaker.failure_threshold,
        reset_timeout_ms = config.breaker.reset_timeout_ms,
        half_open_success_threshold = config.breaker.half_open_success_threshold,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let client = Arc::new(startup::build_client(&config).await);
    tracing::info!(mode = ?client.mode(), "Store client ready");

    let shutdown = Shutdown::new();
    let mut tasks = Vec::new();

    let monitor = StoreHealthMonitor::new(client.clone(), config.health_check.clone());
    tasks.push(tokio::spawn(monitor.run(shutdown.subscribe())));

    if config.admin.enabled {
        let listener = TcpListener::bind(&config.admin.bind_address).await?;
        let state = AdminState {
            client: client.clone(),
            api_key: Arc::from(config.admin.api_key.as_str()),
        };
        let rx = shutdown.subscribe();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = admin::serve(listener, state, rx).await {
                tracing::error!(error = %e, "Admin API stopped with error");
            }
        }));
    }

    signals::wait_for_signal().await;
    shutdown.trigger();
    for task in tasks {
        let _ = task.await;
    }

    tracing::info!(health = ?client.health_status(), "Shutdown complete");
    Ok(())
}
