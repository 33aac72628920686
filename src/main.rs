use std::sync::atomic::AtomicUsize;
use std::sync::Arc;

mod config;
mod error;
mod handler;
mod http;
mod logger;
mod nodes;
mod remote;
mod router;
mod server;
mod telemetry;

use crate::nodes::NodeRegistry;
use crate::remote::http::build_client;
use crate::remote::{HttpWorkerClient, RemoteHandle, WorkerClient};
use crate::router::Router;
use crate::server::{create_reusable_listener, start_server_loop, start_signal_handler, SignalHandler};
use crate::telemetry::{HttpTelemetry, LogTelemetry, TelemetrySink};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // First argument is the config file path without extension
    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config".to_string());
    let cfg = config::Config::load_from(&config_path)?;
    logger::init(&cfg)?;

    let mut runtime_builder = tokio::runtime::Builder::new_multi_thread();
    runtime_builder.enable_all();

    if let Some(workers) = cfg.server.workers {
        runtime_builder.worker_threads(workers);
        logger::log_config(&format!("Using {workers} worker threads"));
    } else {
        logger::log_config("Using default worker threads (CPU cores)");
    }

    let runtime = runtime_builder.build()?;
    runtime.block_on(async_main(cfg))
}

async fn async_main(cfg: config::Config) -> Result<(), Box<dyn std::error::Error>> {
    let addr = cfg.get_socket_addr()?;
    let listener = create_reusable_listener(addr)?;

    // One connection pool for worker calls and telemetry delivery
    let client = build_client();
    let workers: Arc<dyn WorkerClient> =
        Arc::new(HttpWorkerClient::with_client(client.clone(), cfg.workers.clone()));
    let telemetry: Arc<dyn TelemetrySink> = match cfg.telemetry.endpoint {
        Some(ref endpoint) => Arc::new(HttpTelemetry::new(client, endpoint)),
        None => Arc::new(LogTelemetry),
    };

    let router = Router::new(NodeRegistry::builtin(), workers, telemetry);
    logger::log_server_start(&addr, &cfg, RemoteHandle::ALL.len(), router.nodes().len());

    let state = Arc::new(config::AppState::new(&cfg, router));
    let active_connections = Arc::new(AtomicUsize::new(0));

    let signals = Arc::new(SignalHandler::new());
    start_signal_handler(Arc::clone(&signals))?;

    // Connections are served with spawn_local
    let local = tokio::task::LocalSet::new();
    local
        .run_until(start_server_loop(
            listener,
            state,
            active_connections,
            Arc::clone(&signals.shutdown),
        ))
        .await
}
