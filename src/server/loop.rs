// Server loop module
// Accepts connections until shutdown is requested, then drains active ones

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::Notify;

use super::connection::{accept_connection, connection_timeout};
use crate::config;
use crate::logger;

const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Run the accept loop until `shutdown` fires
///
/// After shutdown the listener is closed and in-flight connections get up to
/// one connection timeout to finish.
pub async fn start_server_loop(
    listener: TcpListener,
    state: Arc<config::AppState>,
    active_connections: Arc<AtomicUsize>,
    shutdown: Arc<Notify>,
) -> Result<(), Box<dyn std::error::Error>> {
    loop {
        tokio::select! {
            accept_result = listener.accept() => {
                match accept_result {
                    Ok((stream, peer_addr)) => {
                        accept_connection(stream, peer_addr, &state, &active_connections);
                    }
                    Err(e) => {
                        logger::log_error(&format!("Failed to accept connection: {e}"));
                    }
                }
            }

            () = shutdown.notified() => break,
        }
    }

    drop(listener);
    logger::log_shutdown(active_connections.load(Ordering::SeqCst));

    let deadline = tokio::time::Instant::now() + connection_timeout(&state.config.performance);
    drain_connections(&active_connections, deadline).await;
    Ok(())
}

/// Wait until no connection is active or the deadline passes
async fn drain_connections(active_connections: &AtomicUsize, deadline: tokio::time::Instant) {
    while active_connections.load(Ordering::SeqCst) > 0 {
        if tokio::time::Instant::now() >= deadline {
            logger::log_warning(&format!(
                "Shutdown deadline reached with {} connection(s) still active",
                active_connections.load(Ordering::SeqCst)
            ));
            return;
        }
        tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
    }
}
