// Application state module
// Holds the loaded configuration and the request router shared by all connections

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use super::types::Config;
use crate::router::Router;

/// Application state
pub struct AppState {
    pub config: Config,
    pub router: Router,

    // Cached config values for fast access without locks
    pub cached_access_log: Arc<AtomicBool>,
}

impl AppState {
    pub fn new(config: &Config, router: Router) -> Self {
        Self {
            config: config.clone(),
            router,
            cached_access_log: Arc::new(AtomicBool::new(config.logging.access_log)),
        }
    }
}
