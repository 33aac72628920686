//! Logger module
//!
//! Provides logging utilities for the router including:
//! - Server lifecycle logging
//! - Access logging with multiple formats
//! - Dispatch, telemetry and error logging
//! - File-based logging support

mod format;
pub mod writer;

pub use format::AccessLogEntry;
pub use writer::Level;

use crate::config::Config;
use std::net::SocketAddr;

/// Initialize the logger with configuration
///
/// Should be called once at application startup.
pub fn init(config: &Config) -> std::io::Result<()> {
    writer::init(
        &config.logging.level,
        config.logging.access_log_file.as_deref(),
        config.logging.error_log_file.as_deref(),
    )
}

/// Write to info/access log
fn write_info(level: Level, message: &str) {
    match writer::get() {
        Some(w) => w.write_info(level, message),
        None => println!("{message}"),
    }
}

/// Write to error log
fn write_error(level: Level, message: &str) {
    match writer::get() {
        Some(w) => w.write_error(level, message),
        None => eprintln!("{message}"),
    }
}

/// Write to access log specifically
fn write_access(message: &str) {
    match writer::get() {
        Some(w) => w.write_access(message),
        None => println!("{message}"),
    }
}

pub fn log_server_start(addr: &SocketAddr, config: &Config, handles: usize, nodes: usize) {
    write_info(Level::Info, "======================================");
    write_info(Level::Info, "Model router started successfully");
    write_info(Level::Info, &format!("Listening on: http://{addr}"));
    write_info(Level::Info, &format!("Log level: {}", config.logging.level));
    if let Some(workers) = config.server.workers {
        write_info(Level::Info, &format!("Worker threads: {workers}"));
    }
    write_info(
        Level::Info,
        &format!("Remote handles: {handles}, public nodes: {nodes}"),
    );
    write_info(
        Level::Info,
        &format!("Worker base URL: {}", config.workers.base_url),
    );
    match config.telemetry.endpoint {
        Some(ref endpoint) => write_info(Level::Info, &format!("Telemetry: {endpoint}")),
        None => write_info(Level::Info, "Telemetry: error log"),
    }
    if let Some(ref path) = config.logging.access_log_file {
        write_info(Level::Info, &format!("Access log: {path}"));
    }
    if let Some(ref path) = config.logging.error_log_file {
        write_info(Level::Info, &format!("Error log: {path}"));
    }
    write_info(Level::Info, "======================================\n");
}

pub fn log_config(message: &str) {
    write_info(Level::Info, &format!("[CONFIG] {message}"));
}

pub fn log_connection_accepted(peer_addr: &SocketAddr) {
    write_info(Level::Debug, &format!("[Connection] Accepted from: {peer_addr}"));
}

pub fn log_connection_error(err: &impl std::fmt::Debug) {
    write_error(
        Level::Error,
        &format!("[ERROR] Failed to serve connection: {err:?}"),
    );
}

pub fn log_error(message: &str) {
    write_error(Level::Error, &format!("[ERROR] {message}"));
}

pub fn log_warning(message: &str) {
    write_error(Level::Warn, &format!("[WARN] {message}"));
}

pub fn log_debug(message: &str) {
    write_info(Level::Debug, &format!("[DEBUG] {message}"));
}

/// Log which handler a model id resolved to
pub fn log_dispatch(model_id: &str, target: &str) {
    write_info(Level::Debug, &format!("[Dispatch] {model_id} -> {target}"));
}

/// Log a handler failure with its full detail (never sent to the caller)
pub fn log_handler_fault(model_id: &str, detail: &str) {
    write_error(
        Level::Error,
        &format!("[Handler] {model_id} failed: {detail}"),
    );
}

/// Log an error report that had no remote collector
pub fn log_telemetry_report(report: &str) {
    write_error(Level::Warn, &format!("[Telemetry] {report}"));
}

pub fn log_telemetry_failure(message: &str) {
    write_error(
        Level::Warn,
        &format!("[Telemetry] Failed to deliver report: {message}"),
    );
}

/// Log formatted access log entry
pub fn log_access(entry: &AccessLogEntry, format: &str) {
    write_access(&entry.format(format));
}

pub fn log_shutdown(active_connections: usize) {
    write_info(
        Level::Info,
        &format!("[Shutdown] Listener closed, {active_connections} connection(s) still active"),
    );
}
