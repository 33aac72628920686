//! Request handler module
//!
//! Adapts HTTP requests to the model router and its responses back to HTTP.

pub mod router;

// Re-export main entry point
pub use router::handle_request;
