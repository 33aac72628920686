//! HTTP protocol layer module
//!
//! Provides HTTP protocol-related base functionality, decoupled from routing logic.

pub mod negotiate;
pub mod response;

// Re-export commonly used types
pub use response::{
    build_405_response, build_413_response, build_error_response, build_health_response,
    build_image_response, build_json_response, build_options_response, without_body,
};
