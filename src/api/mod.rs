//! # REST API
//!
//! Routing, middleware wiring, handlers and the HTTP error mapping.

pub mod error;
pub mod handlers;
pub mod routes;
pub mod server;

pub use error::ApiError;
pub use routes::{build_router, ApiState};
pub use server::start_api_server;
