//! # REST API
//!
//! HTTP routing, the response envelope and the mapping from service errors
//! onto it.

pub mod envelope;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod server;

pub use envelope::{ApiResponse, Envelope, JsonBody};
pub use error::ApiError;
pub use routes::{build_router, ApiState};
pub use server::start_api_server;
