//! HTTP API layer for Barrier Gateway.
//!
//! Accepts proxy requests from agents and maps each exchange's outcome onto
//! an HTTP reply.

pub mod handlers;
mod routes;
mod types;

pub use routes::build_router;
