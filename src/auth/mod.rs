//! Ingress authentication for Barrier Gateway.
//!
//! Agents present an API key; the resolved client id is carried into the
//! decision record of every exchange they start.

mod api_key;
mod middleware;

pub use api_key::*;
pub use middleware::*;
