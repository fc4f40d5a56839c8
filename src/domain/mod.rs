//! Domain types for Barrier Gateway.
//!
//! Snapshots of the proxied exchange, detector findings, policy verdicts and
//! the per-request decision record.

mod finding;
mod inspection;
mod record;
mod verdict;

pub use finding::*;
pub use inspection::*;
pub use record::*;
pub use verdict::*;
