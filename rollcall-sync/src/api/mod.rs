//! HTTP API handlers
//!
//! The HTTP surface is a thin adapter: handlers validate and decode,
//! then delegate to the ledger, the pipeline, or the identity index.

mod analyze;
mod attendance;
mod health;
mod register;

pub use analyze::analyze_routes;
pub use attendance::attendance_routes;
pub use health::health_routes;
pub use register::register_routes;
