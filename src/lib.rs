//! Library crate for the viento wind-telemetry backend.
//!
//! The binary in `main.rs` wires these modules together; they are exposed
//! as a library so the aggregation pipeline and the HTTP router can also
//! be driven directly, e.g. from integration tests.

pub mod aggregate;
pub mod collector;
pub mod config;
pub mod error;
pub mod models;
pub mod routes;
pub mod schema;
pub mod store;

pub use config::Config;
