//! Appmetrics - per-application runtime state folded from a platform telemetry stream.

pub mod aggregate;
pub mod cc_http;
pub mod config;
pub mod directory;
pub mod enrich;
pub mod event_router;
pub mod normalize;
pub mod pipeline;
pub mod reconcile;
pub mod store;
pub mod types;
