pub mod config;
pub mod constants;
pub mod error;
pub mod logging;

pub mod gateway;
pub mod idempotency;
pub mod metrics;
pub mod pipeline;
pub mod query;

// Layered boundaries for application and infrastructure
pub mod app;
pub mod infra;

// Domain data shapes shared across layers
pub mod domain;
