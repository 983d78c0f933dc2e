// Agora - discussion feed service

// HTTP surface
pub mod api;

// Application wiring
pub mod app_state;
pub mod config;

// Feed materialization core
pub mod feed;

// Domain types
pub mod models;

// Repository seams and backends
pub mod store;

// Request identity
pub mod viewer;

// Common utilities
pub mod error;

// Re-exports for convenience
pub use error::{AppError, AppResult};
