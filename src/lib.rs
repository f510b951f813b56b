pub mod auth;
pub mod config;
pub mod designs;
pub mod error;
pub mod interactions;
pub mod messaging;
pub mod models;
pub mod notifications;
pub mod openapi;
pub mod profiles;
pub mod rate_limit; // in-memory rate limiting
pub mod repo;
pub mod routes;
pub mod security;
pub mod storage;
pub mod telemetry;

// Re-export commonly used items for tests / external users
pub use routes::{config as configure, AppState};
pub use security::SecurityHeaders;
