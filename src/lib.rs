// Library exports for Alchemax
// This allows integration tests and the binary to share the same modules

pub mod audit;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod membership;
pub mod routes;
pub mod state;
