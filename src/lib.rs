//! Mirrors a public TV show catalog into a library manager's watchlist,
//! filtering the catalog against a declarative selection spec and adding
//! matching shows through the manager's HTTP API.

pub mod api;
pub mod cache;
pub mod config;
pub mod downstream;
pub mod duration;
pub mod error;
pub mod filter;
pub mod orchestrator;
pub mod processor;
pub mod rate_limiter;
pub mod scheduler;
pub mod state;
pub mod stats;
pub mod upstream;
