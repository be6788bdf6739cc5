//! Stampede - A load-or-compute cache
//!
//! Computes each missing key at most once no matter how many callers ask for
//! it, expires entries by time, and refreshes stale values in the background.
//! Ships with a read-through HTTP server in front of an origin.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod origin;
pub mod tasks;

pub use api::AppState;
pub use config::Config;
pub use tasks::spawn_cleanup_task;
