//! API Module
//!
//! HTTP handlers and routing for the read-through cache server.
//!
//! # Endpoints
//! - `PUT /set` - Store a key-value pair
//! - `GET /get/:key` - Retrieve a cached value
//! - `GET /fetch/:key` - Retrieve a value, loading it from the origin on a miss
//! - `POST /refresh/:key` - Refresh a key in the background
//! - `DELETE /del/:key` - Delete a key
//! - `GET /stats` - Get cache statistics
//! - `GET /health` - Health check endpoint

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
