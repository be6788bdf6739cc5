//! API Handlers
//!
//! HTTP request handlers for each cache server endpoint.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::cache::{CacheLoader, LoadingCache, TokioExecutor};
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::models::{
    DeleteResponse, GetResponse, HealthResponse, RefreshResponse, SetRequest, SetResponse,
    StatsResponse,
};
use crate::origin::OriginLoader;

/// Application state shared across all handlers.
///
/// Contains the cache handle and the loader used for read-through fetches.
#[derive(Clone)]
pub struct AppState {
    /// Thread-safe cache handle
    pub cache: LoadingCache<String>,
    /// Computes values missing from the cache
    pub loader: Arc<dyn CacheLoader<String>>,
}

impl AppState {
    /// Creates a new AppState with the given cache and loader.
    pub fn new(cache: LoadingCache<String>, loader: Arc<dyn CacheLoader<String>>) -> Self {
        Self { cache, loader }
    }

    /// Creates a new AppState from configuration.
    ///
    /// Refreshes run on the current runtime's blocking pool and misses are
    /// fetched from the configured origin.
    ///
    /// # Panics
    /// When called outside of a tokio runtime.
    pub fn from_config(config: &Config) -> Result<Self> {
        let cache = LoadingCache::builder()
            .policy(config.policy()?)
            .namespace(config.namespace.clone())
            .executor(Arc::new(TokioExecutor::current()))
            .build()?;
        let loader = OriginLoader::new(config.origin_url.clone(), tokio::runtime::Handle::current());
        Ok(Self::new(cache, Arc::new(loader)))
    }
}

/// Handler for PUT /set
///
/// Stores a key-value pair in the cache, replacing any in-flight load.
pub async fn set_handler(
    State(state): State<AppState>,
    Json(req): Json<SetRequest>,
) -> Result<Json<SetResponse>> {
    // Validate request
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidArgument(error_msg));
    }

    state.cache.put(&req.key, req.value)?;

    Ok(Json(SetResponse::new(req.key)))
}

/// Handler for GET /get/:key
///
/// Returns the cached value without touching the origin.
pub async fn get_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<GetResponse>> {
    match state.cache.get_if_present(&key) {
        Some(value) => Ok(Json(GetResponse::new(key, value))),
        None => Err(CacheError::KeyNotFound(key)),
    }
}

/// Handler for GET /fetch/:key
///
/// Read-through: returns the cached value, loading it from the origin on a
/// miss. Concurrent fetches of the same key share one origin request.
pub async fn fetch_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<GetResponse>> {
    let cache = state.cache.clone();
    let loader = Arc::clone(&state.loader);
    let lookup = key.clone();

    // Loading blocks the calling thread.
    let value = tokio::task::spawn_blocking(move || cache.get(&lookup, &loader))
        .await
        .map_err(|err| CacheError::Internal(format!("fetch task failed: {}", err)))??;

    Ok(Json(GetResponse::new(key, value)))
}

/// Handler for POST /refresh/:key
///
/// Starts a background refresh and returns without waiting for it.
pub async fn refresh_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<(StatusCode, Json<RefreshResponse>)> {
    let cache = state.cache.clone();
    let loader = Arc::clone(&state.loader);
    let lookup = key.clone();

    // Takes the cache lock, and a same-thread executor would run the loader here.
    let started = tokio::task::spawn_blocking(move || cache.refresh(&lookup, &loader))
        .await
        .map_err(|err| CacheError::Internal(format!("refresh task failed: {}", err)))??
        .is_some();

    Ok((StatusCode::ACCEPTED, Json(RefreshResponse::new(key, started))))
}

/// Handler for DELETE /del/:key
///
/// Deletes a key from the cache. Deleting a missing key succeeds.
pub async fn delete_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Json<DeleteResponse> {
    let removed = state.cache.remove(&key);
    Json(DeleteResponse::new(key, removed))
}

/// Handler for GET /stats
///
/// Returns current cache statistics.
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse::from(state.cache.stats()))
}

/// Handler for GET /health
///
/// Returns health status of the server.
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}
