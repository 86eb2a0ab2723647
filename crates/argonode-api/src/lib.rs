//! Subscription HTTP endpoint
//!
//! Serves a greeting on `/` and the base64 share-link payload on
//! `/{sub_path}`. Everything else is a 404. The server runs for the whole
//! life of the process, independent of bootstrap success.

pub mod cache;
pub mod handlers;

use axum::{routing::get, Router};
use std::net::SocketAddr;
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::info;

pub use cache::SubscriptionCache;

pub const DEFAULT_SUB_PATH: &str = "sub";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubPathError {
    #[error("Subscription path must not be empty")]
    Empty,

    #[error("Subscription path {0:?} must be a single path segment")]
    InvalidSegment(String),
}

/// Subscription server configuration
#[derive(Debug, Clone)]
pub struct SubscriptionServerConfig {
    /// Address to bind the HTTP server
    pub bind_addr: SocketAddr,
    /// Path segment the payload is served under, without slashes
    pub sub_path: String,
}

impl SubscriptionServerConfig {
    /// Configuration listening on all interfaces
    pub fn new(port: u16, sub_path: &str) -> Result<Self, SubPathError> {
        Ok(Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], port)),
            sub_path: normalize_sub_path(sub_path)?,
        })
    }
}

impl Default for SubscriptionServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            sub_path: DEFAULT_SUB_PATH.to_string(),
        }
    }
}

/// Strip surrounding slashes and reject anything that is not one literal
/// path segment
pub fn normalize_sub_path(raw: &str) -> Result<String, SubPathError> {
    let trimmed = raw.trim().trim_matches('/');
    if trimmed.is_empty() {
        return Err(SubPathError::Empty);
    }
    // A leading ':' is the old capture syntax, which axum rejects
    if trimmed.starts_with(':') || trimmed.contains(['/', '{', '}', '*', '?', '#']) {
        return Err(SubPathError::InvalidSegment(raw.to_string()));
    }
    Ok(trimmed.to_string())
}

/// HTTP server exposing the subscription cache
pub struct SubscriptionServer {
    config: SubscriptionServerConfig,
    cache: SubscriptionCache,
}

impl SubscriptionServer {
    pub fn new(config: SubscriptionServerConfig, cache: SubscriptionCache) -> Self {
        Self { config, cache }
    }

    pub fn config(&self) -> &SubscriptionServerConfig {
        &self.config
    }

    /// Build the router with all routes
    pub fn build_router(&self) -> Router {
        let sub_route = format!("/{}", self.config.sub_path);

        Router::new()
            .route("/", get(handlers::root))
            .route(&sub_route, get(handlers::subscription))
            .fallback(handlers::not_found)
            .with_state(self.cache.clone())
            .layer(TraceLayer::new_for_http())
    }

    /// Bind and serve until the process exits
    pub async fn start(self) -> Result<(), anyhow::Error> {
        let router = self.build_router();

        let listener = tokio::net::TcpListener::bind(self.config.bind_addr).await?;
        info!("🚀 HTTP server listening on {}", self.config.bind_addr);
        info!(
            "Subscription path: http://{}/{}",
            self.config.bind_addr, self.config.sub_path
        );

        axum::serve(listener, router)
            .await
            .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

        Ok(())
    }
}
