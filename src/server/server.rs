//! Publish server implementation
//!
//! Wires the job store, credential/post stores, publisher, and scheduler
//! together behind the HTTP API, and owns the background tasks (job
//! eviction sweep, scheduled-post poller).

use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::jobs::{InMemoryJobStore, JobStore};
use crate::media::MediaValidator;
use crate::publisher::{HttpClientFactory, Publisher};
use crate::scheduler::PostScheduler;
use crate::stores::{InMemoryCredentialStore, InMemoryPostStore};

use super::api::create_router;
use super::config::ServerConfig;

// ============================================================================
// App State
// ============================================================================

/// Shared application state for API handlers
#[derive(Clone)]
pub struct AppState {
    /// Publish orchestrator
    pub publisher: Publisher,

    /// Job store for polling
    pub jobs: Arc<dyn JobStore>,

    /// Server start time
    pub start_time: Instant,
}

// ============================================================================
// Publish Server
// ============================================================================

/// Main publish API server
pub struct PublishServer {
    server_config: ServerConfig,
    config: Config,
    state: AppState,
    jobs: Arc<InMemoryJobStore>,
    scheduler: Arc<PostScheduler>,
}

impl PublishServer {
    /// Create a new server with in-memory stores
    ///
    /// Credentials for the default user are seeded from environment
    /// variables; a deployment with real collaborators would inject its
    /// own stores here.
    pub async fn new(server_config: ServerConfig, config: Config) -> Result<Self, ServerError> {
        config
            .validate()
            .map_err(|e| ServerError::ConfigError(e.to_string()))?;

        let jobs = Arc::new(InMemoryJobStore::new());
        let credentials = Arc::new(InMemoryCredentialStore::new());
        credentials.seed_from_env("default").await;
        let posts = Arc::new(InMemoryPostStore::new());

        let factory = Arc::new(HttpClientFactory::new(config.publisher.poll.clone()));
        let publisher = Publisher::new(
            jobs.clone(),
            credentials,
            posts.clone(),
            factory,
        )
        .with_validator(MediaValidator::new(config.media.ratio_tolerance));

        let scheduler = Arc::new(PostScheduler::new(
            posts,
            publisher.clone(),
            config.scheduler.interval_secs,
        ));

        let state = AppState {
            publisher,
            jobs: jobs.clone(),
            start_time: Instant::now(),
        };

        Ok(Self {
            server_config,
            config,
            state,
            jobs,
            scheduler,
        })
    }

    /// Get the application state
    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    /// Build the router with all routes and layers
    pub fn build_router(&self) -> Router {
        let mut router = create_router(self.state.clone());

        if self.server_config.enable_cors {
            router = router.layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            );
        }

        if self.server_config.enable_request_logging {
            router = router.layer(TraceLayer::new_for_http());
        }

        router
    }

    /// Start the server
    pub async fn start(&self) -> Result<(), ServerError> {
        let router = self.build_router();
        let addr = self.server_config.bind_address;

        tracing::info!("Starting publish server on {}", addr);

        self.start_background_tasks();

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::BindError(e.to_string()))?;

        axum::serve(listener, router)
            .await
            .map_err(|e| ServerError::ServeError(e.to_string()))?;

        Ok(())
    }

    /// Start with graceful shutdown
    pub async fn start_with_shutdown(
        &self,
        shutdown_signal: impl std::future::Future<Output = ()> + Send + 'static,
    ) -> Result<(), ServerError> {
        let router = self.build_router();
        let addr = self.server_config.bind_address;

        tracing::info!("Starting publish server on {} (with graceful shutdown)", addr);

        self.start_background_tasks();

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::BindError(e.to_string()))?;

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| ServerError::ServeError(e.to_string()))?;

        tracing::info!("Publish server shutdown complete");
        Ok(())
    }

    /// Start background tasks: job eviction and the scheduled-post poller
    fn start_background_tasks(&self) {
        self.jobs.clone().start_cleanup_task(
            self.config.publisher.job_cleanup_interval_secs,
            self.config.job_max_age(),
        );

        if self.config.scheduler.enabled {
            self.scheduler.clone().start();
        }

        tracing::info!("Background tasks started");
    }
}

// ============================================================================
// Server Errors
// ============================================================================

/// Server errors
#[derive(Debug, Clone)]
pub enum ServerError {
    /// Configuration error
    ConfigError(String),

    /// Failed to bind to address
    BindError(String),

    /// Server error
    ServeError(String),
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            Self::BindError(msg) => write!(f, "Failed to bind: {}", msg),
            Self::ServeError(msg) => write!(f, "Server error: {}", msg),
        }
    }
}

impl std::error::Error for ServerError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_server_creation() {
        let server = PublishServer::new(ServerConfig::default(), Config::default()).await;
        assert!(server.is_ok());
    }

    #[tokio::test]
    async fn test_server_rejects_invalid_config() {
        let mut config = Config::default();
        config.publisher.poll.max_attempts = 0;

        let server = PublishServer::new(ServerConfig::default(), config).await;
        assert!(matches!(server, Err(ServerError::ConfigError(_))));
    }

    #[tokio::test]
    async fn test_app_state_jobs_empty_at_start() {
        let server = PublishServer::new(ServerConfig::default(), Config::default())
            .await
            .unwrap();
        let state = server.state();

        assert!(state.jobs.get("nonexistent").await.is_none());
    }
}
