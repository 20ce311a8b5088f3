//! crosspost - Multi-platform social publishing orchestrator
//!
//! Accepts a logical post (caption, hashtags, media) and fans it out to
//! Facebook, Instagram, and LinkedIn, tracking each request as an
//! asynchronous job a client can poll.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`config`] - Configuration management and settings
//! - [`models`] - Core data structures and types
//! - [`platforms`] - Per-platform publishing clients
//! - [`media`] - Aspect-ratio validation for carousel posts
//! - [`jobs`] - Job tracking for in-flight publishes
//! - [`stores`] - Credential and post storage interfaces
//! - [`publisher`] - The publish orchestrator
//! - [`scheduler`] - Scheduled-post polling
//! - [`server`] - HTTP API server
//!
//! # Example
//!
//! ```no_run
//! use crosspost::config::Config;
//! use crosspost::server::{PublishServer, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let server = PublishServer::new(ServerConfig::default(), config).await?;
//!     server.start().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod jobs;
pub mod media;
pub mod models;
pub mod platforms;
pub mod publisher;
pub mod scheduler;
pub mod server;
pub mod stores;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{Error, ErrorCategory, Result};
    pub use crate::jobs::{Job, JobStatus, JobStore, PublishReport, ReportStatus};
    pub use crate::models::{MediaItem, MediaType, Platform, Post, PostStatus};
    pub use crate::platforms::{PlatformPublisher, PollPolicy, PublishOutcome};
    pub use crate::publisher::{PublishRequest, Publisher, SubmitError};
    pub use crate::server::{PublishServer, ServerConfig};
}
