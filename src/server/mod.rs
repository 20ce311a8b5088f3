//! HTTP surface for publish submission and job polling

pub mod api;
pub mod config;
pub mod server;

pub use api::create_router;
pub use config::ServerConfig;
pub use server::{AppState, PublishServer, ServerError};
