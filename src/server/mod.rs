//! HTTP server
//!
//! [`BrokerHandler`] implements the HTTP contract on plain `http` types;
//! [`BrokerServer`] runs it on axum.

pub mod config;
pub mod handler;
pub mod listener;

pub use config::ServerConfig;
pub use handler::{BrokerHandler, X_FRAME_NUMBER, X_TIMESTAMP};
pub use listener::BrokerServer;
