//! Live-frame relay
//!
//! Camera frames flow into named channels, either pushed over HTTP or captured
//! by a [`pipeline::StreamPipeline`] that annotates them with an AI engine on
//! the way. Each channel keeps only its latest frame; readers always get the
//! newest one.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use frame_broker::{Broker, BrokerServer, ServerConfig};
//!
//! # async fn run() -> frame_broker::Result<()> {
//! let broker = Arc::new(Broker::new());
//! let server = BrokerServer::new(ServerConfig::default(), broker);
//! server.run_until(async { let _ = tokio::signal::ctrl_c().await; }).await
//! # }
//! ```

pub mod broker;
pub mod error;
pub mod media;
pub mod pipeline;
pub mod registry;
pub mod server;
pub mod stats;

pub use broker::{Broker, FetchedFrame};
pub use error::{Error, Result};
pub use registry::{Channel, ChannelRegistry, Encoding, Frame, FrameRef, RegistryConfig};
pub use server::{BrokerHandler, BrokerServer, ServerConfig};
