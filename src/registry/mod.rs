//! Channel registry for live frames
//!
//! The registry maps channel names to channels. Each channel holds exactly one
//! current frame; producers swap it, readers take a reference to it.
//!
//! # Architecture
//!
//! ```text
//!                       Arc<ChannelRegistry>
//!                  ┌──────────────────────────┐
//!                  │ channels: HashMap<name,  │
//!                  │   Arc<Channel {          │
//!                  │     current: FrameRef,   │
//!                  │     sequence,            │
//!                  │   }>                     │
//!                  │ >                        │
//!                  └────────────┬─────────────┘
//!                               │
//!         ┌─────────────────────┼─────────────────────┐
//!         │                     │                     │
//!         ▼                     ▼                     ▼
//!   [Annotate worker]      [HTTP GET]            [HTTP GET]
//!   channel.update()       channel.fetch()       channel.fetch()
//! ```
//!
//! # Zero-Copy Design
//!
//! Frames are shared through `FrameRef` (an `Arc`) and payloads are
//! `bytes::Bytes`, so handing a frame to a reader is a refcount bump. The last
//! holder to drop its reference frees the payload.

pub mod channel;
pub mod config;
pub mod error;
pub mod frame;
pub mod store;

pub use channel::{Channel, ChannelState, ChannelStats, Fetched};
pub use config::RegistryConfig;
pub use error::RegistryError;
pub use frame::{Annotation, Encoding, Frame, FrameBuilder, FrameRef, WeakFrame};
pub use store::ChannelRegistry;
