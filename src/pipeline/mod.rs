//! Capture/annotate pipelines
//!
//! Each stream runs a worker pair: the video source calls a [`FrameSink`] from
//! its own thread, and a dedicated annotate thread runs inference and publishes
//! to the stream's channel. A supervisor thread handles source reconnects.
//!
//! ```text
//!  VideoSource ──on_new_frame──► FrameSink ──(busy? drop)──► Handoff (1 slot)
//!       ▲                            │                            │
//!       │ init/play            on_eos/on_error                    ▼
//!       │                            ▼                     AnnotateWorker
//!   Supervisor ◄──────────── flume::Receiver           AiEngine::predict()
//!   (backoff, disable)                                  Channel::update()
//! ```
//!
//! # Backpressure
//!
//! The capture side never blocks and never queues more than one frame: while
//! the annotate thread is busy, new captures are dropped and the source gets
//! [`CaptureStatus::Busy`]. At most one inference is in flight per stream.

pub mod config;
pub mod engine;
pub mod handoff;
pub mod source;
pub mod stream;
mod supervisor;
mod worker;

pub use config::PipelineConfig;
pub use engine::{AiEngine, EngineError};
pub use handoff::{CaptureStatus, CapturedFrame};
pub use source::{FrameSink, Framerate, SourceEvent, SourceParams, VideoSource};
pub use stream::StreamPipeline;
