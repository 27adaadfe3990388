//! Video source collaborator interface
//!
//! A [`VideoSource`] wraps whatever media framework actually decodes the
//! camera stream. The pipeline hands it a [`FrameSink`] at `init`; the source
//! calls the sink from its own thread for every decoded frame and reports
//! end-of-stream and errors through it. No framework type crosses this
//! boundary.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::registry::Encoding;
use crate::stats::PipelineStats;

use super::handoff::{CaptureStatus, CapturedFrame, Handoff};

/// Frame rate as a fraction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Framerate {
    /// Numerator
    pub num: u32,
    /// Denominator
    pub den: u32,
}

impl Default for Framerate {
    fn default() -> Self {
        Self { num: 5, den: 1 }
    }
}

/// Parameters a source is (re)initialized with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceParams {
    /// Source URI (rtsp://, v4l2 device, file, ...)
    pub uri: String,
    /// Requested width, `None` for the source's native size
    #[serde(default)]
    pub width: Option<u32>,
    /// Requested height, `None` for the source's native size
    #[serde(default)]
    pub height: Option<u32>,
    /// Requested frame rate
    #[serde(default)]
    pub framerate: Framerate,
    /// Encoding of the frames the source delivers
    #[serde(default = "default_encoding")]
    pub encoding: Encoding,
}

fn default_encoding() -> Encoding {
    Encoding::Jpeg
}

impl SourceParams {
    /// JPEG source at its native size and 5 fps
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            width: None,
            height: None,
            framerate: Framerate::default(),
            encoding: Encoding::Jpeg,
        }
    }

    /// Request a frame size
    pub fn size(mut self, width: u32, height: u32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    /// Request a frame rate
    pub fn framerate(mut self, num: u32, den: u32) -> Self {
        self.framerate = Framerate { num, den };
        self
    }

    /// Set the delivered encoding
    pub fn encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }
}

/// Events a source reports to the pipeline supervisor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceEvent {
    /// Stream ended
    EndOfStream,
    /// Stream failed
    Error(String),
    /// Pipeline is stopping
    Shutdown,
}

/// An external video source
///
/// After `stop()` returns the source must not call the sink again.
pub trait VideoSource: Send + 'static {
    /// Prepare the source. Called again with the same parameters on reconnect.
    fn init(&mut self, params: &SourceParams, sink: FrameSink) -> Result<()>;

    /// Start delivering frames
    fn play(&mut self) -> Result<()>;

    /// Suspend delivery
    fn pause(&mut self) -> Result<()>;

    /// Stop delivering frames and release resources
    fn stop(&mut self);
}

struct SinkShared {
    handoff: Arc<Handoff>,
    events: flume::Sender<SourceEvent>,
    stats: Arc<PipelineStats>,
    encoding: Encoding,
    next_sequence: AtomicU64,
    frame_seen: AtomicBool,
}

/// Capture side of a pipeline, handed to the video source
#[derive(Clone)]
pub struct FrameSink {
    shared: Arc<SinkShared>,
}

impl FrameSink {
    pub(crate) fn new(
        handoff: Arc<Handoff>,
        events: flume::Sender<SourceEvent>,
        stats: Arc<PipelineStats>,
        encoding: Encoding,
    ) -> Self {
        Self {
            shared: Arc::new(SinkShared {
                handoff,
                events,
                stats,
                encoding,
                next_sequence: AtomicU64::new(1),
                frame_seen: AtomicBool::new(false),
            }),
        }
    }

    /// Offer a decoded frame.
    ///
    /// Never blocks on the annotate thread: if it is busy the frame is
    /// dropped and `Busy` is returned. Accepted bytes are copied, so the
    /// source may reuse its buffer as soon as this returns.
    pub fn on_new_frame(&self, data: &[u8], width: u32, height: u32) -> CaptureStatus {
        let shared = &self.shared;
        if data.is_empty() || width == 0 || height == 0 {
            return CaptureStatus::Rejected;
        }

        let status = shared.handoff.reserve();
        match status {
            CaptureStatus::Accepted => {
                shared.frame_seen.store(true, Ordering::Release);
                let frame = CapturedFrame {
                    sequence: shared.next_sequence.fetch_add(1, Ordering::Relaxed),
                    width,
                    height,
                    encoding: shared.encoding,
                    data: Bytes::copy_from_slice(data),
                    captured_at: Instant::now(),
                };
                shared.handoff.deliver(frame);
                shared.stats.record_captured();
            }
            CaptureStatus::Busy => {
                shared.frame_seen.store(true, Ordering::Release);
                shared.stats.record_dropped();
                tracing::trace!(width = width, height = height, "Frame dropped: annotate busy");
            }
            CaptureStatus::Rejected | CaptureStatus::Stopped => {}
        }
        status
    }

    /// Report end of stream
    pub fn on_end_of_stream(&self) {
        let _ = self.shared.events.send(SourceEvent::EndOfStream);
    }

    /// Report a source error
    pub fn on_error(&self, message: impl Into<String>) {
        let _ = self.shared.events.send(SourceEvent::Error(message.into()));
    }

    /// Whether the pipeline still accepts frames
    pub fn is_running(&self) -> bool {
        self.shared.handoff.is_running()
    }

    /// Clear and return whether any frame arrived since the last call
    pub(crate) fn take_frame_seen(&self) -> bool {
        self.shared.frame_seen.swap(false, Ordering::AcqRel)
    }
}

impl std::fmt::Debug for FrameSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameSink")
            .field("encoding", &self.shared.encoding)
            .field("running", &self.is_running())
            .finish()
    }
}
