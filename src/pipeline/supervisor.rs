//! Source supervisor thread
//!
//! Reacts to end-of-stream and error events by reinitializing the source with
//! the same parameters after an exponential backoff. A failure counts as
//! consecutive when no frame arrived since the previous one; too many in a row
//! disable the channel.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::registry::Channel;
use crate::stats::{PipelineStats, PipelineStatus};

use super::config::PipelineConfig;
use super::source::{FrameSink, SourceEvent, SourceParams, VideoSource};

pub(crate) type SharedSource = Arc<Mutex<Box<dyn VideoSource>>>;

pub(crate) struct Supervisor {
    pub(crate) source: SharedSource,
    pub(crate) params: SourceParams,
    pub(crate) sink: FrameSink,
    pub(crate) events: flume::Receiver<SourceEvent>,
    pub(crate) channel: Arc<Channel>,
    pub(crate) config: PipelineConfig,
    pub(crate) status: Arc<Mutex<PipelineStatus>>,
    pub(crate) stats: Arc<PipelineStats>,
    pub(crate) failures: u32,
}

impl Supervisor {
    pub(crate) fn run(mut self) {
        loop {
            match self.events.recv() {
                Ok(SourceEvent::Shutdown) | Err(_) => break,
                Ok(event) => {
                    let reason = match event {
                        SourceEvent::Error(msg) => msg,
                        _ => "end of stream".to_string(),
                    };
                    tracing::warn!(
                        channel = %self.channel.name(),
                        error = %Error::SourceDisconnected(reason),
                        "Video source interrupted"
                    );
                    if !self.reconnect() {
                        break;
                    }
                }
            }
        }

        self.source.lock().stop();
        tracing::debug!(channel = %self.channel.name(), "Supervisor exited");
    }

    /// Retry until the source is back, the channel is disabled, or shutdown.
    ///
    /// Returns `false` when the supervisor should exit.
    fn reconnect(&mut self) -> bool {
        if self.sink.take_frame_seen() {
            self.failures = 0;
        }

        loop {
            self.failures += 1;
            if self.failures > self.config.max_consecutive_failures {
                self.channel.disable();
                self.set_status(PipelineStatus::Disabled);
                tracing::error!(
                    channel = %self.channel.name(),
                    failures = self.failures - 1,
                    "Too many consecutive source failures, giving up"
                );
                return false;
            }

            let delay = self.config.backoff_for(self.failures);
            self.set_status(PipelineStatus::Reconnecting);
            tracing::warn!(
                channel = %self.channel.name(),
                attempt = self.failures,
                delay_ms = delay.as_millis() as u64,
                "Reconnecting video source"
            );

            if !self.wait(delay) {
                return false;
            }

            match self.restart() {
                Ok(()) => {
                    self.stats.record_reconnect();
                    self.set_status(PipelineStatus::Running);
                    tracing::info!(channel = %self.channel.name(), uri = %self.params.uri, "Video source reconnected");
                    return true;
                }
                Err(e) => {
                    tracing::warn!(channel = %self.channel.name(), error = %e, "Reconnect failed");
                }
            }
        }
    }

    fn restart(&mut self) -> Result<()> {
        let mut source = self.source.lock();
        source.stop();
        source.init(&self.params, self.sink.clone())?;
        source.play()
    }

    /// Sleep for `delay`, coalescing further source events.
    ///
    /// Returns `false` if shutdown was requested.
    fn wait(&self, delay: Duration) -> bool {
        let deadline = Instant::now() + delay;
        loop {
            match self.events.recv_deadline(deadline) {
                Ok(SourceEvent::Shutdown) | Err(flume::RecvTimeoutError::Disconnected) => {
                    return false
                }
                Ok(_) => continue,
                Err(flume::RecvTimeoutError::Timeout) => return true,
            }
        }
    }

    fn set_status(&self, status: PipelineStatus) {
        *self.status.lock() = status;
    }
}
