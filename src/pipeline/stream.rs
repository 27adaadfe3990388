//! Per-stream capture/annotate worker pair

use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::registry::Channel;
use crate::stats::{PipelineStats, PipelineStatsSnapshot, PipelineStatus};

use super::config::PipelineConfig;
use super::engine::AiEngine;
use super::handoff::Handoff;
use super::source::{FrameSink, SourceEvent, SourceParams, VideoSource};
use super::supervisor::{SharedSource, Supervisor};
use super::worker::AnnotateWorker;

/// A running capture/annotate pipeline feeding one channel
///
/// Owns the annotate thread and the supervisor thread. Dropping the pipeline
/// stops it.
pub struct StreamPipeline {
    channel: Arc<Channel>,
    source: SharedSource,
    handoff: Arc<Handoff>,
    sink: FrameSink,
    events: flume::Sender<SourceEvent>,
    status: Arc<Mutex<PipelineStatus>>,
    stats: Arc<PipelineStats>,
    annotate: Option<JoinHandle<()>>,
    supervisor: Option<JoinHandle<()>>,
}

impl StreamPipeline {
    /// Initialize `source`, spawn the worker threads and start playback.
    ///
    /// Without an engine, frames are published unannotated.
    pub fn start(
        channel: Arc<Channel>,
        source: Box<dyn VideoSource>,
        engine: Option<Box<dyn AiEngine>>,
        params: SourceParams,
        config: PipelineConfig,
    ) -> Result<Self> {
        let handoff = Arc::new(Handoff::new());
        let stats = Arc::new(PipelineStats::new());
        let status = Arc::new(Mutex::new(PipelineStatus::Running));
        let (events_tx, events_rx) = flume::unbounded();
        let sink = FrameSink::new(
            Arc::clone(&handoff),
            events_tx.clone(),
            Arc::clone(&stats),
            params.encoding,
        );
        let source: SharedSource = Arc::new(Mutex::new(source));

        source.lock().init(&params, sink.clone())?;

        let worker = AnnotateWorker {
            handoff: Arc::clone(&handoff),
            channel: Arc::clone(&channel),
            engine,
            stats: Arc::clone(&stats),
        };
        let annotate = std::thread::Builder::new()
            .name(format!("annotate-{}", channel.name()))
            .spawn(move || worker.run())?;

        let supervisor = Supervisor {
            source: Arc::clone(&source),
            params: params.clone(),
            sink: sink.clone(),
            events: events_rx,
            channel: Arc::clone(&channel),
            config,
            status: Arc::clone(&status),
            stats: Arc::clone(&stats),
            failures: 0,
        };
        let supervisor = match std::thread::Builder::new()
            .name(format!("supervisor-{}", channel.name()))
            .spawn(move || supervisor.run())
        {
            Ok(handle) => handle,
            Err(e) => {
                handoff.shutdown();
                let _ = annotate.join();
                return Err(Error::Io(e));
            }
        };

        let mut pipeline = Self {
            channel,
            source,
            handoff,
            sink,
            events: events_tx,
            status,
            stats,
            annotate: Some(annotate),
            supervisor: Some(supervisor),
        };

        if let Err(e) = pipeline.play() {
            pipeline.stop();
            return Err(e);
        }
        // A previous pipeline may have given up on this channel
        pipeline.channel.enable();

        tracing::info!(
            channel = %pipeline.channel.name(),
            uri = %params.uri,
            "Pipeline started"
        );
        Ok(pipeline)
    }

    /// Channel this pipeline publishes to
    pub fn channel(&self) -> &Arc<Channel> {
        &self.channel
    }

    /// Capture side handle, as given to the source
    pub fn sink(&self) -> &FrameSink {
        &self.sink
    }

    /// Resume frame delivery
    pub fn play(&self) -> Result<()> {
        self.source.lock().play()
    }

    /// Suspend frame delivery
    pub fn pause(&self) -> Result<()> {
        self.source.lock().pause()
    }

    /// Current status
    pub fn status(&self) -> PipelineStatus {
        *self.status.lock()
    }

    /// Whether a frame is pending or being annotated
    pub fn is_busy(&self) -> bool {
        self.handoff.is_busy()
    }

    /// Snapshot of pipeline counters
    pub fn stats(&self) -> PipelineStatsSnapshot {
        self.stats.snapshot(self.status())
    }

    /// Stop the pipeline.
    ///
    /// Returns once the source has stopped calling back and both threads have
    /// exited. An inference already in flight completes and is published
    /// first. Calling `stop` again is a no-op.
    pub fn stop(&mut self) {
        if self.annotate.is_none() && self.supervisor.is_none() {
            return;
        }
        *self.status.lock() = PipelineStatus::Stopping;

        // New captures now return Stopped; the annotate loop exits after the
        // frame it holds, if any.
        self.handoff.shutdown();

        let _ = self.events.send(SourceEvent::Shutdown);
        if let Some(handle) = self.supervisor.take() {
            if handle.join().is_err() {
                tracing::error!(channel = %self.channel.name(), "Supervisor thread panicked");
            }
        }
        if let Some(handle) = self.annotate.take() {
            if handle.join().is_err() {
                tracing::error!(channel = %self.channel.name(), "Annotate thread panicked");
            }
        }

        *self.status.lock() = PipelineStatus::Stopped;
        tracing::info!(channel = %self.channel.name(), "Pipeline stopped");
    }
}

impl Drop for StreamPipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for StreamPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamPipeline")
            .field("channel", &self.channel.name())
            .field("status", &self.status())
            .finish()
    }
}
