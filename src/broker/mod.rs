//! Broker façade
//!
//! Ties the registry and the capture pipelines together behind the two
//! operations transports need: publish a JPEG into a channel, and fetch the
//! latest one out of it.
//!
//! ```text
//!   HTTP POST ──publish()──►┐                      ┌──fetch()──► HTTP GET
//!                           ▼                      │
//!                    ChannelRegistry ──► Channel ──┘
//!                           ▲
//!   VideoSource ──► StreamPipeline (attach_pipeline)
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::pipeline::{AiEngine, PipelineConfig, SourceParams, StreamPipeline, VideoSource};
use crate::registry::{
    Annotation, Channel, ChannelRegistry, ChannelStats, Encoding, Fetched, Frame, FrameRef,
    RegistryConfig, RegistryError,
};
use crate::stats::PipelineStatsSnapshot;

/// A frame copied out of a channel
#[derive(Debug, Clone)]
pub struct FetchedFrame {
    /// Id of the channel the frame came from
    pub channel_id: u64,
    /// Encoded image, owned by the caller
    pub bytes: Bytes,
    /// MIME type of `bytes`
    pub content_type: &'static str,
    /// Channel sequence number
    pub sequence: u64,
    /// Capture wall-clock time, milliseconds since the epoch
    pub timestamp_ms: u64,
    pub width: u32,
    pub height: u32,
}

/// Publish/fetch entry point over a set of channels
pub struct Broker {
    registry: Arc<ChannelRegistry>,
    pipelines: Mutex<HashMap<String, StreamPipeline>>,
    pipeline_config: PipelineConfig,
}

impl Broker {
    /// Create a broker with default configuration
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default(), PipelineConfig::default())
    }

    /// Create a broker with custom configuration
    pub fn with_config(registry: RegistryConfig, pipeline: PipelineConfig) -> Self {
        Self {
            registry: Arc::new(ChannelRegistry::with_config(registry)),
            pipelines: Mutex::new(HashMap::new()),
            pipeline_config: pipeline,
        }
    }

    /// The underlying registry
    pub fn registry(&self) -> &Arc<ChannelRegistry> {
        &self.registry
    }

    /// Publish a JPEG into `name`, registering the channel on first use.
    ///
    /// The payload is shared, not copied. Returns the channel sequence, which
    /// is also the published frame's sequence.
    pub fn publish(&self, name: &str, payload: Bytes, width: u32, height: u32) -> Result<u64> {
        if payload.is_empty() {
            return Err(Error::InvalidArgument("empty frame payload".into()));
        }
        if width == 0 || height == 0 {
            return Err(Error::InvalidArgument(format!(
                "invalid frame dimensions {}x{}",
                width, height
            )));
        }

        let size = payload.len();
        loop {
            let channel = self.registry.find_or_register(name)?;
            let payload = payload.clone();
            let published = channel.update_with(move |sequence| {
                Frame::builder(width, height, Encoding::Jpeg, payload)
                    .sequence(sequence)
                    .build()
            });

            match published {
                Ok(sequence) => {
                    tracing::trace!(channel = name, sequence, size, "Frame published");
                    return Ok(sequence);
                }
                // Removed between lookup and update: publish into a fresh channel
                Err(Error::ChannelRemoved(_)) => {
                    tracing::debug!(channel = name, "Channel removed during publish, retrying");
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Copy out the latest frame of `name`.
    pub fn fetch(&self, name: &str) -> Result<FetchedFrame> {
        let channel = self.lookup(name)?;
        let (frame, sequence) = channel.fetch()?;
        Ok(Self::copy_out(&channel, frame, sequence))
    }

    /// Copy out the latest frame of `name` if its sequence is past
    /// `last_seen`, else fail with [`Error::NotModified`].
    pub fn fetch_if_newer(&self, name: &str, last_seen: u64) -> Result<FetchedFrame> {
        let channel = self.lookup(name)?;
        match channel.fetch_if_newer(last_seen)? {
            Fetched::Frame(frame, sequence) => Ok(Self::copy_out(&channel, frame, sequence)),
            Fetched::NotModified => Err(Error::NotModified),
        }
    }

    /// Annotation of the latest frame of `name`
    pub fn annotation(&self, name: &str) -> Result<Option<Annotation>> {
        self.lookup(name)?.annotation()
    }

    /// Register `name` without publishing into it
    pub fn register(&self, name: &str) -> Result<Arc<Channel>> {
        Ok(self.registry.find_or_register(name)?)
    }

    /// Remove `name`, stopping its pipeline first if one is attached.
    pub fn remove(&self, name: &str) -> Result<()> {
        let pipeline = self.pipelines.lock().remove(name);
        // Joins the pipeline threads; must not hold the map lock
        drop(pipeline);

        self.registry.remove(name).map_err(Self::map_not_found)?;
        Ok(())
    }

    /// Statistics for every channel, ordered by registration
    pub fn channels(&self) -> Vec<ChannelStats> {
        self.registry.snapshot()
    }

    /// Start a capture/annotate pipeline feeding `name`.
    ///
    /// Fails if a pipeline is already attached to the channel.
    pub fn attach_pipeline(
        &self,
        name: &str,
        source: Box<dyn VideoSource>,
        engine: Option<Box<dyn AiEngine>>,
        params: SourceParams,
    ) -> Result<()> {
        let channel = self.registry.find_or_register(name)?;

        let mut pipelines = self.pipelines.lock();
        if pipelines.contains_key(name) {
            return Err(Error::InvalidArgument(format!(
                "a pipeline is already attached to channel {}",
                name
            )));
        }

        let pipeline =
            StreamPipeline::start(channel, source, engine, params, self.pipeline_config.clone())?;
        pipelines.insert(name.to_string(), pipeline);
        Ok(())
    }

    /// Stop and remove the pipeline feeding `name`. The channel stays.
    pub fn detach_pipeline(&self, name: &str) -> Result<()> {
        let pipeline = self.pipelines.lock().remove(name);
        match pipeline {
            Some(mut pipeline) => {
                pipeline.stop();
                Ok(())
            }
            None => Err(Error::NotFound(name.to_string())),
        }
    }

    /// Counters of the pipeline feeding `name`, if any
    pub fn pipeline_stats(&self, name: &str) -> Option<PipelineStatsSnapshot> {
        self.pipelines.lock().get(name).map(|p| p.stats())
    }

    /// Stop every attached pipeline. Channels and their frames stay.
    pub fn shutdown(&self) {
        let pipelines: Vec<StreamPipeline> =
            self.pipelines.lock().drain().map(|(_, p)| p).collect();
        if pipelines.is_empty() {
            return;
        }

        tracing::info!(count = pipelines.len(), "Stopping pipelines");
        for mut pipeline in pipelines {
            pipeline.stop();
        }
    }

    fn lookup(&self, name: &str) -> Result<Arc<Channel>> {
        self.registry.find_by_name(name).map_err(Self::map_not_found)
    }

    fn map_not_found(err: RegistryError) -> Error {
        match err {
            RegistryError::NotFound(name) => Error::NotFound(name),
            other => Error::Registry(other),
        }
    }

    fn copy_out(channel: &Channel, frame: FrameRef, sequence: u64) -> FetchedFrame {
        let fetched = FetchedFrame {
            channel_id: channel.id(),
            bytes: Bytes::copy_from_slice(frame.payload()),
            content_type: frame.encoding().content_type(),
            sequence,
            timestamp_ms: channel.timestamp_ms(&frame),
            width: frame.width(),
            height: frame.height(),
        };
        drop(frame);
        fetched
    }
}

impl Default for Broker {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Broker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Broker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Broker")
            .field("channels", &self.registry.len())
            .field("pipelines", &self.pipelines.lock().len())
            .finish()
    }
}
