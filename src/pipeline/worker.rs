//! Annotate thread
//!
//! Waits on the handoff, runs inference on the pending frame and publishes the
//! result to the channel. Inference failures are absorbed by publishing the
//! raw frame without an annotation.

use std::sync::Arc;

use crate::error::Error;
use crate::registry::{Channel, Frame};
use crate::stats::PipelineStats;

use super::engine::AiEngine;
use super::handoff::{CapturedFrame, Handoff};

pub(crate) struct AnnotateWorker {
    pub(crate) handoff: Arc<Handoff>,
    pub(crate) channel: Arc<Channel>,
    pub(crate) engine: Option<Box<dyn AiEngine>>,
    pub(crate) stats: Arc<PipelineStats>,
}

impl AnnotateWorker {
    /// Run until the handoff is shut down.
    ///
    /// A frame already taken when shutdown begins is still annotated and
    /// published before the loop exits.
    pub(crate) fn run(mut self) {
        tracing::debug!(channel = %self.channel.name(), "Annotate thread started");

        while let Some(captured) = self.handoff.take() {
            self.process(captured);
            self.handoff.finish();
        }

        tracing::debug!(channel = %self.channel.name(), "Annotate thread exited");
    }

    fn process(&mut self, captured: CapturedFrame) {
        let annotation = match self.engine.as_mut() {
            Some(engine) => match engine.predict(&captured.data, captured.encoding) {
                Ok(doc) => {
                    self.stats.record_annotated();
                    Some(doc)
                }
                Err(e) => {
                    self.stats.record_inference_failure();
                    tracing::warn!(
                        channel = %self.channel.name(),
                        sequence = captured.sequence,
                        error = %Error::InferenceFailed(e.to_string()),
                        "Publishing frame without annotation"
                    );
                    None
                }
            },
            None => None,
        };

        let result = Frame::builder(
            captured.width,
            captured.height,
            captured.encoding,
            captured.data,
        )
        .sequence(captured.sequence)
        .annotation(annotation)
        .captured_at(captured.captured_at)
        .build()
        .and_then(|frame| self.channel.update(frame));

        match result {
            Ok(sequence) => {
                self.stats.record_published();
                tracing::trace!(
                    channel = %self.channel.name(),
                    capture_sequence = captured.sequence,
                    sequence = sequence,
                    "Frame published"
                );
            }
            Err(Error::ChannelRemoved(_)) => {
                tracing::debug!(channel = %self.channel.name(), "Channel removed, frame discarded");
            }
            Err(e) => {
                tracing::warn!(channel = %self.channel.name(), error = %e, "Failed to publish frame");
            }
        }
    }
}
