//! Channel mailbox
//!
//! A channel holds exactly one current frame plus a monotonic sequence
//! counter. `update` is the only writer path; `fetch` hands out new references.
//! Both hold the channel lock only for a pointer swap and a refcount bump.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use serde::Serialize;

use crate::error::{Error, Result};

use super::frame::{Annotation, FrameRef};

/// State of a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelState {
    /// Accepting updates
    Active,
    /// Producer gave up after repeated source failures; last frame still served
    Disabled,
    /// Removed from the registry; updates are rejected
    Removed,
}

/// Result of a conditional fetch
#[derive(Debug)]
pub enum Fetched {
    /// A frame newer than the one the caller has seen
    Frame(FrameRef, u64),
    /// Caller's frame is still current
    NotModified,
}

struct Slot {
    current: Option<FrameRef>,
    sequence: u64,
    updated_at: Option<Instant>,
    removed: bool,
}

/// A named live stream with a single current frame
pub struct Channel {
    id: u64,
    name: String,
    slot: Mutex<Slot>,
    disabled: AtomicBool,
    created_at: Instant,
    created_wall_ms: u64,
}

impl Channel {
    pub(super) fn new(id: u64, name: String) -> Self {
        let created_wall_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        Self {
            id,
            name,
            slot: Mutex::new(Slot {
                current: None,
                sequence: 0,
                updated_at: None,
                removed: false,
            }),
            disabled: AtomicBool::new(false),
            created_at: Instant::now(),
            created_wall_ms,
        }
    }

    /// Registry-assigned id
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Channel name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// When the channel was created
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Replace the current frame.
    ///
    /// Returns the channel sequence number assigned to this update.
    pub fn update(&self, frame: FrameRef) -> Result<u64> {
        self.update_with(move |_| Ok(frame))
    }

    /// Replace the current frame with one built from the sequence number it
    /// will be published under.
    ///
    /// `make` runs inside the critical section and must stay O(1).
    pub fn update_with<F>(&self, make: F) -> Result<u64>
    where
        F: FnOnce(u64) -> Result<FrameRef>,
    {
        let (old, sequence) = {
            let mut slot = self.slot.lock();
            if slot.removed {
                return Err(Error::ChannelRemoved(self.name.clone()));
            }

            let sequence = slot.sequence + 1;
            let frame = make(sequence)?;
            slot.sequence = sequence;
            slot.updated_at = Some(Instant::now());
            (slot.current.replace(frame), sequence)
        };

        // Release the previous frame outside the lock
        drop(old);

        tracing::trace!(channel = %self.name, sequence = sequence, "Channel updated");
        Ok(sequence)
    }

    /// Take a reference to the current frame and the channel sequence.
    pub fn fetch(&self) -> Result<(FrameRef, u64)> {
        let slot = self.slot.lock();
        match slot.current {
            Some(ref frame) => Ok((frame.clone(), slot.sequence)),
            None => Err(Error::NoFrameYet(self.name.clone())),
        }
    }

    /// Like [`fetch`](Self::fetch), but returns `NotModified` when the
    /// sequence has not moved past `last_seen`.
    pub fn fetch_if_newer(&self, last_seen: u64) -> Result<Fetched> {
        let slot = self.slot.lock();
        match slot.current {
            Some(_) if slot.sequence <= last_seen => Ok(Fetched::NotModified),
            Some(ref frame) => Ok(Fetched::Frame(frame.clone(), slot.sequence)),
            None => Err(Error::NoFrameYet(self.name.clone())),
        }
    }

    /// Annotation attached to the current frame
    pub fn annotation(&self) -> Result<Option<Annotation>> {
        let (frame, _) = self.fetch()?;
        Ok(frame.annotation().cloned())
    }

    /// Current sequence number (0 before the first update)
    pub fn sequence(&self) -> u64 {
        self.slot.lock().sequence
    }

    /// Wall-clock capture time of `frame` in milliseconds since the epoch.
    ///
    /// Derived from the channel's creation instant so that it follows the
    /// monotonic clock.
    pub fn timestamp_ms(&self, frame: &FrameRef) -> u64 {
        let captured = frame.captured_at();
        match captured.checked_duration_since(self.created_at) {
            Some(after) => self.created_wall_ms + after.as_millis() as u64,
            None => self
                .created_wall_ms
                .saturating_sub(self.created_at.duration_since(captured).as_millis() as u64),
        }
    }

    /// Mark the channel disabled
    pub fn disable(&self) {
        if !self.disabled.swap(true, Ordering::AcqRel) {
            tracing::error!(channel = %self.name, "Channel disabled");
        }
    }

    /// Clear the disabled flag
    pub fn enable(&self) {
        self.disabled.store(false, Ordering::Release);
    }

    /// Whether the producer gave up on this channel
    pub fn is_disabled(&self) -> bool {
        self.disabled.load(Ordering::Acquire)
    }

    /// Current state
    pub fn state(&self) -> ChannelState {
        if self.slot.lock().removed {
            ChannelState::Removed
        } else if self.is_disabled() {
            ChannelState::Disabled
        } else {
            ChannelState::Active
        }
    }

    /// Reject further updates. Called by the registry under its write lock.
    pub(super) fn retire(&self) -> Option<FrameRef> {
        let mut slot = self.slot.lock();
        slot.removed = true;
        slot.current.take()
    }

    /// Snapshot of channel statistics
    pub fn stats(&self) -> ChannelStats {
        let state = self.state();
        let slot = self.slot.lock();
        let current = slot.current.as_ref();

        ChannelStats {
            id: self.id,
            name: self.name.clone(),
            state,
            sequence: slot.sequence,
            has_frame: current.is_some(),
            width: current.map(|f| f.width()),
            height: current.map(|f| f.height()),
            frame_bytes: current.map(|f| f.payload().len()).unwrap_or(0),
            annotated: current.map(|f| f.annotation().is_some()).unwrap_or(false),
            age_ms: slot.updated_at.map(|t| t.elapsed().as_millis() as u64),
        }
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("sequence", &self.sequence())
            .finish()
    }
}

/// Statistics for a channel
#[derive(Debug, Clone, Serialize)]
pub struct ChannelStats {
    /// Registry-assigned id
    pub id: u64,
    /// Channel name
    pub name: String,
    /// Current state
    pub state: ChannelState,
    /// Channel sequence number
    pub sequence: u64,
    /// Whether a frame has been published
    pub has_frame: bool,
    /// Width of the current frame
    pub width: Option<u32>,
    /// Height of the current frame
    pub height: Option<u32>,
    /// Size of the current payload
    pub frame_bytes: usize,
    /// Whether the current frame carries an annotation
    pub annotated: bool,
    /// Milliseconds since the last update
    pub age_ms: Option<u64>,
}
