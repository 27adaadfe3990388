//! Single-slot handoff between the capture side and the annotate thread
//!
//! `busy`, the pending slot and `running` live under one mutex. `busy` is set
//! when a capture is accepted and only cleared once the annotate thread has
//! finished with that frame, so at most one frame is pending or in flight.

use std::time::Instant;

use bytes::Bytes;
use parking_lot::{Condvar, Mutex};

use crate::registry::Encoding;

/// Status returned to the video source for each offered frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureStatus {
    /// Frame handed to the annotate thread
    Accepted,
    /// Annotate thread busy; frame dropped
    Busy,
    /// Frame was empty or had zero dimensions
    Rejected,
    /// Pipeline is shutting down
    Stopped,
}

/// Owned copy of a captured frame waiting for annotation
#[derive(Debug)]
pub struct CapturedFrame {
    /// Capture sequence number
    pub sequence: u64,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Payload encoding
    pub encoding: Encoding,
    /// Owned payload
    pub data: Bytes,
    /// Capture instant
    pub captured_at: Instant,
}

#[derive(Debug)]
struct HandoffState {
    busy: bool,
    pending: Option<CapturedFrame>,
    running: bool,
}

/// Condition-variable mailbox of capacity one
#[derive(Debug)]
pub struct Handoff {
    state: Mutex<HandoffState>,
    cond: Condvar,
}

impl Handoff {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(HandoffState {
                busy: false,
                pending: None,
                running: true,
            }),
            cond: Condvar::new(),
        }
    }

    /// Reserve the slot for a new capture.
    ///
    /// On `Accepted` the caller owns the reservation and must follow up with
    /// [`deliver`](Self::deliver).
    pub fn reserve(&self) -> CaptureStatus {
        let mut state = self.state.lock();
        if !state.running {
            return CaptureStatus::Stopped;
        }
        if state.busy {
            return CaptureStatus::Busy;
        }
        state.busy = true;
        CaptureStatus::Accepted
    }

    /// Store the reserved frame and wake the annotate thread.
    pub fn deliver(&self, frame: CapturedFrame) {
        let mut state = self.state.lock();
        state.pending = Some(frame);
        self.cond.notify_one();
    }

    /// Block until a frame is pending or the handoff is shut down.
    ///
    /// The slot is cleared before the lock is released.
    pub fn take(&self) -> Option<CapturedFrame> {
        let mut state = self.state.lock();
        loop {
            if !state.running {
                return None;
            }
            if let Some(frame) = state.pending.take() {
                return Some(frame);
            }
            self.cond.wait(&mut state);
        }
    }

    /// Mark the in-flight frame done, unblocking the next capture.
    pub fn finish(&self) {
        self.state.lock().busy = false;
    }

    /// Stop accepting captures and wake the annotate thread.
    pub fn shutdown(&self) {
        let mut state = self.state.lock();
        state.running = false;
        state.pending = None;
        self.cond.notify_all();
    }

    /// Whether a frame is pending or being annotated
    pub fn is_busy(&self) -> bool {
        self.state.lock().busy
    }

    /// Whether the handoff still accepts captures
    pub fn is_running(&self) -> bool {
        self.state.lock().running
    }
}

impl Default for Handoff {
    fn default() -> Self {
        Self::new()
    }
}
