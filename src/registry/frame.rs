//! Reference-counted frame types
//!
//! A [`Frame`] is immutable once built. It is shared through [`FrameRef`], an
//! `Arc` handle: cloning a `FrameRef` adds a reference, dropping one releases
//! it, and the payload is freed when the last handle goes away. Readers never
//! lock the frame itself; only the reference count is atomic.

use std::sync::{Arc, Weak};
use std::time::Instant;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Opaque annotation document returned by the AI engine
pub type Annotation = serde_json::Value;

/// Encoding of a frame payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    /// JPEG compressed image
    Jpeg,
    /// Raw 32-bit BGRA pixels
    Bgra,
}

impl Encoding {
    /// MIME type served for this encoding
    pub fn content_type(self) -> &'static str {
        match self {
            Encoding::Jpeg => "image/jpeg",
            Encoding::Bgra => "application/octet-stream",
        }
    }
}

/// A single published frame
///
/// Cheap to share: the payload is a `Bytes` and the frame itself lives behind
/// an `Arc` in [`FrameRef`].
#[derive(Debug)]
pub struct Frame {
    sequence: u64,
    width: u32,
    height: u32,
    encoding: Encoding,
    payload: Bytes,
    annotation: Option<Annotation>,
    captured_at: Instant,
}

impl Frame {
    /// Create a shared frame with refcount 1.
    ///
    /// Fails with [`Error::InvalidArgument`] if the payload is empty or either
    /// dimension is zero.
    pub fn new(
        sequence: u64,
        width: u32,
        height: u32,
        encoding: Encoding,
        payload: Bytes,
    ) -> Result<FrameRef> {
        Self::builder(width, height, encoding, payload)
            .sequence(sequence)
            .build()
    }

    /// Start building a frame that needs an annotation or capture time.
    pub fn builder(width: u32, height: u32, encoding: Encoding, payload: Bytes) -> FrameBuilder {
        FrameBuilder {
            sequence: 0,
            width,
            height,
            encoding,
            payload,
            annotation: None,
            captured_at: None,
        }
    }

    /// Producer-assigned sequence number
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Width in pixels
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Payload encoding
    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// Encoded bytes
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// AI annotation, if the frame went through inference successfully
    pub fn annotation(&self) -> Option<&Annotation> {
        self.annotation.as_ref()
    }

    /// Monotonic capture time
    pub fn captured_at(&self) -> Instant {
        self.captured_at
    }
}

/// Builder for [`Frame`]
#[derive(Debug)]
pub struct FrameBuilder {
    sequence: u64,
    width: u32,
    height: u32,
    encoding: Encoding,
    payload: Bytes,
    annotation: Option<Annotation>,
    captured_at: Option<Instant>,
}

impl FrameBuilder {
    /// Set the sequence number
    pub fn sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }

    /// Attach an annotation document
    pub fn annotation(mut self, annotation: Option<Annotation>) -> Self {
        self.annotation = annotation;
        self
    }

    /// Set the capture instant (defaults to now)
    pub fn captured_at(mut self, at: Instant) -> Self {
        self.captured_at = Some(at);
        self
    }

    /// Validate and share the frame
    pub fn build(self) -> Result<FrameRef> {
        if self.payload.is_empty() {
            return Err(Error::InvalidArgument("empty frame payload".into()));
        }
        if self.width == 0 || self.height == 0 {
            return Err(Error::InvalidArgument(format!(
                "invalid frame dimensions {}x{}",
                self.width, self.height
            )));
        }

        Ok(FrameRef(Arc::new(Frame {
            sequence: self.sequence,
            width: self.width,
            height: self.height,
            encoding: self.encoding,
            payload: self.payload,
            annotation: self.annotation,
            captured_at: self.captured_at.unwrap_or_else(Instant::now),
        })))
    }
}

/// Strong handle to a shared frame
///
/// `clone()` is add-ref, `drop()` is release.
#[derive(Debug, Clone)]
pub struct FrameRef(Arc<Frame>);

impl FrameRef {
    /// Number of live handles to this frame
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }

    /// Observe the frame without keeping it alive
    pub fn downgrade(&self) -> WeakFrame {
        WeakFrame {
            sequence: self.0.sequence,
            inner: Arc::downgrade(&self.0),
        }
    }

    /// Whether two handles point at the same frame
    pub fn ptr_eq(a: &FrameRef, b: &FrameRef) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }
}

impl std::ops::Deref for FrameRef {
    type Target = Frame;

    fn deref(&self) -> &Frame {
        &self.0
    }
}

/// Non-owning observer of a frame
#[derive(Debug, Clone)]
pub struct WeakFrame {
    sequence: u64,
    inner: Weak<Frame>,
}

impl WeakFrame {
    /// Take a new reference.
    ///
    /// Fails with [`Error::FrameReleased`] if every strong handle is gone.
    pub fn add_ref(&self) -> Result<FrameRef> {
        self.inner
            .upgrade()
            .map(FrameRef)
            .ok_or(Error::FrameReleased(self.sequence))
    }

    /// Whether the frame has been freed
    pub fn is_released(&self) -> bool {
        self.inner.strong_count() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_frame() {
        let frame = Frame::new(7, 640, 480, Encoding::Jpeg, Bytes::from_static(b"\xff\xd8")).unwrap();

        assert_eq!(frame.sequence(), 7);
        assert_eq!(frame.width(), 640);
        assert_eq!(frame.height(), 480);
        assert_eq!(frame.encoding(), Encoding::Jpeg);
        assert_eq!(frame.ref_count(), 1);
        assert!(frame.annotation().is_none());
    }

    #[test]
    fn test_rejects_empty_payload() {
        let result = Frame::new(1, 640, 480, Encoding::Jpeg, Bytes::new());
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_rejects_zero_dimensions() {
        let result = Frame::new(1, 0, 480, Encoding::Bgra, Bytes::from_static(&[0; 4]));
        assert!(matches!(result, Err(Error::InvalidArgument(_))));

        let result = Frame::new(1, 640, 0, Encoding::Bgra, Bytes::from_static(&[0; 4]));
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_clone_and_drop_track_refcount() {
        let frame = Frame::new(1, 2, 2, Encoding::Bgra, Bytes::from(vec![0u8; 16])).unwrap();
        let second = frame.clone();
        assert_eq!(frame.ref_count(), 2);
        assert!(FrameRef::ptr_eq(&frame, &second));

        drop(second);
        assert_eq!(frame.ref_count(), 1);
    }

    #[test]
    fn test_add_ref_after_release_fails() {
        let frame = Frame::new(3, 2, 2, Encoding::Jpeg, Bytes::from_static(b"jpeg")).unwrap();
        let weak = frame.downgrade();

        let extra = weak.add_ref().unwrap();
        assert_eq!(extra.ref_count(), 2);
        drop(extra);
        drop(frame);

        assert!(weak.is_released());
        assert!(matches!(weak.add_ref(), Err(Error::FrameReleased(3))));
    }

    #[test]
    fn test_builder_sets_annotation() {
        let doc = serde_json::json!({ "detections": [] });
        let frame = Frame::builder(4, 4, Encoding::Jpeg, Bytes::from_static(b"data"))
            .sequence(9)
            .annotation(Some(doc.clone()))
            .build()
            .unwrap();

        assert_eq!(frame.sequence(), 9);
        assert_eq!(frame.annotation(), Some(&doc));
    }

    #[test]
    fn test_shared_across_threads() {
        let frame = Frame::new(1, 1, 1, Encoding::Jpeg, Bytes::from_static(b"x")).unwrap();
        let weak = frame.downgrade();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let f = frame.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        let tmp = f.clone();
                        assert_eq!(tmp.payload().as_ref(), b"x");
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(frame.ref_count(), 1);
        drop(frame);
        assert!(weak.is_released());
    }
}
