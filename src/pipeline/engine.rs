//! AI engine collaborator interface

use crate::registry::{Annotation, Encoding};

/// Error returned by an AI engine
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    /// Engine could not be reached
    #[error("engine unavailable: {0}")]
    Unavailable(String),
    /// Engine refused the frame
    #[error("engine rejected frame: {0}")]
    Rejected(String),
    /// Engine answered with something that is not an annotation document
    #[error("invalid engine response: {0}")]
    InvalidResponse(String),
}

/// Synchronous inference backend
///
/// Only ever called from a pipeline's annotate thread, one frame at a time.
pub trait AiEngine: Send + 'static {
    /// Run inference on one encoded frame and return its annotation document.
    fn predict(&mut self, frame: &[u8], encoding: Encoding) -> Result<Annotation, EngineError>;
}

impl<F> AiEngine for F
where
    F: FnMut(&[u8], Encoding) -> Result<Annotation, EngineError> + Send + 'static,
{
    fn predict(&mut self, frame: &[u8], encoding: Encoding) -> Result<Annotation, EngineError> {
        self(frame, encoding)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_closure_engine() {
        let mut calls = 0;
        let mut engine = move |frame: &[u8], _: Encoding| {
            calls += 1;
            Ok(json!({ "bytes": frame.len(), "calls": calls }))
        };

        let doc = AiEngine::predict(&mut engine, b"abc", Encoding::Jpeg).unwrap();
        assert_eq!(doc["bytes"], 3);
        assert_eq!(doc["calls"], 1);
    }

    #[test]
    fn test_engine_error_display() {
        let err = EngineError::Unavailable("connection refused".into());
        assert_eq!(err.to_string(), "engine unavailable: connection refused");
    }
}
