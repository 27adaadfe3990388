//! Media handling for published frames
//!
//! This module provides:
//! - JPEG header probing for frame dimensions

pub mod jpeg;

pub use jpeg::{probe_dimensions, Dimensions};
