//! Frame sources.
//!
//! - `CameraSource`: a camera device. `stub://` devices produce synthetic
//!   frames; real devices need the `ingest-v4l2` feature.
//! - `StillImageSource`: a single image file, for one-shot analysis.
//!
//! Sources hand out owned `Frame`s. Nothing here writes frames to disk; that
//! only happens in the evidence recorder.

pub mod camera;
#[cfg(feature = "ingest-v4l2")]
mod normalize;
pub mod still;
#[cfg(feature = "ingest-v4l2")]
pub mod v4l2;

use anyhow::Result;

use crate::frame::Frame;

pub use camera::{CameraConfig, CameraSource};
pub use still::StillImageSource;

/// Anything that produces frames on demand.
pub trait FrameSource: Send {
    /// Open the underlying device. Failing here is fatal for the capture loop.
    fn connect(&mut self) -> Result<()>;

    /// Capture the next frame.
    fn next_frame(&mut self) -> Result<Frame>;

    fn is_healthy(&self) -> bool;

    fn stats(&self) -> SourceStats;
}

/// Statistics for a frame source.
#[derive(Clone, Debug)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub source: String,
}
