//! Single image file source.

use anyhow::{anyhow, Context, Result};
use image::RgbImage;
use std::path::{Path, PathBuf};

use super::{FrameSource, SourceStats};
use crate::frame::Frame;

/// Serves one decoded image file as a frame, as often as asked.
pub struct StillImageSource {
    path: PathBuf,
    image: Option<RgbImage>,
    frames_served: u64,
}

impl StillImageSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            image: None,
            frames_served: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FrameSource for StillImageSource {
    fn connect(&mut self) -> Result<()> {
        let bytes = std::fs::read(&self.path)
            .with_context(|| format!("could not read image file {}", self.path.display()))?;
        let image = image::load_from_memory(&bytes)
            .with_context(|| format!("could not decode image file {}", self.path.display()))?;
        let image = image.into_rgb8();
        log::info!(
            "StillImageSource: loaded {} ({}x{})",
            self.path.display(),
            image.width(),
            image.height()
        );
        self.image = Some(image);
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Frame> {
        let image = self
            .image
            .as_ref()
            .ok_or_else(|| anyhow!("image {} not loaded; call connect() first", self.path.display()))?;
        self.frames_served += 1;
        Ok(Frame::from_image(image.clone()))
    }

    fn is_healthy(&self) -> bool {
        self.image.is_some()
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frames_served,
            source: self.path.display().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_png_from_disk() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("scene.png");
        RgbImage::from_pixel(12, 8, image::Rgb([10, 20, 30])).save(&path)?;

        let mut source = StillImageSource::new(&path);
        assert!(source.next_frame().is_err());
        source.connect()?;
        let frame = source.next_frame()?;
        assert_eq!((frame.width(), frame.height()), (12, 8));
        assert_eq!(source.stats().frames_captured, 1);
        Ok(())
    }

    #[test]
    fn missing_file_fails_connect() {
        let mut source = StillImageSource::new("/nonexistent/scene.jpg");
        let err = source.connect().unwrap_err();
        assert!(err.to_string().contains("could not read image file"));
        assert!(!source.is_healthy());
    }
}
