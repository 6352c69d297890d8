//! Frames and the latest-frame hub.
//!
//! - `Frame`: one captured RGB image plus its capture time.
//! - `FrameHub`: single-slot holder of the most recent frame. The capture loop
//!   publishes into it; the video stream and the analysis dispatcher read from it.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Local};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::RgbImage;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

/// One captured frame (packed RGB24).
pub struct Frame {
    image: RgbImage,
    /// Wall-clock capture time.
    pub captured_at: DateTime<Local>,
}

impl Frame {
    /// Wrap packed RGB24 pixels. The buffer length must match the dimensions.
    pub fn from_rgb(pixels: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        let expected = width
            .checked_mul(height)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))? as usize;
        if pixels.len() != expected {
            return Err(anyhow!(
                "RGB frame length mismatch: expected {}, got {}",
                expected,
                pixels.len()
            ));
        }
        let image = RgbImage::from_raw(width, height, pixels)
            .ok_or_else(|| anyhow!("invalid {}x{} RGB frame", width, height))?;
        Ok(Self::from_image(image))
    }

    pub fn from_image(image: RgbImage) -> Self {
        Self {
            image,
            captured_at: Local::now(),
        }
    }

    /// Decode an encoded image (JPEG or PNG).
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let image = image::load_from_memory(bytes).context("decode image")?;
        Ok(Self::from_image(image.into_rgb8()))
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    /// Scale to `target_width`, keeping the aspect ratio. The height is
    /// truncated and never below one pixel. Upscales narrower frames.
    pub fn resized(&self, target_width: u32) -> Result<Frame> {
        if target_width == 0 {
            return Err(anyhow!("target width must be greater than zero"));
        }
        if self.width() == 0 || self.height() == 0 {
            return Err(anyhow!("cannot resize an empty frame"));
        }
        let target_height = resized_height(self.width(), self.height(), target_width);
        let image = image::imageops::resize(
            &self.image,
            target_width,
            target_height,
            FilterType::Triangle,
        );
        Ok(Frame {
            image,
            captured_at: self.captured_at,
        })
    }

    /// Encode as JPEG with the given quality (1..=100).
    pub fn to_jpeg(&self, quality: u8) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100));
        encoder
            .encode_image(&self.image)
            .context("encode jpeg")?;
        Ok(out)
    }
}

/// Height that keeps the aspect ratio at `target_width`.
pub fn resized_height(width: u32, height: u32, target_width: u32) -> u32 {
    let scaled = target_width as u64 * height as u64 / width.max(1) as u64;
    (scaled.min(u32::MAX as u64) as u32).max(1)
}

// ----------------------------------------------------------------------------
// FrameHub: latest-frame slot
// ----------------------------------------------------------------------------

struct HubSlot {
    seq: u64,
    frame: Option<Arc<Frame>>,
    jpeg: Option<(u64, Arc<Vec<u8>>)>,
    closed: bool,
}

/// Holds the most recent frame. Older frames are dropped, never queued.
pub struct FrameHub {
    slot: Mutex<HubSlot>,
    changed: Condvar,
    jpeg_quality: u8,
}

impl FrameHub {
    pub fn new(jpeg_quality: u8) -> Self {
        Self {
            slot: Mutex::new(HubSlot {
                seq: 0,
                frame: None,
                jpeg: None,
                closed: false,
            }),
            changed: Condvar::new(),
            jpeg_quality,
        }
    }

    /// Replace the latest frame and wake any waiting readers.
    pub fn publish(&self, frame: Arc<Frame>) {
        if let Ok(mut slot) = self.slot.lock() {
            slot.seq += 1;
            slot.frame = Some(frame);
            self.changed.notify_all();
        }
    }

    /// Latest frame and its sequence number.
    pub fn latest(&self) -> Option<(u64, Arc<Frame>)> {
        let slot = self.slot.lock().ok()?;
        slot.frame.clone().map(|frame| (slot.seq, frame))
    }

    /// Block until a frame newer than `after` is published, the hub is closed,
    /// or `timeout` passes. Returns `None` on close or timeout.
    pub fn wait_newer(&self, after: u64, timeout: Duration) -> Option<(u64, Arc<Frame>)> {
        let slot = self.slot.lock().ok()?;
        let (slot, _) = self
            .changed
            .wait_timeout_while(slot, timeout, |slot| slot.seq <= after && !slot.closed)
            .ok()?;
        if slot.closed || slot.seq <= after {
            return None;
        }
        slot.frame.clone().map(|frame| (slot.seq, frame))
    }

    /// JPEG of the frame with sequence `seq`, encoded once and shared by all
    /// readers of that frame.
    pub fn jpeg_for(&self, seq: u64, frame: &Frame) -> Result<Arc<Vec<u8>>> {
        {
            let slot = self
                .slot
                .lock()
                .map_err(|_| anyhow!("frame hub lock poisoned"))?;
            if let Some((cached_seq, jpeg)) = &slot.jpeg {
                if *cached_seq == seq {
                    return Ok(jpeg.clone());
                }
            }
        }
        let jpeg = Arc::new(frame.to_jpeg(self.jpeg_quality)?);
        let mut slot = self
            .slot
            .lock()
            .map_err(|_| anyhow!("frame hub lock poisoned"))?;
        if slot.jpeg.as_ref().map_or(true, |(cached, _)| *cached < seq) {
            slot.jpeg = Some((seq, jpeg.clone()));
        }
        Ok(jpeg)
    }

    /// Wake all readers and refuse further waits.
    pub fn close(&self) {
        if let Ok(mut slot) = self.slot.lock() {
            slot.closed = true;
            self.changed.notify_all();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.slot.lock().map(|slot| slot.closed).unwrap_or(true)
    }
}

impl Default for FrameHub {
    fn default() -> Self {
        Self::new(80)
    }
}
