//! Texture formats, channel reordering, and the UI-surface upload path.
//!
//! Pipeline: UI engine bitmap -> `FrameHandoff` -> snapshot -> (BGRA swizzle)
//! -> sub-rectangle upload into the pre-allocated UI texture.

use tracing::{debug, trace};

use super::handoff::{FrameConsumer, FrameHandoff};
use crate::error::Result;
use crate::gpu::{GpuDevice, TextureId, TextureRegion};

/// Colour layout of the swapchain/texture the GPU boundary selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureFormat {
    Rgba8,
    Bgra8,
}

impl TextureFormat {
    pub fn is_bgra(&self) -> bool {
        matches!(self, Self::Bgra8)
    }

    /// Bytes of one pixel in this format's memory order.
    pub fn pack(&self, r: u8, g: u8, b: u8, a: u8) -> [u8; 4] {
        match self {
            Self::Rgba8 => [r, g, b, a],
            Self::Bgra8 => [b, g, r, a],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rgba8 => "rgba8",
            Self::Bgra8 => "bgra8",
        }
    }
}

/// Fill a tightly packed `width` x `height` buffer with one colour.
pub fn solid_pixels(format: TextureFormat, width: usize, height: usize, rgba: [u8; 4]) -> Vec<u8> {
    let px = format.pack(rgba[0], rgba[1], rgba[2], rgba[3]);
    px.repeat(width * height)
}

/// Swap the R and B channels of a row-major bitmap into `out`, dropping any
/// row padding. `out` is resized, not reallocated, when already large enough.
///
/// Returns `false` (leaving `out` untouched) for an empty or inconsistent
/// source description.
pub fn swap_red_blue(source: &[u8], row_bytes: usize, width: usize, height: usize, out: &mut Vec<u8>) -> bool {
    if width == 0 || height == 0 || row_bytes < width * 4 {
        return false;
    }
    let needed = match row_bytes.checked_mul(height - 1).and_then(|n| n.checked_add(width * 4)) {
        Some(n) => n,
        None => return false,
    };
    if source.len() < needed {
        return false;
    }

    out.resize(width * height * 4, 0);
    for (y, dst_row) in out.chunks_exact_mut(width * 4).enumerate() {
        let src_row = &source[y * row_bytes..y * row_bytes + width * 4];
        for (dst, src) in dst_row.chunks_exact_mut(4).zip(src_row.chunks_exact(4)) {
            dst[0] = src[2];
            dst[1] = src[1];
            dst[2] = src[0];
            dst[3] = src[3];
        }
    }
    true
}

/// Uploads the newest UI bitmap into the UI texture, at most once per
/// published version.
pub struct UiTextureUploader {
    consumer: FrameConsumer,
    format: TextureFormat,
    max_width: usize,
    max_height: usize,
    converted: Vec<u8>,
}

impl UiTextureUploader {
    pub fn new(format: TextureFormat, max_width: usize, max_height: usize) -> Self {
        debug!(
            "UI texture uploader: {}x{} {}",
            max_width,
            max_height,
            format.as_str()
        );
        Self {
            consumer: FrameConsumer::new(),
            format,
            max_width,
            max_height,
            converted: Vec::new(),
        }
    }

    /// Last version committed to the GPU.
    pub fn uploaded_version(&self) -> u64 {
        self.consumer.uploaded_version()
    }

    /// Returns `Ok(true)` if a new frame was uploaded, `Ok(false)` if there
    /// was nothing new (or the snapshot was unusable).
    pub fn upload_latest(&mut self, handoff: &FrameHandoff, gpu: &mut dyn GpuDevice) -> Result<bool> {
        let Some(frame) = self.consumer.consume(handoff) else {
            return Ok(false);
        };

        if frame.width == 0 || frame.height == 0 || frame.row_bytes < frame.width * 4 || frame.pixels.is_empty() {
            return Ok(false);
        }

        let width = frame.width.min(self.max_width);
        let height = frame.height.min(self.max_height);
        let version = frame.version;

        let (data, row_pitch) = if self.format.is_bgra() {
            if !swap_red_blue(&frame.pixels, frame.row_bytes, width, height, &mut self.converted) {
                return Ok(false);
            }
            (self.converted.as_slice(), width * 4)
        } else {
            (frame.pixels.as_slice(), frame.row_bytes)
        };

        let region = TextureRegion {
            x: 0,
            y: 0,
            width: width as u32,
            height: height as u32,
        };
        gpu.update_texture(TextureId::Ui, Some(region), data, row_pitch)?;
        self.consumer.mark_uploaded(version);
        trace!("UI texture: uploaded version {} ({}x{})", version, width, height);
        Ok(true)
    }
}
