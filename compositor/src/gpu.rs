//! GPU boundary: texture updates and copies against pre-allocated,
//! fixed-size textures. Device and swapchain lifecycle live elsewhere.

use crate::error::Result;
use crate::runtime::SwapchainId;
use crate::vr::texture::TextureFormat;

/// The fixed set of textures the compositor writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureId {
    /// UI surface bitmap.
    Ui,
    /// Ground/background texture.
    Background,
    /// Pointer ray strip, shared by both hands.
    PointerRay,
}

impl TextureId {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ui => "ui",
            Self::Background => "background",
            Self::PointerRay => "pointer-ray",
        }
    }
}

/// Sub-rectangle of a texture, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

pub trait GpuDevice {
    /// Colour format shared by all textures and swapchains.
    fn color_format(&self) -> TextureFormat;

    /// Upload bytes into `texture`. `region == None` means the full texture.
    fn update_texture(
        &mut self,
        texture: TextureId,
        region: Option<TextureRegion>,
        data: &[u8],
        row_pitch: usize,
    ) -> Result<()>;

    /// Copy a texture into an acquired swapchain image.
    fn copy_to_swapchain(&mut self, texture: TextureId, swapchain: SwapchainId, image_index: u32) -> Result<()>;

    /// Submit queued work.
    fn flush(&mut self) -> Result<()>;
}
