//! Quad composition layers submitted to the runtime each frame.
//!
//! Back-to-front order: background, UI quad, right ray, left ray. A frame
//! carries between zero and four layers.

use std::f32::consts::FRAC_PI_2;

use super::geometry::{Pose, Quat, Vec3};
use super::pointer::{RayVisual, Surface};
use super::texture::{solid_pixels, TextureFormat};
use crate::config::BackgroundOptions;
use crate::runtime::{Hand, SwapchainId};

/// Pointer ray strip texture size.
pub const RAY_TEXTURE_WIDTH: u32 = 256;
pub const RAY_TEXTURE_HEIGHT: u32 = 8;
/// RGBA colour of the ray strip.
pub const RAY_COLOR: [u8; 4] = [100, 220, 255, 230];
/// RGBA fill of the UI texture before the first bitmap arrives.
pub const UI_CLEAR_COLOR: [u8; 4] = [16, 16, 16, 255];

/// Distance of the ground quad's centre in front of the origin.
const GROUND_FORWARD_OFFSET: f32 = -1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerKind {
    Background,
    Ui,
    PointerRay(Hand),
}

/// Pixel sub-rectangle of a swapchain image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageRect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl ImageRect {
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            x: 0,
            y: 0,
            width: width as i32,
            height: height as i32,
        }
    }
}

/// One world-locked quad layer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompositionLayer {
    pub kind: LayerKind,
    pub swapchain: SwapchainId,
    pub pose: Pose,
    pub width_m: f32,
    pub height_m: f32,
    pub image_rect: ImageRect,
}

/// Lies flat at ground height: the quad's +Y turns into -Z.
pub fn ground_pose(opts: &BackgroundOptions) -> Pose {
    Pose::new(
        Vec3::new(0.0, opts.ground_height_meters, GROUND_FORWARD_OFFSET),
        Quat::from_axis_angle(Vec3::new(1.0, 0.0, 0.0), -FRAC_PI_2),
    )
}

pub fn background_layer(opts: &BackgroundOptions) -> CompositionLayer {
    CompositionLayer {
        kind: LayerKind::Background,
        swapchain: SwapchainId::Background,
        pose: ground_pose(opts),
        width_m: opts.ground_width_meters,
        height_m: opts.ground_depth_meters,
        image_rect: ImageRect::full(opts.texture_width, opts.texture_height),
    }
}

pub fn ui_layer(surface: &Surface) -> CompositionLayer {
    CompositionLayer {
        kind: LayerKind::Ui,
        swapchain: SwapchainId::Ui,
        pose: surface.pose,
        width_m: surface.width_m,
        height_m: surface.height_m,
        image_rect: ImageRect::full(surface.width_px, surface.height_px),
    }
}

/// Layer for a visible ray, `None` when hidden.
pub fn ray_layer(hand: Hand, ray: &RayVisual, thickness: f32) -> Option<CompositionLayer> {
    if !ray.visible {
        return None;
    }
    Some(CompositionLayer {
        kind: LayerKind::PointerRay(hand),
        swapchain: SwapchainId::PointerRay,
        pose: ray.pose,
        width_m: ray.length,
        height_m: thickness,
        image_rect: ImageRect::full(RAY_TEXTURE_WIDTH, RAY_TEXTURE_HEIGHT),
    })
}

/// Solid strip uploaded once at startup.
pub fn ray_texture_pixels(format: TextureFormat) -> Vec<u8> {
    solid_pixels(
        format,
        RAY_TEXTURE_WIDTH as usize,
        RAY_TEXTURE_HEIGHT as usize,
        RAY_COLOR,
    )
}
