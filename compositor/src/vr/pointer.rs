//! Controller ray -> surface pixel coordinates.
//!
//! Each poll, every hand's aim pose becomes a world-space ray that is
//! intersected with the UI quad. Tracking loss and off-surface rays are
//! ordinary outcomes, reported through the sample flags.

use tracing::trace;

use super::geometry::{intersect_ray_with_quad, Pose, Quat, Vec3};
use crate::config::{PointerOptions, SurfaceOptions};
use crate::error::Result;
use crate::runtime::{Hand, XrRuntime};

/// Rotates the ray quad (a strip along local +X) so it lies along the
/// controller's forward (-Z) axis.
pub const RAY_ALIGNMENT: Quat = Quat {
    x: 0.0,
    y: -0.707_106_77,
    z: 0.0,
    w: 0.707_106_77,
};

// ── Surface ──────────────────────────────────────────────────

/// The fixed UI quad: pose and size in meters, resolution in pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Surface {
    pub pose: Pose,
    pub width_m: f32,
    pub height_m: f32,
    pub width_px: u32,
    pub height_px: u32,
}

impl Surface {
    /// Quad centered `distance` meters in front of the reference origin,
    /// facing back toward it.
    pub fn in_front(width_m: f32, height_m: f32, distance: f32, width_px: u32, height_px: u32) -> Self {
        Self {
            pose: Pose::at(0.0, 0.0, -distance),
            width_m,
            height_m,
            width_px,
            height_px,
        }
    }

    pub fn from_options(opts: &SurfaceOptions) -> Self {
        Self::in_front(
            opts.width_meters,
            opts.height_meters(),
            opts.distance_meters,
            opts.width_px,
            opts.height_px,
        )
    }

    pub fn center_px(&self) -> (f64, f64) {
        (self.width_px as f64 * 0.5, self.height_px as f64 * 0.5)
    }
}

// ── Pointer sample ───────────────────────────────────────────

/// One hand's pointer state for one poll.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerSample {
    pub has_pose: bool,
    pub ray_origin: Vec3,
    pub ray_direction: Vec3,
    pub orientation: Quat,
    pub on_surface: bool,
    pub hit_distance: f32,
    pub x: f64,
    pub y: f64,
}

impl PointerSample {
    /// No pose: tracking lost or controller absent.
    pub fn untracked(surface: &Surface) -> Self {
        let (x, y) = surface.center_px();
        Self {
            has_pose: false,
            ray_origin: Vec3::ZERO,
            ray_direction: Vec3::FORWARD,
            orientation: Quat::IDENTITY,
            on_surface: false,
            hit_distance: 0.0,
            x,
            y,
        }
    }

    /// Build a sample from a located pose.
    pub fn from_pose(pose: &Pose, surface: &Surface) -> Self {
        let direction = pose.orientation.rotate(Vec3::FORWARD).normalize();
        let mut sample = Self {
            has_pose: true,
            ray_origin: pose.position,
            ray_direction: direction,
            orientation: pose.orientation,
            ..Self::untracked(surface)
        };

        if let Some(hit) =
            intersect_ray_with_quad(pose.position, direction, &surface.pose, surface.width_m, surface.height_m)
        {
            let w = surface.width_px as f64;
            let h = surface.height_px as f64;
            sample.on_surface = true;
            sample.hit_distance = hit.distance;
            sample.x = (hit.u.clamp(0.0, 1.0) * w).clamp(0.0, (w - 1.0).max(0.0));
            sample.y = (hit.v.clamp(0.0, 1.0) * h).clamp(0.0, (h - 1.0).max(0.0));
        }
        sample
    }
}

/// Query one hand's pointer against the surface.
///
/// Only a failing pose-action query is an error. An inactive pose action,
/// a failed locate, or missing validity flags yield an untracked sample.
pub fn query_pointer_hit<R: XrRuntime + ?Sized>(
    runtime: &mut R,
    hand: Hand,
    display_time: i64,
    surface: &Surface,
) -> Result<PointerSample> {
    if !runtime.pose_active(hand)? {
        return Ok(PointerSample::untracked(surface));
    }

    let location = match runtime.locate_hand(hand, display_time) {
        Ok(location) => location,
        Err(e) => {
            trace!("Pointer {}: locate failed: {}", hand.as_str(), e);
            return Ok(PointerSample::untracked(surface));
        }
    };
    if !location.is_valid() {
        return Ok(PointerSample::untracked(surface));
    }

    Ok(PointerSample::from_pose(&location.pose, surface))
}

// ── Ray visual ───────────────────────────────────────────────

/// Visual ray indicator for one hand.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayVisual {
    pub visible: bool,
    pub length: f32,
    pub pose: Pose,
}

impl Default for RayVisual {
    fn default() -> Self {
        Self {
            visible: false,
            length: 0.0,
            pose: Pose::default(),
        }
    }
}

impl RayVisual {
    /// Refresh from this poll's sample. The quad is centered half a
    /// length along the ray so it starts at the controller.
    pub fn update(&mut self, sample: &PointerSample, opts: &PointerOptions) {
        if !sample.has_pose {
            self.visible = false;
            return;
        }

        let length = if sample.on_surface {
            sample.hit_distance.clamp(opts.ray_min_length, opts.ray_fallback_length)
        } else {
            opts.ray_fallback_length
        };
        self.length = length;
        self.pose = Pose::new(
            sample.ray_origin.add(sample.ray_direction.scale(length * 0.5)),
            sample.orientation.mul(RAY_ALIGNMENT),
        );
        self.visible = true;
    }

    pub fn hide(&mut self) {
        self.visible = false;
    }
}
