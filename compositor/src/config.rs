//! Compositor configuration, loaded from an optional YAML file.
//!
//! Every key is optional; missing keys take the defaults below.

use std::path::Path;

use anyhow::{ensure, Context, Result};
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct CompositorConfig {
    pub surface: SurfaceOptions,
    pub pointer: PointerOptions,
    pub scroll: ScrollOptions,
    pub background: BackgroundOptions,
    pub startup: StartupOptions,
}

/// The floating UI quad.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct SurfaceOptions {
    pub width_px: u32,
    pub height_px: u32,
    pub width_meters: f32,
    /// Distance in front of the reference-space origin.
    pub distance_meters: f32,
}

impl SurfaceOptions {
    /// Height in meters, following the pixel aspect ratio.
    pub fn height_meters(&self) -> f32 {
        self.width_meters * self.height_px as f32 / self.width_px.max(1) as f32
    }
}

impl Default for SurfaceOptions {
    fn default() -> Self {
        Self {
            width_px: 1280,
            height_px: 720,
            width_meters: 1.2,
            distance_meters: 1.2,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct PointerOptions {
    pub press_threshold: f32,
    pub release_threshold: f32,
    pub ray_min_length: f32,
    pub ray_fallback_length: f32,
    pub ray_thickness: f32,
    pub device_id: i32,
}

impl Default for PointerOptions {
    fn default() -> Self {
        Self {
            press_threshold: 0.75,
            release_threshold: 0.65,
            ray_min_length: 0.05,
            ray_fallback_length: 2.0,
            ray_thickness: 0.01,
            device_id: 1,
        }
    }
}

/// Thumbstick scroll tuning. The defaults are empirical.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ScrollOptions {
    pub axis_deadzone: f32,
    pub pixels_per_frame: f32,
    /// Deltas at or below this (in pixels, both axes) are not sent.
    pub delta_epsilon: f32,
}

impl Default for ScrollOptions {
    fn default() -> Self {
        Self {
            axis_deadzone: 0.2,
            pixels_per_frame: 24.0,
            delta_epsilon: 0.01,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct BackgroundOptions {
    pub texture_width: u32,
    pub texture_height: u32,
    pub ground_width_meters: f32,
    pub ground_depth_meters: f32,
    pub ground_height_meters: f32,
    /// Command applied at startup, e.g. `grid` or `dds|assets/sky.dds`.
    pub initial: String,
}

impl Default for BackgroundOptions {
    fn default() -> Self {
        Self {
            texture_width: 1024,
            texture_height: 1024,
            ground_width_meters: 8.0,
            ground_depth_meters: 8.0,
            ground_height_meters: -1.5,
            initial: "grid".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct StartupOptions {
    pub first_frame_timeout_ms: u64,
    /// Sleep between event polls while the session is not running.
    pub idle_poll_ms: u64,
}

impl Default for StartupOptions {
    fn default() -> Self {
        Self {
            first_frame_timeout_ms: 15_000,
            idle_poll_ms: 50,
        }
    }
}

impl CompositorConfig {
    pub fn from_yaml_str(s: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(s).context("invalid compositor configuration")?;
        config.validated()
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let s = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_yaml_str(&s)
    }

    /// Validate invariants serde defaults cannot express.
    pub fn validated(self) -> Result<Self> {
        let s = &self.surface;
        ensure!(
            s.width_px > 0 && s.height_px > 0,
            "surface.width-px and surface.height-px must be greater than zero"
        );
        ensure!(s.width_meters > 0.0, "surface.width-meters must be positive");
        ensure!(s.distance_meters > 0.0, "surface.distance-meters must be positive");

        let p = &self.pointer;
        ensure!(
            p.release_threshold < p.press_threshold,
            "pointer.release-threshold must be below pointer.press-threshold"
        );
        ensure!(
            p.press_threshold > 0.0 && p.press_threshold <= 1.0,
            "pointer.press-threshold must be in (0, 1]"
        );
        ensure!(
            p.ray_min_length > 0.0 && p.ray_min_length <= p.ray_fallback_length,
            "pointer.ray-min-length must be positive and not exceed pointer.ray-fallback-length"
        );
        ensure!(p.ray_thickness > 0.0, "pointer.ray-thickness must be positive");

        let sc = &self.scroll;
        ensure!(
            (0.0..1.0).contains(&sc.axis_deadzone),
            "scroll.axis-deadzone must be in [0, 1)"
        );
        ensure!(sc.pixels_per_frame > 0.0, "scroll.pixels-per-frame must be positive");
        ensure!(sc.delta_epsilon >= 0.0, "scroll.delta-epsilon must not be negative");

        let b = &self.background;
        ensure!(
            b.texture_width > 0 && b.texture_height > 0,
            "background.texture-width and background.texture-height must be greater than zero"
        );
        ensure!(
            b.ground_width_meters > 0.0 && b.ground_depth_meters > 0.0,
            "background ground size must be positive"
        );
        Ok(self)
    }
}
