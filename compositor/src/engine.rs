//! UI engine boundary.
//!
//! The engine is a black box: the compositor pushes synthesized pointer
//! events into it, and it calls back with rendered bitmaps and platform
//! messages through `EmbedderCallbacks`.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::Result;
use crate::vr::background::BackgroundConfig;
use crate::vr::handoff::FrameHandoff;

/// Platform channel carrying background commands.
pub const BACKGROUND_CHANNEL: &str = "xrpane/background";

/// Primary (trigger) button bit in `PointerEvent::buttons`.
pub const BUTTON_PRIMARY: i64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerPhase {
    Add,
    Hover,
    Down,
    Move,
    Up,
    Remove,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum PointerSignal {
    #[default]
    None,
    Scroll { dx: f64, dy: f64 },
}

/// Pointer event in surface pixel space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerEvent {
    pub phase: PointerPhase,
    pub x: f64,
    pub y: f64,
    pub device: i32,
    pub buttons: i64,
    pub signal: PointerSignal,
    pub timestamp_us: u64,
}

impl PointerEvent {
    pub fn is_scroll(&self) -> bool {
        matches!(self.signal, PointerSignal::Scroll { .. })
    }
}

/// Calls from the compositor into the engine.
pub trait UiEngine {
    fn send_pointer_event(&mut self, event: &PointerEvent) -> Result<()>;

    /// Stop the engine. Best effort.
    fn shutdown(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Answers one platform message. Used at most once.
pub trait PlatformResponder {
    fn respond(&mut self, payload: &[u8]) -> Result<()>;
}

/// Calls from the engine into the compositor. May arrive on the engine's
/// render thread.
pub trait EmbedderCallbacks: Send + Sync {
    /// A new bitmap is ready: tightly or loosely packed RGBA rows.
    /// Returns `false` if the bitmap was rejected.
    fn on_surface_present(&self, pixels: &[u8], row_bytes: usize, height: usize) -> bool;

    fn on_platform_message(&self, channel: &str, payload: &[u8], responder: &mut dyn PlatformResponder);
}

/// Callback sink registered with the engine at startup.
pub struct EngineBridge {
    surface: Arc<FrameHandoff>,
    background: Arc<BackgroundConfig>,
}

impl EngineBridge {
    pub fn new(surface: Arc<FrameHandoff>, background: Arc<BackgroundConfig>) -> Self {
        Self { surface, background }
    }
}

impl EmbedderCallbacks for EngineBridge {
    fn on_surface_present(&self, pixels: &[u8], row_bytes: usize, height: usize) -> bool {
        let width = row_bytes / 4;
        self.surface.publish(pixels, row_bytes, width, height).is_some()
    }

    fn on_platform_message(&self, channel: &str, payload: &[u8], responder: &mut dyn PlatformResponder) {
        let reply = if channel == BACKGROUND_CHANNEL {
            let command = String::from_utf8_lossy(payload);
            let reply = self.background.handle_command(&command);
            debug!("Background command {:?} -> {}", command, reply);
            reply
        } else {
            String::new()
        };

        if let Err(e) = responder.respond(reply.as_bytes()) {
            warn!("Failed to answer platform message on {}: {}", channel, e);
        }
    }
}
