//! XR runtime boundary.
//!
//! Instance/session bring-up and swapchain allocation happen before an
//! `XrRuntime` is handed to the compositor. The compositor only drives the
//! session lifecycle, frame pacing, action queries, and layer submission.

use serde::Deserialize;

use crate::error::Result;
use crate::vr::geometry::{Pose, Vec2};
use crate::vr::layers::CompositionLayer;

/// Tracked hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Hand {
    Left,
    Right,
}

impl Hand {
    pub const BOTH: [Hand; 2] = [Hand::Left, Hand::Right];

    pub fn other(&self) -> Hand {
        match self {
            Self::Left => Self::Right,
            Self::Right => Self::Left,
        }
    }

    pub fn index(&self) -> usize {
        match self {
            Self::Left => 0,
            Self::Right => 1,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Right => "right",
        }
    }
}

/// Session lifecycle states reported by the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Ready,
    Synchronized,
    Visible,
    Focused,
    Stopping,
    LossPending,
    Exiting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    StateChanged(SessionState),
    InstanceLossPending,
    EventsLost(u32),
}

/// Result of waiting for the next display cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameState {
    /// Predicted display time, in runtime nanoseconds.
    pub predicted_display_time: i64,
    pub should_render: bool,
}

/// A located pose plus the runtime's validity flags.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpaceLocation {
    pub pose: Pose,
    pub position_valid: bool,
    pub orientation_valid: bool,
}

impl SpaceLocation {
    pub fn is_valid(&self) -> bool {
        self.position_valid && self.orientation_valid
    }
}

/// Current state of an input action.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ActionState<T> {
    pub is_active: bool,
    pub current: T,
}

impl<T: Default> ActionState<T> {
    pub fn inactive() -> Self {
        Self {
            is_active: false,
            current: T::default(),
        }
    }
}

impl<T> ActionState<T> {
    pub fn active(current: T) -> Self {
        Self {
            is_active: true,
            current,
        }
    }
}

/// Runtime-owned image sets, one per composited texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SwapchainId {
    Ui,
    Background,
    PointerRay,
}

pub trait XrRuntime {
    /// Next pending session event, if any.
    fn poll_event(&mut self) -> Result<Option<SessionEvent>>;

    fn begin_session(&mut self) -> Result<()>;

    fn end_session(&mut self) -> Result<()>;

    /// Ask the runtime to wind the session down (it answers with Stopping).
    fn request_exit(&mut self) -> Result<()>;

    /// Block until the next frame should be produced.
    fn wait_frame(&mut self) -> Result<FrameState>;

    fn begin_frame(&mut self) -> Result<()>;

    /// Submit layers, back to front.
    fn end_frame(&mut self, display_time: i64, layers: &[CompositionLayer]) -> Result<()>;

    fn sync_actions(&mut self) -> Result<()>;

    /// Whether the hand's pose action is bound and tracking.
    fn pose_active(&mut self, hand: Hand) -> Result<bool>;

    /// Locate the hand's aim pose in the reference space.
    fn locate_hand(&mut self, hand: Hand, display_time: i64) -> Result<SpaceLocation>;

    /// Right-hand trigger value in `[0, 1]`.
    fn trigger_state(&mut self) -> Result<ActionState<f32>>;

    /// Thumbstick vector for one hand, each axis in `[-1, 1]`.
    fn scroll_state(&mut self, hand: Hand) -> Result<ActionState<Vec2>>;

    fn acquire_swapchain_image(&mut self, swapchain: SwapchainId) -> Result<u32>;

    fn release_swapchain_image(&mut self, swapchain: SwapchainId) -> Result<()>;

    /// Destroy action spaces, swapchains, and the session. Called once.
    fn teardown(&mut self) -> Result<()> {
        Ok(())
    }
}
