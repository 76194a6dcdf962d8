//! Scripted controller input for the headless backend.
//!
//! Provides the `InputEvent` enum and the `InputProvider` trait so the
//! binary and integration tests can drive hand poses, the trigger,
//! thumbsticks, and session focus through one deterministic sequence.
//! `Frame` markers split the script into displayed frames.

use std::collections::VecDeque;
use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

use crate::runtime::Hand;
use crate::vr::geometry::{Pose, Quat, Vec3};

/// One scripted input step.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum InputEvent {
    /// Hold `hand` at `position`, pointing at `target` (meters).
    Aim {
        hand: Hand,
        position: [f32; 3],
        target: [f32; 3],
    },
    /// Raw aim pose; `orientation` is `[x, y, z, w]`.
    Pose {
        hand: Hand,
        position: [f32; 3],
        orientation: [f32; 4],
    },
    /// Tracking lost for `hand`.
    HandLost { hand: Hand },
    /// Right-hand trigger value in `[0, 1]`.
    Trigger { value: f32 },
    /// Trigger action unbound / inactive.
    TriggerInactive,
    /// Thumbstick vector for `hand`.
    Scroll { hand: Hand, x: f32, y: f32 },
    /// Thumbstick released (action inactive).
    ScrollInactive { hand: Hand },
    /// Session focus gained or lost.
    Focus { focused: bool },
    /// Display one frame with the current state.
    Frame,
    /// Let `ms` milliseconds of display time pass.
    Wait { ms: u64 },
}

impl InputEvent {
    /// Aim from a standing position toward a point on the default surface.
    pub fn aim(hand: Hand, target: [f32; 3]) -> Self {
        let x = match hand {
            Hand::Left => -0.2,
            Hand::Right => 0.2,
        };
        Self::Aim {
            hand,
            position: [x, -0.3, 0.0],
            target,
        }
    }

    /// Resolve `Aim`/`Pose` to a pose; `None` for other steps.
    pub fn pose(&self) -> Option<(Hand, Pose)> {
        match *self {
            Self::Aim { hand, position, target } => {
                let origin = Vec3::new(position[0], position[1], position[2]);
                let target = Vec3::new(target[0], target[1], target[2]);
                Some((hand, Pose::looking_at(origin, target)))
            }
            Self::Pose {
                hand,
                position,
                orientation,
            } => {
                let [x, y, z, w] = orientation;
                Some((
                    hand,
                    Pose::new(
                        Vec3::new(position[0], position[1], position[2]),
                        Quat::new(x, y, z, w).normalized(),
                    ),
                ))
            }
            _ => None,
        }
    }

    pub fn wait_duration(&self) -> Option<Duration> {
        match self {
            Self::Wait { ms } => Some(Duration::from_millis(*ms)),
            _ => None,
        }
    }
}

/// Trait for providing input events to the headless runtime.
pub trait InputProvider: Send {
    /// Get the next input event, if any.
    fn next_event(&mut self) -> Option<InputEvent>;
    /// Whether there are more events to deliver.
    fn has_events(&self) -> bool;
}

/// Delivers events from a pre-defined queue.
pub struct ScriptedInputProvider {
    events: VecDeque<InputEvent>,
}

impl ScriptedInputProvider {
    pub fn new(events: Vec<InputEvent>) -> Self {
        Self {
            events: VecDeque::from(events),
        }
    }

    /// Parse a YAML list of steps.
    pub fn from_yaml_str(s: &str) -> anyhow::Result<Self> {
        let events: Vec<InputEvent> = serde_yaml::from_str(s).context("invalid input script")?;
        Ok(Self::new(events))
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let s = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read input script {}", path.display()))?;
        Self::from_yaml_str(&s)
    }

    /// Built-in demo: aim, press, drag, release, then scroll with the left
    /// stick while the right hand points at the surface.
    pub fn demo() -> Self {
        let mut events = vec![InputEvent::aim(Hand::Right, [0.0, 0.0, -1.2])];
        events.extend(std::iter::repeat(InputEvent::Frame).take(3));

        events.push(InputEvent::Trigger { value: 0.9 });
        events.push(InputEvent::Frame);
        for step in 1..=10 {
            let x = step as f32 * 0.03;
            events.push(InputEvent::aim(Hand::Right, [x, 0.0, -1.2]));
            events.push(InputEvent::Frame);
        }
        events.push(InputEvent::Trigger { value: 0.2 });
        events.push(InputEvent::Frame);

        events.push(InputEvent::aim(Hand::Left, [-0.3, 0.1, -1.2]));
        events.push(InputEvent::Scroll {
            hand: Hand::Left,
            x: 0.0,
            y: 0.8,
        });
        events.extend(std::iter::repeat(InputEvent::Frame).take(10));
        events.push(InputEvent::ScrollInactive { hand: Hand::Left });
        events.push(InputEvent::Frame);
        Self::new(events)
    }

    /// Number of remaining events.
    pub fn remaining(&self) -> usize {
        self.events.len()
    }
}

impl InputProvider for ScriptedInputProvider {
    fn next_event(&mut self) -> Option<InputEvent> {
        self.events.pop_front()
    }

    fn has_events(&self) -> bool {
        !self.events.is_empty()
    }
}

/// A recording wrapper that keeps every event drawn from an inner provider.
pub struct RecordingProvider<P: InputProvider> {
    inner: P,
    recorded: Vec<InputEvent>,
}

impl<P: InputProvider> RecordingProvider<P> {
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            recorded: Vec::new(),
        }
    }

    pub fn recorded(&self) -> &[InputEvent] {
        &self.recorded
    }

    pub fn into_recorded(self) -> Vec<InputEvent> {
        self.recorded
    }
}

impl<P: InputProvider> InputProvider for RecordingProvider<P> {
    fn next_event(&mut self) -> Option<InputEvent> {
        let event = self.inner.next_event()?;
        self.recorded.push(event.clone());
        Some(event)
    }

    fn has_events(&self) -> bool {
        self.inner.has_events()
    }
}
