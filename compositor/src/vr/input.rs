//! Controller input -> UI pointer events.
//!
//! Once per displayed frame the state machine samples both hands, the
//! right-hand trigger, and both thumbsticks, then emits add/hover/down/
//! move/up/remove events to the UI engine. Implicit states:
//!
//! - Idle: pointer not added
//! - Hovering: added, not down
//! - Dragging: added and down
//!
//! The pointer is added lazily, on the first press or scroll that lands on
//! the surface.

use std::sync::Arc;

use tracing::{debug, info, trace, warn};

use super::geometry::Vec2;
use super::pointer::{query_pointer_hit, PointerSample, RayVisual, Surface};
use crate::clock::Clock;
use crate::config::{PointerOptions, ScrollOptions};
use crate::engine::{PointerEvent, PointerPhase, PointerSignal, UiEngine, BUTTON_PRIMARY};
use crate::error::Result;
use crate::runtime::{ActionState, Hand, XrRuntime};

/// Rescale an axis value so `[deadzone, 1]` maps continuously onto `[0, 1]`,
/// keeping the sign. Values inside the deadzone become 0.
pub fn apply_axis_deadzone(value: f32, deadzone: f32) -> f32 {
    let magnitude = value.abs();
    if magnitude <= deadzone {
        return 0.0;
    }
    let normalized = ((magnitude - deadzone) / (1.0 - deadzone)).clamp(0.0, 1.0);
    normalized.copysign(value)
}

/// Per-poll input snapshot. Indexed by `Hand::index()`.
#[derive(Debug, Clone, Copy)]
pub struct InputFrame {
    pub samples: [PointerSample; 2],
    pub trigger: ActionState<f32>,
    pub scroll: [ActionState<Vec2>; 2],
}

impl InputFrame {
    pub fn sample(&self, hand: Hand) -> &PointerSample {
        &self.samples[hand.index()]
    }

    /// Pick the thumbstick that drives scrolling: the only active one, or
    /// the larger of two (ties go to the right hand).
    pub fn scroll_axis(&self) -> Option<(Hand, Vec2)> {
        let left = self.scroll[Hand::Left.index()];
        let right = self.scroll[Hand::Right.index()];
        match (left.is_active, right.is_active) {
            (true, true) if left.current.length_squared() > right.current.length_squared() => {
                Some((Hand::Left, left.current))
            }
            (_, true) => Some((Hand::Right, right.current)),
            (true, false) => Some((Hand::Left, left.current)),
            (false, false) => None,
        }
    }

    /// Hand whose on-surface ray positions the scroll: the axis hand first,
    /// then the other one.
    pub fn scroll_hit(&self, axis_hand: Hand) -> Option<&PointerSample> {
        [axis_hand, axis_hand.other()]
            .into_iter()
            .map(|hand| self.sample(hand))
            .find(|sample| sample.on_surface)
    }
}

/// Session-scoped pointer bookkeeping. `pointer_down` implies `pointer_added`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InputState {
    pub trigger_pressed: bool,
    pub pointer_added: bool,
    pub pointer_down: bool,
    pub last_x: f64,
    pub last_y: f64,
}

pub struct InputStateMachine {
    state: InputState,
    rays: [RayVisual; 2],
    surface: Surface,
    pointer: PointerOptions,
    scroll: ScrollOptions,
    clock: Arc<dyn Clock>,
}

impl InputStateMachine {
    pub fn new(surface: Surface, pointer: PointerOptions, scroll: ScrollOptions, clock: Arc<dyn Clock>) -> Self {
        let (last_x, last_y) = surface.center_px();
        info!(
            "VR input initialized: press={:.2} release={:.2} deadzone={:.2} scroll={}px/frame",
            pointer.press_threshold, pointer.release_threshold, scroll.axis_deadzone, scroll.pixels_per_frame
        );
        Self {
            state: InputState {
                trigger_pressed: false,
                pointer_added: false,
                pointer_down: false,
                last_x,
                last_y,
            },
            rays: [RayVisual::default(); 2],
            surface,
            pointer,
            scroll,
            clock,
        }
    }

    pub fn state(&self) -> &InputState {
        &self.state
    }

    pub fn ray(&self, hand: Hand) -> &RayVisual {
        &self.rays[hand.index()]
    }

    pub fn surface(&self) -> &Surface {
        &self.surface
    }

    /// Sample the runtime and apply one focused poll.
    ///
    /// Runtime action-query failures propagate; the state is untouched in
    /// that case.
    pub fn poll<R: XrRuntime + ?Sized>(
        &mut self,
        runtime: &mut R,
        display_time: i64,
        engine: &mut dyn UiEngine,
    ) -> Result<()> {
        runtime.sync_actions()?;
        let left = query_pointer_hit(runtime, Hand::Left, display_time, &self.surface)?;
        let right = query_pointer_hit(runtime, Hand::Right, display_time, &self.surface)?;
        let trigger = runtime.trigger_state()?;
        let scroll_left = runtime.scroll_state(Hand::Left)?;
        let scroll_right = runtime.scroll_state(Hand::Right)?;

        let frame = InputFrame {
            samples: [left, right],
            trigger,
            scroll: [scroll_left, scroll_right],
        };
        self.apply(&frame, engine);
        Ok(())
    }

    /// Apply one focused poll's samples.
    pub fn apply(&mut self, frame: &InputFrame, engine: &mut dyn UiEngine) {
        for hand in Hand::BOTH {
            self.rays[hand.index()].update(frame.sample(hand), &self.pointer);
        }

        let transitioned = self.apply_trigger(frame, engine);
        let moved = !transitioned && self.apply_motion(frame.sample(Hand::Right), engine);
        self.apply_scroll(frame, moved, engine);
    }

    /// Forced transition to Idle-or-Hovering when the session is not
    /// focused: release a held pointer at its last position and hide rays.
    pub fn focus_lost(&mut self, engine: &mut dyn UiEngine) {
        if self.state.pointer_down {
            let (x, y) = (self.state.last_x, self.state.last_y);
            debug!("Input: focus lost while dragging, releasing at ({:.1}, {:.1})", x, y);
            self.send(engine, PointerPhase::Up, x, y, 0, PointerSignal::None);
            self.state.pointer_down = false;
        }
        self.state.trigger_pressed = false;
        for ray in &mut self.rays {
            ray.hide();
        }
    }

    /// Release and remove the pointer before the engine goes away.
    pub fn shutdown(&mut self, engine: &mut dyn UiEngine) {
        self.focus_lost(engine);
        if self.state.pointer_added {
            let (x, y) = (self.state.last_x, self.state.last_y);
            self.send(engine, PointerPhase::Remove, x, y, 0, PointerSignal::None);
            self.state.pointer_added = false;
        }
    }

    // ── Trigger ──────────────────────────────────────────────

    /// Returns `true` if a down or up was emitted.
    fn apply_trigger(&mut self, frame: &InputFrame, engine: &mut dyn UiEngine) -> bool {
        let input_active = frame.trigger.is_active;
        let value = if input_active { frame.trigger.current } else { 0.0 };
        let pressed_now = if self.state.trigger_pressed {
            value >= self.pointer.release_threshold
        } else {
            value >= self.pointer.press_threshold
        };

        let hit = frame.sample(Hand::Right);
        let mut transitioned = false;

        if pressed_now && !self.state.trigger_pressed {
            if hit.on_surface {
                self.ensure_added(engine, hit.x, hit.y);
                if self.state.pointer_added
                    && self.send(engine, PointerPhase::Down, hit.x, hit.y, BUTTON_PRIMARY, PointerSignal::None)
                {
                    self.state.pointer_down = true;
                    transitioned = true;
                }
            }
        } else if (!pressed_now || !input_active) && self.state.trigger_pressed && self.state.pointer_down {
            let (x, y) = if hit.on_surface {
                (hit.x, hit.y)
            } else {
                (self.state.last_x, self.state.last_y)
            };
            self.send(engine, PointerPhase::Up, x, y, 0, PointerSignal::None);
            self.state.pointer_down = false;
            transitioned = true;
        }

        self.state.trigger_pressed = input_active && pressed_now;
        transitioned
    }

    // ── Motion ───────────────────────────────────────────────

    /// Returns `true` if a hover or move was delivered.
    fn apply_motion(&mut self, hit: &PointerSample, engine: &mut dyn UiEngine) -> bool {
        if !self.state.pointer_added || !hit.on_surface {
            return false;
        }
        if hit.x == self.state.last_x && hit.y == self.state.last_y {
            return false;
        }
        let (phase, buttons) = if self.state.pointer_down {
            (PointerPhase::Move, BUTTON_PRIMARY)
        } else {
            (PointerPhase::Hover, 0)
        };
        self.send(engine, phase, hit.x, hit.y, buttons, PointerSignal::None)
    }

    // ── Scroll ───────────────────────────────────────────────

    /// `moved` means this poll already delivered a motion event; it stands
    /// in for the pre-scroll hover when it landed on the same pixel.
    fn apply_scroll(&mut self, frame: &InputFrame, moved: bool, engine: &mut dyn UiEngine) {
        let Some((axis_hand, axis)) = frame.scroll_axis() else {
            return;
        };

        let dz = self.scroll.axis_deadzone;
        let ppf = f64::from(self.scroll.pixels_per_frame);
        let dx = f64::from(apply_axis_deadzone(axis.x, dz)) * ppf;
        // Stick up scrolls content up: negative screen-space delta.
        let dy = -f64::from(apply_axis_deadzone(axis.y, dz)) * ppf;
        let eps = f64::from(self.scroll.delta_epsilon);
        if dx.abs() <= eps && dy.abs() <= eps {
            return;
        }

        let (mut x, mut y) = (self.state.last_x, self.state.last_y);
        if let Some(hit) = frame.scroll_hit(axis_hand) {
            x = hit.x;
            y = hit.y;
            self.ensure_added(engine, x, y);
            let hovered_here = moved && x == self.state.last_x && y == self.state.last_y;
            if self.state.pointer_added && !self.state.pointer_down && !hovered_here {
                self.send(engine, PointerPhase::Hover, x, y, 0, PointerSignal::None);
            }
        }

        if !self.state.pointer_added {
            trace!("Input: scroll ignored, pointer never added");
            return;
        }

        let (phase, buttons) = if self.state.pointer_down {
            (PointerPhase::Move, BUTTON_PRIMARY)
        } else {
            (PointerPhase::Hover, 0)
        };
        self.send(engine, phase, x, y, buttons, PointerSignal::Scroll { dx, dy });
    }

    // ── Event delivery ───────────────────────────────────────

    fn ensure_added(&mut self, engine: &mut dyn UiEngine, x: f64, y: f64) {
        if self.state.pointer_added {
            return;
        }
        if self.send(engine, PointerPhase::Add, x, y, 0, PointerSignal::None) {
            self.state.pointer_added = true;
        }
    }

    /// Deliver one event. Last-known coordinates only move on success.
    fn send(
        &mut self,
        engine: &mut dyn UiEngine,
        phase: PointerPhase,
        x: f64,
        y: f64,
        buttons: i64,
        signal: PointerSignal,
    ) -> bool {
        let event = PointerEvent {
            phase,
            x,
            y,
            device: self.pointer.device_id,
            buttons,
            signal,
            timestamp_us: self.clock.timestamp_micros(),
        };
        match engine.send_pointer_event(&event) {
            Ok(()) => {
                self.state.last_x = x;
                self.state.last_y = y;
                trace!("Input: {:?} at ({:.1}, {:.1})", phase, x, y);
                true
            }
            Err(e) => {
                warn!("Pointer event {:?} rejected: {}", phase, e);
                false
            }
        }
    }
}
