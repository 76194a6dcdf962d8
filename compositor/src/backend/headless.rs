//! Headless backend for CI testing and demo mode.
//!
//! Deterministic in-process stand-ins for the three external boundaries:
//!
//! - `HeadlessRuntime`: session lifecycle, scripted hands/trigger/sticks,
//!   records every submitted layer stack
//! - `HeadlessGpu`: records texture uploads, copies, and flushes
//! - `HeadlessUiEngine`: a render thread that presents generated bitmaps
//!   through `EmbedderCallbacks` and records pointer events

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::Context;
use tracing::{debug, info, warn};

use crate::clock::SystemClock;
use crate::compositor::Compositor;
use crate::config::CompositorConfig;
use crate::engine::{
    EmbedderCallbacks, EngineBridge, PlatformResponder, PointerEvent, PointerPhase, UiEngine, BACKGROUND_CHANNEL,
};
use crate::error::{CompositorError, Result};
use crate::gpu::{GpuDevice, TextureId, TextureRegion};
use crate::input_source::{InputEvent, InputProvider, ScriptedInputProvider};
use crate::runtime::{
    ActionState, FrameState, Hand, SessionEvent, SessionState, SpaceLocation, SwapchainId, XrRuntime,
};
use crate::vr::background::BackgroundConfig;
use crate::vr::geometry::{Pose, Vec2};
use crate::vr::handoff::FrameHandoff;
use crate::vr::layers::CompositionLayer;
use crate::vr::texture::TextureFormat;

// ── Runtime ──────────────────────────────────────────────────

/// Layers submitted for one displayed frame.
#[derive(Debug, Clone)]
pub struct SubmittedFrame {
    pub display_time: i64,
    pub layers: Vec<CompositionLayer>,
}

#[derive(Debug, Clone, Copy, Default)]
struct HandInput {
    pose: Option<Pose>,
    scroll: Option<Vec2>,
}

/// Scripted XR runtime. Starts Ready, reaches Focused once the session
/// begins, and stops when the script runs out.
pub struct HeadlessRuntime {
    provider: Box<dyn InputProvider>,
    hands: [HandInput; 2],
    trigger: Option<f32>,
    events: VecDeque<SessionEvent>,
    session_running: bool,
    stopping: bool,
    frame_ready: bool,
    display_time: i64,
    frame_interval: Duration,
    pace: bool,
    acquired: HashMap<SwapchainId, u32>,
    submitted: Vec<SubmittedFrame>,
    torn_down: bool,
}

impl HeadlessRuntime {
    pub fn new(provider: Box<dyn InputProvider>, frame_interval: Duration) -> Self {
        info!("Headless XR runtime initialized ({}ms frames)", frame_interval.as_millis());
        Self {
            provider,
            hands: [HandInput::default(); 2],
            trigger: Some(0.0),
            events: VecDeque::from([SessionEvent::StateChanged(SessionState::Ready)]),
            session_running: false,
            stopping: false,
            frame_ready: false,
            display_time: 0,
            frame_interval,
            pace: false,
            acquired: HashMap::new(),
            submitted: Vec::new(),
            torn_down: false,
        }
    }

    /// Sleep for the frame interval in `wait_frame`, like a real display.
    pub fn with_pacing(mut self, pace: bool) -> Self {
        self.pace = pace;
        self
    }

    pub fn submitted(&self) -> &[SubmittedFrame] {
        &self.submitted
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    fn hand_mut(&mut self, hand: Hand) -> &mut HandInput {
        &mut self.hands[hand.index()]
    }

    fn begin_stopping(&mut self) {
        if !self.stopping {
            self.stopping = true;
            self.events.push_back(SessionEvent::StateChanged(SessionState::Stopping));
        }
    }

    /// Consume script steps until a frame marker, a session event, or the
    /// end of the script.
    fn advance_script(&mut self) {
        while !self.frame_ready && !self.stopping {
            let Some(event) = self.provider.next_event() else {
                debug!("Headless runtime: script finished");
                self.begin_stopping();
                return;
            };

            if let Some((hand, pose)) = event.pose() {
                self.hand_mut(hand).pose = Some(pose);
                continue;
            }

            match event {
                InputEvent::HandLost { hand } => self.hand_mut(hand).pose = None,
                InputEvent::Trigger { value } => self.trigger = Some(value.clamp(0.0, 1.0)),
                InputEvent::TriggerInactive => self.trigger = None,
                InputEvent::Scroll { hand, x, y } => self.hand_mut(hand).scroll = Some(Vec2::new(x, y)),
                InputEvent::ScrollInactive { hand } => self.hand_mut(hand).scroll = None,
                InputEvent::Focus { focused } => {
                    let state = if focused {
                        SessionState::Focused
                    } else {
                        SessionState::Visible
                    };
                    self.events.push_back(SessionEvent::StateChanged(state));
                    return;
                }
                InputEvent::Frame => self.frame_ready = true,
                InputEvent::Wait { .. } => {
                    if let Some(wait) = event.wait_duration() {
                        self.display_time += wait.as_nanos() as i64;
                    }
                }
                InputEvent::Aim { .. } | InputEvent::Pose { .. } => {}
            }
        }
    }
}

impl XrRuntime for HeadlessRuntime {
    fn poll_event(&mut self) -> Result<Option<SessionEvent>> {
        if self.events.is_empty() && self.session_running && !self.frame_ready {
            self.advance_script();
        }
        Ok(self.events.pop_front())
    }

    fn begin_session(&mut self) -> Result<()> {
        if self.session_running {
            return Err(CompositorError::runtime("xrBeginSession", "session already running"));
        }
        self.session_running = true;
        for state in [SessionState::Synchronized, SessionState::Visible, SessionState::Focused] {
            self.events.push_back(SessionEvent::StateChanged(state));
        }
        Ok(())
    }

    fn end_session(&mut self) -> Result<()> {
        if !self.session_running {
            return Err(CompositorError::runtime("xrEndSession", "session not running"));
        }
        self.session_running = false;
        self.events.push_back(SessionEvent::StateChanged(SessionState::Idle));
        self.events.push_back(SessionEvent::StateChanged(SessionState::Exiting));
        Ok(())
    }

    fn request_exit(&mut self) -> Result<()> {
        if !self.session_running {
            return Err(CompositorError::runtime("xrRequestExitSession", "session not running"));
        }
        self.begin_stopping();
        Ok(())
    }

    fn wait_frame(&mut self) -> Result<FrameState> {
        if !self.frame_ready {
            self.advance_script();
        }
        let should_render = std::mem::take(&mut self.frame_ready);
        if self.pace {
            thread::sleep(self.frame_interval);
        }
        self.display_time += self.frame_interval.as_nanos() as i64;
        Ok(FrameState {
            predicted_display_time: self.display_time,
            should_render,
        })
    }

    fn begin_frame(&mut self) -> Result<()> {
        Ok(())
    }

    fn end_frame(&mut self, display_time: i64, layers: &[CompositionLayer]) -> Result<()> {
        if let Some(swapchain) = self.acquired.keys().next() {
            return Err(CompositorError::runtime(
                "xrEndFrame",
                format!("swapchain {:?} still acquired", swapchain),
            ));
        }
        self.submitted.push(SubmittedFrame {
            display_time,
            layers: layers.to_vec(),
        });
        Ok(())
    }

    fn sync_actions(&mut self) -> Result<()> {
        Ok(())
    }

    fn pose_active(&mut self, hand: Hand) -> Result<bool> {
        Ok(self.hands[hand.index()].pose.is_some())
    }

    fn locate_hand(&mut self, hand: Hand, _display_time: i64) -> Result<SpaceLocation> {
        match self.hands[hand.index()].pose {
            Some(pose) => Ok(SpaceLocation {
                pose,
                position_valid: true,
                orientation_valid: true,
            }),
            None => Ok(SpaceLocation {
                pose: Pose::default(),
                position_valid: false,
                orientation_valid: false,
            }),
        }
    }

    fn trigger_state(&mut self) -> Result<ActionState<f32>> {
        Ok(match self.trigger {
            Some(value) => ActionState::active(value),
            None => ActionState::inactive(),
        })
    }

    fn scroll_state(&mut self, hand: Hand) -> Result<ActionState<Vec2>> {
        Ok(match self.hands[hand.index()].scroll {
            Some(v) => ActionState::active(v),
            None => ActionState::inactive(),
        })
    }

    fn acquire_swapchain_image(&mut self, swapchain: SwapchainId) -> Result<u32> {
        if self.acquired.contains_key(&swapchain) {
            return Err(CompositorError::runtime(
                "xrAcquireSwapchainImage",
                format!("{:?} already acquired", swapchain),
            ));
        }
        let index = (self.submitted.len() % 3) as u32;
        self.acquired.insert(swapchain, index);
        Ok(index)
    }

    fn release_swapchain_image(&mut self, swapchain: SwapchainId) -> Result<()> {
        self.acquired
            .remove(&swapchain)
            .map(|_| ())
            .ok_or_else(|| CompositorError::runtime("xrReleaseSwapchainImage", format!("{:?} not acquired", swapchain)))
    }

    fn teardown(&mut self) -> Result<()> {
        self.torn_down = true;
        info!("Headless runtime torn down after {} frame(s)", self.submitted.len());
        Ok(())
    }
}

// ── GPU ──────────────────────────────────────────────────────

/// One recorded texture update.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureUpload {
    pub region: Option<TextureRegion>,
    pub data: Vec<u8>,
    pub row_pitch: usize,
}

/// Records GPU traffic instead of touching a device.
pub struct HeadlessGpu {
    format: TextureFormat,
    uploads: HashMap<TextureId, (usize, TextureUpload)>,
    copies: Vec<(TextureId, SwapchainId, u32)>,
    flushes: usize,
    fail_next_upload: bool,
}

impl HeadlessGpu {
    pub fn new(format: TextureFormat) -> Self {
        Self {
            format,
            uploads: HashMap::new(),
            copies: Vec::new(),
            flushes: 0,
            fail_next_upload: false,
        }
    }

    /// Make the next `update_texture` fail.
    pub fn fail_next_upload(&mut self) {
        self.fail_next_upload = true;
    }

    pub fn last_upload(&self, texture: TextureId) -> Option<&TextureUpload> {
        self.uploads.get(&texture).map(|(_, upload)| upload)
    }

    pub fn upload_count(&self, texture: TextureId) -> usize {
        self.uploads.get(&texture).map_or(0, |(count, _)| *count)
    }

    pub fn copy_count(&self, swapchain: SwapchainId) -> usize {
        self.copies.iter().filter(|(_, s, _)| *s == swapchain).count()
    }

    pub fn flush_count(&self) -> usize {
        self.flushes
    }
}

impl GpuDevice for HeadlessGpu {
    fn color_format(&self) -> TextureFormat {
        self.format
    }

    fn update_texture(
        &mut self,
        texture: TextureId,
        region: Option<TextureRegion>,
        data: &[u8],
        row_pitch: usize,
    ) -> Result<()> {
        if std::mem::take(&mut self.fail_next_upload) {
            return Err(CompositorError::gpu("update_texture", "device removed"));
        }
        if row_pitch == 0 || data.is_empty() {
            return Err(CompositorError::gpu(
                "update_texture",
                format!("empty upload to {}", texture.as_str()),
            ));
        }
        let upload = TextureUpload {
            region,
            data: data.to_vec(),
            row_pitch,
        };
        let entry = self.uploads.entry(texture).or_insert((0, upload.clone()));
        entry.0 += 1;
        entry.1 = upload;
        Ok(())
    }

    fn copy_to_swapchain(&mut self, texture: TextureId, swapchain: SwapchainId, image_index: u32) -> Result<()> {
        self.copies.push((texture, swapchain, image_index));
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.flushes += 1;
        Ok(())
    }
}

// ── UI engine ────────────────────────────────────────────────

#[derive(Default)]
struct CaptureResponder {
    reply: Option<Vec<u8>>,
}

impl PlatformResponder for CaptureResponder {
    fn respond(&mut self, payload: &[u8]) -> Result<()> {
        if self.reply.is_some() {
            return Err(CompositorError::engine("respond", "response already sent"));
        }
        self.reply = Some(payload.to_vec());
        Ok(())
    }
}

/// Generated UI bitmap `frame`: dark panel with a bright column that moves
/// one step per frame.
pub fn demo_bitmap(width: usize, height: usize, frame: u64) -> Vec<u8> {
    let mut pixels = [24u8, 28, 36, 255].repeat(width * height);
    if width == 0 {
        return pixels;
    }
    let column = (frame as usize * 8) % width;
    for y in 0..height {
        let i = (y * width + column) * 4;
        pixels[i..i + 4].copy_from_slice(&[220, 220, 230, 255]);
    }
    pixels
}

/// UI engine stand-in with its own render thread.
pub struct HeadlessUiEngine {
    callbacks: Arc<dyn EmbedderCallbacks>,
    events: Vec<PointerEvent>,
    stop: Arc<AtomicBool>,
    render_thread: Option<JoinHandle<u64>>,
    frames_presented: u64,
}

impl HeadlessUiEngine {
    pub fn new(callbacks: Arc<dyn EmbedderCallbacks>) -> Self {
        Self {
            callbacks,
            events: Vec::new(),
            stop: Arc::new(AtomicBool::new(false)),
            render_thread: None,
            frames_presented: 0,
        }
    }

    /// Start presenting `width` x `height` bitmaps every `interval`.
    /// `max_frames` bounds the run; `None` renders until shutdown.
    pub fn start_rendering(&mut self, width: usize, height: usize, interval: Duration, max_frames: Option<u64>) {
        if self.render_thread.is_some() {
            return;
        }
        let callbacks = Arc::clone(&self.callbacks);
        let stop = Arc::clone(&self.stop);
        self.render_thread = Some(thread::spawn(move || {
            let mut frame = 0u64;
            while !stop.load(Ordering::SeqCst) && max_frames.map_or(true, |max| frame < max) {
                let pixels = demo_bitmap(width, height, frame);
                if callbacks.on_surface_present(&pixels, width * 4, height) {
                    frame += 1;
                }
                thread::sleep(interval);
            }
            frame
        }));
        info!("Headless UI engine rendering {}x{}", width, height);
    }

    /// Present one bitmap from the calling thread.
    pub fn present_now(&mut self, pixels: &[u8], row_bytes: usize, height: usize) -> bool {
        let ok = self.callbacks.on_surface_present(pixels, row_bytes, height);
        if ok {
            self.frames_presented += 1;
        }
        ok
    }

    /// Send a platform message and return the UTF-8 reply.
    pub fn platform_message(&self, channel: &str, payload: &str) -> String {
        let mut responder = CaptureResponder::default();
        self.callbacks
            .on_platform_message(channel, payload.as_bytes(), &mut responder);
        responder
            .reply
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
            .unwrap_or_default()
    }

    pub fn events(&self) -> &[PointerEvent] {
        &self.events
    }

    pub fn phases(&self) -> Vec<PointerPhase> {
        self.events.iter().map(|e| e.phase).collect()
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }
}

impl UiEngine for HeadlessUiEngine {
    fn send_pointer_event(&mut self, event: &PointerEvent) -> Result<()> {
        if self.stop.load(Ordering::SeqCst) {
            return Err(CompositorError::engine("send_pointer_event", "engine shut down"));
        }
        self.events.push(*event);
        Ok(())
    }

    fn shutdown(&mut self) -> Result<()> {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.render_thread.take() {
            match handle.join() {
                Ok(frames) => self.frames_presented += frames,
                Err(_) => warn!("Headless UI render thread panicked"),
            }
        }
        Ok(())
    }
}

impl Drop for HeadlessUiEngine {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

// ── Entry point ──────────────────────────────────────────────

/// Headless run configuration.
#[derive(Debug, Clone)]
pub struct HeadlessConfig {
    pub compositor: CompositorConfig,
    /// YAML input script; the built-in demo runs when unset.
    pub script: Option<PathBuf>,
    /// Background command sent at startup instead of `background.initial`.
    pub background: Option<String>,
    pub frame_interval: Duration,
}

impl Default for HeadlessConfig {
    fn default() -> Self {
        Self {
            compositor: CompositorConfig::default(),
            script: None,
            background: None,
            frame_interval: Duration::from_millis(11),
        }
    }
}

/// Run the compositor against the headless runtime, GPU, and UI engine
/// until the input script ends or Ctrl+C is pressed.
pub fn run(config: HeadlessConfig) -> anyhow::Result<()> {
    let HeadlessConfig {
        compositor: config,
        script,
        background,
        frame_interval,
    } = config;

    let provider = match &script {
        Some(path) => ScriptedInputProvider::from_yaml_file(path)?,
        None => {
            info!("No input script given, running the built-in demo");
            ScriptedInputProvider::demo()
        }
    };
    info!("Input script: {} step(s)", provider.remaining());

    let gpu = HeadlessGpu::new(TextureFormat::Rgba8);
    let format = gpu.color_format();
    let surface = Arc::new(FrameHandoff::new());
    let background_config = Arc::new(BackgroundConfig::new(
        format,
        config.background.texture_width,
        config.background.texture_height,
    ));
    let bridge = Arc::new(EngineBridge::new(Arc::clone(&surface), Arc::clone(&background_config)));
    let mut engine = HeadlessUiEngine::new(bridge);

    let command = background.unwrap_or_else(|| config.background.initial.clone());
    let reply = engine.platform_message(BACKGROUND_CHANNEL, &command);
    if reply == "ok" {
        info!("Background: {}", command);
    } else {
        warn!("Background command {:?} failed: {}", command, reply);
    }

    engine.start_rendering(
        config.surface.width_px as usize,
        config.surface.height_px as usize,
        frame_interval,
        None,
    );

    let runtime = HeadlessRuntime::new(Box::new(provider), frame_interval).with_pacing(true);
    let mut compositor = Compositor::new(
        runtime,
        gpu,
        engine,
        config,
        surface,
        background_config,
        Arc::new(SystemClock::new()),
    )?;

    let shutdown = compositor.shutdown_flag();
    ctrlc::set_handler(move || shutdown.store(true, Ordering::Relaxed)).context("failed to install Ctrl+C handler")?;

    compositor.run()?;
    info!(
        "Headless run complete: {} frame(s), {} pointer event(s)",
        compositor.frames_rendered(),
        compositor.engine().events().len()
    );
    Ok(())
}
