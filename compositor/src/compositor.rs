//! Session lifecycle and the per-frame composition loop.
//!
//! `Compositor` owns the three external boundaries (XR runtime, GPU, UI
//! engine) plus the core state, and runs everything on the calling thread.
//! The only cross-thread state is the UI frame handoff and the background
//! config, both shared with the engine's callbacks through `Arc`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{debug, info, trace, warn};

use crate::clock::Clock;
use crate::config::CompositorConfig;
use crate::engine::UiEngine;
use crate::error::Result;
use crate::gpu::{GpuDevice, TextureId};
use crate::runtime::{Hand, SessionEvent, SessionState, SwapchainId, XrRuntime};
use crate::vr::background::{BackgroundConfig, UploadOutcome};
use crate::vr::handoff::FrameHandoff;
use crate::vr::input::InputStateMachine;
use crate::vr::layers::{
    background_layer, ray_layer, ray_texture_pixels, ui_layer, CompositionLayer, RAY_TEXTURE_WIDTH,
    UI_CLEAR_COLOR,
};
use crate::vr::pointer::Surface;
use crate::vr::texture::{solid_pixels, UiTextureUploader};

pub struct Compositor<R: XrRuntime, G: GpuDevice, E: UiEngine> {
    runtime: R,
    gpu: G,
    engine: E,
    config: CompositorConfig,
    surface: Arc<FrameHandoff>,
    background: Arc<BackgroundConfig>,
    uploader: UiTextureUploader,
    input: InputStateMachine,
    session_state: SessionState,
    session_running: bool,
    exit_requested: bool,
    exit_signalled: bool,
    shutdown: Arc<AtomicBool>,
    frames_rendered: u64,
    torn_down: bool,
}

impl<R: XrRuntime, G: GpuDevice, E: UiEngine> Compositor<R, G, E> {
    /// Take ownership of the boundaries and upload the static textures.
    ///
    /// `surface` and `background` must be the same instances the engine's
    /// `EmbedderCallbacks` publish into.
    pub fn new(
        runtime: R,
        mut gpu: G,
        engine: E,
        config: CompositorConfig,
        surface: Arc<FrameHandoff>,
        background: Arc<BackgroundConfig>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let format = gpu.color_format();
        let (width, height) = (config.surface.width_px as usize, config.surface.height_px as usize);

        gpu.update_texture(
            TextureId::Ui,
            None,
            &solid_pixels(format, width, height, UI_CLEAR_COLOR),
            width * 4,
        )?;
        gpu.update_texture(
            TextureId::PointerRay,
            None,
            &ray_texture_pixels(format),
            RAY_TEXTURE_WIDTH as usize * 4,
        )?;

        let input = InputStateMachine::new(
            Surface::from_options(&config.surface),
            config.pointer.clone(),
            config.scroll.clone(),
            clock,
        );
        info!(
            "Compositor initialized: surface {}x{} px, {} textures",
            width,
            height,
            format.as_str()
        );

        Ok(Self {
            runtime,
            gpu,
            engine,
            uploader: UiTextureUploader::new(format, width, height),
            config,
            surface,
            background,
            input,
            session_state: SessionState::Idle,
            session_running: false,
            exit_requested: false,
            exit_signalled: false,
            shutdown: Arc::new(AtomicBool::new(false)),
            frames_rendered: 0,
            torn_down: false,
        })
    }

    // ── Accessors ────────────────────────────────────────────

    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    pub fn gpu(&self) -> &G {
        &self.gpu
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    pub fn input(&self) -> &InputStateMachine {
        &self.input
    }

    pub fn background(&self) -> &Arc<BackgroundConfig> {
        &self.background
    }

    pub fn session_state(&self) -> SessionState {
        self.session_state
    }

    pub fn is_session_running(&self) -> bool {
        self.session_running
    }

    pub fn exit_requested(&self) -> bool {
        self.exit_requested
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    /// Flag that asks the loop to wind the session down (Ctrl+C).
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    // ── Main loop ────────────────────────────────────────────

    /// Wait (bounded) for the engine's first bitmap. Startup continues on
    /// timeout; the UI quad keeps its clear colour until a frame arrives.
    pub fn wait_for_first_frame(&self) -> bool {
        let timeout = Duration::from_millis(self.config.startup.first_frame_timeout_ms);
        match self.surface.wait_for_first_frame(timeout) {
            Some((width, height, version)) => {
                info!("First UI frame: {}x{} (v{})", width, height, version);
                true
            }
            None => {
                warn!(
                    "No UI frame after {}ms, continuing with an empty surface",
                    timeout.as_millis()
                );
                false
            }
        }
    }

    /// Run until the session exits, then tear down.
    pub fn run(&mut self) -> Result<()> {
        self.wait_for_first_frame();
        let result = self.run_loop();
        self.shutdown();
        result
    }

    fn run_loop(&mut self) -> Result<()> {
        while self.step()? {}
        info!("Session ended after {} frame(s)", self.frames_rendered);
        Ok(())
    }

    /// One loop iteration. Returns `false` once the session has exited.
    pub fn step(&mut self) -> Result<bool> {
        if self.shutdown.load(Ordering::Relaxed) && !self.exit_signalled {
            self.exit_signalled = true;
            if self.session_running {
                info!("Shutdown requested, asking the runtime to exit");
                self.runtime.request_exit()?;
            } else {
                self.exit_requested = true;
            }
        }

        self.poll_events()?;
        if self.exit_requested {
            return Ok(false);
        }

        if !self.session_running {
            thread::sleep(Duration::from_millis(self.config.startup.idle_poll_ms));
            return Ok(true);
        }

        self.render_frame()?;
        Ok(true)
    }

    /// Drain pending runtime events.
    pub fn poll_events(&mut self) -> Result<()> {
        while let Some(event) = self.runtime.poll_event()? {
            self.handle_session_event(event)?;
            if self.exit_requested {
                break;
            }
        }
        Ok(())
    }

    fn handle_session_event(&mut self, event: SessionEvent) -> Result<()> {
        match event {
            SessionEvent::StateChanged(state) => {
                debug!("Session state: {:?} -> {:?}", self.session_state, state);
                self.session_state = state;
                match state {
                    SessionState::Ready => {
                        self.runtime.begin_session()?;
                        self.session_running = true;
                        info!("Session running");
                    }
                    SessionState::Stopping => {
                        self.input.focus_lost(&mut self.engine);
                        self.session_running = false;
                        self.runtime.end_session()?;
                        info!("Session stopped");
                    }
                    SessionState::Exiting | SessionState::LossPending => {
                        self.input.focus_lost(&mut self.engine);
                        self.session_running = false;
                        self.exit_requested = true;
                    }
                    _ => {}
                }
            }
            SessionEvent::InstanceLossPending => {
                warn!("XR instance loss pending");
                self.input.focus_lost(&mut self.engine);
                self.session_running = false;
                self.exit_requested = true;
            }
            SessionEvent::EventsLost(count) => warn!("Runtime dropped {} event(s)", count),
        }
        Ok(())
    }

    /// Wait for, compose, and submit one frame.
    pub fn render_frame(&mut self) -> Result<()> {
        let frame = self.runtime.wait_frame()?;
        let display_time = frame.predicted_display_time;

        if self.session_state == SessionState::Focused {
            self.input.poll(&mut self.runtime, display_time, &mut self.engine)?;
        } else {
            self.input.focus_lost(&mut self.engine);
        }

        self.runtime.begin_frame()?;

        let mut layers: Vec<CompositionLayer> = Vec::with_capacity(4);
        if frame.should_render {
            self.compose(&mut layers)?;
            self.gpu.flush()?;
            self.frames_rendered += 1;
        }

        self.runtime.end_frame(display_time, &layers)
    }

    /// Refresh swapchain images and collect layers, back to front.
    fn compose(&mut self, layers: &mut Vec<CompositionLayer>) -> Result<()> {
        if self.background.is_enabled() {
            let background = &self.background;
            blit(
                &mut self.runtime,
                &mut self.gpu,
                TextureId::Background,
                SwapchainId::Background,
                |gpu| match background.upload_if_stale(gpu) {
                    Ok(UploadOutcome::Uploaded) => debug!("Background texture uploaded"),
                    Ok(UploadOutcome::Superseded) => debug!("Background changed during upload, retrying next frame"),
                    Ok(_) => {}
                    Err(e) => warn!("Background upload failed: {}", e),
                },
            )?;
            layers.push(background_layer(&self.config.background));
        }

        let (uploader, surface) = (&mut self.uploader, &self.surface);
        blit(
            &mut self.runtime,
            &mut self.gpu,
            TextureId::Ui,
            SwapchainId::Ui,
            |gpu| match uploader.upload_latest(surface, gpu) {
                Ok(true) => trace!("UI texture v{} uploaded", uploader.uploaded_version()),
                Ok(false) => {}
                Err(e) => warn!("UI upload failed: {}", e),
            },
        )?;
        layers.push(ui_layer(self.input.surface()));

        let rays: Vec<CompositionLayer> = [Hand::Right, Hand::Left]
            .into_iter()
            .filter_map(|hand| ray_layer(hand, self.input.ray(hand), self.config.pointer.ray_thickness))
            .collect();
        if !rays.is_empty() {
            blit(
                &mut self.runtime,
                &mut self.gpu,
                TextureId::PointerRay,
                SwapchainId::PointerRay,
                |_| {},
            )?;
            layers.extend(rays);
        }
        Ok(())
    }

    /// Best-effort teardown in reverse order. Runs once; every step's
    /// failure is logged and skipped.
    pub fn shutdown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;

        self.input.shutdown(&mut self.engine);
        if let Err(e) = self.engine.shutdown() {
            warn!("UI engine shutdown failed: {}", e);
        }
        if self.session_running {
            self.session_running = false;
            if let Err(e) = self.runtime.end_session() {
                warn!("end_session during teardown failed: {}", e);
            }
        }
        if let Err(e) = self.runtime.teardown() {
            warn!("XR runtime teardown failed: {}", e);
        }
        info!("Compositor shut down");
    }
}

impl<R: XrRuntime, G: GpuDevice, E: UiEngine> Drop for Compositor<R, G, E> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Acquire `swapchain`, let `upload` refresh `texture`, copy it in, and
/// release. The image is released even when the copy fails.
fn blit<R: XrRuntime, G: GpuDevice>(
    runtime: &mut R,
    gpu: &mut G,
    texture: TextureId,
    swapchain: SwapchainId,
    upload: impl FnOnce(&mut G),
) -> Result<()> {
    let index = runtime.acquire_swapchain_image(swapchain)?;
    upload(gpu);
    let copied = gpu.copy_to_swapchain(texture, swapchain, index);
    let released = runtime.release_swapchain_image(swapchain);
    copied.and(released)
}
