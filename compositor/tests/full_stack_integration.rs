//! Full-stack integration tests: the compositor loop driven end to end by
//! the headless runtime, GPU, and UI engine with scripted controller input.

use std::sync::Arc;
use std::time::Duration;

use xrpane_compositor::backend::headless::{HeadlessGpu, HeadlessRuntime, HeadlessUiEngine};
use xrpane_compositor::clock::TestClock;
use xrpane_compositor::compositor::Compositor;
use xrpane_compositor::config::CompositorConfig;
use xrpane_compositor::engine::{EngineBridge, PointerEvent, PointerPhase, PointerSignal, BACKGROUND_CHANNEL, BUTTON_PRIMARY};
use xrpane_compositor::gpu::TextureId;
use xrpane_compositor::input_source::{InputEvent, InputProvider, RecordingProvider, ScriptedInputProvider};
use xrpane_compositor::runtime::{Hand, SessionState};
use xrpane_compositor::vr::background::BackgroundConfig;
use xrpane_compositor::vr::handoff::FrameHandoff;
use xrpane_compositor::vr::layers::LayerKind;
use xrpane_compositor::vr::texture::TextureFormat;

type Stack = Compositor<HeadlessRuntime, HeadlessGpu, HeadlessUiEngine>;

fn test_config() -> CompositorConfig {
    let mut config = CompositorConfig::default();
    config.background.texture_width = 64;
    config.background.texture_height = 64;
    config.startup.first_frame_timeout_ms = 10;
    config.startup.idle_poll_ms = 1;
    config
}

fn build_with(provider: Box<dyn InputProvider>, clock: Arc<TestClock>, format: TextureFormat) -> Stack {
    let config = test_config();
    let surface = Arc::new(FrameHandoff::new());
    let background = Arc::new(BackgroundConfig::new(
        format,
        config.background.texture_width,
        config.background.texture_height,
    ));
    let bridge = Arc::new(EngineBridge::new(Arc::clone(&surface), Arc::clone(&background)));
    let runtime = HeadlessRuntime::new(provider, Duration::from_millis(11));
    Compositor::new(
        runtime,
        HeadlessGpu::new(format),
        HeadlessUiEngine::new(bridge),
        config,
        surface,
        background,
        clock,
    )
    .unwrap()
}

fn build(events: Vec<InputEvent>) -> Stack {
    build_with(
        Box::new(ScriptedInputProvider::new(events)),
        Arc::new(TestClock::new()),
        TextureFormat::Rgba8,
    )
}

fn phases(events: &[PointerEvent]) -> Vec<PointerPhase> {
    events.iter().map(|e| e.phase).collect()
}

fn scrolls(events: &[PointerEvent]) -> Vec<(f64, f64)> {
    events
        .iter()
        .filter_map(|e| match e.signal {
            PointerSignal::Scroll { dx, dy } => Some((dx, dy)),
            PointerSignal::None => None,
        })
        .collect()
}

fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-3
}

// ── Pointer lifecycle ───────────────────────────────────────

#[test]
fn test_drag_sequence_end_to_end() {
    let mut events = vec![
        InputEvent::aim(Hand::Right, [0.0, 0.0, -1.2]),
        InputEvent::Frame,
        InputEvent::Trigger { value: 0.9 },
        InputEvent::Frame,
    ];
    for step in 1..=3 {
        events.push(InputEvent::aim(Hand::Right, [step as f32 * 0.1, 0.0, -1.2]));
        events.push(InputEvent::Frame);
    }
    events.push(InputEvent::Trigger { value: 0.1 });
    events.push(InputEvent::Frame);

    let mut c = build(events);
    c.run().unwrap();

    let sent = c.engine().events();
    assert_eq!(
        phases(sent),
        vec![
            PointerPhase::Add,
            PointerPhase::Down,
            PointerPhase::Move,
            PointerPhase::Move,
            PointerPhase::Move,
            PointerPhase::Up,
            PointerPhase::Remove
        ]
    );

    assert_eq!(sent[1].buttons, BUTTON_PRIMARY);
    assert!(sent[2..5].iter().all(|e| e.buttons == BUTTON_PRIMARY));
    assert_eq!(sent[5].buttons, 0);
    // Moving right along the surface.
    assert!(sent[2].x < sent[3].x && sent[3].x < sent[4].x);
    assert!(sent.iter().all(|e| e.device == 1));
    assert_eq!(c.runtime().submitted().len(), 6);
}

#[test]
fn test_trigger_hysteresis_across_frames() {
    let mut events = vec![InputEvent::aim(Hand::Right, [0.0, 0.0, -1.2])];
    for value in [0.70, 0.80, 0.68, 0.60] {
        events.push(InputEvent::Trigger { value });
        events.push(InputEvent::Frame);
    }

    let mut c = build(events);
    c.run().unwrap();

    assert_eq!(
        phases(c.engine().events()),
        vec![PointerPhase::Add, PointerPhase::Down, PointerPhase::Up, PointerPhase::Remove]
    );
}

#[test]
fn test_press_off_surface_is_ignored() {
    let mut c = build(vec![
        InputEvent::aim(Hand::Right, [0.0, 2.0, -1.2]),
        InputEvent::Trigger { value: 1.0 },
        InputEvent::Frame,
        InputEvent::Trigger { value: 0.0 },
        InputEvent::Frame,
    ]);
    c.run().unwrap();
    assert!(c.engine().events().is_empty());

    // The ray is still drawn at the fallback length.
    let layers = &c.runtime().submitted()[0].layers;
    let ray = layers
        .iter()
        .find(|l| l.kind == LayerKind::PointerRay(Hand::Right))
        .unwrap();
    assert!((ray.width_m - 2.0).abs() < 1e-5);
}

#[test]
fn test_hand_lost_mid_drag_releases_at_last_position() {
    let mut c = build(vec![
        InputEvent::aim(Hand::Right, [0.0, 0.0, -1.2]),
        InputEvent::Trigger { value: 1.0 },
        InputEvent::Frame,
        InputEvent::HandLost { hand: Hand::Right },
        InputEvent::Frame,
        InputEvent::Trigger { value: 0.0 },
        InputEvent::Frame,
    ]);
    c.run().unwrap();

    let sent = c.engine().events();
    assert_eq!(
        phases(sent),
        vec![PointerPhase::Add, PointerPhase::Down, PointerPhase::Up, PointerPhase::Remove]
    );
    assert_eq!((sent[2].x, sent[2].y), (sent[1].x, sent[1].y));

    // No ray layers once the hand is gone.
    let last = &c.runtime().submitted()[2].layers;
    assert!(last.iter().all(|l| !matches!(l.kind, LayerKind::PointerRay(_))));
}

#[test]
fn test_focus_loss_mid_drag_sends_single_up() {
    let mut c = build(vec![
        InputEvent::aim(Hand::Right, [0.0, 0.0, -1.2]),
        InputEvent::Trigger { value: 1.0 },
        InputEvent::Frame,
        InputEvent::Focus { focused: false },
        InputEvent::Frame,
        InputEvent::Frame,
        InputEvent::Focus { focused: true },
        InputEvent::Frame,
    ]);
    c.run().unwrap();

    // Re-focused with the trigger still held: pressed again.
    assert_eq!(
        phases(c.engine().events()),
        vec![
            PointerPhase::Add,
            PointerPhase::Down,
            PointerPhase::Up,
            PointerPhase::Down,
            PointerPhase::Up,
            PointerPhase::Remove
        ]
    );
}

// ── Scrolling ───────────────────────────────────────────────

#[test]
fn test_scroll_hovers_then_scrolls_at_aim_point() {
    let mut c = build(vec![
        InputEvent::aim(Hand::Right, [0.0, 0.0, -1.2]),
        InputEvent::Scroll {
            hand: Hand::Right,
            x: 0.0,
            y: 1.0,
        },
        InputEvent::Frame,
    ]);
    c.run().unwrap();

    let sent = c.engine().events();
    assert_eq!(
        phases(sent),
        vec![PointerPhase::Add, PointerPhase::Hover, PointerPhase::Hover, PointerPhase::Remove]
    );
    assert_eq!(scrolls(sent), vec![(0.0, -24.0)]);
    assert!((sent[2].x - 640.0).abs() < 1.0);
    assert!((sent[2].y - 360.0).abs() < 1.0);
}

#[test]
fn test_scroll_inside_deadzone_is_silent() {
    let mut c = build(vec![
        InputEvent::aim(Hand::Right, [0.0, 0.0, -1.2]),
        InputEvent::Scroll {
            hand: Hand::Left,
            x: 0.2,
            y: -0.15,
        },
        InputEvent::Frame,
    ]);
    c.run().unwrap();
    assert!(c.engine().events().is_empty());
}

#[test]
fn test_scroll_arbitration_prefers_larger_stick() {
    let mut c = build(vec![
        InputEvent::aim(Hand::Right, [0.0, 0.0, -1.2]),
        InputEvent::Scroll {
            hand: Hand::Left,
            x: 0.5,
            y: 0.0,
        },
        InputEvent::Scroll {
            hand: Hand::Right,
            x: 0.0,
            y: 0.9,
        },
        InputEvent::Frame,
        // Equal magnitudes: the right stick wins ties.
        InputEvent::Scroll {
            hand: Hand::Left,
            x: 0.6,
            y: 0.0,
        },
        InputEvent::Scroll {
            hand: Hand::Right,
            x: 0.0,
            y: -0.6,
        },
        InputEvent::Frame,
        InputEvent::Scroll {
            hand: Hand::Left,
            x: -1.0,
            y: 0.0,
        },
        InputEvent::ScrollInactive { hand: Hand::Right },
        InputEvent::Frame,
    ]);
    c.run().unwrap();

    let deltas = scrolls(c.engine().events());
    assert_eq!(deltas.len(), 3);
    assert!(approx(deltas[0].0, 0.0) && approx(deltas[0].1, -21.0));
    assert!(approx(deltas[1].0, 0.0) && approx(deltas[1].1, 12.0));
    assert!(approx(deltas[2].0, -24.0) && approx(deltas[2].1, 0.0));
}

#[test]
fn test_scroll_while_dragging_uses_move_with_button() {
    let mut c = build(vec![
        InputEvent::aim(Hand::Right, [0.0, 0.0, -1.2]),
        InputEvent::Trigger { value: 1.0 },
        InputEvent::Frame,
        InputEvent::Scroll {
            hand: Hand::Left,
            x: 0.0,
            y: -1.0,
        },
        InputEvent::Frame,
    ]);
    c.run().unwrap();

    let sent = c.engine().events();
    let scroll = sent.iter().find(|e| e.is_scroll()).unwrap();
    assert_eq!(scroll.phase, PointerPhase::Move);
    assert_eq!(scroll.buttons, BUTTON_PRIMARY);
    assert_eq!(scroll.signal, PointerSignal::Scroll { dx: 0.0, dy: 24.0 });
}

// ── Timestamps ──────────────────────────────────────────────

#[test]
fn test_event_timestamps_follow_clock() {
    let clock = Arc::new(TestClock::new());
    let events = vec![
        InputEvent::aim(Hand::Right, [0.0, 0.0, -1.2]),
        InputEvent::Trigger { value: 1.0 },
        InputEvent::Frame,
        InputEvent::Trigger { value: 0.0 },
        InputEvent::Frame,
    ];
    let mut c = build_with(
        Box::new(ScriptedInputProvider::new(events)),
        Arc::clone(&clock),
        TextureFormat::Rgba8,
    );

    assert!(c.step().unwrap());
    clock.advance(Duration::from_millis(16));
    assert!(c.step().unwrap());

    let sent = c.engine().events();
    assert_eq!(sent[0].timestamp_us, 0);
    assert_eq!(sent[1].timestamp_us, 0);
    assert_eq!(sent[2].timestamp_us, 16_000);
}

// ── Textures and layers ─────────────────────────────────────

#[test]
fn test_ui_bitmap_swizzled_for_bgra_device() {
    let mut c = build_with(
        Box::new(ScriptedInputProvider::new(vec![InputEvent::Frame, InputEvent::Frame])),
        Arc::new(TestClock::new()),
        TextureFormat::Bgra8,
    );
    let pixels = [1u8, 2, 3, 255].repeat(1280 * 720);
    assert!(c.engine_mut().present_now(&pixels, 1280 * 4, 720));
    c.run().unwrap();

    // Clear fill at startup plus exactly one bitmap upload.
    assert_eq!(c.gpu().upload_count(TextureId::Ui), 2);
    let upload = c.gpu().last_upload(TextureId::Ui).unwrap();
    assert_eq!(&upload.data[..4], &[3, 2, 1, 255]);
    assert_eq!(upload.row_pitch, 1280 * 4);
}

#[test]
fn test_oversized_bitmap_clamped_to_surface() {
    let mut c = build(vec![InputEvent::Frame]);
    let pixels = vec![7u8; 2000 * 800 * 4];
    assert!(c.engine_mut().present_now(&pixels, 2000 * 4, 800));
    c.run().unwrap();

    let upload = c.gpu().last_upload(TextureId::Ui).unwrap();
    let region = upload.region.unwrap();
    assert_eq!((region.width, region.height), (1280, 720));
}

#[test]
fn test_background_switch_mid_session() {
    let mut c = build(vec![InputEvent::Frame, InputEvent::Frame, InputEvent::Frame]);

    assert!(c.step().unwrap());
    assert_eq!(c.gpu().upload_count(TextureId::Background), 1);

    assert_eq!(c.engine().platform_message(BACKGROUND_CHANNEL, "none"), "ok");
    assert!(c.step().unwrap());
    assert_eq!(c.engine().platform_message(BACKGROUND_CHANNEL, "grid"), "ok");
    assert!(c.step().unwrap());
    while c.step().unwrap() {}

    let frames = c.runtime().submitted();
    assert_eq!(frames.len(), 3);
    assert_eq!(frames[0].layers[0].kind, LayerKind::Background);
    assert_eq!(frames[1].layers[0].kind, LayerKind::Ui);
    assert_eq!(frames[2].layers[0].kind, LayerKind::Background);
    assert_eq!(c.gpu().upload_count(TextureId::Background), 2);
}

#[test]
fn test_ground_layer_lies_flat_below_user() {
    let mut c = build(vec![InputEvent::Frame]);
    c.run().unwrap();

    let ground = &c.runtime().submitted()[0].layers[0];
    assert_eq!(ground.kind, LayerKind::Background);
    assert!((ground.pose.position.y + 1.5).abs() < 1e-6);
    assert!((ground.pose.position.z + 1.0).abs() < 1e-6);
    // Quad normal (+Z) points up once laid flat.
    let normal = ground.pose.orientation.rotate(xrpane_compositor::vr::geometry::Vec3::new(0.0, 0.0, 1.0));
    assert!((normal.y - 1.0).abs() < 1e-5);
    assert_eq!((ground.width_m, ground.height_m), (8.0, 8.0));
}

// ── Session lifecycle ───────────────────────────────────────

#[test]
fn test_session_runs_script_to_exit() {
    let recording = RecordingProvider::new(ScriptedInputProvider::demo());
    let mut c = build_with(Box::new(recording), Arc::new(TestClock::new()), TextureFormat::Rgba8);
    c.run().unwrap();

    assert_eq!(c.session_state(), SessionState::Exiting);
    assert!(c.runtime().is_torn_down());
    assert!(c.frames_rendered() > 20);

    let sent = c.engine().events();
    assert_eq!(sent.first().map(|e| e.phase), Some(PointerPhase::Add));
    assert_eq!(sent.last().map(|e| e.phase), Some(PointerPhase::Remove));
    // Left stick pushed up scrolls content up.
    assert!(scrolls(sent).iter().all(|&(dx, dy)| dx == 0.0 && approx(dy, -18.0)));
    assert_eq!(scrolls(sent).len(), 10);
}

#[test]
fn test_display_time_advances_each_frame() {
    let mut c = build(vec![InputEvent::Frame, InputEvent::Wait { ms: 50 }, InputEvent::Frame]);
    c.run().unwrap();
    let frames = c.runtime().submitted();
    assert_eq!(frames[1].display_time - frames[0].display_time, 61_000_000);
}
