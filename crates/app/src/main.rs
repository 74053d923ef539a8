//! vbparts - Main Entry Point
//!
//! Compares deferred-shading techniques and particle generation strategies
//! under one frame loop. Flags take the form `-name:value`, e.g.
//! `vbparts -renderer:g6 -pmode:co -pcount:262144`.

mod controls;
mod title;

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, info};
use winit::application::ApplicationHandler;
use winit::event::{DeviceEvent, DeviceId, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::WindowId;

use vbparts_core::{RuntimeSettings, Timer};
use vbparts_platform::{InputState, KeyCode, Window};
use vbparts_renderer::{FrameInputs, Rebuild, Renderer, TickOutcome};
use vbparts_scene::{Camera, FpsController};

use crate::controls::{CONTROL_KEYS, widget_edit};
use crate::title::{TitleOverlay, TitleSlot};

const FPS_LOG_INTERVAL: Duration = Duration::from_secs(2);

/// Frame counter logged every [`FPS_LOG_INTERVAL`].
#[derive(Default)]
struct FpsCounter {
    frames: u32,
    elapsed: f32,
}

impl FpsCounter {
    fn frame(&mut self, dt: f32) {
        self.frames += 1;
        self.elapsed += dt;
        if self.elapsed >= FPS_LOG_INTERVAL.as_secs_f32() {
            let fps = self.frames as f32 / self.elapsed;
            info!("{:.1} fps ({:.2} ms)", fps, 1000.0 / fps);
            *self = Self::default();
        }
    }
}

struct App {
    settings: RuntimeSettings,
    // Dropped before the window it draws to
    renderer: Option<Renderer>,
    window: Option<Window>,
    input: InputState,
    timer: Timer,
    camera: Camera,
    controller: FpsController,
    fps: FpsCounter,
    title: TitleSlot,
    failure: Option<anyhow::Error>,
}

impl App {
    fn new(settings: RuntimeSettings) -> Self {
        let mut timer = Timer::new();
        timer.set_frozen(settings.freeze_time);
        Self {
            settings,
            renderer: None,
            window: None,
            input: InputState::new(),
            timer,
            camera: Camera::new(),
            controller: FpsController::new(),
            fps: FpsCounter::default(),
            title: TitleSlot::default(),
            failure: None,
        }
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let window = Window::new(
            event_loop,
            self.settings.window_width,
            self.settings.window_height,
            "vbparts",
        )
        .context("Failed to create window")?;
        let mut renderer =
            Renderer::new(&window, &self.settings).context("Failed to create renderer")?;
        renderer
            .set_overlay(Box::new(TitleOverlay::new(self.title.clone())))
            .context("Failed to install overlay")?;

        self.renderer = Some(renderer);
        self.window = Some(window);
        Ok(())
    }

    /// Stops the loop, keeping the first error for `main` to report.
    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        error!("{:#}", err);
        self.failure.get_or_insert(err);
        event_loop.exit();
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let frame = self.timer.frame();
        let (Some(window), Some(renderer)) = (self.window.as_mut(), self.renderer.as_mut()) else {
            return Ok(());
        };

        if self.input.is_key_just_pressed(KeyCode::Escape) {
            info!("Escape pressed, shutting down");
            event_loop.exit();
            return Ok(());
        }
        if self.input.is_key_just_pressed(KeyCode::KeyF) {
            let frozen = !self.timer.is_frozen();
            self.timer.set_frozen(frozen);
            info!("Time frozen: {}", frozen);
        }

        for key in CONTROL_KEYS {
            if !self.input.is_key_just_pressed(key) {
                continue;
            }
            if let Some(edit) = widget_edit(key) {
                let rebuild = renderer
                    .edit_widgets(edit)
                    .with_context(|| format!("Failed to apply {key:?}"))?;
                if rebuild != Rebuild::None {
                    debug!("{:?} needs {:?}", key, rebuild);
                }
            }
        }

        if let Some(captured) = self.controller.update(&mut self.camera, &self.input, frame.dt) {
            window.set_cursor_captured(captured);
        }
        self.camera.set_aspect(renderer.aspect_ratio());

        let inputs = FrameInputs {
            time: frame.time,
            view: self.camera.view_matrix(),
            proj: self.camera.projection_matrix(),
        };
        match renderer.tick(&inputs)? {
            TickOutcome::Presented => self.fps.frame(frame.dt),
            TickOutcome::Rebuilt => debug!("Frame skipped for swapchain rebuild"),
            TickOutcome::Skipped => {}
        }

        if let Some(title) = self.title.take() {
            window.set_title(&title);
        }
        self.input.end_frame();
        Ok(())
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        match self.init(event_loop) {
            Ok(()) => info!("Initialization complete, entering main loop"),
            Err(e) => self.fail(event_loop, e),
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        if self.input.handle_window_event(&event) {
            return;
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested, shutting down");
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Some(renderer) = self.renderer.as_mut() {
                    renderer.resize(size.width, size.height);
                }
            }
            WindowEvent::RedrawRequested => {
                if let Err(e) = self.redraw(event_loop) {
                    self.fail(event_loop, e);
                }
            }
            _ => {}
        }
    }

    fn device_event(&mut self, _event_loop: &ActiveEventLoop, _id: DeviceId, event: DeviceEvent) {
        if let DeviceEvent::MouseMotion { delta: (dx, dy) } = event {
            self.input.on_mouse_motion(dx, dy);
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = self.window.as_ref() {
            window.request_redraw();
        }
    }
}

fn main() -> Result<()> {
    vbparts_core::init_logging();

    let settings =
        RuntimeSettings::parse_args(std::env::args()).context("Invalid command-line flags")?;
    info!("Starting vbparts with {:?}", settings);

    let event_loop = EventLoop::new().context("Failed to create event loop")?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(settings);
    event_loop.run_app(&mut app)?;

    match app.failure.take() {
        Some(err) => Err(anyhow!("vbparts stopped: {err:#}")),
        None => Ok(()),
    }
}
