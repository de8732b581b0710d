//! Translucent viewer.
//!
//! Loads the glTF models named in the configuration and orbits around them.
//! Drag with the left mouse button to rotate, scroll to zoom.
//!
//! Usage: `translucent [config.toml]` (defaults to `translucent.toml`).

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{error, info, warn};
use winit::application::ApplicationHandler;
use winit::event::{MouseScrollDelta, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::WindowId;

use translucent_core::{Config, Timer};
use translucent_platform::{InputState, MouseButton, Window};
use translucent_renderer::{FrameOutcome, Renderer};
use translucent_resources::Model;
use translucent_scene::OrbitController;

const DEFAULT_CONFIG: &str = "translucent.toml";
const FPS_INTERVAL: Duration = Duration::from_secs(2);
/// Pixels per scroll line for touchpads reporting pixel deltas.
const PIXELS_PER_LINE: f32 = 40.0;

struct App {
    config: Config,
    models: Option<Vec<Model>>,
    // Renderer before window: the surface must go before the window does.
    renderer: Option<Renderer>,
    window: Option<Window>,
    orbit: OrbitController,
    input: InputState,
    timer: Timer,
    /// First fatal error, reported after the event loop exits.
    failure: Option<anyhow::Error>,
}

impl App {
    fn new(config: Config, models: Vec<Model>) -> Self {
        Self {
            config,
            models: Some(models),
            renderer: None,
            window: None,
            orbit: OrbitController::default(),
            input: InputState::new(),
            timer: Timer::new(),
            failure: None,
        }
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let window = Window::new(event_loop, &self.config.window)?;
        let models = self.models.take().unwrap_or_default();
        let renderer = Renderer::new(
            &window,
            &self.config.render,
            &self.config.assets.shader_dir,
            models,
        )
        .context("failed to create renderer")?;

        self.orbit = OrbitController::frame(&renderer.scene_bounds(), renderer.camera().fov_y);
        info!("Initialization complete, entering main loop");

        self.renderer = Some(renderer);
        self.window = Some(window);
        Ok(())
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        error!("{:#}", err);
        self.failure.get_or_insert(err);
        event_loop.exit();
    }

    fn redraw(&mut self) -> Result<()> {
        let Some(renderer) = self.renderer.as_mut() else {
            return Ok(());
        };

        if self.input.is_mouse_pressed(MouseButton::Left) {
            self.orbit.rotate(self.input.cursor_delta());
        }
        self.orbit.zoom(self.input.scroll());
        self.orbit.apply(renderer.camera_mut());
        self.input.begin_frame();

        if renderer.render_frame()? != FrameOutcome::Presented {
            return Ok(());
        }
        self.timer.tick();
        if let Some(fps) = self.timer.fps_report(FPS_INTERVAL) {
            let stats = renderer.stats();
            info!(
                "{:.1} fps ({} presented, {} skipped, {} rebuilds)",
                fps, stats.presented, stats.skipped, stats.recreations
            );
        }
        Ok(())
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none()
            && let Err(e) = self.init(event_loop)
        {
            self.fail(event_loop, e);
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested, shutting down");
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Some(window) = self.window.as_mut() {
                    window.resize(size.width, size.height);
                }
                if let Some(renderer) = self.renderer.as_mut() {
                    renderer.resize(size.width, size.height);
                }
            }
            WindowEvent::RedrawRequested => {
                if let Err(e) = self.redraw() {
                    self.fail(event_loop, e.context("frame failed"));
                }
            }
            WindowEvent::MouseInput { state, button, .. } => {
                let button = MouseButton::from(button);
                if state.is_pressed() {
                    self.input.on_mouse_pressed(button);
                } else {
                    self.input.on_mouse_released(button);
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                self.input.on_cursor_moved(position.x as f32, position.y as f32);
            }
            WindowEvent::CursorLeft { .. } => self.input.on_cursor_left(),
            WindowEvent::MouseWheel { delta, .. } => {
                let lines = match delta {
                    MouseScrollDelta::LineDelta(_, y) => y,
                    MouseScrollDelta::PixelDelta(position) => position.y as f32 / PIXELS_PER_LINE,
                };
                self.input.on_scroll(lines);
            }
            WindowEvent::KeyboardInput { event, .. } => {
                use winit::keyboard::PhysicalKey;
                if let PhysicalKey::Code(key) = event.physical_key {
                    if event.state.is_pressed() {
                        self.input.on_key_pressed(key);
                    } else {
                        self.input.on_key_released(key);
                    }
                }
                if self.input.is_key_just_pressed(translucent_platform::KeyCode::Escape) {
                    event_loop.exit();
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        // Minimized windows get no redraws until the next resize.
        if let Some(window) = self.window.as_ref()
            && !window.is_minimized()
        {
            window.request_redraw();
        }
    }
}

fn load_models(config: &Config) -> Result<Vec<Model>> {
    if config.assets.models.is_empty() {
        warn!("No models configured, rendering an empty scene");
    }
    config
        .assets
        .models
        .iter()
        .map(|path| {
            let model = Model::load(path)
                .with_context(|| format!("failed to load model {}", path.display()))?;
            info!(
                "Loaded '{}': {} meshes, {} vertices, {} triangles",
                model.name,
                model.meshes.len(),
                model.total_vertex_count(),
                model.total_triangle_count()
            );
            Ok(model)
        })
        .collect()
}

fn main() -> Result<()> {
    translucent_core::init_logging();

    let config_path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG));
    let config = Config::load_or_default(&config_path)
        .with_context(|| format!("invalid configuration {}", config_path.display()))?;
    let models = load_models(&config)?;

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config, models);
    event_loop.run_app(&mut app)?;
    info!("Exiting after {:.1?}", app.timer.elapsed());

    match app.failure.take() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
