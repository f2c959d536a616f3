//! vkframe viewer entry point.
//!
//! Opens a window, loads the configured mesh and spins it until the window
//! is closed. An optional first argument names a TOML configuration file.

use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{error, info};
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::WindowId;

use vkframe_core::{FpsCounter, Timer, ViewerConfig};
use vkframe_platform::Window;
use vkframe_renderer::Renderer;

struct App {
    config: ViewerConfig,
    // Dropped before the window it renders into.
    renderer: Option<Renderer>,
    window: Option<Window>,
    timer: Timer,
    fps: FpsCounter,
    fatal: Option<anyhow::Error>,
}

impl App {
    fn new(config: ViewerConfig) -> Self {
        Self {
            config,
            renderer: None,
            window: None,
            timer: Timer::new(),
            fps: FpsCounter::new(Duration::from_secs(1)),
            fatal: None,
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        error!("{:#}", err);
        self.fatal = Some(err);
        event_loop.exit();
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let mut window =
            Window::new(event_loop, &self.config.window).context("failed to create window")?;
        let renderer =
            Renderer::new(&mut window, &self.config).context("failed to create renderer")?;

        self.renderer = Some(renderer);
        self.window = Some(window);
        self.timer.tick();
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
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested, shutting down");
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Some(window) = self.window.as_mut() {
                    window.resize(size.width, size.height);
                }
            }
            WindowEvent::RedrawRequested => {
                let delta = self.timer.tick();
                let Some(renderer) = self.renderer.as_mut() else {
                    return;
                };

                if let Err(e) = renderer.draw(delta.as_secs_f32()) {
                    self.fail(event_loop, anyhow::Error::new(e).context("frame loop aborted"));
                    return;
                }

                if let (Some(fps), Some(window)) = (self.fps.record(delta), self.window.as_ref()) {
                    window.set_title(&format!("{} - {:.0} fps", self.config.window.title, fps));
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = self.window.as_ref() {
            window.request_redraw();
        }
    }
}

fn load_config() -> Result<ViewerConfig> {
    match std::env::args_os().nth(1) {
        Some(path) => ViewerConfig::load(&path)
            .with_context(|| format!("failed to load config {:?}", path)),
        None => {
            info!("No config file given, using defaults");
            Ok(ViewerConfig::default())
        }
    }
}

fn main() -> Result<()> {
    vkframe_core::init_logging();
    info!("Starting vkframe");

    let config = load_config()?;

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    // Release GPU objects before reporting.
    app.renderer.take();

    match app.fatal.take() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
