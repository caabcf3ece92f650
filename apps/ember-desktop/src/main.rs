use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use ember_app::{AppConfig, FrameClock, Game};
use ember_assets::AssetLoader;
use ember_input::{Action, InputEvent, InputState, Key, MouseButton};
use ember_render_wgpu::WgpuDevice;
use glam::Vec2;
use tracing_subscriber::EnvFilter;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowId};

#[derive(Parser)]
#[command(name = "ember-desktop", about = "ember render loop in a desktop window")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Asset root, overriding `assets.root` from the config
    #[arg(long)]
    assets: Option<PathBuf>,
}

struct GpuApp {
    config: AppConfig,
    window: Option<Arc<Window>>,
    device: Option<WgpuDevice>,
    game: Option<Game>,
    input: InputState,
    clock: FrameClock,
    fatal: Option<anyhow::Error>,
}

impl GpuApp {
    fn new(config: AppConfig) -> Self {
        Self {
            config,
            window: None,
            device: None,
            game: None,
            input: InputState::new(),
            clock: FrameClock::new(),
            fatal: None,
        }
    }

    /// Open the window and the GPU device, then build the scene.
    fn start(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let window_config = &self.config.window;
        let attrs = Window::default_attributes()
            .with_title(window_config.title.clone())
            .with_inner_size(PhysicalSize::new(window_config.width, window_config.height));
        let window = Arc::new(event_loop.create_window(attrs).context("create window")?);

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let surface = instance
            .create_surface(window.clone())
            .context("create surface")?;

        let size = window.inner_size();
        let mut device = WgpuDevice::new(&instance, surface, size.width, size.height)
            .context("open graphics device")?;

        let assets = AssetLoader::new(&self.config.assets.root);
        let game = Game::init(&mut device, &assets, self.config.scene).context("build scene")?;

        self.window = Some(window);
        self.device = Some(device);
        self.game = Some(game);
        Ok(())
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        tracing::error!("{err:#}");
        self.fatal = Some(err);
        event_loop.exit();
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        let dt = self.clock.tick();
        let (Some(game), Some(device)) = (&mut self.game, &mut self.device) else {
            return;
        };
        match game.update(device, dt) {
            Ok(report) => {
                if !report.skipped.is_empty() {
                    tracing::debug!(skipped = report.skipped.len(), "frame skipped meshes");
                }
            }
            Err(err) => {
                let err = anyhow::Error::new(err).context("render frame");
                self.fail(event_loop, err);
            }
        }
    }
}

/// Translate a winit event into the backend-neutral input vocabulary.
fn translate(event: &WindowEvent) -> Option<InputEvent> {
    match event {
        WindowEvent::KeyboardInput {
            event:
                KeyEvent {
                    physical_key,
                    state,
                    repeat: false,
                    ..
                },
            ..
        } => {
            let key = match physical_key {
                PhysicalKey::Code(KeyCode::Escape) => Key::Escape,
                _ => Key::Other,
            };
            Some(match state {
                ElementState::Pressed => InputEvent::KeyPressed(key),
                ElementState::Released => InputEvent::KeyReleased(key),
            })
        }
        WindowEvent::CursorMoved { position, .. } => Some(InputEvent::CursorMoved(Vec2::new(
            position.x as f32,
            position.y as f32,
        ))),
        WindowEvent::MouseInput { state, button, .. } => {
            let button = match button {
                winit::event::MouseButton::Left => MouseButton::Left,
                winit::event::MouseButton::Right => MouseButton::Right,
                winit::event::MouseButton::Middle => MouseButton::Middle,
                _ => MouseButton::Other,
            };
            Some(match state {
                ElementState::Pressed => InputEvent::ButtonPressed(button),
                ElementState::Released => InputEvent::ButtonReleased(button),
            })
        }
        _ => None,
    }
}

impl ApplicationHandler for GpuApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() || self.fatal.is_some() {
            return;
        }
        if let Err(err) = self.start(event_loop) {
            self.fail(event_loop, err);
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        if let Some(input) = translate(&event) {
            match self.input.handle(input) {
                Action::Quit => event_loop.exit(),
                Action::PrimaryClick(position) => {
                    tracing::info!(x = position.x, y = position.y, "left click");
                }
                Action::Noop => {}
            }
            return;
        }

        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::Resized(new_size) => {
                if let Some(device) = &mut self.device {
                    device.resize(new_size.width, new_size.height);
                }
            }
            WindowEvent::RedrawRequested => self.redraw(event_loop),
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        if let (Some(game), Some(device)) = (&mut self.game, &mut self.device) {
            game.shutdown(device);
        }
        tracing::info!(
            frames = self.clock.frames(),
            avg_ms = self.clock.timer().average().as_secs_f64() * 1000.0,
            "event loop finished"
        );
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    let mut config = AppConfig::load_or_default(cli.config.as_deref())?;
    if let Some(root) = cli.assets {
        config.assets.root = root;
    }
    tracing::info!(assets = %config.assets.root.display(), "ember-desktop starting");

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = GpuApp::new(config);
    event_loop.run_app(&mut app)?;

    match app.fatal {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
