//! Ten textured cubes and a fly camera
//!
//! WASD moves, the mouse looks around, Escape quits. Settings come from
//! `cubes.toml` in the working directory when it exists.

use cube_engine::core::{ApplicationConfig, Config, ConfigError};
use cube_engine::foundation::logging;
use cube_engine::foundation::time::{FpsCounter, Timer};
use cube_engine::render::vulkan::{VulkanError, WindowError};
use cube_engine::render::{FlyCamera, FrameStatus, InputAction, InputState, VulkanRenderer, Window};
use thiserror::Error;

const CONFIG_PATH: &str = "cubes.toml";

/// Anything that stops the demo from starting
#[derive(Error, Debug)]
enum AppError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("window error: {0}")]
    Window(#[from] WindowError),

    #[error("renderer error: {0}")]
    Vulkan(#[from] VulkanError),
}

struct CubesApp {
    // dropped before the window so the surface goes first
    renderer: VulkanRenderer,
    window: Window,
    camera: FlyCamera,
    input: InputState,
    timer: Timer,
    fps: FpsCounter,
}

impl CubesApp {
    fn new(config: &ApplicationConfig) -> Result<Self, AppError> {
        log::info!("Creating window...");
        let mut window = Window::new(&config.window.title, config.window.width, config.window.height)?;
        window.capture_cursor();

        log::info!("Creating Vulkan renderer...");
        let renderer = VulkanRenderer::new(config, &mut window)?;

        Ok(Self {
            renderer,
            window,
            camera: FlyCamera::new(&config.camera),
            input: InputState::new(config.window.width, config.window.height),
            timer: Timer::new(),
            fps: FpsCounter::new(),
        })
    }

    fn run(&mut self) {
        let mut recreated = 0u32;

        while !self.window.should_close() {
            let now = self.window.get_time();
            let delta_time = self.timer.tick(now);
            if let Some(fps) = self.fps.frame(now) {
                log::info!("FPS: {}", fps);
            }

            self.handle_events();
            for movement in InputState::movements(|key| self.window.is_key_pressed(key)) {
                self.camera.process_keyboard(movement, delta_time);
            }

            let view = self.camera.view_matrix();
            let framebuffer_size = self.window.get_framebuffer_size();
            if self.renderer.draw_frame(&view, framebuffer_size, self.input.resize_flag()) == FrameStatus::Recreated {
                recreated += 1;
            }
        }

        log::info!("Window closed after {} swapchain rebuilds", recreated);
        if let Err(err) = self.renderer.wait_idle() {
            log::warn!("device_wait_idle failed: {}", err);
        }
    }

    fn handle_events(&mut self) {
        self.window.poll_events();
        let events: Vec<_> = self.window.flush_events().map(|(_, event)| event).collect();

        for event in &events {
            match self.input.handle_event(event) {
                InputAction::Close => self.window.set_should_close(true),
                InputAction::Look { dx, dy } => self.camera.process_mouse(dx, dy),
                InputAction::Resized { width, height } => {
                    log::debug!("Framebuffer resized to {}x{}", width, height);
                }
                InputAction::None => {}
            }
        }
    }
}

fn main() {
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("PANIC occurred: {:?}", panic_info);

        if let Some(location) = panic_info.location() {
            eprintln!("Panic location: {}:{}:{}", location.file(), location.line(), location.column());
        }
    }));

    let config = match ApplicationConfig::load_or_default(CONFIG_PATH) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Failed to read {}: {}", CONFIG_PATH, err);
            std::process::exit(1);
        }
    };
    logging::init(&config.engine.log_level);
    log::info!("Starting cubes demo");

    let result = config
        .validate()
        .map_err(AppError::from)
        .and_then(|()| CubesApp::new(&config));
    let mut app = match result {
        Ok(app) => app,
        Err(err) => {
            log::error!("Initialization failed: {}", err);
            std::process::exit(1);
        }
    };

    app.run();
    drop(app);
    log::info!("Cubes demo finished");
}
