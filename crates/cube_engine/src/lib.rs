//! # Cube Engine
//!
//! A small Vulkan 1.3 renderer: ten textured cubes, a fly camera and a
//! double-buffered frame loop built on dynamic rendering.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cube_engine::prelude::*;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ApplicationConfig::default();
//!     let mut window = Window::new(&config.window.title, config.window.width, config.window.height)?;
//!     let mut renderer = VulkanRenderer::new(&config, &mut window)?;
//!     let camera = FlyCamera::new(&config.camera);
//!     let mut resized = false;
//!
//!     while !window.should_close() {
//!         window.poll_events();
//!         renderer.draw_frame(&camera.view_matrix(), window.get_framebuffer_size(), &mut resized);
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(
    clippy::module_name_repetitions,
    clippy::similar_names,
    clippy::too_many_arguments,
    clippy::missing_errors_doc,
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss
)]

pub mod config;
pub mod core;
pub mod foundation;
pub mod render;

/// Common imports for engine users
pub mod prelude {
    pub use crate::{
        core::{ApplicationConfig, CameraConfig, Config, ConfigError},
        foundation::{
            logging,
            math::{Mat4, Vec3},
            time::{FpsCounter, Timer},
        },
        render::{
            CameraMovement, FlyCamera, FrameStatus, InputAction, InputState, VulkanRenderer, Window,
        },
        render::vulkan::{VulkanError, VulkanResult, WindowError},
    };
}
