//! # Application Configuration
//!
//! Every setting has a compiled-in default, so a config file is optional.
//! The types serialize to TOML or RON through [`Config`].
//!
//! ## Configuration Categories
//!
//! - **Window**: title and initial size
//! - **Renderer**: Vulkan application info, validation, depth, shaders
//! - **Assets**: texture location
//! - **Camera**: projection and fly-camera tuning
//! - **Engine**: logging

use serde::{Deserialize, Serialize};
use std::path::Path;

pub use crate::config::{Config, ConfigError};

/// # Shader Configuration
///
/// SPIR-V paths for the cube pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShaderConfig {
    /// Path to the vertex shader SPIR-V file
    pub vertex_shader_path: String,
    /// Path to the fragment shader SPIR-V file
    pub fragment_shader_path: String,
}

impl ShaderConfig {
    /// Create a new shader configuration
    pub fn new(vertex_path: impl Into<String>, fragment_path: impl Into<String>) -> Self {
        Self {
            vertex_shader_path: vertex_path.into(),
            fragment_shader_path: fragment_path.into(),
        }
    }

    /// Create shader config with automatic path resolution
    ///
    /// Tries the build output first, then a few common locations, so the
    /// binary works from the workspace root and from its own directory.
    pub fn with_path_resolution(base_vertex: &str, base_fragment: &str) -> Self {
        const SHADER_DIRS: [&str; 5] = [
            "target/shaders/",
            "../target/shaders/",
            "shaders/",
            "resources/shaders/",
            "./",
        ];

        let find = |name: &str| {
            SHADER_DIRS
                .iter()
                .map(|dir| format!("{dir}{name}"))
                .find(|candidate| Path::new(candidate).exists())
                .unwrap_or_else(|| format!("{}{name}", SHADER_DIRS[0]))
        };

        Self {
            vertex_shader_path: find(base_vertex),
            fragment_shader_path: find(base_fragment),
        }
    }

    /// Validate that shader files exist
    pub fn validate(&self) -> Result<(), ConfigError> {
        for path in [&self.vertex_shader_path, &self.fragment_shader_path] {
            if !Path::new(path).exists() {
                return Err(ConfigError::Invalid(format!("Shader not found: {path}")));
            }
        }
        Ok(())
    }
}

impl Default for ShaderConfig {
    fn default() -> Self {
        Self::with_path_resolution("cube_vertex.spv", "cube_fragment.spv")
    }
}

/// # Window Configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Window title
    pub title: String,
    /// Initial width in screen coordinates
    pub width: u32,
    /// Initial height in screen coordinates
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Star Dust".to_string(),
            width: 800,
            height: 600,
        }
    }
}

/// # Vulkan Renderer Configuration
///
/// Application metadata for instance creation plus the debug features.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VulkanRendererConfig {
    /// Application name for Vulkan instance creation
    pub application_name: String,
    /// Engine name for Vulkan instance creation
    pub engine_name: String,
    /// Application version (major, minor, patch)
    pub application_version: (u32, u32, u32),
    /// Shader configuration
    pub shaders: ShaderConfig,
    /// Whether to build a depth attachment alongside the swapchain
    pub use_depth: bool,
    /// Whether to enable Vulkan validation layers
    ///
    /// `None` enables them in debug builds only and tolerates a missing layer.
    pub enable_validation: Option<bool>,
}

impl VulkanRendererConfig {
    /// Create a new renderer configuration
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            application_name: app_name.into(),
            engine_name: "Shining Engine".to_string(),
            application_version: (1, 0, 0),
            shaders: ShaderConfig::default(),
            use_depth: true,
            enable_validation: None,
        }
    }

    /// Set application version
    #[must_use]
    pub fn with_version(mut self, major: u32, minor: u32, patch: u32) -> Self {
        self.application_version = (major, minor, patch);
        self
    }

    /// Set custom shader configuration
    #[must_use]
    pub fn with_shaders(mut self, shaders: ShaderConfig) -> Self {
        self.shaders = shaders;
        self
    }

    /// Enable or disable validation layers
    #[must_use]
    pub fn with_validation(mut self, enabled: bool) -> Self {
        self.enable_validation = Some(enabled);
        self
    }

    /// Whether validation should be turned on for this build
    pub fn validation_enabled(&self) -> bool {
        self.enable_validation.unwrap_or(cfg!(debug_assertions))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.application_name.is_empty() {
            return Err(ConfigError::Invalid("Application name cannot be empty".to_string()));
        }
        self.shaders.validate()
    }
}

impl Default for VulkanRendererConfig {
    fn default() -> Self {
        Self::new("Star Dust")
    }
}

/// # Asset Configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetConfig {
    /// Texture applied to every cube
    pub texture_path: String,
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            texture_path: "resources/textures/container.png".to_string(),
        }
    }
}

/// # Camera Configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Vertical field of view in degrees
    pub fov_degrees: f32,
    /// Near clipping plane
    pub near: f32,
    /// Far clipping plane
    pub far: f32,
    /// Movement speed in units per second
    pub speed: f32,
    /// Degrees of rotation per pixel of mouse movement
    pub sensitivity: f32,
}

impl CameraConfig {
    /// Validate projection parameters
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.fov_degrees > 0.0 && self.fov_degrees < 180.0) {
            return Err(ConfigError::Invalid(format!("Field of view out of range: {}", self.fov_degrees)));
        }
        if self.near <= 0.0 || self.near >= self.far {
            return Err(ConfigError::Invalid(format!(
                "Clip planes must satisfy 0 < near < far (near={}, far={})",
                self.near, self.far
            )));
        }
        Ok(())
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            fov_degrees: 60.0,
            near: 0.1,
            far: 100.0,
            speed: 2.5,
            sensitivity: 0.1,
        }
    }
}

/// # Engine Configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Default log level; `RUST_LOG` overrides it
    pub log_level: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// # Complete Application Configuration
///
/// Top-level configuration loaded by the demo application.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Window settings
    pub window: WindowConfig,
    /// Rendering system configuration
    pub renderer: VulkanRendererConfig,
    /// Asset locations
    pub assets: AssetConfig,
    /// Camera tuning
    pub camera: CameraConfig,
    /// Engine core configuration
    pub engine: EngineConfig,
}

impl ApplicationConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window.width == 0 || self.window.height == 0 {
            return Err(ConfigError::Invalid("Window size must be non-zero".to_string()));
        }
        self.camera.validate()?;
        self.renderer.validate()
    }
}

impl Config for ApplicationConfig {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigFormat;

    fn sample() -> ApplicationConfig {
        let mut config = ApplicationConfig::default();
        config.renderer.shaders = ShaderConfig::new("a.spv", "b.spv");
        config
    }

    #[test]
    fn test_defaults_match_the_demo() {
        let config = ApplicationConfig::default();
        assert_eq!(config.window.width, 800);
        assert_eq!(config.window.height, 600);
        assert_eq!(config.renderer.application_name, "Star Dust");
        assert_eq!(config.renderer.engine_name, "Shining Engine");
        assert!(config.renderer.use_depth);
        assert!(config.camera.validate().is_ok());
    }

    #[test]
    fn test_toml_round_trip() {
        let config = sample();
        let text = config.to_string_with_format(ConfigFormat::Toml).unwrap();
        let parsed = ApplicationConfig::from_str_with_format(&text, ConfigFormat::Toml).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_ron_round_trip() {
        let config = sample().renderer.with_validation(true);
        let text = ron::ser::to_string(&config).unwrap();
        let parsed: VulkanRendererConfig = ron::from_str(&text).unwrap();
        assert_eq!(parsed.enable_validation, Some(true));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let text = "[window]\ntitle = \"Cubes\"\nwidth = 1024\nheight = 768\n";
        let parsed = ApplicationConfig::from_str_with_format(text, ConfigFormat::Toml).unwrap();
        assert_eq!(parsed.window.title, "Cubes");
        assert_eq!(parsed.window.width, 1024);
        assert_eq!(parsed.engine.log_level, "info");
    }

    #[test]
    fn test_camera_validation_rejects_inverted_planes() {
        let camera = CameraConfig {
            near: 10.0,
            far: 1.0,
            ..CameraConfig::default()
        };
        assert!(matches!(camera.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_missing_shader_fails_validation() {
        let shaders = ShaderConfig::new("definitely/missing.spv", "also/missing.spv");
        assert!(shaders.validate().is_err());
    }

    #[test]
    fn test_explicit_validation_flag_wins() {
        let config = VulkanRendererConfig::default().with_validation(false);
        assert!(!config.validation_enabled());
    }
}
