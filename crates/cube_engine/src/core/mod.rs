//! # Core Module
//!
//! Shared configuration used by the renderer and the demo application.

pub mod config;

pub use config::{
    ApplicationConfig,
    AssetConfig,
    CameraConfig,
    Config,
    ConfigError,
    EngineConfig,
    ShaderConfig,
    VulkanRendererConfig,
    WindowConfig,
};
