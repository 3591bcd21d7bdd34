//! Rendering: the cube scene, camera, input and the Vulkan backend

pub mod camera;
pub mod frame;
pub mod input;
pub mod scene;
pub mod vulkan;

pub use camera::{CameraMovement, FlyCamera};
pub use frame::{run_frame, AcquireOutcome, FrameBackend, FrameStatus, PresentOutcome};
pub use input::{InputAction, InputState};
pub use vulkan::{VulkanRenderer, Window};
