//! Platform abstraction layer.
//!
//! This crate provides platform-specific functionality:
//! - Window management and cursor capture via winit
//! - Keyboard state and cursor deltas
//! - Vulkan surface creation

mod input;
mod window;

pub use input::{InputState, KeyCode};
pub use window::{Surface, Window};

// Re-export winit types that users might need
pub use winit::event::{DeviceEvent, WindowEvent};
pub use winit::event_loop::{ActiveEventLoop, EventLoop};
