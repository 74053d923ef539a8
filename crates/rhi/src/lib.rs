//! Vulkan abstraction layer (Render Hardware Interface).
//!
//! This crate provides a safe abstraction over Vulkan using the `ash` crate.
//! It handles:
//! - Instance, device and queue creation (graphics, present, compute)
//! - Swapchain management
//! - Render passes with a present/intermediate/depth attachment convention
//! - Resource binding tables and pipelines
//! - Buffers, images and queue-family ownership transfer
//! - Command buffer recording and synchronization primitives

mod error;

pub mod bindable;
pub mod buffer;
pub mod command;
pub mod descriptor;
pub mod device;
pub mod image;
pub mod instance;
pub mod ownership;
pub mod physical_device;
pub mod pipeline;
pub mod render_pass;
pub mod sampler;
pub mod shader;
pub mod swapchain;
pub mod sync;
pub mod vertex;

pub use bindable::Bindable;
pub use error::{RhiError, RhiResult};

// Re-export ash types that users might need
pub use ash::vk;
