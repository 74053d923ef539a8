//! Camera and controller.
//!
//! This crate provides:
//! - A first-person camera with Vulkan projection
//! - A WASD fly controller with toggleable mouse-look

pub mod camera;

pub use camera::{Camera, FpsController, Projection};
