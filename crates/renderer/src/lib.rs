//! Frame orchestration and render techniques.
//!
//! This crate drives the renderer:
//! - Frame lifecycle across the graphics, present and compute queues
//! - Swapchain rebuilds on resize or staleness
//! - Forward, G-buffer and visibility-buffer techniques
//! - Particle generation strategies
//! - Runtime controls for an overlay

mod context;
mod depth_buffer;
mod error;
pub mod frame;
pub mod overlay;
pub mod particles;
mod renderer;
pub mod technique;
pub mod ubo;

pub use error::{RendererError, RendererResult};
pub use frame::TickOutcome;
pub use overlay::{Overlay, Rebuild, WidgetState};
pub use particles::{GenerationMode, ParticleSettings};
pub use renderer::Renderer;
pub use technique::{FrameInputs, SceneOptions, Technique, TechniqueKind};
