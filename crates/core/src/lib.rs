//! Core utilities shared by every vbparts crate.
//!
//! This crate provides foundational types used across the renderer:
//! - Error types and result aliases
//! - Logging initialization
//! - Frame timer
//! - Runtime settings parsed from command-line flags

mod config;
mod error;
mod logging;
mod timer;

pub use config::{ParticleModeArg, RuntimeSettings, TechniqueArg};
pub use error::{Error, Result};
pub use logging::init_logging;
pub use timer::{FrameTime, Timer};
