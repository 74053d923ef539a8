//! Render techniques.
//!
//! A technique owns its render pass, attachments, binding tables, pipelines
//! and particle system, and records one frame's worth of commands. The four
//! techniques are:
//!
//! - [`ForwardTechnique`]: one subpass straight into the present image
//! - [`GBufferTechnique`]: 3 or 6 targets, then a full-screen lighting pass
//! - [`VisibilityTechnique`]: one target of triangle/material ids and
//!   barycentrics, shaded from a vertex table in the lighting pass
//!
//! The orchestrator holds a [`Technique`] and never needs to know which one
//! it is. Rebuilding a technique is dropping it and calling
//! [`Technique::new`] again.

mod forward;
mod gbuffer;
pub mod scene;
mod visibility;

pub use forward::ForwardTechnique;
pub use gbuffer::GBufferTechnique;
pub use visibility::VisibilityTechnique;

use glam::Mat4;

use vbparts_core::TechniqueArg;
use vbparts_rhi::command::CommandBuffer;
use vbparts_rhi::render_pass::RenderPass;
use vbparts_rhi::vk;

use crate::context::BuildContext;
use crate::error::RendererResult;
use crate::particles::{ParticleSettings, ParticleSystem};

/// Which technique to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TechniqueKind {
    Forward,
    GBuffer3,
    GBuffer6,
    Visibility,
}

impl TechniqueKind {
    /// Selection order in the overlay.
    pub const ALL: [Self; 4] = [
        Self::Visibility,
        Self::GBuffer3,
        Self::GBuffer6,
        Self::Forward,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Forward => "Forward Renderer",
            Self::GBuffer3 => "Geometry Buffer (3)",
            Self::GBuffer6 => "Geometry Buffer (6)",
            Self::Visibility => "Visibility Buffer",
        }
    }

    /// Suffix of this technique's shader names.
    pub fn suffix(self) -> &'static str {
        match self {
            Self::Forward => "fwd",
            Self::GBuffer3 => "g3",
            Self::GBuffer6 => "g6",
            Self::Visibility => "v",
        }
    }

    /// Position in [`TechniqueKind::ALL`].
    pub fn index(self) -> usize {
        Self::ALL
            .iter()
            .position(|kind| *kind == self)
            .unwrap_or_default()
    }

    /// The technique after this one, wrapping around.
    pub fn next(self) -> Self {
        Self::ALL[(self.index() + 1) % Self::ALL.len()]
    }

    /// Names of the debug views the lighting pass can show.
    ///
    /// Empty for the forward renderer, which has no lighting pass.
    pub fn debug_views(self) -> &'static [&'static str] {
        match self {
            Self::Forward => &[],
            Self::GBuffer3 => &["Shaded", "Depth", "Albedo", "WS Position", "WS Normal"],
            Self::GBuffer6 => &[
                "Shaded",
                "Depth",
                "Albedo",
                "WS Position",
                "WS Normal",
                "Emission",
                "Specular",
                "Metallic / Roughness",
            ],
            Self::Visibility => &["Shaded", "Visibility UV", "Primitive ID", "Material ID"],
        }
    }
}

impl From<TechniqueArg> for TechniqueKind {
    fn from(arg: TechniqueArg) -> Self {
        match arg {
            TechniqueArg::Forward => Self::Forward,
            TechniqueArg::GBuffer3 => Self::GBuffer3,
            TechniqueArg::GBuffer6 => Self::GBuffer6,
            TechniqueArg::VisibilityBuffer => Self::Visibility,
        }
    }
}

/// Values that change every frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameInputs {
    /// Seconds since startup, frozen with the timer
    pub time: f32,
    pub view: Mat4,
    pub proj: Mat4,
}

/// User-controlled scene switches that outlive a rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SceneOptions {
    /// Skip the scene meshes and draw only particles
    pub particles_only: bool,
    /// Index into [`TechniqueKind::debug_views`]
    pub debug_view: u8,
}

impl Default for SceneOptions {
    fn default() -> Self {
        Self {
            particles_only: true,
            debug_view: 0,
        }
    }
}

/// Per-frame hooks every technique provides.
pub trait RenderTechnique {
    fn kind(&self) -> TechniqueKind;

    fn render_pass(&self) -> &RenderPass;

    /// Framebuffer attachments after the present image, depth last.
    fn framebuffer_views(&self) -> Vec<vk::ImageView>;

    /// Uploads this frame's uniform data for `image_index`.
    ///
    /// # Errors
    ///
    /// Returns an error if a uniform write fails.
    fn per_frame_update(
        &mut self,
        image_index: usize,
        inputs: &FrameInputs,
        options: &SceneOptions,
    ) -> RendererResult<()>;

    /// Records the whole pass for `image_index` except its end, and returns
    /// the still-open render pass so overlay drawing can follow.
    fn record_graphics(
        &self,
        cmd: &CommandBuffer,
        framebuffer: vk::Framebuffer,
        image_index: usize,
        options: &SceneOptions,
    ) -> &RenderPass;

    fn particles(&self) -> &ParticleSystem;

    fn particles_mut(&mut self) -> &mut ParticleSystem;

    /// Records the compute work of one frame. No-op without compute.
    ///
    /// # Errors
    ///
    /// Returns an error if the particle storage buffer is in the wrong
    /// queue family.
    fn record_compute(&mut self, cmd: &CommandBuffer) -> RendererResult<()> {
        self.particles_mut().record_compute(cmd)
    }

    fn has_compute(&self) -> bool {
        self.particles().has_compute()
    }
}

/// The active technique.
pub enum Technique {
    Forward(ForwardTechnique),
    GBuffer(GBufferTechnique),
    Visibility(VisibilityTechnique),
}

impl Technique {
    /// Builds `kind` with its particle system.
    ///
    /// # Errors
    ///
    /// Returns an error if any shader, texture or GPU object fails to load or
    /// create.
    pub fn new(
        ctx: &BuildContext<'_>,
        kind: TechniqueKind,
        particles: &ParticleSettings,
    ) -> RendererResult<Self> {
        Ok(match kind {
            TechniqueKind::Forward => Self::Forward(ForwardTechnique::new(ctx, particles)?),
            TechniqueKind::GBuffer3 => Self::GBuffer(GBufferTechnique::new(ctx, particles, 3)?),
            TechniqueKind::GBuffer6 => Self::GBuffer(GBufferTechnique::new(ctx, particles, 6)?),
            TechniqueKind::Visibility => {
                Self::Visibility(VisibilityTechnique::new(ctx, particles)?)
            }
        })
    }

    pub fn as_dyn(&self) -> &dyn RenderTechnique {
        match self {
            Self::Forward(technique) => technique,
            Self::GBuffer(technique) => technique,
            Self::Visibility(technique) => technique,
        }
    }

    pub fn as_dyn_mut(&mut self) -> &mut dyn RenderTechnique {
        match self {
            Self::Forward(technique) => technique,
            Self::GBuffer(technique) => technique,
            Self::Visibility(technique) => technique,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overlay_order() {
        assert_eq!(TechniqueKind::Visibility.index(), 0);
        assert_eq!(TechniqueKind::GBuffer3.index(), 1);
        assert_eq!(TechniqueKind::GBuffer6.index(), 2);
        assert_eq!(TechniqueKind::Forward.index(), 3);
    }

    #[test]
    fn test_next_wraps() {
        assert_eq!(TechniqueKind::Visibility.next(), TechniqueKind::GBuffer3);
        assert_eq!(TechniqueKind::Forward.next(), TechniqueKind::Visibility);
    }

    #[test]
    fn test_from_arg() {
        assert_eq!(
            TechniqueKind::from(TechniqueArg::VisibilityBuffer),
            TechniqueKind::Visibility
        );
        assert_eq!(TechniqueKind::from(TechniqueArg::GBuffer6), TechniqueKind::GBuffer6);
    }

    #[test]
    fn test_debug_views() {
        assert!(TechniqueKind::Forward.debug_views().is_empty());
        assert_eq!(TechniqueKind::GBuffer3.debug_views().len(), 5);
        assert_eq!(TechniqueKind::Visibility.debug_views()[3], "Material ID");
        for kind in TechniqueKind::ALL {
            if let Some(first) = kind.debug_views().first() {
                assert_eq!(*first, "Shaded");
            }
        }
    }

    #[test]
    fn test_default_scene_options() {
        let options = SceneOptions::default();
        assert!(options.particles_only);
        assert_eq!(options.debug_view, 0);
    }
}
