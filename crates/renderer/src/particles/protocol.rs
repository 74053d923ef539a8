//! Pipeline shape and draw counts for each generation mode.
//!
//! Everything here is pure so the draw protocol can be checked without a GPU.

use vbparts_rhi::descriptor::BindingDesc;
use vbparts_rhi::pipeline::PrimitiveTopology;
use vbparts_rhi::vertex::VertexLayout;

use super::settings::{GenerationMode, TEXTURED_COMPLEXITY};
use crate::technique::TechniqueKind;

/// Quad corners emitted per particle by the expanding modes.
pub const VERTICES_PER_PARTICLE: u32 = 6;
/// Threads per compute workgroup, matching `particles.comp`.
pub const COMPUTE_WORKGROUP_SIZE: u32 = 256;
/// Quads emitted by one geometry shader invocation in geometry expansion.
pub const GEOMETRY_PARTICLES_PER_INVOCATION: u32 = 28;

/// Draw and dispatch sizes for one particle system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawProtocol {
    /// Vertex count of the single draw call
    pub vertex_count: u32,
    /// Workgroups dispatched per frame, compute mode only
    pub dispatch_groups: Option<u32>,
}

impl DrawProtocol {
    pub fn new(mode: GenerationMode, particle_count: u32) -> Self {
        match mode {
            GenerationMode::VertexExpansion => Self {
                vertex_count: particle_count * VERTICES_PER_PARTICLE,
                dispatch_groups: None,
            },
            GenerationMode::Compute => Self {
                vertex_count: particle_count * VERTICES_PER_PARTICLE,
                dispatch_groups: Some(particle_count.div_ceil(COMPUTE_WORKGROUP_SIZE)),
            },
            GenerationMode::GeometryExpansion => Self {
                vertex_count: particle_count.div_ceil(GEOMETRY_PARTICLES_PER_INVOCATION),
                dispatch_groups: None,
            },
            GenerationMode::VertexGeometry => Self {
                vertex_count: particle_count,
                dispatch_groups: None,
            },
        }
    }

    /// Records in the compute storage buffer; zero outside compute mode.
    pub fn storage_records(&self) -> u32 {
        if self.dispatch_groups.is_some() {
            self.vertex_count
        } else {
            0
        }
    }
}

/// Graphics pipeline configuration for one generation mode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StrategyShape {
    pub vertex_shader: &'static str,
    pub geometry_shader: Option<&'static str>,
    pub vertex_layout: VertexLayout,
    pub topology: PrimitiveTopology,
    /// Stage reading the particle uniform block; `None` when only the
    /// compute pass reads it.
    pub uniform_binding: Option<BindingDesc>,
}

impl StrategyShape {
    pub fn new(mode: GenerationMode) -> Self {
        match mode {
            GenerationMode::VertexExpansion => Self {
                vertex_shader: "vert_particles_fwd",
                geometry_shader: None,
                vertex_layout: VertexLayout::Nul,
                topology: PrimitiveTopology::TriangleList,
                uniform_binding: Some(BindingDesc::ubo_vertex()),
            },
            GenerationMode::Compute => Self {
                vertex_shader: "particles_fwd",
                geometry_shader: None,
                // Storage records share the 32-byte position/normal/uv layout
                vertex_layout: VertexLayout::Standard,
                topology: PrimitiveTopology::TriangleList,
                uniform_binding: None,
            },
            GenerationMode::GeometryExpansion => Self {
                vertex_shader: "geom_particles_fwd",
                geometry_shader: Some("particles"),
                vertex_layout: VertexLayout::Nul,
                topology: PrimitiveTopology::PointList,
                uniform_binding: Some(BindingDesc::ubo_geometry()),
            },
            GenerationMode::VertexGeometry => Self {
                vertex_shader: "vertgeom_particles_fwd",
                geometry_shader: Some("quadexpand"),
                vertex_layout: VertexLayout::Nul,
                topology: PrimitiveTopology::PointList,
                uniform_binding: Some(BindingDesc::ubo_vertex()),
            },
        }
    }
}

/// Fragment shader drawing particles into `technique`'s first subpass.
///
/// Compute mode uses `comp_` variants, whose texture binding sits at a
/// different index.
pub fn fragment_shader(technique: TechniqueKind, mode: GenerationMode) -> String {
    let base = format!("particles_{}", technique.suffix());
    if mode == GenerationMode::Compute {
        format!("comp_{base}")
    } else {
        base
    }
}

/// Colour outputs written by the particle fragment shader.
pub fn output_attachments(technique: TechniqueKind) -> u32 {
    match technique {
        TechniqueKind::GBuffer3 => 3,
        TechniqueKind::GBuffer6 => 6,
        TechniqueKind::Forward | TechniqueKind::Visibility => 1,
    }
}

/// Texture sampled by the particle pass, if any.
///
/// The visibility buffer textures opaque particles in its lighting pass, so
/// only cutout particles need the texture there.
pub fn particle_texture(
    technique: TechniqueKind,
    complexity: u8,
    cutout: bool,
) -> Option<&'static str> {
    let textured =
        complexity == TEXTURED_COMPLEXITY && (cutout || technique != TechniqueKind::Visibility);
    textured.then_some(if cutout { "leaf.png" } else { "shrimp.png" })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_expansion_draws_six_per_particle() {
        let protocol = DrawProtocol::new(GenerationMode::VertexExpansion, 1024);
        assert_eq!(protocol.vertex_count, 6144);
        assert_eq!(protocol.dispatch_groups, None);
    }

    #[test]
    fn test_geometry_expansion_rounds_up() {
        let protocol = DrawProtocol::new(GenerationMode::GeometryExpansion, 16);
        assert_eq!(protocol.vertex_count, 1);
        let protocol = DrawProtocol::new(GenerationMode::GeometryExpansion, 56);
        assert_eq!(protocol.vertex_count, 2);
        let protocol = DrawProtocol::new(GenerationMode::GeometryExpansion, 57);
        assert_eq!(protocol.vertex_count, 3);
    }

    #[test]
    fn test_compute_dispatch_groups() {
        let protocol = DrawProtocol::new(GenerationMode::Compute, 300);
        assert_eq!(protocol.dispatch_groups, Some(2));
        assert_eq!(protocol.vertex_count, 1800);
        assert_eq!(protocol.storage_records(), 1800);

        let protocol = DrawProtocol::new(GenerationMode::Compute, 256);
        assert_eq!(protocol.dispatch_groups, Some(1));
    }

    #[test]
    fn test_hybrid_draws_one_point_per_particle() {
        let protocol = DrawProtocol::new(GenerationMode::VertexGeometry, 300);
        assert_eq!(protocol.vertex_count, 300);
        assert_eq!(protocol.storage_records(), 0);
    }

    #[test]
    fn test_protocol_is_reproducible() {
        for mode in GenerationMode::ALL {
            assert_eq!(DrawProtocol::new(mode, 777), DrawProtocol::new(mode, 777));
        }
    }

    #[test]
    fn test_strategy_shapes() {
        let shape = StrategyShape::new(GenerationMode::Compute);
        assert_eq!(shape.vertex_layout, VertexLayout::Standard);
        assert!(shape.uniform_binding.is_none());

        let shape = StrategyShape::new(GenerationMode::GeometryExpansion);
        assert_eq!(shape.geometry_shader, Some("particles"));
        assert_eq!(shape.topology, PrimitiveTopology::PointList);

        let shape = StrategyShape::new(GenerationMode::VertexGeometry);
        assert_eq!(shape.geometry_shader, Some("quadexpand"));
        assert_eq!(shape.vertex_layout, VertexLayout::Nul);
    }

    #[test]
    fn test_fragment_shader_names() {
        assert_eq!(
            fragment_shader(TechniqueKind::GBuffer3, GenerationMode::VertexExpansion),
            "particles_g3"
        );
        assert_eq!(
            fragment_shader(TechniqueKind::Visibility, GenerationMode::Compute),
            "comp_particles_v"
        );
        assert_eq!(
            fragment_shader(TechniqueKind::Forward, GenerationMode::VertexGeometry),
            "particles_fwd"
        );
    }

    #[test]
    fn test_output_attachments() {
        assert_eq!(output_attachments(TechniqueKind::Forward), 1);
        assert_eq!(output_attachments(TechniqueKind::GBuffer3), 3);
        assert_eq!(output_attachments(TechniqueKind::GBuffer6), 6);
        assert_eq!(output_attachments(TechniqueKind::Visibility), 1);
    }

    #[test]
    fn test_particle_texture_selection() {
        assert_eq!(particle_texture(TechniqueKind::Forward, 1, false), None);
        assert_eq!(
            particle_texture(TechniqueKind::Forward, 2, false),
            Some("shrimp.png")
        );
        assert_eq!(particle_texture(TechniqueKind::Visibility, 2, false), None);
        assert_eq!(
            particle_texture(TechniqueKind::Visibility, 2, true),
            Some("leaf.png")
        );
    }
}
