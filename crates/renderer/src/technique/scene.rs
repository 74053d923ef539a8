//! The static demo scene shared by every technique.
//!
//! Six boxes and a quad, each tagged with the material that shades it.
//! Standard meshes are grouped by material so one pipeline bind covers each
//! group; visibility meshes carry triangle and material ids instead and are
//! also packed into the lighting pass vertex table.

use std::sync::Arc;

use bytemuck::Pod;
use glam::{Mat4, Vec2, Vec3};
use tracing::debug;

use vbparts_resources::mesh::{self, MeshData};
use vbparts_resources::{VertexTable, VertexTableBuilder};
use vbparts_rhi::Bindable;
use vbparts_rhi::buffer::{Buffer, BufferUsage};
use vbparts_rhi::descriptor::BufferBinding;
use vbparts_rhi::command::CommandBuffer;
use vbparts_rhi::device::Device;
use vbparts_rhi::vertex::{UberVertex, Vertex};
use vbparts_rhi::vk;

use crate::context::BuildContext;
use crate::error::RendererResult;
use crate::technique::{FrameInputs, SceneOptions};
use crate::ubo::{DebugUbo, LightUbo, MatrixUbo, TrackedUniform};

/// Texture directory, relative to the working directory.
pub const TEXTURE_DIR: &str = "Textures";
pub const SHRIMP_TEXTURE: &str = "shrimp.png";
pub const RACCOON_TEXTURE: &str = "raccoon.png";
pub const LEAF_TEXTURE: &str = "leaf.png";

/// Shading model of a mesh. The discriminant is the id written into
/// visibility vertices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Material {
    Shrimp = 1,
    Raymarch = 2,
    Raccoon = 3,
}

impl Material {
    pub const ALL: [Self; 3] = [Self::Shrimp, Self::Raccoon, Self::Raymarch];

    #[inline]
    pub fn id(self) -> u16 {
        self as u16
    }

    /// Fragment shader base name, completed with the technique suffix.
    pub fn shader(self) -> &'static str {
        match self {
            Self::Shrimp => "shrimp",
            Self::Raymarch => "raymarch",
            Self::Raccoon => "raccoon",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Shape {
    Quad(Vec2),
    Cube(Vec3),
}

/// One object of the scene.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub origin: Vec3,
    pub shape: Shape,
    pub material: Material,
}

/// Scene contents, in triangle id order.
pub const PLACEMENTS: [Placement; 6] = [
    Placement {
        origin: Vec3::new(-0.5, 0.0, 0.0),
        shape: Shape::Quad(Vec2::new(0.5, 0.5)),
        material: Material::Shrimp,
    },
    Placement {
        origin: Vec3::new(0.5, 0.0, -3.0),
        shape: Shape::Cube(Vec3::new(2.5, 2.5, 2.5)),
        material: Material::Shrimp,
    },
    Placement {
        origin: Vec3::new(2.0, 0.3, 2.0),
        shape: Shape::Cube(Vec3::new(1.0, 1.5, 1.0)),
        material: Material::Shrimp,
    },
    Placement {
        origin: Vec3::new(-2.0, 0.3, 2.0),
        shape: Shape::Cube(Vec3::new(1.5, 1.5, 1.5)),
        material: Material::Raccoon,
    },
    // Ground
    Placement {
        origin: Vec3::new(0.0, -2.5, 0.0),
        shape: Shape::Cube(Vec3::new(20.0, 0.2, 20.0)),
        material: Material::Shrimp,
    },
    Placement {
        origin: Vec3::new(3.0, 0.0, -2.0),
        shape: Shape::Cube(Vec3::new(2.0, 2.0, 2.0)),
        material: Material::Raymarch,
    },
];

impl Placement {
    pub fn mesh(&self) -> MeshData<Vertex> {
        match self.shape {
            Shape::Quad(size) => mesh::quad(self.origin, size),
            Shape::Cube(size) => mesh::cube(self.origin, size),
        }
    }

    /// Visibility mesh; advances `tri_id` past this object's triangles.
    pub fn visibility_mesh(&self, tri_id: &mut u16) -> MeshData<UberVertex> {
        match self.shape {
            Shape::Quad(size) => {
                mesh::visibility_quad(self.origin, size, tri_id, self.material.id())
            }
            Shape::Cube(size) => {
                mesh::visibility_cube(self.origin, size, tri_id, self.material.id())
            }
        }
    }
}

/// Standard meshes of `material`, in placement order.
pub fn standard_meshes(material: Material) -> Vec<MeshData<Vertex>> {
    PLACEMENTS
        .iter()
        .filter(|placement| placement.material == material)
        .map(Placement::mesh)
        .collect()
}

/// Every visibility mesh, with triangle ids counted from zero.
pub fn visibility_meshes() -> Vec<MeshData<UberVertex>> {
    let mut tri_id = 0;
    PLACEMENTS
        .iter()
        .map(|placement| placement.visibility_mesh(&mut tri_id))
        .collect()
}

/// Packs `meshes` into the lighting pass vertex table.
///
/// # Errors
///
/// Returns an error if the meshes overflow the table.
pub fn vertex_table(meshes: &[MeshData<UberVertex>]) -> RendererResult<VertexTable> {
    let mut builder = VertexTableBuilder::new();
    for mesh in meshes {
        builder.push(mesh)?;
    }
    debug!(
        "Vertex table: {} indices, {} vertices",
        builder.index_count(),
        builder.vertex_count()
    );
    Ok(builder.build())
}

/// An indexed mesh uploaded to the GPU. Binding it also draws it.
pub struct GpuMesh {
    vertex_buffer: Buffer,
    index_buffer: Buffer,
    index_count: u32,
}

impl GpuMesh {
    /// Uploads `vertices` and 16-bit `indices`.
    ///
    /// # Errors
    ///
    /// Returns an error if either buffer is empty or cannot be created.
    pub fn new<V: Pod>(
        device: Arc<Device>,
        vertices: &[V],
        indices: &[u16],
    ) -> RendererResult<Self> {
        let vertex_buffer = Buffer::new_with_data(
            device.clone(),
            BufferUsage::Vertex,
            bytemuck::cast_slice(vertices),
        )?;
        let index_buffer =
            Buffer::new_with_data(device, BufferUsage::Index, bytemuck::cast_slice(indices))?;

        Ok(Self {
            vertex_buffer,
            index_buffer,
            index_count: indices.len() as u32,
        })
    }

    /// Uploads every standard mesh of `material`.
    ///
    /// # Errors
    ///
    /// Returns an error if an upload fails.
    pub fn standard(device: &Arc<Device>, material: Material) -> RendererResult<Vec<Self>> {
        standard_meshes(material)
            .iter()
            .map(|mesh| Self::new(device.clone(), &mesh.vertices, &mesh.indices))
            .collect()
    }

    #[inline]
    pub fn index_count(&self) -> u32 {
        self.index_count
    }
}

impl Bindable for GpuMesh {
    fn bind(&self, cmd: &CommandBuffer, _image_index: usize) {
        cmd.bind_vertex_buffers(0, &[self.vertex_buffer.handle()], &[0]);
        cmd.bind_index_buffer(self.index_buffer.handle(), 0, vk::IndexType::UINT16);
        cmd.draw_indexed(self.index_count, 1, 0, 0, 0);
    }
}

/// Per-image uniform blocks read by the scene shaders.
///
/// The light never changes after creation. The debug block is only bound
/// by techniques with a lighting pass.
pub struct SceneUniforms {
    matrix: TrackedUniform<MatrixUbo>,
    light: TrackedUniform<LightUbo>,
    debug: TrackedUniform<DebugUbo>,
}

impl SceneUniforms {
    /// # Errors
    ///
    /// Returns an error if buffer creation fails.
    pub fn new(ctx: &BuildContext<'_>) -> RendererResult<Self> {
        let device = ctx.device;
        Ok(Self {
            matrix: TrackedUniform::new(device.clone(), ctx.image_count, MatrixUbo::default())?,
            light: TrackedUniform::new(device.clone(), ctx.image_count, LightUbo::default())?,
            debug: TrackedUniform::new(device.clone(), ctx.image_count, DebugUbo::default())?,
        })
    }

    /// Uploads the scene matrices for `image_index`. Skipped while only
    /// particles are drawn, since nothing else reads them.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn update_matrices(
        &mut self,
        image_index: usize,
        inputs: &FrameInputs,
        options: &SceneOptions,
    ) -> RendererResult<()> {
        if options.particles_only {
            return Ok(());
        }
        let ubo = MatrixUbo::new(Mat4::IDENTITY, inputs.view, inputs.proj, inputs.time);
        self.matrix.update(image_index, &ubo)?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn update_debug(&mut self, image_index: usize, options: &SceneOptions) -> RendererResult<()> {
        self.debug
            .update(image_index, &DebugUbo::new(options.debug_view))?;
        Ok(())
    }

    pub fn matrix_binding(&self) -> BufferBinding {
        BufferBinding::per_image(self.matrix.handles(), TrackedUniform::<MatrixUbo>::range())
    }

    pub fn light_binding(&self) -> BufferBinding {
        BufferBinding::per_image(self.light.handles(), TrackedUniform::<LightUbo>::range())
    }

    pub fn debug_binding(&self) -> BufferBinding {
        BufferBinding::per_image(self.debug.handles(), TrackedUniform::<DebugUbo>::range())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vbparts_resources::mesh::{CUBE_TRIANGLES, QUAD_TRIANGLES};
    use vbparts_resources::vertex_table::{MAX_INDICES, MAX_TRIANGLES, MAX_VERTICES};

    #[test]
    fn test_material_groups() {
        assert_eq!(standard_meshes(Material::Shrimp).len(), 4);
        assert_eq!(standard_meshes(Material::Raccoon).len(), 1);
        assert_eq!(standard_meshes(Material::Raymarch).len(), 1);
    }

    #[test]
    fn test_visibility_triangle_ids_are_unique() {
        let meshes = visibility_meshes();
        let mut expected = 0.0;
        for (mesh, placement) in meshes.iter().zip(PLACEMENTS.iter()) {
            assert!(mesh.vertices.iter().all(|v| v.ids.x == expected));
            assert!(
                mesh.vertices
                    .iter()
                    .all(|v| v.ids.y == f32::from(placement.material.id()))
            );
            expected += f32::from(match placement.shape {
                Shape::Quad(_) => QUAD_TRIANGLES,
                Shape::Cube(_) => CUBE_TRIANGLES,
            });
        }
    }

    #[test]
    fn test_scene_fits_vertex_table() {
        let meshes = visibility_meshes();
        let indices: usize = meshes.iter().map(|m| m.indices.len()).sum();
        let vertices: usize = meshes.iter().map(|m| m.vertices.len()).sum();
        assert!(indices / 3 <= MAX_TRIANGLES);
        assert!(indices <= MAX_INDICES);
        assert!(vertices <= MAX_VERTICES);
        assert!(vertex_table(&meshes).is_ok());
    }
}
