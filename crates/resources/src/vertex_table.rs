//! Scene-wide vertex table for the visibility-buffer lighting pass.
//!
//! The lighting pass only sees a triangle id per pixel, so it needs every
//! triangle's vertices in a uniform buffer. Visibility meshes are appended
//! one after another: indices are rebased by the number of vertices already
//! in the table, and each vertex is packed as two `vec4`s with the UV split
//! across their `w` components.

use bytemuck::{Pod, Zeroable};
use glam::{Vec3, Vec4};
use vbparts_rhi::vertex::UberVertex;

use crate::error::{ResourceError, ResourceResult};
use crate::mesh::MeshData;

pub const MAX_TRIANGLES: usize = 64;
pub const MAX_INDICES: usize = MAX_TRIANGLES * 3;
pub const MAX_VERTICES: usize = MAX_INDICES;

/// `xyz` position and `u`, then `xyz` normal and `v`.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct VertexTableEntry {
    pub position_u: Vec4,
    pub normal_v: Vec4,
}

impl VertexTableEntry {
    pub fn new(vertex: &UberVertex) -> Self {
        Self {
            position_u: vertex.position.extend(vertex.uv.x),
            normal_v: vertex.normal.extend(vertex.uv.y),
        }
    }

    #[inline]
    pub fn position(&self) -> Vec3 {
        self.position_u.truncate()
    }
}

/// Uniform block read by the lighting pass.
///
/// # Memory Layout
///
/// - Offset 0: indices (192 x 4 bytes)
/// - Offset 768: vertices (192 x 32 bytes)
/// - Total size: 6912 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct VertexTable {
    pub indices: [u32; MAX_INDICES],
    pub vertices: [VertexTableEntry; MAX_VERTICES],
}

impl Default for VertexTable {
    fn default() -> Self {
        Self::zeroed()
    }
}

/// Accumulates visibility meshes into a [`VertexTable`].
#[derive(Debug, Default)]
pub struct VertexTableBuilder {
    table: VertexTable,
    index_offset: usize,
    vertex_offset: usize,
}

impl VertexTableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `mesh`, rebasing its indices onto the vertices already stored.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::VertexTableOverflow`] if the mesh does not
    /// fit; the table is left unchanged in that case.
    pub fn push(&mut self, mesh: &MeshData<UberVertex>) -> ResourceResult<()> {
        let indices = self.index_offset + mesh.indices.len();
        let vertices = self.vertex_offset + mesh.vertices.len();
        let triangles = indices / 3;

        check_limit("triangles", triangles, MAX_TRIANGLES)?;
        check_limit("indices", indices, MAX_INDICES)?;
        check_limit("vertices", vertices, MAX_VERTICES)?;

        for (slot, &index) in self.table.indices[self.index_offset..indices]
            .iter_mut()
            .zip(&mesh.indices)
        {
            *slot = index as u32 + self.vertex_offset as u32;
        }
        for (slot, vertex) in self.table.vertices[self.vertex_offset..vertices]
            .iter_mut()
            .zip(&mesh.vertices)
        {
            *slot = VertexTableEntry::new(vertex);
        }

        self.index_offset = indices;
        self.vertex_offset = vertices;
        Ok(())
    }

    #[inline]
    pub fn index_count(&self) -> usize {
        self.index_offset
    }

    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.vertex_offset
    }

    pub fn build(self) -> VertexTable {
        self.table
    }
}

fn check_limit(what: &'static str, needed: usize, limit: usize) -> ResourceResult<()> {
    if needed > limit {
        return Err(ResourceError::VertexTableOverflow {
            what,
            needed,
            limit,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::{visibility_cube, visibility_quad};
    use glam::Vec2;

    #[test]
    fn test_table_size() {
        assert_eq!(std::mem::size_of::<VertexTableEntry>(), 32);
        assert_eq!(std::mem::size_of::<VertexTable>(), 768 + 192 * 32);
    }

    #[test]
    fn test_entry_packing() {
        let vertex = UberVertex::new(
            Vec3::new(1.0, 2.0, 3.0),
            Vec3::Y,
            Vec2::new(0.25, 0.75),
            0.0,
            0.0,
        );
        let entry = VertexTableEntry::new(&vertex);
        assert_eq!(entry.position_u, Vec4::new(1.0, 2.0, 3.0, 0.25));
        assert_eq!(entry.normal_v, Vec4::new(0.0, 1.0, 0.0, 0.75));
    }

    #[test]
    fn test_indices_are_rebased() {
        let mut tri_id = 0;
        let mut builder = VertexTableBuilder::new();
        builder
            .push(&visibility_quad(Vec3::ZERO, Vec2::ONE, &mut tri_id, 1))
            .unwrap();
        builder
            .push(&visibility_cube(Vec3::ZERO, Vec3::ONE, &mut tri_id, 1))
            .unwrap();

        assert_eq!(builder.index_count(), 42);
        assert_eq!(builder.vertex_count(), 30);

        let table = builder.build();
        assert_eq!(&table.indices[..6], &[0, 1, 2, 3, 4, 5]);
        assert_eq!(table.indices[6], 6);
        assert!(table.indices[6..42].iter().all(|&i| (6..30).contains(&i)));
        assert_eq!(table.indices[42], 0);
    }

    #[test]
    fn test_overflow_leaves_table_unchanged() {
        let mut tri_id = 0;
        let cube = visibility_cube(Vec3::ZERO, Vec3::ONE, &mut tri_id, 0);
        let mut builder = VertexTableBuilder::new();
        for _ in 0..5 {
            builder.push(&cube).unwrap();
        }

        let err = builder.push(&cube).unwrap_err();
        assert!(matches!(
            err,
            ResourceError::VertexTableOverflow {
                what: "triangles",
                needed: 72,
                limit: 64
            }
        ));
        assert_eq!(builder.index_count(), 180);
    }
}
