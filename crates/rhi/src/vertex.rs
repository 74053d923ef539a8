//! Vertex data structures and input descriptions.
//!
//! # Vertex Types
//!
//! - [`Vertex`] - position, normal and UV for shaded scene meshes
//! - [`VisibilityVertex`] - position, UV and `(triangle id, material id)` for
//!   the visibility pass
//! - [`UberVertex`] - everything above, split into the two on upload
//! - [`PointVertex`] - position only
//!
//! Pipelines are parameterised by [`VertexLayout`] rather than by vertex type,
//! which also covers the empty layout used when particles are expanded
//! purely from `gl_VertexIndex`.

use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};

const VEC3: vk::Format = vk::Format::R32G32B32_SFLOAT;
const VEC2: vk::Format = vk::Format::R32G32_SFLOAT;

/// Standard vertex: position, normal, UV.
///
/// # Memory Layout
///
/// - Offset 0: position (12 bytes)
/// - Offset 12: normal (12 bytes)
/// - Offset 24: uv (8 bytes)
/// - Total size: 32 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub uv: Vec2,
}

impl Vertex {
    #[inline]
    pub const fn new(position: Vec3, normal: Vec3, uv: Vec2) -> Self {
        Self {
            position,
            normal,
            uv,
        }
    }
}

/// Visibility-pass vertex. `ids` holds the triangle id in `x` and the
/// material id in `y`.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct VisibilityVertex {
    pub position: Vec3,
    pub uv: Vec2,
    pub ids: Vec2,
}

impl VisibilityVertex {
    #[inline]
    pub fn new(position: Vec3, uv: Vec2, triangle_id: f32, material_id: f32) -> Self {
        Self {
            position,
            uv,
            ids: Vec2::new(triangle_id, material_id),
        }
    }
}

/// Full vertex for visibility-buffer meshes, split into a [`VisibilityVertex`]
/// for rasterisation and a [`Vertex`] for the lighting pass's vertex table.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct UberVertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub uv: Vec2,
    pub ids: Vec2,
}

impl UberVertex {
    #[inline]
    pub fn new(position: Vec3, normal: Vec3, uv: Vec2, triangle_id: f32, material_id: f32) -> Self {
        Self {
            position,
            normal,
            uv,
            ids: Vec2::new(triangle_id, material_id),
        }
    }

    #[inline]
    pub fn visibility(&self) -> VisibilityVertex {
        VisibilityVertex {
            position: self.position,
            uv: self.uv,
            ids: self.ids,
        }
    }

    #[inline]
    pub fn shading(&self) -> Vertex {
        Vertex::new(self.position, self.normal, self.uv)
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct PointVertex {
    pub position: Vec3,
}

/// Closed set of vertex layouts a pipeline can consume.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VertexLayout {
    /// [`Vertex`]
    Standard,
    /// [`VisibilityVertex`]
    Visibility,
    /// [`PointVertex`]
    Point,
    /// No vertex input; shaders work from `gl_VertexIndex` alone.
    Nul,
}

impl VertexLayout {
    /// Bytes per vertex.
    pub const fn stride(self) -> u32 {
        match self {
            Self::Standard => std::mem::size_of::<Vertex>() as u32,
            Self::Visibility => std::mem::size_of::<VisibilityVertex>() as u32,
            Self::Point => std::mem::size_of::<PointVertex>() as u32,
            Self::Nul => 0,
        }
    }

    /// Per-vertex binding 0, absent for [`VertexLayout::Nul`].
    pub fn binding_descriptions(self) -> Vec<vk::VertexInputBindingDescription> {
        match self {
            Self::Nul => Vec::new(),
            _ => vec![vk::VertexInputBindingDescription {
                binding: 0,
                stride: self.stride(),
                input_rate: vk::VertexInputRate::VERTEX,
            }],
        }
    }

    /// Attributes at consecutive locations, vec3s before vec2s.
    pub fn attribute_descriptions(self) -> Vec<vk::VertexInputAttributeDescription> {
        let formats: &[vk::Format] = match self {
            Self::Standard => &[VEC3, VEC3, VEC2],
            Self::Visibility => &[VEC3, VEC2, VEC2],
            Self::Point => &[VEC3],
            Self::Nul => &[],
        };

        let mut offset = 0;
        formats
            .iter()
            .enumerate()
            .map(|(location, &format)| {
                let attribute = vk::VertexInputAttributeDescription {
                    binding: 0,
                    location: location as u32,
                    format,
                    offset,
                };
                offset += if format == VEC3 { 12 } else { 8 };
                attribute
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_sizes() {
        assert_eq!(std::mem::size_of::<Vertex>(), 32);
        assert_eq!(std::mem::size_of::<VisibilityVertex>(), 28);
        assert_eq!(std::mem::size_of::<UberVertex>(), 40);
        assert_eq!(std::mem::size_of::<PointVertex>(), 12);
    }

    #[test]
    fn test_standard_attributes() {
        let attributes = VertexLayout::Standard.attribute_descriptions();
        let offsets: Vec<u32> = attributes.iter().map(|a| a.offset).collect();
        assert_eq!(offsets, vec![0, 12, 24]);
        assert_eq!(attributes[2].format, vk::Format::R32G32_SFLOAT);
        assert_eq!(attributes[2].location, 2);
    }

    #[test]
    fn test_visibility_attributes_match_struct() {
        let attributes = VertexLayout::Visibility.attribute_descriptions();
        assert_eq!(attributes.len(), 3);
        assert_eq!(attributes[1].offset, 12);
        assert_eq!(attributes[2].offset, 20);
        assert_eq!(VertexLayout::Visibility.stride(), 28);
    }

    #[test]
    fn test_nul_layout_has_no_input() {
        assert!(VertexLayout::Nul.binding_descriptions().is_empty());
        assert!(VertexLayout::Nul.attribute_descriptions().is_empty());
        assert_eq!(VertexLayout::Nul.stride(), 0);
    }

    #[test]
    fn test_point_binding() {
        let bindings = VertexLayout::Point.binding_descriptions();
        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings[0].stride, 12);
        assert_eq!(bindings[0].input_rate, vk::VertexInputRate::VERTEX);
    }

    #[test]
    fn test_uber_vertex_split() {
        let uber = UberVertex::new(Vec3::X, Vec3::Z, Vec2::new(0.5, 1.0), 4.0, 1.0);
        let visibility = uber.visibility();
        assert_eq!(visibility.position, Vec3::X);
        assert_eq!(visibility.ids, Vec2::new(4.0, 1.0));

        let shading = uber.shading();
        assert_eq!(shading.normal, Vec3::Z);
        assert_eq!(shading.uv, Vec2::new(0.5, 1.0));
    }
}
