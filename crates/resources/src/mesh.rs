//! Procedural meshes.
//!
//! Meshes are built on the CPU as a vertex list plus 16-bit indices. Cube
//! faces share corners, so vertices are deduplicated on insertion; a cube
//! ends up with 4 unique vertices and 6 indices per face.
//!
//! Visibility variants carry a triangle id and a material id in every
//! vertex. The caller owns the running triangle counter so that ids stay
//! unique across all meshes of a scene.

use glam::{Vec2, Vec3};
use vbparts_rhi::vertex::{UberVertex, Vertex, VisibilityVertex};

/// Triangles added by [`visibility_quad`].
pub const QUAD_TRIANGLES: u16 = 2;
/// Triangles added by [`visibility_cube`].
pub const CUBE_TRIANGLES: u16 = 12;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshData<V> {
    pub vertices: Vec<V>,
    pub indices: Vec<u16>,
}

impl<V: Copy + PartialEq> MeshData<V> {
    pub fn new() -> Self {
        Self {
            vertices: Vec::new(),
            indices: Vec::new(),
        }
    }

    /// Appends `vertex`, reusing an identical existing vertex if there is one.
    pub fn push_dedup(&mut self, vertex: V) {
        if let Some(i) = self.vertices.iter().position(|v| *v == vertex) {
            self.indices.push(i as u16);
            return;
        }
        self.vertices.push(vertex);
        self.indices.push((self.vertices.len() - 1) as u16);
    }

    #[inline]
    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }

    #[inline]
    pub fn vertex_count(&self) -> u32 {
        self.vertices.len() as u32
    }
}

impl MeshData<UberVertex> {
    /// Rasterisation half of every vertex.
    pub fn visibility_vertices(&self) -> Vec<VisibilityVertex> {
        self.vertices.iter().map(UberVertex::visibility).collect()
    }
}

/// Quad facing +Z centred on `origin`.
pub fn quad(origin: Vec3, size: Vec2) -> MeshData<Vertex> {
    let normal = Vec3::Z;
    let [bl, br, tr, tl] = quad_corners(origin, size);
    MeshData {
        vertices: vec![
            Vertex::new(bl, normal, Vec2::new(0.0, 1.0)),
            Vertex::new(br, normal, Vec2::new(1.0, 1.0)),
            Vertex::new(tr, normal, Vec2::new(1.0, 0.0)),
            Vertex::new(tl, normal, Vec2::new(0.0, 0.0)),
        ],
        indices: vec![0, 1, 2, 2, 3, 0],
    }
}

/// Visibility quad. Emits six unshared vertices and advances `tri_id` by
/// [`QUAD_TRIANGLES`]; every vertex carries the id the quad started at.
pub fn visibility_quad(
    origin: Vec3,
    size: Vec2,
    tri_id: &mut u16,
    mat_id: u16,
) -> MeshData<UberVertex> {
    let normal = Vec3::Z;
    let [bl, br, tr, tl] = quad_corners(origin, size);
    let vertex = |position, uv| UberVertex::new(position, normal, uv, *tri_id as f32, mat_id as f32);

    let vertices = vec![
        vertex(bl, Vec2::new(0.0, 1.0)),
        vertex(br, Vec2::new(1.0, 1.0)),
        vertex(tr, Vec2::new(1.0, 0.0)),
        vertex(tr, Vec2::new(1.0, 0.0)),
        vertex(tl, Vec2::new(0.0, 0.0)),
        vertex(bl, Vec2::new(0.0, 1.0)),
    ];
    *tri_id += QUAD_TRIANGLES;

    MeshData {
        vertices,
        indices: (0..6).collect(),
    }
}

/// Axis-aligned box centred on `origin` with edge lengths `size`.
pub fn cube(origin: Vec3, size: Vec3) -> MeshData<Vertex> {
    let mut mesh = MeshData::new();
    for face in cube_faces(origin, size) {
        for (position, uv) in face.corners() {
            mesh.push_dedup(Vertex::new(position, face.normal, uv));
        }
    }
    mesh
}

/// Visibility cube. Advances `tri_id` by [`CUBE_TRIANGLES`].
pub fn visibility_cube(
    origin: Vec3,
    size: Vec3,
    tri_id: &mut u16,
    mat_id: u16,
) -> MeshData<UberVertex> {
    let mut mesh = MeshData::new();
    for face in cube_faces(origin, size) {
        for (position, uv) in face.corners() {
            mesh.push_dedup(UberVertex::new(
                position,
                face.normal,
                uv,
                *tri_id as f32,
                mat_id as f32,
            ));
        }
    }
    *tri_id += CUBE_TRIANGLES;
    mesh
}

fn quad_corners(origin: Vec3, size: Vec2) -> [Vec3; 4] {
    let h = 0.5 * size;
    [
        origin + Vec3::new(-h.x, -h.y, 0.0),
        origin + Vec3::new(h.x, -h.y, 0.0),
        origin + Vec3::new(h.x, h.y, 0.0),
        origin + Vec3::new(-h.x, h.y, 0.0),
    ]
}

/// One cube face, corners clockwise from top-left as seen from outside.
struct Face {
    quad: [Vec3; 4],
    normal: Vec3,
}

impl Face {
    /// Two triangles: (0, 3, 1) and (1, 3, 2).
    fn corners(&self) -> [(Vec3, Vec2); 6] {
        let [one, two, three, four] = self.quad;
        [
            (one, Vec2::new(0.0, 0.0)),
            (four, Vec2::new(0.0, 1.0)),
            (two, Vec2::new(1.0, 0.0)),
            (two, Vec2::new(1.0, 0.0)),
            (four, Vec2::new(0.0, 1.0)),
            (three, Vec2::new(1.0, 1.0)),
        ]
    }
}

//  front: a--b   back: e--f
//         |  |         |  |
//         d--c         h--g
fn cube_faces(origin: Vec3, size: Vec3) -> [Face; 6] {
    let local = |x: f32, y: f32, z: f32| Vec3::new(x, y, z) * size * 0.5 + origin;
    let a = local(-1.0, 1.0, 1.0);
    let b = local(1.0, 1.0, 1.0);
    let c = local(1.0, -1.0, 1.0);
    let d = local(-1.0, -1.0, 1.0);
    let e = local(-1.0, 1.0, -1.0);
    let f = local(1.0, 1.0, -1.0);
    let g = local(1.0, -1.0, -1.0);
    let h = local(-1.0, -1.0, -1.0);

    [
        Face { quad: [a, b, c, d], normal: Vec3::Z },
        Face { quad: [f, e, h, g], normal: Vec3::NEG_Z },
        Face { quad: [e, a, d, h], normal: Vec3::NEG_X },
        Face { quad: [b, f, g, c], normal: Vec3::X },
        Face { quad: [a, e, f, b], normal: Vec3::Y },
        Face { quad: [d, c, g, h], normal: Vec3::NEG_Y },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_dedup() {
        let mut mesh = MeshData::new();
        mesh.push_dedup(1u32);
        mesh.push_dedup(2u32);
        mesh.push_dedup(1u32);
        assert_eq!(mesh.vertices, vec![1, 2]);
        assert_eq!(mesh.indices, vec![0, 1, 0]);
    }

    #[test]
    fn test_quad() {
        let mesh = quad(Vec3::new(-0.5, 0.0, 0.0), Vec2::new(0.5, 0.5));
        assert_eq!(mesh.indices, vec![0, 1, 2, 2, 3, 0]);
        assert_eq!(mesh.vertices[0].position, Vec3::new(-0.75, -0.25, 0.0));
        assert_eq!(mesh.vertices[2].position, Vec3::new(-0.25, 0.25, 0.0));
        assert_eq!(mesh.vertices[0].uv, Vec2::new(0.0, 1.0));
        assert!(mesh.vertices.iter().all(|v| v.normal == Vec3::Z));
    }

    #[test]
    fn test_cube_shares_face_corners() {
        let mesh = cube(Vec3::ZERO, Vec3::ONE);
        assert_eq!(mesh.index_count(), 36);
        assert_eq!(mesh.vertex_count(), 24);
        assert!(mesh.indices.iter().all(|&i| (i as usize) < mesh.vertices.len()));
    }

    #[test]
    fn test_cube_extent() {
        let mesh = cube(Vec3::new(0.0, -2.5, 0.0), Vec3::new(20.0, 0.2, 20.0));
        let min = mesh.vertices.iter().fold(Vec3::MAX, |m, v| m.min(v.position));
        let max = mesh.vertices.iter().fold(Vec3::MIN, |m, v| m.max(v.position));
        assert!((min - Vec3::new(-10.0, -2.6, -10.0)).length() < 1e-5);
        assert!((max - Vec3::new(10.0, -2.4, 10.0)).length() < 1e-5);
    }

    #[test]
    fn test_cube_front_face() {
        let mesh = cube(Vec3::ZERO, Vec3::splat(2.0));
        let front: Vec<_> = mesh.indices[..6]
            .iter()
            .map(|&i| mesh.vertices[i as usize])
            .collect();
        assert!(front.iter().all(|v| v.normal == Vec3::Z));
        assert_eq!(front[0].position, Vec3::new(-1.0, 1.0, 1.0));
        assert_eq!(front[5].position, Vec3::new(1.0, -1.0, 1.0));
        assert_eq!(front[5].uv, Vec2::new(1.0, 1.0));
    }

    #[test]
    fn test_visibility_ids() {
        let mut tri_id = 0;
        let quad = visibility_quad(Vec3::ZERO, Vec2::ONE, &mut tri_id, 1);
        assert_eq!(tri_id, 2);
        assert_eq!(quad.vertex_count(), 6);
        assert!(quad.vertices.iter().all(|v| v.ids == Vec2::new(0.0, 1.0)));

        let cube = visibility_cube(Vec3::ZERO, Vec3::ONE, &mut tri_id, 3);
        assert_eq!(tri_id, 14);
        assert_eq!(cube.vertex_count(), 24);
        assert!(cube.vertices.iter().all(|v| v.ids == Vec2::new(2.0, 3.0)));
        assert_eq!(cube.visibility_vertices().len(), 24);
    }
}
