//! Integration tests for scene mesh packing and texture decoding.

use glam::{Vec2, Vec3};

use vbparts_resources::mesh::{visibility_cube, visibility_quad};
use vbparts_resources::vertex_table::{MAX_TRIANGLES, VertexTableBuilder};
use vbparts_resources::{ResourceError, load_image};

const SHRIMP: u16 = 1;
const RAYMARCH: u16 = 2;
const RACCOON: u16 = 3;

#[test]
fn test_visibility_scene_fits_vertex_table() {
    let mut tri_id = 0;
    let meshes = [
        visibility_quad(Vec3::new(-0.5, 0.0, 0.0), Vec2::new(0.5, 0.5), &mut tri_id, SHRIMP),
        visibility_cube(Vec3::new(0.5, 0.0, -3.0), Vec3::splat(2.5), &mut tri_id, SHRIMP),
        visibility_cube(Vec3::new(2.0, 0.3, 2.0), Vec3::new(1.0, 1.5, 1.0), &mut tri_id, SHRIMP),
        visibility_cube(Vec3::new(-2.0, 0.3, 2.0), Vec3::splat(1.5), &mut tri_id, RACCOON),
        visibility_cube(Vec3::new(0.0, -2.5, 0.0), Vec3::new(20.0, 0.2, 20.0), &mut tri_id, SHRIMP),
        visibility_cube(Vec3::new(3.0, 0.0, -2.0), Vec3::splat(2.0), &mut tri_id, RAYMARCH),
    ];
    assert_eq!(tri_id, 62);
    assert!((tri_id as usize) < MAX_TRIANGLES);

    let mut builder = VertexTableBuilder::new();
    for mesh in &meshes {
        builder.push(mesh).expect("scene should fit the vertex table");
    }
    assert_eq!(builder.index_count(), 186);
    assert_eq!(builder.vertex_count(), 126);

    // Triangle ids in the visibility vertices line up with table triangles.
    let table = builder.build();
    let raccoon_first = table.indices[6 + 36 * 3] as usize;
    assert_eq!(meshes[3].vertices[0].ids, Vec2::new(26.0, RACCOON as f32));
    assert_eq!(
        table.vertices[raccoon_first].position(),
        meshes[3].vertices[0].position
    );
}

#[test]
fn test_load_texture_from_disk() {
    let dir = std::env::temp_dir().join(format!("vbparts-textures-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("leaf.png");
    image::RgbaImage::from_pixel(4, 4, image::Rgba([0, 128, 0, 0]))
        .save(&path)
        .unwrap();

    let texture = load_image(&path).unwrap();
    assert_eq!(texture.width, 4);
    assert_eq!(texture.pixels.len(), 64);
    assert_eq!(&texture.pixels[..4], &[0, 128, 0, 0]);

    std::fs::remove_dir_all(&dir).unwrap();
    assert!(matches!(
        load_image(&path),
        Err(ResourceError::FileNotFound(_))
    ));
}
