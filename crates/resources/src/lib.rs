//! CPU-side resources.
//!
//! This crate prepares data before it is uploaded to the GPU:
//! - Image decoding to tightly packed RGBA8
//! - Procedural quad and cube meshes, including visibility variants
//! - Packing of visibility meshes into the lighting pass vertex table

pub mod error;
pub mod image_data;
pub mod mesh;
pub mod vertex_table;

pub use error::{ResourceError, ResourceResult};
pub use image_data::{ImageData, load_image};
pub use mesh::MeshData;
pub use vertex_table::{VertexTable, VertexTableBuilder, VertexTableEntry};
