//! Common contract for anything recorded into a command buffer at draw time.

use crate::command::CommandBuffer;

/// A GPU object that binds itself into a command buffer.
///
/// Implemented by graphics and compute pipelines, descriptors and meshes.
/// `image_index` selects per-swapchain-image state such as descriptor sets;
/// objects without per-image state ignore it.
pub trait Bindable {
    fn bind(&self, cmd: &CommandBuffer, image_index: usize);
}
