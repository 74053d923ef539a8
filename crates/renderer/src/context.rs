//! Shared objects a technique borrows while it is being built.

use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use vbparts_resources::load_image;
use vbparts_rhi::command::CommandPool;
use vbparts_rhi::descriptor::{DescriptorPool, ImageBinding};
use vbparts_rhi::device::Device;
use vbparts_rhi::image::Image;
use vbparts_rhi::sampler::Sampler;
use vbparts_rhi::vk;

use crate::error::RendererResult;

/// Everything that outlives a technique but is needed to construct one.
///
/// Borrowed from the orchestrator for the duration of a build; the
/// descriptor pool and depth buffer are replaced on every rebuild.
pub struct BuildContext<'a> {
    pub device: &'a Arc<Device>,
    pub descriptor_pool: &'a DescriptorPool,
    pub command_pool: &'a CommandPool,
    pub sampler: &'a Sampler,
    /// View of the orchestrator-owned depth buffer
    pub depth_view: vk::ImageView,
    pub present_format: vk::Format,
    pub extent: vk::Extent2D,
    pub image_count: usize,
    pub shader_dir: &'a Path,
    pub texture_dir: &'a Path,
}

impl BuildContext<'_> {
    /// Decodes `name` from the texture directory and uploads it.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing, cannot be decoded, has zero
    /// size, or the upload fails.
    pub fn load_texture(&self, name: &str) -> RendererResult<Image> {
        let data = load_image(&self.texture_dir.join(name))?;
        let image = Image::texture_rgba8(
            self.device.clone(),
            self.command_pool,
            data.width,
            data.height,
            &data.pixels,
        )?;
        debug!("Uploaded texture {} ({}x{})", name, data.width, data.height);
        Ok(image)
    }

    /// Sampled-image binding for `image` using the shared sampler.
    pub fn sampled(&self, image: &Image) -> ImageBinding {
        ImageBinding::sampled(image.view(), self.sampler.handle())
    }
}
