//! Depth buffer shared by every technique.
//!
//! Owned by the orchestrator rather than a technique, since it only
//! depends on the swapchain extent. Each technique appends its view as the
//! last framebuffer attachment.

use std::sync::Arc;

use tracing::debug;

use vbparts_rhi::RhiResult;
use vbparts_rhi::command::CommandPool;
use vbparts_rhi::device::Device;
use vbparts_rhi::image::Image;
use vbparts_rhi::render_pass::AttachmentDesc;
use vbparts_rhi::vk;

pub struct DepthBuffer {
    image: Image,
}

impl DepthBuffer {
    /// Creates a depth image in its attachment layout.
    ///
    /// # Errors
    ///
    /// Returns an error if image creation or the layout transition fails.
    pub fn new(device: Arc<Device>, pool: &CommandPool, extent: vk::Extent2D) -> RhiResult<Self> {
        let image = Image::attachment(device, pool, &AttachmentDesc::depth(), extent)?;
        debug!("Depth buffer created: {}x{}", extent.width, extent.height);
        Ok(Self { image })
    }

    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.image.view()
    }
}
