//! Device-local images: render-pass attachments and sampled textures.
//!
//! # Overview
//!
//! - [`Image::attachment`] creates a swapchain-sized target for one
//!   [`AttachmentDesc`] and moves it into the layout the render pass expects
//! - [`Image::texture_rgba8`] uploads decoded RGBA8 pixels through a staging
//!   buffer and leaves the image readable from fragment shaders
//!
//! Layout changes go through [`layout_transition`], which only knows the
//! transitions these two paths need; anything else is an
//! [`RhiError::ImageError`].

use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use tracing::{debug, error, info};

use crate::buffer::{Buffer, BufferUsage};
use crate::command::{CommandBuffer, CommandPool, submit_one_time};
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::render_pass::{AttachmentDesc, DEPTH_FORMAT};

/// Format of uploaded textures.
pub const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;

/// Access masks, stages and aspect for one supported layout change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutTransition {
    pub old_layout: vk::ImageLayout,
    pub new_layout: vk::ImageLayout,
    pub src_access: vk::AccessFlags,
    pub dst_access: vk::AccessFlags,
    pub src_stage: vk::PipelineStageFlags,
    pub dst_stage: vk::PipelineStageFlags,
    pub aspect: vk::ImageAspectFlags,
}

impl LayoutTransition {
    pub fn barrier(&self, image: vk::Image) -> vk::ImageMemoryBarrier<'static> {
        vk::ImageMemoryBarrier::default()
            .old_layout(self.old_layout)
            .new_layout(self.new_layout)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(image)
            .subresource_range(subresource_range(self.aspect))
            .src_access_mask(self.src_access)
            .dst_access_mask(self.dst_access)
    }

    pub fn record(&self, cmd: &CommandBuffer, image: vk::Image) {
        cmd.pipeline_barrier(self.src_stage, self.dst_stage, &[], &[self.barrier(image)]);
    }
}

/// Looks up the barrier parameters for `old -> new`.
///
/// # Errors
///
/// Returns [`RhiError::ImageError`] for any transition other than undefined
/// to transfer-destination, colour or depth attachment, and
/// transfer-destination to shader-read-only.
pub fn layout_transition(
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
) -> RhiResult<LayoutTransition> {
    use vk::ImageLayout as L;

    let (src_access, dst_access, src_stage, dst_stage) = match (old_layout, new_layout) {
        (L::UNDEFINED, L::TRANSFER_DST_OPTIMAL) => (
            vk::AccessFlags::empty(),
            vk::AccessFlags::TRANSFER_WRITE,
            vk::PipelineStageFlags::TOP_OF_PIPE,
            vk::PipelineStageFlags::TRANSFER,
        ),
        (L::TRANSFER_DST_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL) => (
            vk::AccessFlags::TRANSFER_WRITE,
            vk::AccessFlags::SHADER_READ,
            vk::PipelineStageFlags::TRANSFER,
            vk::PipelineStageFlags::FRAGMENT_SHADER,
        ),
        (L::UNDEFINED, L::COLOR_ATTACHMENT_OPTIMAL) => (
            vk::AccessFlags::empty(),
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            vk::PipelineStageFlags::TOP_OF_PIPE,
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        ),
        (L::UNDEFINED, L::DEPTH_STENCIL_ATTACHMENT_OPTIMAL) => (
            vk::AccessFlags::empty(),
            vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            vk::PipelineStageFlags::TOP_OF_PIPE,
            vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
        ),
        _ => {
            return Err(RhiError::ImageError(format!(
                "Unsupported layout transition: {old_layout:?} -> {new_layout:?}"
            )));
        }
    };

    let aspect = if new_layout == L::DEPTH_STENCIL_ATTACHMENT_OPTIMAL {
        vk::ImageAspectFlags::DEPTH
    } else {
        vk::ImageAspectFlags::COLOR
    };

    Ok(LayoutTransition {
        old_layout,
        new_layout,
        src_access,
        dst_access,
        src_stage,
        dst_stage,
        aspect,
    })
}

/// Usage and aspect for an attachment of `format`.
pub fn attachment_usage(format: vk::Format) -> (vk::ImageUsageFlags, vk::ImageAspectFlags) {
    if format == DEPTH_FORMAT {
        (
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            vk::ImageAspectFlags::DEPTH,
        )
    } else {
        (
            vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::INPUT_ATTACHMENT,
            vk::ImageAspectFlags::COLOR,
        )
    }
}

fn subresource_range(aspect: vk::ImageAspectFlags) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange::default()
        .aspect_mask(aspect)
        .base_mip_level(0)
        .level_count(1)
        .base_array_layer(0)
        .layer_count(1)
}

/// A 2D image with its view and memory.
///
/// Resources are destroyed view first, then image, then memory.
pub struct Image {
    device: Arc<Device>,
    image: vk::Image,
    view: vk::ImageView,
    allocation: Option<Allocation>,
    format: vk::Format,
    extent: vk::Extent2D,
}

impl Image {
    /// Creates the intermediate or depth target described by `desc`.
    ///
    /// # Errors
    ///
    /// Returns an error if the extent is empty, the attachment layout has no
    /// supported transition, or creation fails.
    pub fn attachment(
        device: Arc<Device>,
        pool: &CommandPool,
        desc: &AttachmentDesc,
        extent: vk::Extent2D,
    ) -> RhiResult<Self> {
        let (usage, aspect) = attachment_usage(desc.format);
        let transition = layout_transition(vk::ImageLayout::UNDEFINED, desc.layout)?;

        let image = Self::new(device.clone(), desc.format, extent, usage, aspect, "attachment")?;
        submit_one_time(pool, device.graphics_queue(), |cmd| {
            transition.record(cmd, image.image);
        })?;

        Ok(image)
    }

    /// Uploads `pixels` (tightly packed RGBA8, row-major) as a sampled texture.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::ImageError`] if either dimension is zero or the
    /// pixel count does not match, or an error if upload fails.
    pub fn texture_rgba8(
        device: Arc<Device>,
        pool: &CommandPool,
        width: u32,
        height: u32,
        pixels: &[u8],
    ) -> RhiResult<Self> {
        if width == 0 || height == 0 {
            return Err(RhiError::ImageError(format!(
                "Texture has zero size: {width}x{height}"
            )));
        }
        let expected = width as usize * height as usize * 4;
        if pixels.len() != expected {
            return Err(RhiError::ImageError(format!(
                "Texture data is {} bytes, expected {expected}",
                pixels.len()
            )));
        }

        let to_transfer =
            layout_transition(vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL)?;
        let to_shader = layout_transition(
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )?;

        let extent = vk::Extent2D { width, height };
        let image = Self::new(
            device.clone(),
            TEXTURE_FORMAT,
            extent,
            vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
            vk::ImageAspectFlags::COLOR,
            "texture",
        )?;
        let staging = Buffer::new_with_data(device.clone(), BufferUsage::Staging, pixels)?;

        let region = vk::BufferImageCopy::default()
            .buffer_offset(0)
            .buffer_row_length(0)
            .buffer_image_height(0)
            .image_subresource(
                vk::ImageSubresourceLayers::default()
                    .aspect_mask(vk::ImageAspectFlags::COLOR)
                    .mip_level(0)
                    .base_array_layer(0)
                    .layer_count(1),
            )
            .image_offset(vk::Offset3D { x: 0, y: 0, z: 0 })
            .image_extent(vk::Extent3D {
                width,
                height,
                depth: 1,
            });

        submit_one_time(pool, device.graphics_queue(), |cmd| {
            to_transfer.record(cmd, image.image);
            cmd.copy_buffer_to_image(
                staging.handle(),
                image.image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
            );
            to_shader.record(cmd, image.image);
        })?;

        info!("Uploaded texture: {}x{}", width, height);
        Ok(image)
    }

    fn new(
        device: Arc<Device>,
        format: vk::Format,
        extent: vk::Extent2D,
        usage: vk::ImageUsageFlags,
        aspect: vk::ImageAspectFlags,
        name: &'static str,
    ) -> RhiResult<Self> {
        if extent.width == 0 || extent.height == 0 {
            return Err(RhiError::ImageError(
                "Image dimensions must be greater than 0".to_string(),
            ));
        }

        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(format)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = unsafe { device.handle().create_image(&image_info, None)? };
        let requirements = unsafe { device.handle().get_image_memory_requirements(image) };

        let allocation = device.lock_allocator()?.allocate(&AllocationCreateDesc {
            name,
            requirements,
            location: MemoryLocation::GpuOnly,
            linear: false,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        })?;

        unsafe {
            device
                .handle()
                .bind_image_memory(image, allocation.memory(), allocation.offset())?;
        }

        let view_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(subresource_range(aspect));
        let view = unsafe { device.handle().create_image_view(&view_info, None)? };

        debug!(
            "Created {} image: {}x{} ({:?})",
            name, extent.width, extent.height, format
        );

        Ok(Self {
            device,
            image,
            view,
            allocation: Some(allocation),
            format,
            extent,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::Image {
        self.image
    }

    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_image_view(self.view, None);
            self.device.handle().destroy_image(self.image, None);
        }

        if let Some(allocation) = self.allocation.take() {
            match self.device.lock_allocator() {
                Ok(mut allocator) => {
                    if let Err(e) = allocator.free(allocation) {
                        error!("Failed to free image allocation: {:?}", e);
                    }
                }
                Err(e) => error!("Leaking image allocation: {}", e),
            }
        }

        debug!("Destroyed image ({:?})", self.format);
    }
}
