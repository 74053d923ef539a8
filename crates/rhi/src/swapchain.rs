//! Swapchain management.
//!
//! # Overview
//!
//! A [`Swapchain`] owns the presentable images, their views and one
//! framebuffer per image. It is never patched in place: on resize or an
//! out-of-date result the owner drops it and constructs a new one, so the
//! image count stays fixed for the lifetime of the object and the
//! framebuffer count always matches it.
//!
//! Framebuffers are built per render pass with
//! [`Swapchain::create_framebuffers`]; the present view is always prepended
//! as attachment 0, matching the render pass attachment order.
//!
//! # Example
//!
//! ```no_run
//! # fn demo(
//! #     instance: &vbparts_rhi::instance::Instance,
//! #     device: std::sync::Arc<vbparts_rhi::device::Device>,
//! #     surface: ash::vk::SurfaceKHR,
//! #     render_pass: ash::vk::RenderPass,
//! #     depth_view: ash::vk::ImageView,
//! # ) -> vbparts_rhi::RhiResult<()> {
//! use vbparts_rhi::swapchain::Swapchain;
//!
//! let mut swapchain = Swapchain::new(instance, device, surface, 1024, 768)?;
//! swapchain.create_framebuffers(&[depth_view], render_pass)?;
//! assert_eq!(swapchain.framebuffers().len(), swapchain.image_count() as usize);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info, warn};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::instance::Instance;

/// Swapchain surface support details.
#[derive(Debug, Clone)]
pub struct SwapchainSupportDetails {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupportDetails {
    /// Queries swapchain support details for a physical device and surface.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the queries fail.
    pub fn query(
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
    ) -> RhiResult<Self> {
        let capabilities = unsafe {
            surface_loader.get_physical_device_surface_capabilities(physical_device, surface)?
        };
        let formats = unsafe {
            surface_loader.get_physical_device_surface_formats(physical_device, surface)?
        };
        let present_modes = unsafe {
            surface_loader.get_physical_device_surface_present_modes(physical_device, surface)?
        };

        debug!(
            "Swapchain support: {} formats, {} present modes, min images {}",
            formats.len(),
            present_modes.len(),
            capabilities.min_image_count
        );

        Ok(Self {
            capabilities,
            formats,
            present_modes,
        })
    }

    /// True if at least one format and one present mode are available.
    #[inline]
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

/// Vulkan swapchain with its image views and framebuffers.
pub struct Swapchain {
    device: Arc<Device>,
    swapchain_loader: ash::khr::swapchain::Device,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    framebuffers: Vec<vk::Framebuffer>,
    format: vk::Format,
    extent: vk::Extent2D,
    present_mode: vk::PresentModeKHR,
}

impl Swapchain {
    /// Creates a swapchain for the surface at the requested window size.
    ///
    /// # Arguments
    ///
    /// * `instance` - The Vulkan instance
    /// * `device` - The logical device
    /// * `surface` - The window surface
    /// * `width` - Window framebuffer width
    /// * `height` - Window framebuffer height
    ///
    /// # Errors
    ///
    /// Returns an error if the surface offers no format or present mode, or if
    /// any Vulkan object creation fails.
    pub fn new(
        instance: &Instance,
        device: Arc<Device>,
        surface: vk::SurfaceKHR,
        width: u32,
        height: u32,
    ) -> RhiResult<Self> {
        let swapchain_loader = ash::khr::swapchain::Device::new(instance.handle(), device.handle());
        let surface_loader = ash::khr::surface::Instance::new(instance.entry(), instance.handle());

        let support =
            SwapchainSupportDetails::query(device.physical_device(), surface, &surface_loader)?;
        if !support.is_adequate() {
            return Err(RhiError::SwapchainError(
                "Inadequate swapchain support (no formats or present modes)".to_string(),
            ));
        }

        let surface_format = choose_surface_format(&support.formats);
        let present_mode = choose_present_mode(&support.present_modes);
        let extent = choose_extent(&support.capabilities, width, height);
        let image_count = determine_image_count(&support.capabilities);

        let queue_family_indices = [device.graphics_family(), device.present_family()];
        let (sharing_mode, shared_families) = if queue_family_indices[0] != queue_family_indices[1]
        {
            (vk::SharingMode::CONCURRENT, &queue_family_indices[..])
        } else {
            (vk::SharingMode::EXCLUSIVE, &[][..])
        };

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(sharing_mode)
            .queue_family_indices(shared_families)
            .pre_transform(support.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true);

        let swapchain = unsafe { swapchain_loader.create_swapchain(&create_info, None)? };
        let images = unsafe { swapchain_loader.get_swapchain_images(swapchain)? };

        let mut this = Self {
            device,
            swapchain_loader,
            swapchain,
            images,
            image_views: Vec::new(),
            framebuffers: Vec::new(),
            format: surface_format.format,
            extent,
            present_mode,
        };
        this.image_views = this.create_image_views()?;

        info!(
            "Swapchain created: {}x{}, format {:?}, present mode {:?}, {} images",
            extent.width,
            extent.height,
            surface_format.format,
            present_mode,
            this.images.len()
        );

        Ok(this)
    }

    /// Builds one framebuffer per swapchain image for `render_pass`.
    ///
    /// Each framebuffer's attachments are the image's present view followed
    /// by `attachments`. Any framebuffers from a previous call are destroyed.
    ///
    /// # Errors
    ///
    /// Returns an error if framebuffer creation fails.
    pub fn create_framebuffers(
        &mut self,
        attachments: &[vk::ImageView],
        render_pass: vk::RenderPass,
    ) -> RhiResult<()> {
        self.destroy_framebuffers();

        for &present_view in &self.image_views {
            let views = framebuffer_attachments(present_view, attachments);
            let create_info = vk::FramebufferCreateInfo::default()
                .render_pass(render_pass)
                .attachments(&views)
                .width(self.extent.width)
                .height(self.extent.height)
                .layers(1);

            let framebuffer = unsafe { self.device.handle().create_framebuffer(&create_info, None)? };
            self.framebuffers.push(framebuffer);
        }

        debug!(
            "Created {} framebuffers with {} attachments each",
            self.framebuffers.len(),
            attachments.len() + 1
        );
        Ok(())
    }

    /// Acquires the next presentable image, signaling `semaphore`.
    ///
    /// Returns `(image_index, suboptimal)`.
    ///
    /// # Errors
    ///
    /// Returns the raw Vulkan result so callers can single out
    /// `ERROR_OUT_OF_DATE_KHR`.
    pub fn acquire_next_image(&self, semaphore: vk::Semaphore) -> Result<(u32, bool), vk::Result> {
        unsafe {
            self.swapchain_loader.acquire_next_image(
                self.swapchain,
                u64::MAX,
                semaphore,
                vk::Fence::null(),
            )
        }
    }

    /// Presents `image_index` once `wait_semaphore` is signaled.
    ///
    /// Returns `true` if the swapchain is suboptimal.
    ///
    /// # Errors
    ///
    /// Returns the raw Vulkan result so callers can single out
    /// `ERROR_OUT_OF_DATE_KHR`.
    pub fn present(
        &self,
        queue: vk::Queue,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> Result<bool, vk::Result> {
        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let wait_semaphores = [wait_semaphore];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        unsafe { self.swapchain_loader.queue_present(queue, &present_info) }
    }

    #[inline]
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Width divided by height.
    #[inline]
    pub fn aspect_ratio(&self) -> f32 {
        self.extent.width as f32 / self.extent.height.max(1) as f32
    }

    #[inline]
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }

    #[inline]
    pub fn image_count(&self) -> u32 {
        self.images.len() as u32
    }

    #[inline]
    pub fn image_views(&self) -> &[vk::ImageView] {
        &self.image_views
    }

    #[inline]
    pub fn framebuffers(&self) -> &[vk::Framebuffer] {
        &self.framebuffers
    }

    /// Returns the framebuffer for `index`.
    ///
    /// # Panics
    ///
    /// Panics if framebuffers have not been created or `index` is out of bounds.
    #[inline]
    pub fn framebuffer(&self, index: usize) -> vk::Framebuffer {
        self.framebuffers[index]
    }

    fn create_image_views(&self) -> RhiResult<Vec<vk::ImageView>> {
        self.images
            .iter()
            .enumerate()
            .map(|(i, &image)| {
                let create_info = vk::ImageViewCreateInfo::default()
                    .image(image)
                    .view_type(vk::ImageViewType::TYPE_2D)
                    .format(self.format)
                    .components(vk::ComponentMapping::default())
                    .subresource_range(
                        vk::ImageSubresourceRange::default()
                            .aspect_mask(vk::ImageAspectFlags::COLOR)
                            .level_count(1)
                            .layer_count(1),
                    );

                unsafe { self.device.handle().create_image_view(&create_info, None) }.map_err(
                    |e| RhiError::SwapchainError(format!("Failed to create image view {}: {:?}", i, e)),
                )
            })
            .collect()
    }

    fn destroy_framebuffers(&mut self) {
        for framebuffer in self.framebuffers.drain(..) {
            unsafe {
                self.device.handle().destroy_framebuffer(framebuffer, None);
            }
        }
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        self.destroy_framebuffers();
        unsafe {
            for &view in &self.image_views {
                self.device.handle().destroy_image_view(view, None);
            }
            self.swapchain_loader.destroy_swapchain(self.swapchain, None);
        }
        info!(
            "Swapchain destroyed (was {}x{}, {} images)",
            self.extent.width,
            self.extent.height,
            self.images.len()
        );
    }
}

/// Present view first, then the technique's own attachments.
fn framebuffer_attachments(present_view: vk::ImageView, rest: &[vk::ImageView]) -> Vec<vk::ImageView> {
    std::iter::once(present_view).chain(rest.iter().copied()).collect()
}

/// Prefers B8G8R8A8_UNORM with SRGB_NONLINEAR, otherwise the first format.
fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> vk::SurfaceFormatKHR {
    if let Some(&format) = formats.iter().find(|f| {
        f.format == vk::Format::B8G8R8A8_UNORM && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
    }) {
        return format;
    }

    warn!(
        "B8G8R8A8_UNORM/SRGB_NONLINEAR not offered, using {:?}",
        formats[0].format
    );
    formats[0]
}

/// Prefers MAILBOX, falls back to FIFO which is always available.
fn choose_present_mode(present_modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    if present_modes.contains(&vk::PresentModeKHR::MAILBOX) {
        return vk::PresentModeKHR::MAILBOX;
    }
    warn!("MAILBOX present mode not offered, using FIFO");
    vk::PresentModeKHR::FIFO
}

/// Uses the surface's current extent when fixed, otherwise clamps the window size.
fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    width: u32,
    height: u32,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    vk::Extent2D {
        width: width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    }
}

/// One more than the minimum, capped by the maximum when one is set.
fn determine_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let preferred = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 {
        preferred.min(capabilities.max_image_count)
    } else {
        preferred
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    fn surface_format(format: vk::Format) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }
    }

    #[test]
    fn test_choose_surface_format_prefers_unorm() {
        let formats = [
            surface_format(vk::Format::B8G8R8A8_SRGB),
            surface_format(vk::Format::B8G8R8A8_UNORM),
        ];
        assert_eq!(
            choose_surface_format(&formats).format,
            vk::Format::B8G8R8A8_UNORM
        );
    }

    #[test]
    fn test_choose_surface_format_falls_back_to_first() {
        let formats = [
            surface_format(vk::Format::R8G8B8A8_UNORM),
            surface_format(vk::Format::B8G8R8A8_SRGB),
        ];
        assert_eq!(
            choose_surface_format(&formats).format,
            vk::Format::R8G8B8A8_UNORM
        );
    }

    #[test]
    fn test_choose_present_mode() {
        let modes = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];
        assert_eq!(choose_present_mode(&modes), vk::PresentModeKHR::MAILBOX);

        let modes = [vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::FIFO];
        assert_eq!(choose_present_mode(&modes), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn test_choose_extent() {
        let mut capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: 1920,
                height: 1080,
            },
            min_image_extent: vk::Extent2D {
                width: 100,
                height: 100,
            },
            max_image_extent: vk::Extent2D {
                width: 2000,
                height: 2000,
            },
            ..Default::default()
        };
        assert_eq!(choose_extent(&capabilities, 800, 600).width, 1920);

        capabilities.current_extent = vk::Extent2D {
            width: u32::MAX,
            height: u32::MAX,
        };
        let extent = choose_extent(&capabilities, 3000, 50);
        assert_eq!((extent.width, extent.height), (2000, 100));
    }

    #[test]
    fn test_determine_image_count() {
        let capped = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 2,
            ..Default::default()
        };
        assert_eq!(determine_image_count(&capped), 2);

        let unlimited = vk::SurfaceCapabilitiesKHR {
            min_image_count: 3,
            max_image_count: 0,
            ..Default::default()
        };
        assert_eq!(determine_image_count(&unlimited), 4);
    }

    #[test]
    fn test_framebuffer_attachments_prepend_present_view() {
        let present = vk::ImageView::from_raw(1);
        let gbuffer = vk::ImageView::from_raw(2);
        let depth = vk::ImageView::from_raw(3);

        let views = framebuffer_attachments(present, &[gbuffer, depth]);
        assert_eq!(views, vec![present, gbuffer, depth]);
        assert_eq!(framebuffer_attachments(present, &[]), vec![present]);
    }
}
