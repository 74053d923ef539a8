//! Vulkan logical device and queue management.
//!
//! # Overview
//!
//! [`Device`] is the device/queue context: it owns the logical device, one
//! queue for each of the graphics, present and compute roles, their family
//! indices, and the gpu-allocator instance every buffer and image allocates
//! from. It is created once at startup and shared behind an `Arc`.
//!
//! # Example
//!
//! ```no_run
//! use vbparts_rhi::instance::Instance;
//! use vbparts_rhi::physical_device::select_physical_device;
//! use vbparts_rhi::device::Device;
//! use ash::vk;
//!
//! let instance = Instance::new(false).expect("Failed to create instance");
//! let surface: vk::SurfaceKHR = vk::SurfaceKHR::null(); // placeholder
//! let surface_loader = ash::khr::surface::Instance::new(instance.entry(), instance.handle());
//!
//! let info = select_physical_device(instance.handle(), surface, &surface_loader)
//!     .expect("No suitable GPU found");
//! let device = Device::new(&instance, &info).expect("Failed to create logical device");
//!
//! let compute_queue = device.compute_queue();
//! ```

use std::mem::ManuallyDrop;
use std::sync::{Arc, Mutex, MutexGuard};

use ash::vk;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use tracing::{debug, error, info};

use crate::error::{RhiError, RhiResult};
use crate::instance::Instance;
use crate::physical_device::{DEVICE_EXTENSIONS, PhysicalDeviceInfo, QueueFamilyIndices};

/// Vulkan logical device wrapper.
///
/// # Thread Safety
///
/// Shared across threads through `Arc`. The allocator sits behind a `Mutex`.
pub struct Device {
    device: ash::Device,
    physical_device: vk::PhysicalDevice,
    properties: vk::PhysicalDeviceProperties,
    /// Dropped explicitly before the device is destroyed.
    allocator: ManuallyDrop<Mutex<Allocator>>,
    graphics_queue: vk::Queue,
    present_queue: vk::Queue,
    compute_queue: vk::Queue,
    graphics_family: u32,
    present_family: u32,
    compute_family: u32,
}

impl Device {
    /// Creates the logical device and retrieves all three queues.
    ///
    /// Enabled features: geometry shaders (particle expansion) and sampler
    /// anisotropy when the GPU supports it.
    ///
    /// # Arguments
    ///
    /// * `instance` - The Vulkan instance
    /// * `physical_device_info` - The selected GPU with resolved queue families
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::NoSuitableGpu`] if any queue family is unresolved,
    /// or a Vulkan/allocator error if creation fails.
    pub fn new(
        instance: &Instance,
        physical_device_info: &PhysicalDeviceInfo,
    ) -> RhiResult<Arc<Self>> {
        let families = physical_device_info.queue_families;
        let (Some(graphics_family), Some(present_family), Some(compute_family)) = (
            families.graphics_family,
            families.present_family,
            families.compute_family,
        ) else {
            return Err(RhiError::NoSuitableGpu);
        };

        let unique_families = families.unique_families();
        let queue_priorities = [1.0f32];
        let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = unique_families
            .iter()
            .map(|&family| {
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(family)
                    .queue_priorities(&queue_priorities)
            })
            .collect();

        debug!(
            "Creating {} queue(s) for families: {:?}",
            queue_create_infos.len(),
            unique_families
        );

        let features = vk::PhysicalDeviceFeatures::default()
            .geometry_shader(true)
            .sampler_anisotropy(physical_device_info.features.sampler_anisotropy == vk::TRUE);

        let extension_names: Vec<*const std::ffi::c_char> =
            DEVICE_EXTENSIONS.iter().map(|ext| ext.as_ptr()).collect();

        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extension_names)
            .enabled_features(&features);

        let device = unsafe {
            instance
                .handle()
                .create_device(physical_device_info.device, &create_info, None)?
        };

        info!(
            "Logical device created with {} extension(s)",
            DEVICE_EXTENSIONS.len()
        );

        let graphics_queue = unsafe { device.get_device_queue(graphics_family, 0) };
        let present_queue = unsafe { device.get_device_queue(present_family, 0) };
        let compute_queue = unsafe { device.get_device_queue(compute_family, 0) };
        debug!(
            "Queues retrieved: graphics={}, present={}, compute={}",
            graphics_family, present_family, compute_family
        );

        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.handle().clone(),
            device: device.clone(),
            physical_device: physical_device_info.device,
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        })?;

        info!("GPU memory allocator initialized");

        Ok(Arc::new(Self {
            device,
            physical_device: physical_device_info.device,
            properties: physical_device_info.properties,
            allocator: ManuallyDrop::new(Mutex::new(allocator)),
            graphics_queue,
            present_queue,
            compute_queue,
            graphics_family,
            present_family,
            compute_family,
        }))
    }

    /// Returns the Vulkan logical device handle.
    #[inline]
    pub fn handle(&self) -> &ash::Device {
        &self.device
    }

    #[inline]
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    /// Maximum sampler anisotropy supported by the GPU.
    #[inline]
    pub fn max_sampler_anisotropy(&self) -> f32 {
        self.properties.limits.max_sampler_anisotropy
    }

    #[inline]
    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    #[inline]
    pub fn present_queue(&self) -> vk::Queue {
        self.present_queue
    }

    #[inline]
    pub fn compute_queue(&self) -> vk::Queue {
        self.compute_queue
    }

    #[inline]
    pub fn graphics_family(&self) -> u32 {
        self.graphics_family
    }

    #[inline]
    pub fn present_family(&self) -> u32 {
        self.present_family
    }

    #[inline]
    pub fn compute_family(&self) -> u32 {
        self.compute_family
    }

    /// Returns all three family indices.
    pub fn queue_families(&self) -> QueueFamilyIndices {
        QueueFamilyIndices {
            graphics_family: Some(self.graphics_family),
            present_family: Some(self.present_family),
            compute_family: Some(self.compute_family),
        }
    }

    /// Returns the GPU memory allocator.
    #[inline]
    pub fn allocator(&self) -> &Mutex<Allocator> {
        &self.allocator
    }

    /// Locks the allocator, mapping a poisoned lock to an error.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::InvalidHandle`] if another thread panicked while
    /// holding the lock.
    pub fn lock_allocator(&self) -> RhiResult<MutexGuard<'_, Allocator>> {
        self.allocator
            .lock()
            .map_err(|_| RhiError::InvalidHandle("allocator lock poisoned".to_string()))
    }

    /// Blocks until all queues are idle.
    ///
    /// # Errors
    ///
    /// Returns an error if the wait fails.
    pub fn wait_idle(&self) -> RhiResult<()> {
        unsafe { self.device.device_wait_idle()? };
        Ok(())
    }

    /// Submits work to the graphics queue.
    ///
    /// # Safety
    ///
    /// The caller must ensure the command buffers are fully recorded, the
    /// semaphores are in a valid state, and the fence is unsignaled and not in use.
    ///
    /// # Errors
    ///
    /// Returns an error if the submission fails.
    pub unsafe fn submit_graphics(
        &self,
        submit_infos: &[vk::SubmitInfo],
        fence: vk::Fence,
    ) -> RhiResult<()> {
        unsafe {
            self.device
                .queue_submit(self.graphics_queue, submit_infos, fence)?;
        }
        Ok(())
    }

    /// Submits work to the compute queue.
    ///
    /// # Safety
    ///
    /// Same requirements as [`Device::submit_graphics`].
    ///
    /// # Errors
    ///
    /// Returns an error if the submission fails.
    pub unsafe fn submit_compute(
        &self,
        submit_infos: &[vk::SubmitInfo],
        fence: vk::Fence,
    ) -> RhiResult<()> {
        unsafe {
            self.device
                .queue_submit(self.compute_queue, submit_infos, fence)?;
        }
        Ok(())
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = self.device.device_wait_idle() {
                error!("Failed to wait for device idle during drop: {:?}", e);
            }

            // The allocator frees its memory blocks through the device handle.
            ManuallyDrop::drop(&mut self.allocator);

            self.device.destroy_device(None);
        }
        info!("Logical device destroyed");
    }
}

// Safety: the raw handles are plain values, ash::Device is Send+Sync and the
// allocator is behind a Mutex.
unsafe impl Send for Device {}
unsafe impl Sync for Device {}
