//! Physical device (GPU) selection.
//!
//! # Overview
//!
//! The selection process:
//! 1. Enumerate all available GPUs
//! 2. Resolve graphics, present and compute queue families (all three are mandatory)
//! 3. Verify the geometry-shader feature and swapchain extension
//! 4. Pick the highest scoring GPU (discrete GPUs first)
//!
//! A dedicated compute family (compute without graphics) is preferred so the
//! particle dispatch can overlap graphics work; a combined family is used
//! otherwise.
//!
//! # Example
//!
//! ```no_run
//! use vbparts_rhi::instance::Instance;
//! use vbparts_rhi::physical_device::select_physical_device;
//! use ash::vk;
//!
//! let instance = Instance::new(false).expect("Failed to create instance");
//! let surface: vk::SurfaceKHR = vk::SurfaceKHR::null(); // placeholder
//! let surface_loader = ash::khr::surface::Instance::new(instance.entry(), instance.handle());
//!
//! let device_info = select_physical_device(instance.handle(), surface, &surface_loader)
//!     .expect("Failed to select physical device");
//! println!("Selected GPU: {:?}", device_info.device_name());
//! ```

use std::ffi::CStr;

use ash::vk;
use tracing::{debug, info, warn};

use crate::error::RhiError;

/// Device extensions every candidate must expose.
pub const DEVICE_EXTENSIONS: &[&CStr] = &[ash::khr::swapchain::NAME];

/// Queue family indices for the three queues the renderer drives.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    /// Family used for graphics submissions.
    pub graphics_family: Option<u32>,
    /// Family able to present to the window surface.
    pub present_family: Option<u32>,
    /// Family used for particle compute dispatches.
    pub compute_family: Option<u32>,
}

impl QueueFamilyIndices {
    /// True once graphics, present and compute families are all resolved.
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.graphics_family.is_some()
            && self.present_family.is_some()
            && self.compute_family.is_some()
    }

    /// Returns the distinct family indices, graphics first.
    pub fn unique_families(&self) -> Vec<u32> {
        let mut families = Vec::with_capacity(3);
        for family in [self.graphics_family, self.present_family, self.compute_family]
            .into_iter()
            .flatten()
        {
            if !families.contains(&family) {
                families.push(family);
            }
        }
        families
    }

    /// Resolves families from per-family capabilities.
    ///
    /// `families` yields `(queue_flags, queue_count, present_supported)` in
    /// family-index order. Kept free of Vulkan calls so it can be tested
    /// without a device.
    pub fn resolve(families: &[(vk::QueueFlags, u32, bool)]) -> Self {
        let mut indices = Self::default();

        for (i, &(flags, count, present)) in families.iter().enumerate() {
            if count == 0 {
                continue;
            }
            let i = i as u32;
            let graphics = flags.contains(vk::QueueFlags::GRAPHICS);

            if graphics && indices.graphics_family.is_none() {
                indices.graphics_family = Some(i);
            }
            if present && indices.present_family.is_none() {
                indices.present_family = Some(i);
            }
            if flags.contains(vk::QueueFlags::COMPUTE)
                && !graphics
                && indices.compute_family.is_none()
            {
                indices.compute_family = Some(i);
            }
        }

        // No dedicated compute family: fall back to any compute-capable one
        if indices.compute_family.is_none() {
            indices.compute_family = families
                .iter()
                .position(|&(flags, count, _)| {
                    count > 0 && flags.contains(vk::QueueFlags::COMPUTE)
                })
                .map(|i| i as u32);
        }

        indices
    }
}

/// Information about a physical device (GPU).
#[derive(Clone)]
pub struct PhysicalDeviceInfo {
    /// Vulkan physical device handle.
    pub device: vk::PhysicalDevice,
    /// Device properties (name, limits, API version, etc.).
    pub properties: vk::PhysicalDeviceProperties,
    /// Supported device features.
    pub features: vk::PhysicalDeviceFeatures,
    /// Memory properties (heap sizes, memory types).
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    /// Resolved queue family indices.
    pub queue_families: QueueFamilyIndices,
}

impl PhysicalDeviceInfo {
    /// Returns the device name as a string.
    pub fn device_name(&self) -> &str {
        unsafe {
            CStr::from_ptr(self.properties.device_name.as_ptr())
                .to_str()
                .unwrap_or("Unknown Device")
        }
    }

    /// Returns a human-readable string for the device type.
    pub fn device_type_name(&self) -> &'static str {
        match self.properties.device_type {
            vk::PhysicalDeviceType::DISCRETE_GPU => "Discrete GPU",
            vk::PhysicalDeviceType::INTEGRATED_GPU => "Integrated GPU",
            vk::PhysicalDeviceType::VIRTUAL_GPU => "Virtual GPU",
            vk::PhysicalDeviceType::CPU => "CPU",
            _ => "Other",
        }
    }

    /// Returns the total device local memory in bytes.
    pub fn device_local_memory(&self) -> u64 {
        self.memory_properties
            .memory_heaps
            .iter()
            .take(self.memory_properties.memory_heap_count as usize)
            .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
            .map(|heap| heap.size)
            .sum()
    }

    /// The graphics family index. Present on every selected device.
    #[inline]
    pub fn graphics_family(&self) -> u32 {
        self.queue_families.graphics_family.unwrap_or_default()
    }

    /// The compute family index. Present on every selected device.
    #[inline]
    pub fn compute_family(&self) -> u32 {
        self.queue_families.compute_family.unwrap_or_default()
    }

    /// The present family index. Present on every selected device.
    #[inline]
    pub fn present_family(&self) -> u32 {
        self.queue_families.present_family.unwrap_or_default()
    }
}

impl std::fmt::Debug for PhysicalDeviceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhysicalDeviceInfo")
            .field("name", &self.device_name())
            .field("type", &self.device_type_name())
            .field("queue_families", &self.queue_families)
            .finish()
    }
}

/// Selects the most suitable physical device for rendering.
///
/// # Arguments
///
/// * `instance` - The Vulkan instance
/// * `surface` - The window surface for present support checking
/// * `surface_loader` - The surface extension loader
///
/// # Errors
///
/// Returns [`RhiError::NoSuitableGpu`] if no GPU exposes all three queue
/// families together with the required features and extensions.
pub fn select_physical_device(
    instance: &ash::Instance,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> Result<PhysicalDeviceInfo, RhiError> {
    let devices = unsafe { instance.enumerate_physical_devices()? };

    if devices.is_empty() {
        warn!("No Vulkan-capable GPUs found");
        return Err(RhiError::NoSuitableGpu);
    }

    info!("Found {} GPU(s)", devices.len());

    let selected = devices
        .into_iter()
        .filter_map(|device| check_device_suitability(instance, device, surface, surface_loader))
        .map(|info| {
            let score = rate_device(&info);
            debug!(
                "GPU '{}' ({}) - Score: {}",
                info.device_name(),
                info.device_type_name(),
                score
            );
            (info, score)
        })
        .max_by_key(|(_, score)| *score);

    let Some((device_info, score)) = selected else {
        warn!("No GPU exposes graphics, present and compute queues with the required features");
        return Err(RhiError::NoSuitableGpu);
    };

    info!(
        "Selected GPU: '{}' ({}), Score: {}, queues: {:?}",
        device_info.device_name(),
        device_info.device_type_name(),
        score,
        device_info.queue_families
    );

    Ok(device_info)
}

fn check_device_suitability(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> Option<PhysicalDeviceInfo> {
    let properties = unsafe { instance.get_physical_device_properties(device) };
    let features = unsafe { instance.get_physical_device_features(device) };
    let memory_properties = unsafe { instance.get_physical_device_memory_properties(device) };

    let device_name = unsafe {
        CStr::from_ptr(properties.device_name.as_ptr())
            .to_str()
            .unwrap_or("Unknown")
    };

    let family_properties =
        unsafe { instance.get_physical_device_queue_family_properties(device) };
    let capabilities: Vec<(vk::QueueFlags, u32, bool)> = family_properties
        .iter()
        .enumerate()
        .map(|(i, family)| {
            let present = unsafe {
                surface_loader
                    .get_physical_device_surface_support(device, i as u32, surface)
                    .unwrap_or(false)
            };
            (family.queue_flags, family.queue_count, present)
        })
        .collect();
    let queue_families = QueueFamilyIndices::resolve(&capabilities);

    if !queue_families.is_complete() {
        debug!(
            "GPU '{}' skipped: missing queue families (graphics={}, present={}, compute={})",
            device_name,
            queue_families.graphics_family.is_some(),
            queue_families.present_family.is_some(),
            queue_families.compute_family.is_some()
        );
        return None;
    }

    if features.geometry_shader == vk::FALSE {
        debug!("GPU '{}' skipped: geometry shaders not supported", device_name);
        return None;
    }

    let extensions = unsafe {
        instance
            .enumerate_device_extension_properties(device)
            .unwrap_or_default()
    };
    let has_extensions = DEVICE_EXTENSIONS.iter().all(|required| {
        extensions.iter().any(|ext| {
            let name = unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) };
            name == *required
        })
    });
    if !has_extensions {
        debug!("GPU '{}' skipped: swapchain extension missing", device_name);
        return None;
    }

    Some(PhysicalDeviceInfo {
        device,
        properties,
        features,
        memory_properties,
        queue_families,
    })
}

/// Higher scores indicate more desirable devices.
fn rate_device(info: &PhysicalDeviceInfo) -> u32 {
    let mut score = match info.properties.device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 10000,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 1000,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 100,
        vk::PhysicalDeviceType::CPU => 10,
        _ => 1,
    };

    score += info.properties.limits.max_image_dimension2_d;

    let vram_mb = (info.device_local_memory() / (1024 * 1024)) as u32;
    score += vram_mb.min(16000);

    if info.queue_families.compute_family != info.queue_families.graphics_family {
        score += 100;
    }

    score
}

#[cfg(test)]
mod tests {
    use super::*;

    const GRAPHICS: vk::QueueFlags = vk::QueueFlags::from_raw(
        vk::QueueFlags::GRAPHICS.as_raw()
            | vk::QueueFlags::COMPUTE.as_raw()
            | vk::QueueFlags::TRANSFER.as_raw(),
    );

    #[test]
    fn test_queue_family_indices_default() {
        let indices = QueueFamilyIndices::default();
        assert!(!indices.is_complete());
        assert!(indices.unique_families().is_empty());
    }

    #[test]
    fn test_compute_family_is_required() {
        let indices = QueueFamilyIndices {
            graphics_family: Some(0),
            present_family: Some(0),
            compute_family: None,
        };
        assert!(!indices.is_complete());
    }

    #[test]
    fn test_resolve_prefers_dedicated_compute() {
        let families = [
            (GRAPHICS, 16, true),
            (vk::QueueFlags::TRANSFER, 2, false),
            (vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER, 8, false),
        ];
        let indices = QueueFamilyIndices::resolve(&families);
        assert_eq!(indices.graphics_family, Some(0));
        assert_eq!(indices.present_family, Some(0));
        assert_eq!(indices.compute_family, Some(2));
        assert_eq!(indices.unique_families(), vec![0, 2]);
    }

    #[test]
    fn test_resolve_falls_back_to_graphics_compute() {
        let families = [(GRAPHICS, 1, true)];
        let indices = QueueFamilyIndices::resolve(&families);
        assert!(indices.is_complete());
        assert_eq!(indices.compute_family, Some(0));
        assert_eq!(indices.unique_families(), vec![0]);
    }

    #[test]
    fn test_resolve_without_present_is_incomplete() {
        let families = [(GRAPHICS, 1, false)];
        let indices = QueueFamilyIndices::resolve(&families);
        assert!(!indices.is_complete());
    }

    #[test]
    fn test_resolve_skips_empty_families() {
        let families = [
            (GRAPHICS, 0, true),
            (GRAPHICS, 4, true),
        ];
        let indices = QueueFamilyIndices::resolve(&families);
        assert_eq!(indices.graphics_family, Some(1));
        assert_eq!(indices.present_family, Some(1));
        assert_eq!(indices.compute_family, Some(1));
    }
}
