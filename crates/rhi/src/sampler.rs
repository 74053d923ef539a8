//! Texture sampler shared by every sampled image.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::RhiResult;

/// Upper bound on requested anisotropy, further clamped by the device limit.
pub const MAX_ANISOTROPY: f32 = 16.0;

/// Linear filtering, repeat addressing, single mip level.
pub struct Sampler {
    device: Arc<Device>,
    sampler: vk::Sampler,
}

impl Sampler {
    /// # Errors
    ///
    /// Returns an error if sampler creation fails.
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let create_info = sampler_create_info(device.max_sampler_anisotropy());
        let sampler = unsafe { device.handle().create_sampler(&create_info, None)? };

        debug!(
            "Created sampler (anisotropy {})",
            create_info.max_anisotropy
        );

        Ok(Self { device, sampler })
    }

    #[inline]
    pub fn handle(&self) -> vk::Sampler {
        self.sampler
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_sampler(self.sampler, None);
        }
        debug!("Destroyed sampler");
    }
}

/// Anisotropy is disabled when the device reports no support (limit <= 1).
pub fn sampler_create_info(device_max_anisotropy: f32) -> vk::SamplerCreateInfo<'static> {
    let anisotropy = MAX_ANISOTROPY.min(device_max_anisotropy);
    vk::SamplerCreateInfo::default()
        .mag_filter(vk::Filter::LINEAR)
        .min_filter(vk::Filter::LINEAR)
        .address_mode_u(vk::SamplerAddressMode::REPEAT)
        .address_mode_v(vk::SamplerAddressMode::REPEAT)
        .address_mode_w(vk::SamplerAddressMode::REPEAT)
        .anisotropy_enable(anisotropy > 1.0)
        .max_anisotropy(anisotropy.max(1.0))
        .unnormalized_coordinates(false)
        .compare_enable(false)
        .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
        .mip_lod_bias(0.0)
        .min_lod(0.0)
        .max_lod(0.0)
}
