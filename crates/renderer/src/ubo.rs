//! Uniform block definitions and the redundant-upload filter.
//!
//! These structures must match the GLSL std140 uniform block layouts exactly.
//! All structures use `#[repr(C)]` for predictable memory layout and implement
//! `Pod` and `Zeroable` for safe byte casting. Trailing padding is explicit
//! so every block is a multiple of 16 bytes.

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3, Vec4};

use vbparts_rhi::RhiResult;
use vbparts_rhi::buffer::UniformBuffer;
use vbparts_rhi::device::Device;
use vbparts_rhi::vk;

/// Matrices and time shared by scene shaders.
///
/// # Memory Layout
///
/// - Offset 0: model matrix (64 bytes)
/// - Offset 64: view matrix (64 bytes)
/// - Offset 128: projection matrix (64 bytes)
/// - Offset 192: time (4 bytes)
/// - Offset 196: padding (12 bytes)
/// - Total size: 208 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct MatrixUbo {
    pub model: Mat4,
    pub view: Mat4,
    pub proj: Mat4,
    /// Seconds since startup, zero while frozen.
    pub time: f32,
    pub _padding: [f32; 3],
}

impl MatrixUbo {
    pub const SIZE: usize = std::mem::size_of::<Self>();

    pub fn new(model: Mat4, view: Mat4, proj: Mat4, time: f32) -> Self {
        Self {
            model,
            view,
            proj,
            time,
            _padding: [0.0; 3],
        }
    }
}

/// Single point light.
///
/// `position.w` holds the radius; the `w` of both colours is unused.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct LightUbo {
    pub position: Vec4,
    pub colour: Vec4,
    pub ambient: Vec4,
}

impl LightUbo {
    pub const SIZE: usize = std::mem::size_of::<Self>();

    pub fn new(position: Vec3, radius: f32, colour: Vec3, ambient: Vec3) -> Self {
        Self {
            position: position.extend(radius),
            colour: colour.extend(1.0),
            ambient: ambient.extend(1.0),
        }
    }
}

impl Default for LightUbo {
    /// The scene light: yellow, radius 20, bluish ambient.
    fn default() -> Self {
        Self::new(
            Vec3::new(2.0, 2.0, 2.0),
            20.0,
            Vec3::new(1.0, 1.0, 0.0),
            Vec3::new(0.1, 0.1, 0.5),
        )
    }
}

/// Selected debug view for the lighting pass.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct DebugUbo {
    pub value: f32,
    pub _padding: [f32; 3],
}

impl DebugUbo {
    pub const SIZE: usize = std::mem::size_of::<Self>();

    pub fn new(view_index: u8) -> Self {
        Self {
            value: f32::from(view_index),
            _padding: [0.0; 3],
        }
    }
}

/// Per-frame particle parameters.
///
/// # Memory Layout
///
/// - Offset 0: view matrix (64 bytes)
/// - Offset 64: projection matrix (64 bytes)
/// - Offset 128: time, half size, density, gravity, upwards force (20 bytes)
/// - Offset 148: particle count (4 bytes)
/// - Offset 152: padding (8 bytes)
/// - Total size: 160 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct ParticleUbo {
    pub view: Mat4,
    pub proj: Mat4,
    pub time: f32,
    /// Half the particle quad size, in view space.
    pub half_size: f32,
    /// How tightly packed the particles are.
    pub density: f32,
    pub gravity: f32,
    pub initial_upwards_force: f32,
    pub particle_count: u32,
    pub _padding: [u32; 2],
}

impl ParticleUbo {
    pub const SIZE: usize = std::mem::size_of::<Self>();
}

/// Decides which per-image copies of a uniform block need rewriting.
///
/// A copy is written when the value differs from the last one seen, or when
/// that image's copy predates the current value. Once every copy holds the
/// current value further updates are skipped, so an unchanged value stops
/// costing uploads after at most one write per copy.
#[derive(Debug, Clone)]
pub struct UploadTracker<T> {
    last: Option<T>,
    current: Vec<bool>,
}

impl<T: Copy + PartialEq> UploadTracker<T> {
    pub fn new(copies: usize) -> Self {
        Self {
            last: None,
            current: vec![false; copies],
        }
    }

    /// Returns `true` if copy `index` must be written with `value`.
    ///
    /// Out-of-range indices always report `true` so the write itself
    /// surfaces the error.
    pub fn should_upload(&mut self, index: usize, value: T) -> bool {
        if self.last != Some(value) {
            self.last = Some(value);
            self.current.fill(false);
        }
        self.current
            .get_mut(index)
            .is_none_or(|fresh| !std::mem::replace(fresh, true))
    }

    /// Number of copies still holding an older value.
    pub fn stale_copies(&self) -> usize {
        self.current.iter().filter(|fresh| !**fresh).count()
    }
}

/// A [`UniformBuffer`] that skips writes of unchanged values.
pub struct TrackedUniform<T: Pod + PartialEq> {
    buffer: UniformBuffer<T>,
    tracker: UploadTracker<T>,
}

impl<T: Pod + PartialEq> TrackedUniform<T> {
    /// Creates `count` copies holding `initial`.
    ///
    /// # Errors
    ///
    /// Returns an error if buffer creation fails.
    pub fn new(device: Arc<Device>, count: usize, initial: T) -> RhiResult<Self> {
        let buffer = UniformBuffer::new(device, count, initial)?;
        let mut tracker = UploadTracker::new(count);
        for index in 0..count {
            tracker.should_upload(index, initial);
        }
        Ok(Self { buffer, tracker })
    }

    /// Writes `value` into copy `index` unless it already holds it.
    ///
    /// Returns whether an upload happened.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails or `index` is out of range.
    pub fn update(&mut self, index: usize, value: &T) -> RhiResult<bool> {
        if !self.tracker.should_upload(index, *value) {
            return Ok(false);
        }
        self.buffer.update(index, value)?;
        Ok(true)
    }

    /// Writes `value` into every copy.
    ///
    /// # Errors
    ///
    /// Returns an error if any write fails.
    pub fn update_all(&mut self, value: &T) -> RhiResult<()> {
        self.buffer.update_all(value)?;
        for index in 0..self.buffer.len() {
            self.tracker.should_upload(index, *value);
        }
        Ok(())
    }

    /// Buffer handles in image order, for descriptor writes.
    pub fn handles(&self) -> Vec<vk::Buffer> {
        self.buffer.buffers().map(|buffer| buffer.handle()).collect()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Descriptor range covering one copy.
    pub const fn range() -> vk::DeviceSize {
        std::mem::size_of::<T>() as vk::DeviceSize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_sizes() {
        assert_eq!(MatrixUbo::SIZE, 208);
        assert_eq!(LightUbo::SIZE, 48);
        assert_eq!(DebugUbo::SIZE, 16);
        assert_eq!(ParticleUbo::SIZE, 160);
    }

    #[test]
    fn test_blocks_are_std140_multiples() {
        for size in [
            MatrixUbo::SIZE,
            LightUbo::SIZE,
            DebugUbo::SIZE,
            ParticleUbo::SIZE,
        ] {
            assert_eq!(size % 16, 0);
        }
    }

    #[test]
    fn test_particle_count_offset() {
        let ubo = ParticleUbo {
            particle_count: 0xABCD,
            ..Default::default()
        };
        let bytes = bytemuck::bytes_of(&ubo);
        assert_eq!(&bytes[148..152], &0xABCDu32.to_ne_bytes());
    }

    #[test]
    fn test_default_light() {
        let light = LightUbo::default();
        assert_eq!(light.position, Vec4::new(2.0, 2.0, 2.0, 20.0));
        assert_eq!(light.colour, Vec4::new(1.0, 1.0, 0.0, 1.0));
        assert_eq!(light.ambient, Vec4::new(0.1, 0.1, 0.5, 1.0));
    }

    #[test]
    fn test_debug_view_value() {
        assert_eq!(DebugUbo::new(3).value, 3.0);
    }

    #[test]
    fn test_unchanged_value_uploads_once_per_copy() {
        let mut tracker = UploadTracker::new(3);
        let value = (1.0_f32, Mat4::IDENTITY);

        assert!(tracker.should_upload(0, value));
        assert!(!tracker.should_upload(0, value));
        assert!(tracker.should_upload(1, value));
        assert!(tracker.should_upload(2, value));
        assert_eq!(tracker.stale_copies(), 0);

        for index in [0, 1, 2, 0, 1, 2] {
            assert!(!tracker.should_upload(index, value));
        }
    }

    #[test]
    fn test_change_marks_every_copy_stale() {
        let mut tracker = UploadTracker::new(3);
        for index in 0..3 {
            tracker.should_upload(index, 1.0_f32);
        }

        assert!(tracker.should_upload(1, 2.0));
        assert_eq!(tracker.stale_copies(), 2);
        assert!(tracker.should_upload(0, 2.0));
        assert!(tracker.should_upload(2, 2.0));
        assert!(!tracker.should_upload(1, 2.0));
    }

    #[test]
    fn test_out_of_range_index_reports_upload() {
        let mut tracker = UploadTracker::new(1);
        assert!(tracker.should_upload(5, 0u32));
    }
}
