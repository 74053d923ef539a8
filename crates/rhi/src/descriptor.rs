//! Resource binding tables.
//!
//! # Overview
//!
//! A [`Descriptor`] is built from an ordered list of [`BindingDesc`] values.
//! Binding `i` in the shader is entry `i` of that list. Resources are supplied
//! later, in two separate lists:
//!
//! - buffers ([`BufferBinding`]) for the uniform and storage bindings, in
//!   their relative declaration order
//! - images ([`ImageBinding`]) for the sampler and input-attachment bindings,
//!   in their relative declaration order
//!
//! [`plan_writes`] walks the declaration list with one cursor per resource
//! list and pairs every binding with its resource. One descriptor set is
//! allocated and written per swapchain image.
//!
//! # Example
//!
//! ```no_run
//! # fn demo(
//! #     device: std::sync::Arc<vbparts_rhi::device::Device>,
//! #     pool: &vbparts_rhi::descriptor::DescriptorPool,
//! #     matrices: &[ash::vk::Buffer],
//! #     albedo: ash::vk::ImageView,
//! # ) -> vbparts_rhi::RhiResult<()> {
//! use ash::vk;
//! use vbparts_rhi::descriptor::{BindingDesc, BufferBinding, Descriptor, ImageBinding};
//!
//! let mut descriptor = Descriptor::new(
//!     device,
//!     &[BindingDesc::input_attachment_fragment(), BindingDesc::ubo_fragment()],
//!     vk::PipelineBindPoint::GRAPHICS,
//! )?;
//! descriptor.create_pipeline_layout()?;
//! descriptor.create_descriptor_sets(
//!     pool,
//!     matrices.len(),
//!     &[BufferBinding::per_image(matrices.to_vec(), 144)],
//!     &[ImageBinding::input_attachment(albedo)],
//! )?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::bindable::Bindable;
use crate::command::CommandBuffer;
use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Resource kinds a binding table may hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingKind {
    UniformBuffer,
    StorageBuffer,
    CombinedImageSampler,
    InputAttachment,
}

impl BindingKind {
    pub fn descriptor_type(self) -> vk::DescriptorType {
        match self {
            Self::UniformBuffer => vk::DescriptorType::UNIFORM_BUFFER,
            Self::StorageBuffer => vk::DescriptorType::STORAGE_BUFFER,
            Self::CombinedImageSampler => vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            Self::InputAttachment => vk::DescriptorType::INPUT_ATTACHMENT,
        }
    }

    /// Whether the binding takes a buffer rather than an image.
    #[inline]
    pub fn is_buffer(self) -> bool {
        matches!(self, Self::UniformBuffer | Self::StorageBuffer)
    }
}

impl TryFrom<vk::DescriptorType> for BindingKind {
    type Error = RhiError;

    fn try_from(ty: vk::DescriptorType) -> Result<Self, Self::Error> {
        match ty {
            vk::DescriptorType::UNIFORM_BUFFER => Ok(Self::UniformBuffer),
            vk::DescriptorType::STORAGE_BUFFER => Ok(Self::StorageBuffer),
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER => Ok(Self::CombinedImageSampler),
            vk::DescriptorType::INPUT_ATTACHMENT => Ok(Self::InputAttachment),
            other => Err(RhiError::DescriptorError(format!(
                "Unsupported descriptor type: {other:?}"
            ))),
        }
    }
}

/// One entry of a binding declaration: what it holds and who reads it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindingDesc {
    pub kind: BindingKind,
    pub stages: vk::ShaderStageFlags,
}

impl BindingDesc {
    pub const fn new(kind: BindingKind, stages: vk::ShaderStageFlags) -> Self {
        Self { kind, stages }
    }

    pub const fn ubo_vertex() -> Self {
        Self::new(BindingKind::UniformBuffer, vk::ShaderStageFlags::VERTEX)
    }

    pub const fn ubo_fragment() -> Self {
        Self::new(BindingKind::UniformBuffer, vk::ShaderStageFlags::FRAGMENT)
    }

    pub const fn ubo_geometry() -> Self {
        Self::new(BindingKind::UniformBuffer, vk::ShaderStageFlags::GEOMETRY)
    }

    pub const fn ubo_compute() -> Self {
        Self::new(BindingKind::UniformBuffer, vk::ShaderStageFlags::COMPUTE)
    }

    pub const fn storage_compute() -> Self {
        Self::new(BindingKind::StorageBuffer, vk::ShaderStageFlags::COMPUTE)
    }

    pub const fn sampler_fragment() -> Self {
        Self::new(
            BindingKind::CombinedImageSampler,
            vk::ShaderStageFlags::FRAGMENT,
        )
    }

    pub const fn input_attachment_fragment() -> Self {
        Self::new(BindingKind::InputAttachment, vk::ShaderStageFlags::FRAGMENT)
    }

    fn layout_binding(&self, binding: u32) -> vk::DescriptorSetLayoutBinding<'static> {
        vk::DescriptorSetLayoutBinding::default()
            .binding(binding)
            .descriptor_type(self.kind.descriptor_type())
            .descriptor_count(1)
            .stage_flags(self.stages)
    }
}

/// Buffers backing one buffer binding.
///
/// Either one buffer per swapchain image, or a single buffer shared by every
/// image (the compute storage buffer).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferBinding {
    buffers: Vec<vk::Buffer>,
    range: vk::DeviceSize,
}

impl BufferBinding {
    pub fn per_image(buffers: Vec<vk::Buffer>, range: vk::DeviceSize) -> Self {
        Self { buffers, range }
    }

    pub fn shared(buffer: vk::Buffer, range: vk::DeviceSize) -> Self {
        Self {
            buffers: vec![buffer],
            range,
        }
    }

    /// Buffer info for swapchain image `image_index`.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::DescriptorError`] if a per-image binding has no
    /// buffer for that image.
    pub fn info(&self, image_index: usize) -> RhiResult<vk::DescriptorBufferInfo> {
        let buffer = match self.buffers.as_slice() {
            [single] => *single,
            many => *many.get(image_index).ok_or_else(|| {
                RhiError::DescriptorError(format!(
                    "no buffer for image {image_index} ({} supplied)",
                    many.len()
                ))
            })?,
        };
        Ok(vk::DescriptorBufferInfo {
            buffer,
            offset: 0,
            range: self.range,
        })
    }
}

/// An image view, plus a sampler when sampled from a shader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageBinding {
    pub view: vk::ImageView,
    pub sampler: vk::Sampler,
    pub layout: vk::ImageLayout,
}

impl ImageBinding {
    /// Read with `subpassLoad`, so no sampler is needed.
    pub fn input_attachment(view: vk::ImageView) -> Self {
        Self {
            view,
            sampler: vk::Sampler::null(),
            layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        }
    }

    pub fn sampled(view: vk::ImageView, sampler: vk::Sampler) -> Self {
        Self {
            view,
            sampler,
            layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        }
    }

    fn info(&self) -> vk::DescriptorImageInfo {
        vk::DescriptorImageInfo {
            sampler: self.sampler,
            image_view: self.view,
            image_layout: self.layout,
        }
    }
}

/// Which supplied resource a binding is written from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteSource {
    Buffer(usize),
    Image(usize),
}

/// One descriptor write, resolved against the supplied resource lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedWrite {
    pub binding: u32,
    pub kind: BindingKind,
    pub source: WriteSource,
}

/// Pairs every binding with a resource index using one cursor per list.
///
/// # Errors
///
/// Returns [`RhiError::DescriptorError`] unless the bindings consume exactly
/// `buffer_count` buffers and `image_count` images.
pub fn plan_writes(
    bindings: &[BindingDesc],
    buffer_count: usize,
    image_count: usize,
) -> RhiResult<Vec<PlannedWrite>> {
    let mut next_buffer = 0;
    let mut next_image = 0;

    let writes: Vec<PlannedWrite> = bindings
        .iter()
        .enumerate()
        .map(|(binding, desc)| {
            let source = if desc.kind.is_buffer() {
                next_buffer += 1;
                WriteSource::Buffer(next_buffer - 1)
            } else {
                next_image += 1;
                WriteSource::Image(next_image - 1)
            };
            PlannedWrite {
                binding: binding as u32,
                kind: desc.kind,
                source,
            }
        })
        .collect();

    if next_buffer != buffer_count || next_image != image_count {
        return Err(RhiError::DescriptorError(format!(
            "bindings need {next_buffer} buffer(s) and {next_image} image(s), \
             got {buffer_count} and {image_count}"
        )));
    }

    Ok(writes)
}

/// Descriptor pool for allocating descriptor sets.
///
/// Recreated together with the swapchain, which releases every set at once.
pub struct DescriptorPool {
    device: Arc<Device>,
    pool: vk::DescriptorPool,
    max_sets: u32,
}

impl DescriptorPool {
    /// Creates a pool with explicit sizes.
    ///
    /// # Errors
    ///
    /// Returns an error if pool creation fails.
    pub fn new(
        device: Arc<Device>,
        max_sets: u32,
        pool_sizes: &[vk::DescriptorPoolSize],
    ) -> RhiResult<Self> {
        let create_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(max_sets)
            .pool_sizes(pool_sizes);

        let pool = unsafe { device.handle().create_descriptor_pool(&create_info, None)? };

        debug!(
            "Created descriptor pool: max_sets={}, pool_sizes={}",
            max_sets,
            pool_sizes.len()
        );

        Ok(Self {
            device,
            pool,
            max_sets,
        })
    }

    /// Pool sized for every technique plus particles and the overlay.
    ///
    /// # Errors
    ///
    /// Returns an error if pool creation fails.
    pub fn for_renderer(device: Arc<Device>) -> RhiResult<Self> {
        let sizes = renderer_pool_sizes();
        Self::new(device, sizes.len() as u32 * 1000, &sizes)
    }

    /// Allocates one set per entry of `layouts`.
    ///
    /// # Errors
    ///
    /// Returns an error if allocation fails (e.g., pool exhausted).
    pub fn allocate(
        &self,
        layouts: &[vk::DescriptorSetLayout],
    ) -> RhiResult<Vec<vk::DescriptorSet>> {
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.pool)
            .set_layouts(layouts);

        let sets = unsafe { self.device.handle().allocate_descriptor_sets(&alloc_info)? };

        debug!("Allocated {} descriptor set(s)", sets.len());

        Ok(sets)
    }

    #[inline]
    pub fn handle(&self) -> vk::DescriptorPool {
        self.pool
    }

    #[inline]
    pub fn max_sets(&self) -> u32 {
        self.max_sets
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_descriptor_pool(self.pool, None);
        }
        debug!("Destroyed descriptor pool");
    }
}

fn renderer_pool_sizes() -> [vk::DescriptorPoolSize; 4] {
    [
        vk::DescriptorPoolSize {
            ty: vk::DescriptorType::UNIFORM_BUFFER,
            descriptor_count: 100,
        },
        vk::DescriptorPoolSize {
            ty: vk::DescriptorType::STORAGE_BUFFER,
            descriptor_count: 25,
        },
        vk::DescriptorPoolSize {
            ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            descriptor_count: 20,
        },
        vk::DescriptorPoolSize {
            ty: vk::DescriptorType::INPUT_ATTACHMENT,
            descriptor_count: 20,
        },
    ]
}

/// Set layout, pipeline layout and per-image descriptor sets for one
/// pipeline (or subpass).
pub struct Descriptor {
    device: Arc<Device>,
    set_layout: vk::DescriptorSetLayout,
    pipeline_layout: vk::PipelineLayout,
    bindings: Vec<BindingDesc>,
    sets: Vec<vk::DescriptorSet>,
    bind_point: vk::PipelineBindPoint,
}

impl Descriptor {
    /// Creates the descriptor set layout; binding `i` is `bindings[i]`.
    ///
    /// # Errors
    ///
    /// Returns an error if layout creation fails.
    pub fn new(
        device: Arc<Device>,
        bindings: &[BindingDesc],
        bind_point: vk::PipelineBindPoint,
    ) -> RhiResult<Self> {
        let layout_bindings: Vec<vk::DescriptorSetLayoutBinding> = bindings
            .iter()
            .enumerate()
            .map(|(i, desc)| desc.layout_binding(i as u32))
            .collect();

        let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&layout_bindings);
        let set_layout = unsafe {
            device
                .handle()
                .create_descriptor_set_layout(&create_info, None)?
        };

        debug!(
            "Created descriptor set layout with {} binding(s)",
            bindings.len()
        );

        Ok(Self {
            device,
            set_layout,
            pipeline_layout: vk::PipelineLayout::null(),
            bindings: bindings.to_vec(),
            sets: Vec::new(),
            bind_point,
        })
    }

    /// (Re)creates the pipeline layout, destroying the previous one.
    ///
    /// # Errors
    ///
    /// Returns an error if layout creation fails.
    pub fn create_pipeline_layout(&mut self) -> RhiResult<()> {
        self.destroy_pipeline_layout();

        let set_layouts = [self.set_layout];
        let create_info = vk::PipelineLayoutCreateInfo::default().set_layouts(&set_layouts);
        self.pipeline_layout = unsafe {
            self.device
                .handle()
                .create_pipeline_layout(&create_info, None)?
        };

        debug!("Created pipeline layout");
        Ok(())
    }

    /// Allocates and writes `image_count` descriptor sets from `pool`.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::DescriptorError`] if the supplied resources do not
    /// match the bindings, or a Vulkan error if allocation fails.
    pub fn create_descriptor_sets(
        &mut self,
        pool: &DescriptorPool,
        image_count: usize,
        buffers: &[BufferBinding],
        images: &[ImageBinding],
    ) -> RhiResult<()> {
        let plan = plan_writes(&self.bindings, buffers.len(), images.len())?;

        let layouts = vec![self.set_layout; image_count];
        let sets = pool.allocate(&layouts)?;

        let image_infos: Vec<[vk::DescriptorImageInfo; 1]> =
            images.iter().map(|image| [image.info()]).collect();

        for (image_index, &set) in sets.iter().enumerate() {
            let buffer_infos = buffers
                .iter()
                .map(|binding| binding.info(image_index).map(|info| [info]))
                .collect::<RhiResult<Vec<_>>>()?;

            let writes: Vec<vk::WriteDescriptorSet> = plan
                .iter()
                .map(|planned| {
                    let write = vk::WriteDescriptorSet::default()
                        .dst_set(set)
                        .dst_binding(planned.binding)
                        .dst_array_element(0)
                        .descriptor_type(planned.kind.descriptor_type());
                    match planned.source {
                        WriteSource::Buffer(i) => write.buffer_info(&buffer_infos[i]),
                        WriteSource::Image(i) => write.image_info(&image_infos[i]),
                    }
                })
                .collect();

            unsafe {
                self.device.handle().update_descriptor_sets(&writes, &[]);
            }
        }

        debug!(
            "Wrote {} descriptor set(s) with {} binding(s) each",
            sets.len(),
            plan.len()
        );
        self.sets = sets;
        Ok(())
    }

    #[inline]
    pub fn set_layout(&self) -> vk::DescriptorSetLayout {
        self.set_layout
    }

    /// Null until [`Descriptor::create_pipeline_layout`] has been called.
    #[inline]
    pub fn pipeline_layout(&self) -> vk::PipelineLayout {
        self.pipeline_layout
    }

    #[inline]
    pub fn bindings(&self) -> &[BindingDesc] {
        &self.bindings
    }

    #[inline]
    pub fn sets(&self) -> &[vk::DescriptorSet] {
        &self.sets
    }

    fn destroy_pipeline_layout(&mut self) {
        if self.pipeline_layout != vk::PipelineLayout::null() {
            unsafe {
                self.device
                    .handle()
                    .destroy_pipeline_layout(self.pipeline_layout, None);
            }
            self.pipeline_layout = vk::PipelineLayout::null();
        }
    }
}

impl Bindable for Descriptor {
    fn bind(&self, cmd: &CommandBuffer, image_index: usize) {
        if let Some(&set) = self.sets.get(image_index) {
            cmd.bind_descriptor_sets(self.bind_point, self.pipeline_layout, 0, &[set]);
        }
    }
}

impl Drop for Descriptor {
    fn drop(&mut self) {
        self.destroy_pipeline_layout();
        unsafe {
            self.device
                .handle()
                .destroy_descriptor_set_layout(self.set_layout, None);
        }
        debug!("Destroyed descriptor set layout");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binding_order_is_declaration_order() {
        let bindings = [
            BindingDesc::input_attachment_fragment(),
            BindingDesc::ubo_fragment(),
            BindingDesc::ubo_fragment(),
            BindingDesc::sampler_fragment(),
            BindingDesc::ubo_fragment(),
        ];
        let plan = plan_writes(&bindings, 3, 2).unwrap();

        let numbers: Vec<u32> = plan.iter().map(|w| w.binding).collect();
        assert_eq!(numbers, vec![0, 1, 2, 3, 4]);

        let sources: Vec<WriteSource> = plan.iter().map(|w| w.source).collect();
        assert_eq!(
            sources,
            vec![
                WriteSource::Image(0),
                WriteSource::Buffer(0),
                WriteSource::Buffer(1),
                WriteSource::Image(1),
                WriteSource::Buffer(2),
            ]
        );
    }

    #[test]
    fn test_plan_rejects_missing_resources() {
        let bindings = [BindingDesc::ubo_vertex(), BindingDesc::sampler_fragment()];
        assert!(matches!(
            plan_writes(&bindings, 1, 0),
            Err(RhiError::DescriptorError(_))
        ));
        assert!(matches!(
            plan_writes(&bindings, 2, 1),
            Err(RhiError::DescriptorError(_))
        ));
    }

    #[test]
    fn test_empty_bindings() {
        assert!(plan_writes(&[], 0, 0).unwrap().is_empty());
    }

    #[test]
    fn test_unsupported_kind_rejected() {
        assert!(matches!(
            BindingKind::try_from(vk::DescriptorType::STORAGE_IMAGE),
            Err(RhiError::DescriptorError(_))
        ));
        assert_eq!(
            BindingKind::try_from(vk::DescriptorType::INPUT_ATTACHMENT).unwrap(),
            BindingKind::InputAttachment
        );
    }

    #[test]
    fn test_layout_binding() {
        let binding = BindingDesc::storage_compute().layout_binding(1);
        assert_eq!(binding.binding, 1);
        assert_eq!(binding.descriptor_type, vk::DescriptorType::STORAGE_BUFFER);
        assert_eq!(binding.descriptor_count, 1);
        assert_eq!(binding.stage_flags, vk::ShaderStageFlags::COMPUTE);
    }

    #[test]
    fn test_shared_buffer_serves_every_image() {
        let binding = BufferBinding::shared(vk::Buffer::null(), 32);
        for i in 0..3 {
            let info = binding.info(i).unwrap();
            assert_eq!(info.range, 32);
            assert_eq!(info.offset, 0);
        }
    }

    #[test]
    fn test_per_image_buffer_out_of_range() {
        let binding = BufferBinding::per_image(vec![vk::Buffer::null(); 2], 64);
        assert!(binding.info(1).is_ok());
        assert!(matches!(
            binding.info(2),
            Err(RhiError::DescriptorError(_))
        ));
    }

    #[test]
    fn test_input_attachment_has_no_sampler() {
        let image = ImageBinding::input_attachment(vk::ImageView::null());
        assert_eq!(image.sampler, vk::Sampler::null());
        assert_eq!(image.layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
    }

    #[test]
    fn test_renderer_pool_sizes() {
        let sizes = renderer_pool_sizes();
        let counts: Vec<u32> = sizes.iter().map(|s| s.descriptor_count).collect();
        assert_eq!(counts, vec![100, 25, 20, 20]);
    }
}
