//! Particle subsystem.
//!
//! A [`ParticleSystem`] is one of four generation strategies, chosen by
//! [`GenerationMode`] when it is built. Every strategy exposes the same
//! per-frame protocol:
//!
//! 1. [`ParticleSystem::update`] uploads the uniform block when it changed
//! 2. [`ParticleSystem::record_draw`] binds and issues a single draw
//! 3. [`ParticleSystem::record_compute`] records the dispatch, compute mode only
//!
//! Changing mode or count means dropping the system and building a new
//! one; nothing is mutated in place.

mod protocol;
pub mod settings;

pub use protocol::{
    COMPUTE_WORKGROUP_SIZE, DrawProtocol, GEOMETRY_PARTICLES_PER_INVOCATION, StrategyShape,
    VERTICES_PER_PARTICLE, fragment_shader, output_attachments, particle_texture,
};
pub use settings::{GenerationMode, ParticleSettings};

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec4};
use tracing::info;

use vbparts_rhi::Bindable;
use vbparts_rhi::buffer::{Buffer, BufferUsage};
use vbparts_rhi::command::CommandBuffer;
use vbparts_rhi::descriptor::{BindingDesc, BufferBinding, Descriptor, ImageBinding};
use vbparts_rhi::image::Image;
use vbparts_rhi::ownership::BufferOwnership;
use vbparts_rhi::pipeline::{ComputePipeline, GraphicsPipeline, GraphicsPipelineBuilder};
use vbparts_rhi::vertex::PointVertex;
use vbparts_rhi::vk;

use crate::context::BuildContext;
use crate::error::RendererResult;
use crate::technique::TechniqueKind;
use crate::ubo::{ParticleUbo, TrackedUniform};

/// One quad corner written by `particles.comp`.
///
/// Read back as a standard vertex: position and normal x in the first
/// vector, normal yz and uv in the second.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct ParticleRecord {
    pub position_nx: Vec4,
    pub nyz_uv: Vec4,
}

impl ParticleRecord {
    pub const SIZE: vk::DeviceSize = std::mem::size_of::<Self>() as vk::DeviceSize;
}

/// Compute pass state, present only in compute mode.
struct ComputeStage {
    pipeline: ComputePipeline,
    descriptor: Descriptor,
    /// Written by the dispatch, then bound as the vertex buffer
    storage: Buffer,
    ownership: BufferOwnership,
    dispatch_groups: u32,
}

/// What the draw binds at vertex binding 0.
enum VertexSource {
    /// Single unused vertex; the draw still needs a bound vertex buffer
    Placeholder(Buffer),
    Compute(ComputeStage),
}

/// The active particle strategy and its GPU objects.
pub struct ParticleSystem {
    mode: GenerationMode,
    protocol: DrawProtocol,
    pipeline: GraphicsPipeline,
    descriptor: Descriptor,
    source: VertexSource,
    uniform: TrackedUniform<ParticleUbo>,
    ubo: ParticleUbo,
    _texture: Option<Image>,
}

impl ParticleSystem {
    /// Builds the strategy selected by `settings.mode()` for subpass 0 of
    /// `render_pass`.
    ///
    /// # Errors
    ///
    /// Returns an error if a shader or texture is missing or any GPU object
    /// creation fails.
    pub fn new(
        ctx: &BuildContext<'_>,
        settings: &ParticleSettings,
        technique: TechniqueKind,
        render_pass: vk::RenderPass,
    ) -> RendererResult<Self> {
        let mode = settings.mode();
        let protocol = DrawProtocol::new(mode, settings.count());
        let shape = StrategyShape::new(mode);
        info!(
            "Creating {} particles: count {}, {} vertices per draw",
            mode.name(),
            settings.count(),
            protocol.vertex_count
        );

        let ubo = ParticleUbo {
            view: Mat4::IDENTITY,
            proj: Mat4::IDENTITY,
            time: 0.0,
            half_size: settings.half_size,
            density: settings.density,
            gravity: settings.gravity,
            initial_upwards_force: settings.initial_upwards_force,
            particle_count: settings.count(),
            _padding: [0; 2],
        };

        // Compute mode has a single dispatch reading one uniform copy
        let copies = if mode == GenerationMode::Compute {
            1
        } else {
            ctx.image_count
        };
        let uniform = TrackedUniform::new(ctx.device.clone(), copies, ubo)?;

        let texture = particle_texture(technique, settings.complexity(), settings.cutout())
            .map(|name| ctx.load_texture(name))
            .transpose()?;

        let mut bindings: Vec<BindingDesc> = shape.uniform_binding.into_iter().collect();
        let mut buffers = Vec::new();
        if shape.uniform_binding.is_some() {
            buffers.push(BufferBinding::per_image(
                uniform.handles(),
                TrackedUniform::<ParticleUbo>::range(),
            ));
        }
        let mut images: Vec<ImageBinding> = Vec::new();
        if let Some(texture) = texture.as_ref() {
            bindings.push(BindingDesc::sampler_fragment());
            images.push(ctx.sampled(texture));
        }

        let mut descriptor =
            Descriptor::new(ctx.device.clone(), &bindings, vk::PipelineBindPoint::GRAPHICS)?;
        descriptor.create_pipeline_layout()?;
        descriptor.create_descriptor_sets(
            ctx.descriptor_pool,
            ctx.image_count,
            &buffers,
            &images,
        )?;

        let mut builder = GraphicsPipelineBuilder::new(ctx.shader_dir)
            .vertex_shader(shape.vertex_shader)
            .fragment_shader(&fragment_shader(technique, mode))
            .vertex_layout(shape.vertex_layout)
            .topology(shape.topology)
            .render_pass(render_pass, 0)
            .extent(ctx.extent)
            .depth_write(true)
            .output_attachments(output_attachments(technique));
        if let Some(geometry) = shape.geometry_shader {
            builder = builder.geometry_shader(geometry);
        }
        let pipeline = builder.build(ctx.device.clone(), descriptor.pipeline_layout())?;

        let source = match protocol.dispatch_groups {
            Some(dispatch_groups) => {
                VertexSource::Compute(Self::compute_stage(ctx, &uniform, protocol, dispatch_groups)?)
            }
            None => VertexSource::Placeholder(Buffer::new_with_data(
                ctx.device.clone(),
                BufferUsage::Vertex,
                bytemuck::bytes_of(&PointVertex::default()),
            )?),
        };

        Ok(Self {
            mode,
            protocol,
            pipeline,
            descriptor,
            source,
            uniform,
            ubo,
            _texture: texture,
        })
    }

    fn compute_stage(
        ctx: &BuildContext<'_>,
        uniform: &TrackedUniform<ParticleUbo>,
        protocol: DrawProtocol,
        dispatch_groups: u32,
    ) -> RendererResult<ComputeStage> {
        let storage_size = vk::DeviceSize::from(protocol.storage_records()) * ParticleRecord::SIZE;
        let storage = Buffer::new(ctx.device.clone(), BufferUsage::ParticleStorage, storage_size)?;

        let mut descriptor = Descriptor::new(
            ctx.device.clone(),
            &[BindingDesc::ubo_compute(), BindingDesc::storage_compute()],
            vk::PipelineBindPoint::COMPUTE,
        )?;
        descriptor.create_pipeline_layout()?;
        descriptor.create_descriptor_sets(
            ctx.descriptor_pool,
            1,
            &[
                BufferBinding::per_image(uniform.handles(), TrackedUniform::<ParticleUbo>::range()),
                BufferBinding::shared(storage.handle(), storage_size),
            ],
            &[],
        )?;

        let pipeline = ComputePipeline::new(
            ctx.device.clone(),
            ctx.shader_dir,
            "particles",
            descriptor.pipeline_layout(),
        )?;

        Ok(ComputeStage {
            pipeline,
            descriptor,
            storage,
            ownership: BufferOwnership::new(
                ctx.device.graphics_family(),
                ctx.device.compute_family(),
            ),
            dispatch_groups,
        })
    }

    #[inline]
    pub fn mode(&self) -> GenerationMode {
        self.mode
    }

    #[inline]
    pub fn protocol(&self) -> DrawProtocol {
        self.protocol
    }

    #[inline]
    pub fn has_compute(&self) -> bool {
        matches!(self.source, VertexSource::Compute(_))
    }

    /// Applies size, spread and force changes from `settings`.
    ///
    /// Takes effect on the next [`ParticleSystem::update`].
    pub fn apply_settings(&mut self, settings: &ParticleSettings) {
        self.ubo.half_size = settings.half_size;
        self.ubo.density = settings.density;
        self.ubo.gravity = settings.gravity;
        self.ubo.initial_upwards_force = settings.initial_upwards_force;
    }

    /// Uploads the uniform block for `image_index` if it changed.
    ///
    /// Returns whether an upload happened.
    ///
    /// # Errors
    ///
    /// Returns an error if the upload fails.
    pub fn update(
        &mut self,
        image_index: usize,
        time: f32,
        view: Mat4,
        proj: Mat4,
    ) -> RendererResult<bool> {
        self.ubo.time = time;
        self.ubo.view = view;
        self.ubo.proj = proj;

        let copy = if self.has_compute() { 0 } else { image_index };
        Ok(self.uniform.update(copy, &self.ubo)?)
    }

    /// Records the particle draw into subpass 0 of the open render pass.
    pub fn record_draw(&self, cmd: &CommandBuffer, image_index: usize) {
        self.descriptor.bind(cmd, image_index);
        self.pipeline.bind(cmd, image_index);

        let vertex_buffer = match &self.source {
            VertexSource::Placeholder(buffer) => buffer.handle(),
            VertexSource::Compute(stage) => stage.storage.handle(),
        };
        cmd.bind_vertex_buffers(0, &[vertex_buffer], &[0]);
        cmd.draw(self.protocol.vertex_count, 1, 0, 0);
    }

    /// Records the dispatch bracketed by the ownership transfers of the
    /// storage buffer. Does nothing outside compute mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage buffer is not owned by graphics.
    pub fn record_compute(&mut self, cmd: &CommandBuffer) -> RendererResult<()> {
        let VertexSource::Compute(stage) = &mut self.source else {
            return Ok(());
        };

        let ComputeStage {
            pipeline,
            descriptor,
            storage,
            ownership,
            dispatch_groups,
        } = stage;
        ownership.with_compute_ownership(cmd, storage.handle(), |cmd| {
            descriptor.bind(cmd, 0);
            pipeline.bind(cmd, 0);
            cmd.dispatch(*dispatch_groups, 1, 1);
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vbparts_rhi::vertex::VertexLayout;

    #[test]
    fn test_record_matches_standard_vertex() {
        assert_eq!(ParticleRecord::SIZE, 32);
        assert_eq!(
            ParticleRecord::SIZE as u32,
            VertexLayout::Standard.stride()
        );
    }

    #[test]
    fn test_storage_sized_for_six_corners() {
        let protocol = DrawProtocol::new(GenerationMode::Compute, 1000);
        let size = vk::DeviceSize::from(protocol.storage_records()) * ParticleRecord::SIZE;
        assert_eq!(size, 1000 * 6 * 32);
    }
}
