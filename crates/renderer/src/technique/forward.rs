//! Forward renderer: a single subpass shading straight into the present
//! image.

use vbparts_rhi::Bindable;
use vbparts_rhi::command::CommandBuffer;
use vbparts_rhi::descriptor::{BindingDesc, Descriptor};
use vbparts_rhi::image::Image;
use vbparts_rhi::pipeline::{GraphicsPipeline, GraphicsPipelineBuilder};
use vbparts_rhi::render_pass::{AttachmentDesc, RenderPass};
use vbparts_rhi::vk;

use super::scene::{GpuMesh, Material, RACCOON_TEXTURE, SHRIMP_TEXTURE, SceneUniforms};
use super::{FrameInputs, RenderTechnique, SceneOptions, TechniqueKind};
use crate::context::BuildContext;
use crate::error::RendererResult;
use crate::particles::{ParticleSettings, ParticleSystem};

/// Meshes sharing one material, drawn after a single pipeline bind.
pub(super) struct MaterialBatch {
    pub pipeline: GraphicsPipeline,
    pub meshes: Vec<GpuMesh>,
}

impl MaterialBatch {
    pub fn record(&self, cmd: &CommandBuffer, image_index: usize) {
        self.pipeline.bind(cmd, image_index);
        for mesh in &self.meshes {
            mesh.bind(cmd, image_index);
        }
    }
}

/// Builds one batch per material for subpass 0 of `render_pass`.
pub(super) fn material_batches(
    ctx: &BuildContext<'_>,
    technique: TechniqueKind,
    render_pass: vk::RenderPass,
    layout: vk::PipelineLayout,
    outputs: u32,
) -> RendererResult<Vec<MaterialBatch>> {
    Material::ALL
        .iter()
        .map(|&material| -> RendererResult<MaterialBatch> {
            let pipeline = GraphicsPipelineBuilder::new(ctx.shader_dir)
                .vertex_shader("default")
                .fragment_shader(&format!("{}_{}", material.shader(), technique.suffix()))
                .render_pass(render_pass, 0)
                .extent(ctx.extent)
                .depth_write(true)
                .output_attachments(outputs)
                .build(ctx.device.clone(), layout)?;
            Ok(MaterialBatch {
                pipeline,
                meshes: GpuMesh::standard(ctx.device, material)?,
            })
        })
        .collect()
}

pub struct ForwardTechnique {
    render_pass: RenderPass,
    descriptor: Descriptor,
    uniforms: SceneUniforms,
    batches: Vec<MaterialBatch>,
    particles: ParticleSystem,
    depth_view: vk::ImageView,
    _textures: [Image; 2],
}

impl ForwardTechnique {
    /// # Errors
    ///
    /// Returns an error if any resource fails to load or create.
    pub fn new(ctx: &BuildContext<'_>, particle_settings: &ParticleSettings) -> RendererResult<Self> {
        let render_pass = RenderPass::new(
            ctx.device.clone(),
            &[AttachmentDesc::present(ctx.present_format), AttachmentDesc::depth()],
            1,
            ctx.extent,
        )?;

        let uniforms = SceneUniforms::new(ctx)?;
        let shrimp = ctx.load_texture(SHRIMP_TEXTURE)?;
        let raccoon = ctx.load_texture(RACCOON_TEXTURE)?;

        let mut descriptor = Descriptor::new(
            ctx.device.clone(),
            &[
                BindingDesc::ubo_vertex(),
                BindingDesc::sampler_fragment(),
                BindingDesc::ubo_fragment(),
                BindingDesc::sampler_fragment(),
            ],
            vk::PipelineBindPoint::GRAPHICS,
        )?;
        descriptor.create_pipeline_layout()?;
        descriptor.create_descriptor_sets(
            ctx.descriptor_pool,
            ctx.image_count,
            &[uniforms.matrix_binding(), uniforms.light_binding()],
            &[ctx.sampled(&shrimp), ctx.sampled(&raccoon)],
        )?;

        let batches = material_batches(
            ctx,
            TechniqueKind::Forward,
            render_pass.handle(),
            descriptor.pipeline_layout(),
            1,
        )?;
        let particles = ParticleSystem::new(
            ctx,
            particle_settings,
            TechniqueKind::Forward,
            render_pass.handle(),
        )?;

        Ok(Self {
            render_pass,
            descriptor,
            uniforms,
            batches,
            particles,
            depth_view: ctx.depth_view,
            _textures: [shrimp, raccoon],
        })
    }
}

impl RenderTechnique for ForwardTechnique {
    fn kind(&self) -> TechniqueKind {
        TechniqueKind::Forward
    }

    fn render_pass(&self) -> &RenderPass {
        &self.render_pass
    }

    fn framebuffer_views(&self) -> Vec<vk::ImageView> {
        vec![self.depth_view]
    }

    fn per_frame_update(
        &mut self,
        image_index: usize,
        inputs: &FrameInputs,
        options: &SceneOptions,
    ) -> RendererResult<()> {
        self.uniforms
            .update_matrices(image_index, inputs, options)?;
        self.particles
            .update(image_index, inputs.time, inputs.view, inputs.proj)?;
        Ok(())
    }

    fn record_graphics(
        &self,
        cmd: &CommandBuffer,
        framebuffer: vk::Framebuffer,
        image_index: usize,
        options: &SceneOptions,
    ) -> &RenderPass {
        self.render_pass.begin(cmd, framebuffer);
        if !options.particles_only {
            self.descriptor.bind(cmd, image_index);
            for batch in &self.batches {
                batch.record(cmd, image_index);
            }
        }
        self.particles.record_draw(cmd, image_index);
        &self.render_pass
    }

    fn particles(&self) -> &ParticleSystem {
        &self.particles
    }

    fn particles_mut(&mut self) -> &mut ParticleSystem {
        &mut self.particles
    }
}
