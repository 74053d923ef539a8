//! Visibility buffer.
//!
//! Subpass 0 rasterises triangle and material ids plus barycentric uv into
//! a single half-float target. Subpass 1 looks each pixel's triangle up in
//! the vertex table, rebuilds the surface attributes and shades them.

use vbparts_resources::VertexTable;
use vbparts_rhi::Bindable;
use vbparts_rhi::buffer::UniformBuffer;
use vbparts_rhi::command::CommandBuffer;
use vbparts_rhi::descriptor::{BindingDesc, BufferBinding, Descriptor, ImageBinding};
use vbparts_rhi::image::Image;
use vbparts_rhi::pipeline::{GraphicsPipeline, GraphicsPipelineBuilder};
use vbparts_rhi::render_pass::{AttachmentDesc, RenderPass};
use vbparts_rhi::vertex::VertexLayout;
use vbparts_rhi::vk;

use super::scene::{
    self, GpuMesh, LEAF_TEXTURE, RACCOON_TEXTURE, SHRIMP_TEXTURE, SceneUniforms,
};
use super::{FrameInputs, RenderTechnique, SceneOptions, TechniqueKind};
use crate::context::BuildContext;
use crate::error::RendererResult;
use crate::particles::{ParticleSettings, ParticleSystem};

/// Lighting pass bindings, in shader binding order.
pub const LIGHTING_BINDINGS: [BindingDesc; 8] = [
    BindingDesc::input_attachment_fragment(),
    // Light
    BindingDesc::ubo_fragment(),
    // Matrices
    BindingDesc::ubo_fragment(),
    // Vertex table
    BindingDesc::ubo_fragment(),
    BindingDesc::sampler_fragment(),
    BindingDesc::sampler_fragment(),
    BindingDesc::sampler_fragment(),
    // Debug view
    BindingDesc::ubo_fragment(),
];

pub struct VisibilityTechnique {
    render_pass: RenderPass,
    visibility_descriptor: Descriptor,
    lighting_descriptor: Descriptor,
    uniforms: SceneUniforms,
    _vertex_table: UniformBuffer<VertexTable>,
    meshes: Vec<GpuMesh>,
    visibility_pipeline: GraphicsPipeline,
    lighting_pipeline: GraphicsPipeline,
    particles: ParticleSystem,
    target: Image,
    depth_view: vk::ImageView,
    _textures: [Image; 3],
}

impl VisibilityTechnique {
    /// # Errors
    ///
    /// Returns an error if the scene overflows the vertex table or any
    /// resource fails to load or create.
    pub fn new(ctx: &BuildContext<'_>, particle_settings: &ParticleSettings) -> RendererResult<Self> {
        let attachments = [
            AttachmentDesc::present(ctx.present_format),
            AttachmentDesc::vec4(),
            AttachmentDesc::depth(),
        ];
        let render_pass = RenderPass::new(ctx.device.clone(), &attachments, 2, ctx.extent)?;
        let target = Image::attachment(
            ctx.device.clone(),
            ctx.command_pool,
            &attachments[1],
            ctx.extent,
        )?;

        let visibility_meshes = scene::visibility_meshes();
        let table = scene::vertex_table(&visibility_meshes)?;
        // Written once; the table never changes
        let vertex_table = UniformBuffer::new(ctx.device.clone(), ctx.image_count, table)?;
        let meshes = visibility_meshes
            .iter()
            .map(|mesh| {
                GpuMesh::new(
                    ctx.device.clone(),
                    &mesh.visibility_vertices(),
                    &mesh.indices,
                )
            })
            .collect::<RendererResult<Vec<_>>>()?;

        let uniforms = SceneUniforms::new(ctx)?;
        let shrimp = ctx.load_texture(SHRIMP_TEXTURE)?;
        let raccoon = ctx.load_texture(RACCOON_TEXTURE)?;
        let leaf = ctx.load_texture(LEAF_TEXTURE)?;

        let mut visibility_descriptor = Descriptor::new(
            ctx.device.clone(),
            &[BindingDesc::ubo_vertex()],
            vk::PipelineBindPoint::GRAPHICS,
        )?;
        visibility_descriptor.create_pipeline_layout()?;
        visibility_descriptor.create_descriptor_sets(
            ctx.descriptor_pool,
            ctx.image_count,
            &[uniforms.matrix_binding()],
            &[],
        )?;

        let mut lighting_descriptor = Descriptor::new(
            ctx.device.clone(),
            &LIGHTING_BINDINGS,
            vk::PipelineBindPoint::GRAPHICS,
        )?;
        lighting_descriptor.create_pipeline_layout()?;
        let table_handles = vertex_table.buffers().map(|buffer| buffer.handle()).collect();
        lighting_descriptor.create_descriptor_sets(
            ctx.descriptor_pool,
            ctx.image_count,
            &[
                uniforms.light_binding(),
                uniforms.matrix_binding(),
                BufferBinding::per_image(table_handles, std::mem::size_of::<VertexTable>() as u64),
                uniforms.debug_binding(),
            ],
            &[
                ImageBinding::input_attachment(target.view()),
                ctx.sampled(&shrimp),
                ctx.sampled(&raccoon),
                ctx.sampled(&leaf),
            ],
        )?;

        let visibility_pipeline = GraphicsPipelineBuilder::new(ctx.shader_dir)
            .vertex_shader("default_v")
            .fragment_shader("default_v")
            .vertex_layout(VertexLayout::Visibility)
            .render_pass(render_pass.handle(), 0)
            .extent(ctx.extent)
            .depth_write(true)
            .output_attachments(1)
            .build(ctx.device.clone(), visibility_descriptor.pipeline_layout())?;

        let lighting_pipeline = GraphicsPipelineBuilder::new(ctx.shader_dir)
            .vertex_shader("pp")
            .fragment_shader("pp_lighting_v")
            .vertex_layout(VertexLayout::Nul)
            .render_pass(render_pass.handle(), 1)
            .extent(ctx.extent)
            .depth_write(false)
            .output_attachments(1)
            .build(ctx.device.clone(), lighting_descriptor.pipeline_layout())?;

        let particles = ParticleSystem::new(
            ctx,
            particle_settings,
            TechniqueKind::Visibility,
            render_pass.handle(),
        )?;

        Ok(Self {
            render_pass,
            visibility_descriptor,
            lighting_descriptor,
            uniforms,
            _vertex_table: vertex_table,
            meshes,
            visibility_pipeline,
            lighting_pipeline,
            particles,
            target,
            depth_view: ctx.depth_view,
            _textures: [shrimp, raccoon, leaf],
        })
    }
}

impl RenderTechnique for VisibilityTechnique {
    fn kind(&self) -> TechniqueKind {
        TechniqueKind::Visibility
    }

    fn render_pass(&self) -> &RenderPass {
        &self.render_pass
    }

    fn framebuffer_views(&self) -> Vec<vk::ImageView> {
        vec![self.target.view(), self.depth_view]
    }

    fn per_frame_update(
        &mut self,
        image_index: usize,
        inputs: &FrameInputs,
        options: &SceneOptions,
    ) -> RendererResult<()> {
        self.uniforms
            .update_matrices(image_index, inputs, options)?;
        self.uniforms.update_debug(image_index, options)?;
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
            self.visibility_descriptor.bind(cmd, image_index);
            self.visibility_pipeline.bind(cmd, image_index);
            for mesh in &self.meshes {
                mesh.bind(cmd, image_index);
            }
        }
        self.particles.record_draw(cmd, image_index);

        cmd.next_subpass();
        self.lighting_descriptor.bind(cmd, image_index);
        self.lighting_pipeline.bind(cmd, image_index);
        cmd.draw(3, 1, 0, 0);
        &self.render_pass
    }

    fn particles(&self) -> &ParticleSystem {
        &self.particles
    }

    fn particles_mut(&mut self) -> &mut ParticleSystem {
        &mut self.particles
    }
}
