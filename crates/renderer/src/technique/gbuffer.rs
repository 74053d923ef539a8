//! Deferred shading through a geometry buffer.
//!
//! Subpass 0 writes albedo into an 8-bit target and the remaining surface
//! data into half-float targets; subpass 1 reads them all as input
//! attachments and lights a full-screen triangle.

use vbparts_rhi::Bindable;
use vbparts_rhi::command::CommandBuffer;
use vbparts_rhi::descriptor::{BindingDesc, Descriptor, ImageBinding};
use vbparts_rhi::image::Image;
use vbparts_rhi::pipeline::{GraphicsPipeline, GraphicsPipelineBuilder};
use vbparts_rhi::render_pass::{AttachmentDesc, RenderPass};
use vbparts_rhi::vertex::VertexLayout;
use vbparts_rhi::vk;

use super::forward::{MaterialBatch, material_batches};
use super::scene::{RACCOON_TEXTURE, SHRIMP_TEXTURE, SceneUniforms};
use super::{FrameInputs, RenderTechnique, SceneOptions, TechniqueKind};
use crate::context::BuildContext;
use crate::error::{RendererError, RendererResult};
use crate::particles::{ParticleSettings, ParticleSystem};

/// Attachment list for a G-buffer of `targets` colour targets: present,
/// one 8-bit albedo target, half-float targets, depth.
pub fn attachments(present_format: vk::Format, targets: usize) -> Vec<AttachmentDesc> {
    let mut attachments = Vec::with_capacity(targets + 2);
    attachments.push(AttachmentDesc::present(present_format));
    attachments.push(AttachmentDesc::colour());
    attachments.extend(std::iter::repeat_n(
        AttachmentDesc::vec4(),
        targets.saturating_sub(1),
    ));
    attachments.push(AttachmentDesc::depth());
    attachments
}

/// Lighting pass bindings: every target, then light and debug blocks.
pub fn lighting_bindings(targets: usize) -> Vec<BindingDesc> {
    let mut bindings = vec![BindingDesc::input_attachment_fragment(); targets];
    bindings.push(BindingDesc::ubo_fragment());
    bindings.push(BindingDesc::ubo_fragment());
    bindings
}

pub struct GBufferTechnique {
    kind: TechniqueKind,
    render_pass: RenderPass,
    geometry_descriptor: Descriptor,
    lighting_descriptor: Descriptor,
    uniforms: SceneUniforms,
    batches: Vec<MaterialBatch>,
    lighting_pipeline: GraphicsPipeline,
    particles: ParticleSystem,
    targets: Vec<Image>,
    depth_view: vk::ImageView,
    _textures: [Image; 2],
}

impl GBufferTechnique {
    /// Builds a G-buffer with 3 or 6 targets.
    ///
    /// # Errors
    ///
    /// Returns [`RendererError::Fatal`] for any other target count, or an
    /// error if a resource fails to load or create.
    pub fn new(
        ctx: &BuildContext<'_>,
        particle_settings: &ParticleSettings,
        targets: usize,
    ) -> RendererResult<Self> {
        let kind = match targets {
            3 => TechniqueKind::GBuffer3,
            6 => TechniqueKind::GBuffer6,
            other => {
                return Err(RendererError::Fatal(format!(
                    "Unsupported G-buffer target count: {other}"
                )));
            }
        };

        let attachments = attachments(ctx.present_format, targets);
        let render_pass = RenderPass::new(ctx.device.clone(), &attachments, 2, ctx.extent)?;

        // Everything between the present image and depth
        let targets = attachments[1..attachments.len() - 1]
            .iter()
            .map(|desc| Image::attachment(ctx.device.clone(), ctx.command_pool, desc, ctx.extent))
            .collect::<Result<Vec<_>, _>>()?;

        let uniforms = SceneUniforms::new(ctx)?;
        let shrimp = ctx.load_texture(SHRIMP_TEXTURE)?;
        let raccoon = ctx.load_texture(RACCOON_TEXTURE)?;

        let mut geometry_descriptor = Descriptor::new(
            ctx.device.clone(),
            &[
                BindingDesc::ubo_vertex(),
                BindingDesc::sampler_fragment(),
                BindingDesc::sampler_fragment(),
            ],
            vk::PipelineBindPoint::GRAPHICS,
        )?;
        geometry_descriptor.create_pipeline_layout()?;
        geometry_descriptor.create_descriptor_sets(
            ctx.descriptor_pool,
            ctx.image_count,
            &[uniforms.matrix_binding()],
            &[ctx.sampled(&shrimp), ctx.sampled(&raccoon)],
        )?;

        let mut lighting_descriptor = Descriptor::new(
            ctx.device.clone(),
            &lighting_bindings(targets.len()),
            vk::PipelineBindPoint::GRAPHICS,
        )?;
        lighting_descriptor.create_pipeline_layout()?;
        let inputs: Vec<ImageBinding> = targets
            .iter()
            .map(|target| ImageBinding::input_attachment(target.view()))
            .collect();
        lighting_descriptor.create_descriptor_sets(
            ctx.descriptor_pool,
            ctx.image_count,
            &[uniforms.light_binding(), uniforms.debug_binding()],
            &inputs,
        )?;

        let batches = material_batches(
            ctx,
            kind,
            render_pass.handle(),
            geometry_descriptor.pipeline_layout(),
            targets.len() as u32,
        )?;

        let lighting_pipeline = GraphicsPipelineBuilder::new(ctx.shader_dir)
            .vertex_shader("pp")
            .fragment_shader(&format!("pp_lighting_{}", kind.suffix()))
            .vertex_layout(VertexLayout::Nul)
            .render_pass(render_pass.handle(), 1)
            .extent(ctx.extent)
            .depth_write(false)
            .output_attachments(1)
            .build(ctx.device.clone(), lighting_descriptor.pipeline_layout())?;

        let particles = ParticleSystem::new(ctx, particle_settings, kind, render_pass.handle())?;

        Ok(Self {
            kind,
            render_pass,
            geometry_descriptor,
            lighting_descriptor,
            uniforms,
            batches,
            lighting_pipeline,
            particles,
            targets,
            depth_view: ctx.depth_view,
            _textures: [shrimp, raccoon],
        })
    }
}

impl RenderTechnique for GBufferTechnique {
    fn kind(&self) -> TechniqueKind {
        self.kind
    }

    fn render_pass(&self) -> &RenderPass {
        &self.render_pass
    }

    fn framebuffer_views(&self) -> Vec<vk::ImageView> {
        self.targets
            .iter()
            .map(Image::view)
            .chain(std::iter::once(self.depth_view))
            .collect()
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
            self.geometry_descriptor.bind(cmd, image_index);
            for batch in &self.batches {
                batch.record(cmd, image_index);
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_three_target_attachments() {
        let list = attachments(vk::Format::B8G8R8A8_SRGB, 3);
        assert_eq!(list.len(), 5);
        assert_eq!(list[1], AttachmentDesc::colour());
        assert_eq!(list[2], AttachmentDesc::vec4());
        assert_eq!(list[3], AttachmentDesc::vec4());
        assert_eq!(list[4], AttachmentDesc::depth());
    }

    #[test]
    fn test_six_target_attachments() {
        let list = attachments(vk::Format::B8G8R8A8_SRGB, 6);
        assert_eq!(list.len(), 8);
        assert_eq!(list[0], AttachmentDesc::present(vk::Format::B8G8R8A8_SRGB));
        assert_eq!(
            list.iter().filter(|desc| **desc == AttachmentDesc::vec4()).count(),
            5
        );
    }

    #[test]
    fn test_lighting_bindings() {
        let bindings = lighting_bindings(6);
        assert_eq!(bindings.len(), 8);
        assert!(
            bindings[..6]
                .iter()
                .all(|b| *b == BindingDesc::input_attachment_fragment())
        );
        assert_eq!(bindings[6], BindingDesc::ubo_fragment());
        assert_eq!(bindings[7], BindingDesc::ubo_fragment());
    }
}
