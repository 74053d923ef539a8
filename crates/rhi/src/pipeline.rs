//! Graphics and compute pipelines.
//!
//! # Overview
//!
//! - [`GraphicsPipelineBuilder`] collects shader names, vertex layout,
//!   topology and the render pass/subpass the pipeline runs in
//! - [`GraphicsPipeline`] and [`ComputePipeline`] own the immutable
//!   `vk::Pipeline`; any state change means building a new one
//! - both implement [`Bindable`]
//!
//! Fixed-function state is the same for every graphics pipeline: static
//! viewport and scissor covering the swapchain extent, back-face culling with
//! counter-clockwise front faces, `LESS` depth test, no blending.
//!
//! # Example
//!
//! ```no_run
//! # fn demo(
//! #     device: std::sync::Arc<vbparts_rhi::device::Device>,
//! #     render_pass: ash::vk::RenderPass,
//! #     layout: ash::vk::PipelineLayout,
//! #     extent: ash::vk::Extent2D,
//! # ) -> vbparts_rhi::RhiResult<()> {
//! use std::path::Path;
//! use vbparts_rhi::pipeline::{GraphicsPipelineBuilder, PrimitiveTopology};
//! use vbparts_rhi::vertex::VertexLayout;
//!
//! let pipeline = GraphicsPipelineBuilder::new(Path::new("CompiledShaders"))
//!     .vertex_shader("vertgeom_particles_fwd")
//!     .geometry_shader("quadexpand")
//!     .fragment_shader("particles_fwd")
//!     .vertex_layout(VertexLayout::Point)
//!     .topology(PrimitiveTopology::PointList)
//!     .render_pass(render_pass, 0)
//!     .extent(extent)
//!     .build(device, layout)?;
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use crate::bindable::Bindable;
use crate::command::CommandBuffer;
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::shader::{Shader, ShaderStage};
use crate::vertex::VertexLayout;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PrimitiveTopology {
    PointList,
    #[default]
    TriangleList,
}

impl PrimitiveTopology {
    pub fn to_vk(self) -> vk::PrimitiveTopology {
        match self {
            PrimitiveTopology::PointList => vk::PrimitiveTopology::POINT_LIST,
            PrimitiveTopology::TriangleList => vk::PrimitiveTopology::TRIANGLE_LIST,
        }
    }
}

/// Opaque colour writes, one per fragment output.
pub fn color_blend_attachments(count: u32) -> Vec<vk::PipelineColorBlendAttachmentState> {
    (0..count)
        .map(|_| vk::PipelineColorBlendAttachmentState {
            blend_enable: vk::FALSE,
            src_color_blend_factor: vk::BlendFactor::ONE,
            dst_color_blend_factor: vk::BlendFactor::ZERO,
            color_blend_op: vk::BlendOp::ADD,
            src_alpha_blend_factor: vk::BlendFactor::ONE,
            dst_alpha_blend_factor: vk::BlendFactor::ZERO,
            alpha_blend_op: vk::BlendOp::ADD,
            color_write_mask: vk::ColorComponentFlags::RGBA,
        })
        .collect()
}

/// Depth test and write are both tied to `depth_write`.
pub fn depth_stencil_state(depth_write: bool) -> vk::PipelineDepthStencilStateCreateInfo<'static> {
    vk::PipelineDepthStencilStateCreateInfo::default()
        .depth_test_enable(depth_write)
        .depth_write_enable(depth_write)
        .depth_compare_op(vk::CompareOp::LESS)
        .depth_bounds_test_enable(false)
        .stencil_test_enable(false)
}

/// Builder for [`GraphicsPipeline`].
#[derive(Debug, Clone)]
pub struct GraphicsPipelineBuilder {
    shader_dir: PathBuf,
    vertex_shader: Option<String>,
    geometry_shader: Option<String>,
    fragment_shader: Option<String>,
    vertex_layout: VertexLayout,
    topology: PrimitiveTopology,
    render_pass: vk::RenderPass,
    subpass: u32,
    extent: vk::Extent2D,
    depth_write: bool,
    output_attachments: u32,
}

impl GraphicsPipelineBuilder {
    /// Starts a builder loading shaders from `shader_dir`.
    ///
    /// Defaults: standard vertex layout, triangle list, depth writes on,
    /// one colour output.
    pub fn new(shader_dir: &Path) -> Self {
        Self {
            shader_dir: shader_dir.to_path_buf(),
            vertex_shader: None,
            geometry_shader: None,
            fragment_shader: None,
            vertex_layout: VertexLayout::Standard,
            topology: PrimitiveTopology::TriangleList,
            render_pass: vk::RenderPass::null(),
            subpass: 0,
            extent: vk::Extent2D::default(),
            depth_write: true,
            output_attachments: 1,
        }
    }

    pub fn vertex_shader(mut self, name: &str) -> Self {
        self.vertex_shader = Some(name.to_string());
        self
    }

    pub fn geometry_shader(mut self, name: &str) -> Self {
        self.geometry_shader = Some(name.to_string());
        self
    }

    pub fn fragment_shader(mut self, name: &str) -> Self {
        self.fragment_shader = Some(name.to_string());
        self
    }

    pub fn vertex_layout(mut self, layout: VertexLayout) -> Self {
        self.vertex_layout = layout;
        self
    }

    pub fn topology(mut self, topology: PrimitiveTopology) -> Self {
        self.topology = topology;
        self
    }

    pub fn render_pass(mut self, render_pass: vk::RenderPass, subpass: u32) -> Self {
        self.render_pass = render_pass;
        self.subpass = subpass;
        self
    }

    pub fn extent(mut self, extent: vk::Extent2D) -> Self {
        self.extent = extent;
        self
    }

    pub fn depth_write(mut self, enabled: bool) -> Self {
        self.depth_write = enabled;
        self
    }

    /// Number of colour attachments the fragment shader writes.
    pub fn output_attachments(mut self, count: u32) -> Self {
        self.output_attachments = count;
        self
    }

    /// Stages in pipeline order: vertex, optional geometry, fragment.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::PipelineError`] if the vertex or fragment shader
    /// was not set.
    pub fn stages(&self) -> RhiResult<Vec<(ShaderStage, &str)>> {
        let vertex = self
            .vertex_shader
            .as_deref()
            .ok_or_else(|| RhiError::PipelineError("Vertex shader is required".to_string()))?;
        let fragment = self
            .fragment_shader
            .as_deref()
            .ok_or_else(|| RhiError::PipelineError("Fragment shader is required".to_string()))?;

        let mut stages = vec![(ShaderStage::Vertex, vertex)];
        if let Some(geometry) = self.geometry_shader.as_deref() {
            stages.push((ShaderStage::Geometry, geometry));
        }
        stages.push((ShaderStage::Fragment, fragment));
        Ok(stages)
    }

    /// Builds the pipeline against `layout`.
    ///
    /// # Errors
    ///
    /// Returns an error if a shader is missing or pipeline creation fails.
    pub fn build(self, device: Arc<Device>, layout: vk::PipelineLayout) -> RhiResult<GraphicsPipeline> {
        if self.render_pass == vk::RenderPass::null() {
            return Err(RhiError::PipelineError(
                "Render pass is required".to_string(),
            ));
        }

        // Modules only need to outlive pipeline creation.
        let shaders = self
            .stages()?
            .into_iter()
            .map(|(stage, name)| Shader::load(device.clone(), &self.shader_dir, name, stage))
            .collect::<RhiResult<Vec<_>>>()?;
        let shader_stages: Vec<vk::PipelineShaderStageCreateInfo> =
            shaders.iter().map(Shader::stage_create_info).collect();

        let bindings = self.vertex_layout.binding_descriptions();
        let attributes = self.vertex_layout.attribute_descriptions();
        let vertex_input_state = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&bindings)
            .vertex_attribute_descriptions(&attributes);

        let input_assembly_state = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(self.topology.to_vk())
            .primitive_restart_enable(false);

        let viewports = [vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: self.extent.width as f32,
            height: self.extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }];
        let scissors = [vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: self.extent,
        }];
        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewports(&viewports)
            .scissors(&scissors);

        let rasterization_state = vk::PipelineRasterizationStateCreateInfo::default()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(vk::CullModeFlags::BACK)
            .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
            .depth_bias_enable(false);

        let multisample_state = vk::PipelineMultisampleStateCreateInfo::default()
            .sample_shading_enable(false)
            .rasterization_samples(vk::SampleCountFlags::TYPE_1)
            .min_sample_shading(1.0);

        let depth_stencil_state = depth_stencil_state(self.depth_write);

        let blend_attachments = color_blend_attachments(self.output_attachments);
        let color_blend_state = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(false)
            .logic_op(vk::LogicOp::COPY)
            .attachments(&blend_attachments)
            .blend_constants([0.0; 4]);

        let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input_state)
            .input_assembly_state(&input_assembly_state)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization_state)
            .multisample_state(&multisample_state)
            .depth_stencil_state(&depth_stencil_state)
            .color_blend_state(&color_blend_state)
            .layout(layout)
            .render_pass(self.render_pass)
            .subpass(self.subpass);

        let pipeline = unsafe {
            device
                .handle()
                .create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
                .map_err(|(_, result)| result)?[0]
        };

        info!(
            "Graphics pipeline created: {} (subpass {}, {:?}, {:?})",
            self.fragment_shader.as_deref().unwrap_or_default(),
            self.subpass,
            self.vertex_layout,
            self.topology
        );

        Ok(GraphicsPipeline { device, pipeline })
    }
}

pub struct GraphicsPipeline {
    device: Arc<Device>,
    pipeline: vk::Pipeline,
}

impl GraphicsPipeline {
    #[inline]
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }
}

impl Bindable for GraphicsPipeline {
    fn bind(&self, cmd: &CommandBuffer, _image_index: usize) {
        cmd.bind_pipeline(vk::PipelineBindPoint::GRAPHICS, self.pipeline);
    }
}

impl Drop for GraphicsPipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_pipeline(self.pipeline, None);
        }
        debug!("Graphics pipeline destroyed");
    }
}

pub struct ComputePipeline {
    device: Arc<Device>,
    pipeline: vk::Pipeline,
}

impl ComputePipeline {
    /// Builds a compute pipeline from `<shader_dir>/<name>_c.spv`.
    ///
    /// # Errors
    ///
    /// Returns an error if the shader is missing or pipeline creation fails.
    pub fn new(
        device: Arc<Device>,
        shader_dir: &Path,
        name: &str,
        layout: vk::PipelineLayout,
    ) -> RhiResult<Self> {
        let shader = Shader::load(device.clone(), shader_dir, name, ShaderStage::Compute)?;

        let create_info = vk::ComputePipelineCreateInfo::default()
            .stage(shader.stage_create_info())
            .layout(layout);

        let pipeline = unsafe {
            device
                .handle()
                .create_compute_pipelines(vk::PipelineCache::null(), &[create_info], None)
                .map_err(|(_, result)| result)?[0]
        };

        info!("Compute pipeline created: {}", name);

        Ok(Self { device, pipeline })
    }

    #[inline]
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }
}

impl Bindable for ComputePipeline {
    fn bind(&self, cmd: &CommandBuffer, _image_index: usize) {
        cmd.bind_pipeline(vk::PipelineBindPoint::COMPUTE, self.pipeline);
    }
}

impl Drop for ComputePipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_pipeline(self.pipeline, None);
        }
        debug!("Compute pipeline destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topology_to_vk() {
        assert_eq!(
            PrimitiveTopology::PointList.to_vk(),
            vk::PrimitiveTopology::POINT_LIST
        );
        assert_eq!(
            PrimitiveTopology::default().to_vk(),
            vk::PrimitiveTopology::TRIANGLE_LIST
        );
    }

    #[test]
    fn test_stages_require_vertex_and_fragment() {
        let builder = GraphicsPipelineBuilder::new(Path::new("CompiledShaders"));
        assert!(matches!(
            builder.clone().fragment_shader("f").stages(),
            Err(RhiError::PipelineError(_))
        ));
        assert!(matches!(
            builder.vertex_shader("v").stages(),
            Err(RhiError::PipelineError(_))
        ));
    }

    #[test]
    fn test_geometry_stage_sits_between() {
        let builder = GraphicsPipelineBuilder::new(Path::new("CompiledShaders"))
            .vertex_shader("geom_particles_fwd")
            .geometry_shader("particles")
            .fragment_shader("particles_fwd");
        let stages = builder.stages().unwrap();
        assert_eq!(
            stages,
            vec![
                (ShaderStage::Vertex, "geom_particles_fwd"),
                (ShaderStage::Geometry, "particles"),
                (ShaderStage::Fragment, "particles_fwd"),
            ]
        );
    }

    #[test]
    fn test_color_blend_attachments() {
        let attachments = color_blend_attachments(6);
        assert_eq!(attachments.len(), 6);
        assert!(attachments.iter().all(|a| a.blend_enable == vk::FALSE
            && a.color_write_mask == vk::ColorComponentFlags::RGBA));
        assert!(color_blend_attachments(0).is_empty());
    }

    #[test]
    fn test_depth_state_follows_depth_write() {
        let on = depth_stencil_state(true);
        assert_eq!(on.depth_test_enable, vk::TRUE);
        assert_eq!(on.depth_write_enable, vk::TRUE);
        assert_eq!(on.depth_compare_op, vk::CompareOp::LESS);

        let off = depth_stencil_state(false);
        assert_eq!(off.depth_test_enable, vk::FALSE);
        assert_eq!(off.depth_write_enable, vk::FALSE);
    }

    #[test]
    fn test_pipelines_are_bindable() {
        fn assert_bindable<T: Bindable>() {}
        assert_bindable::<GraphicsPipeline>();
        assert_bindable::<ComputePipeline>();
    }
}
