//! Render passes with a fixed attachment convention.
//!
//! # Overview
//!
//! Every render pass in the renderer follows one layout:
//!
//! ```text
//! attachment 0        present target (swapchain image)
//! attachments 1..n-1  intermediate colour targets (G-buffer / visibility)
//! attachment n        depth
//! ```
//!
//! With a single subpass (forward rendering) that subpass writes the present
//! target and depth. With several subpasses, every subpass but the last
//! writes all intermediate targets plus depth, and the last one reads them as
//! input attachments and writes only the present target.
//!
//! [`plan_render_pass`] computes attachment descriptions, references and
//! dependency edges without touching the GPU; [`RenderPass::new`] turns the
//! plan into a `vk::RenderPass`.
//!
//! # Example
//!
//! ```no_run
//! # fn demo(device: std::sync::Arc<vbparts_rhi::device::Device>, extent: ash::vk::Extent2D)
//! # -> vbparts_rhi::RhiResult<()> {
//! use ash::vk;
//! use vbparts_rhi::render_pass::{AttachmentDesc, RenderPass};
//!
//! // Three-target G-buffer: albedo, position, normal
//! let attachments = [
//!     AttachmentDesc::present(vk::Format::B8G8R8A8_UNORM),
//!     AttachmentDesc::colour(),
//!     AttachmentDesc::vec4(),
//!     AttachmentDesc::vec4(),
//!     AttachmentDesc::depth(),
//! ];
//! let render_pass = RenderPass::new(device, &attachments, 2, extent)?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use crate::command::CommandBuffer;
use crate::device::Device;
use crate::error::RhiResult;

/// Format of the 8-bit colour intermediate target.
pub const COLOUR_FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;
/// Format of the half-float vector intermediate targets.
pub const VEC4_FORMAT: vk::Format = vk::Format::R16G16B16A16_SFLOAT;
/// Format of the depth attachment.
pub const DEPTH_FORMAT: vk::Format = vk::Format::D32_SFLOAT;

/// One attachment of a render pass.
///
/// `layout` is the layout the attachment is referenced with while written;
/// `final_layout` is what it transitions to when the pass ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttachmentDesc {
    pub format: vk::Format,
    pub layout: vk::ImageLayout,
    pub final_layout: vk::ImageLayout,
    pub store_op: vk::AttachmentStoreOp,
}

impl AttachmentDesc {
    /// The swapchain image; stored and handed to the presentation engine.
    pub fn present(swapchain_format: vk::Format) -> Self {
        Self {
            format: swapchain_format,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            final_layout: vk::ImageLayout::PRESENT_SRC_KHR,
            store_op: vk::AttachmentStoreOp::STORE,
        }
    }

    /// 8-bit RGBA target living only between subpasses.
    pub fn colour() -> Self {
        Self::transient(COLOUR_FORMAT)
    }

    /// Half-float RGBA target living only between subpasses.
    pub fn vec4() -> Self {
        Self::transient(VEC4_FORMAT)
    }

    pub fn depth() -> Self {
        Self {
            format: DEPTH_FORMAT,
            layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            final_layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            store_op: vk::AttachmentStoreOp::DONT_CARE,
        }
    }

    fn transient(format: vk::Format) -> Self {
        Self {
            format,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            final_layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            store_op: vk::AttachmentStoreOp::DONT_CARE,
        }
    }

    /// Cleared on load, stencil ignored, contents undefined on entry.
    pub fn description(&self) -> vk::AttachmentDescription {
        vk::AttachmentDescription::default()
            .format(self.format)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(self.store_op)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(self.final_layout)
    }

    fn reference(&self, index: usize) -> vk::AttachmentReference {
        vk::AttachmentReference {
            attachment: index as u32,
            layout: self.layout,
        }
    }
}

/// Attachment references used by one subpass.
#[derive(Debug, Clone, Default)]
pub struct SubpassPlan {
    pub colour: Vec<vk::AttachmentReference>,
    pub input: Vec<vk::AttachmentReference>,
    pub depth: Option<vk::AttachmentReference>,
}

/// Everything needed to create a render pass, computed without a device.
#[derive(Debug, Clone, Default)]
pub struct RenderPassPlan {
    pub attachments: Vec<vk::AttachmentDescription>,
    pub subpasses: Vec<SubpassPlan>,
    pub dependencies: Vec<vk::SubpassDependency>,
}

/// Lays out subpasses and dependency edges for `attachments`.
///
/// The dependency list always starts with an edge from outside the pass into
/// subpass 0 and ends with an edge from the last subpass out of the pass;
/// consecutive subpasses are chained by-region in between.
///
/// # Panics
///
/// Panics if fewer than two attachments or zero subpasses are given.
pub fn plan_render_pass(attachments: &[AttachmentDesc], subpass_count: u32) -> RenderPassPlan {
    assert!(
        attachments.len() >= 2,
        "render pass needs a present and a depth attachment, got {}",
        attachments.len()
    );
    assert!(subpass_count >= 1, "render pass needs at least one subpass");

    let last_attachment = attachments.len() - 1;
    let present_ref = attachments[0].reference(0);
    let depth_ref = attachments[last_attachment].reference(last_attachment);
    let colour_refs: Vec<vk::AttachmentReference> = (1..last_attachment)
        .map(|i| attachments[i].reference(i))
        .collect();
    let input_refs: Vec<vk::AttachmentReference> = colour_refs
        .iter()
        .map(|r| vk::AttachmentReference {
            attachment: r.attachment,
            layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        })
        .collect();

    let last = subpass_count - 1;
    let subpasses = (0..subpass_count)
        .map(|i| {
            if subpass_count == 1 {
                SubpassPlan {
                    colour: vec![present_ref],
                    input: Vec::new(),
                    depth: Some(depth_ref),
                }
            } else if i != last {
                SubpassPlan {
                    colour: colour_refs.clone(),
                    input: Vec::new(),
                    depth: Some(depth_ref),
                }
            } else {
                SubpassPlan {
                    colour: vec![present_ref],
                    input: input_refs.clone(),
                    depth: None,
                }
            }
        })
        .collect();

    RenderPassPlan {
        attachments: attachments.iter().map(AttachmentDesc::description).collect(),
        subpasses,
        dependencies: plan_dependencies(subpass_count),
    }
}

fn plan_dependencies(subpass_count: u32) -> Vec<vk::SubpassDependency> {
    let colour_rw =
        vk::AccessFlags::COLOR_ATTACHMENT_READ | vk::AccessFlags::COLOR_ATTACHMENT_WRITE;
    let last = subpass_count - 1;
    let mut dependencies = Vec::with_capacity(subpass_count as usize + 1);

    if subpass_count == 1 {
        dependencies.push(vk::SubpassDependency {
            src_subpass: vk::SUBPASS_EXTERNAL,
            dst_subpass: 0,
            src_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            dst_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            src_access_mask: vk::AccessFlags::empty(),
            dst_access_mask: colour_rw,
            dependency_flags: vk::DependencyFlags::BY_REGION,
        });
    } else {
        for i in 0..subpass_count {
            let (src_subpass, src_stage_mask, src_access_mask) = if i == 0 {
                (
                    vk::SUBPASS_EXTERNAL,
                    vk::PipelineStageFlags::BOTTOM_OF_PIPE,
                    vk::AccessFlags::MEMORY_READ,
                )
            } else {
                (
                    i - 1,
                    vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                    vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
                )
            };
            let (dst_stage_mask, dst_access_mask) = if i != last {
                (vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT, colour_rw)
            } else {
                (
                    vk::PipelineStageFlags::FRAGMENT_SHADER,
                    vk::AccessFlags::SHADER_READ,
                )
            };
            dependencies.push(vk::SubpassDependency {
                src_subpass,
                dst_subpass: i,
                src_stage_mask,
                dst_stage_mask,
                src_access_mask,
                dst_access_mask,
                dependency_flags: vk::DependencyFlags::BY_REGION,
            });
        }
    }

    dependencies.push(vk::SubpassDependency {
        src_subpass: last,
        dst_subpass: vk::SUBPASS_EXTERNAL,
        src_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        dst_stage_mask: vk::PipelineStageFlags::BOTTOM_OF_PIPE,
        src_access_mask: colour_rw,
        dst_access_mask: vk::AccessFlags::MEMORY_READ,
        dependency_flags: vk::DependencyFlags::BY_REGION,
    });

    dependencies
}

/// Transparent black for every colour attachment, maximum depth for the last.
pub fn clear_values(attachment_count: usize) -> Vec<vk::ClearValue> {
    (0..attachment_count)
        .map(|i| {
            if i + 1 == attachment_count {
                vk::ClearValue {
                    depth_stencil: vk::ClearDepthStencilValue {
                        depth: 1.0,
                        stencil: 0,
                    },
                }
            } else {
                vk::ClearValue {
                    color: vk::ClearColorValue {
                        float32: [0.0, 0.0, 0.0, 0.0],
                    },
                }
            }
        })
        .collect()
}

/// Vulkan render pass wrapper.
pub struct RenderPass {
    device: Arc<Device>,
    render_pass: vk::RenderPass,
    extent: vk::Extent2D,
    subpass_count: u32,
    clear_values: Vec<vk::ClearValue>,
}

impl RenderPass {
    /// Creates a render pass over `attachments` with `subpass_count` subpasses.
    ///
    /// # Arguments
    ///
    /// * `device` - The logical device
    /// * `attachments` - Present target first, depth last
    /// * `subpass_count` - 1 for forward rendering, 2 for deferred techniques
    /// * `extent` - Render area, the swapchain extent
    ///
    /// # Errors
    ///
    /// Returns an error if render pass creation fails.
    ///
    /// # Panics
    ///
    /// Panics if fewer than two attachments are given.
    pub fn new(
        device: Arc<Device>,
        attachments: &[AttachmentDesc],
        subpass_count: u32,
        extent: vk::Extent2D,
    ) -> RhiResult<Self> {
        let plan = plan_render_pass(attachments, subpass_count);

        let subpasses: Vec<vk::SubpassDescription> = plan
            .subpasses
            .iter()
            .map(|subpass| {
                let mut desc = vk::SubpassDescription::default()
                    .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
                    .color_attachments(&subpass.colour)
                    .input_attachments(&subpass.input);
                if let Some(depth) = subpass.depth.as_ref() {
                    desc = desc.depth_stencil_attachment(depth);
                }
                desc
            })
            .collect();

        let create_info = vk::RenderPassCreateInfo::default()
            .attachments(&plan.attachments)
            .subpasses(&subpasses)
            .dependencies(&plan.dependencies);

        let render_pass = unsafe { device.handle().create_render_pass(&create_info, None)? };

        info!(
            "Render pass created: {} attachments, {} subpass(es), {} dependencies",
            attachments.len(),
            subpass_count,
            plan.dependencies.len()
        );

        Ok(Self {
            device,
            render_pass,
            extent,
            subpass_count,
            clear_values: clear_values(attachments.len()),
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::RenderPass {
        self.render_pass
    }

    #[inline]
    pub fn subpass_count(&self) -> u32 {
        self.subpass_count
    }

    #[inline]
    pub fn attachment_count(&self) -> usize {
        self.clear_values.len()
    }

    /// Begins the pass on `framebuffer`, clearing every attachment.
    pub fn begin(&self, cmd: &CommandBuffer, framebuffer: vk::Framebuffer) {
        let begin_info = vk::RenderPassBeginInfo::default()
            .render_pass(self.render_pass)
            .framebuffer(framebuffer)
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: self.extent,
            })
            .clear_values(&self.clear_values);
        cmd.begin_render_pass(&begin_info);
    }

    pub fn end(&self, cmd: &CommandBuffer) {
        cmd.end_render_pass();
    }
}

impl Drop for RenderPass {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_render_pass(self.render_pass, None);
        }
        debug!("Render pass destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gbuffer3() -> Vec<AttachmentDesc> {
        vec![
            AttachmentDesc::present(vk::Format::B8G8R8A8_UNORM),
            AttachmentDesc::colour(),
            AttachmentDesc::vec4(),
            AttachmentDesc::vec4(),
            AttachmentDesc::depth(),
        ]
    }

    fn forward() -> Vec<AttachmentDesc> {
        vec![
            AttachmentDesc::present(vk::Format::B8G8R8A8_UNORM),
            AttachmentDesc::depth(),
        ]
    }

    fn has_external_edges(deps: &[vk::SubpassDependency], last: u32) {
        let first = deps.first().unwrap();
        assert_eq!(first.src_subpass, vk::SUBPASS_EXTERNAL);
        assert_eq!(first.dst_subpass, 0);

        let out = deps.last().unwrap();
        assert_eq!(out.src_subpass, last);
        assert_eq!(out.dst_subpass, vk::SUBPASS_EXTERNAL);
    }

    #[test]
    fn test_single_subpass_writes_present_and_depth() {
        let plan = plan_render_pass(&forward(), 1);
        assert_eq!(plan.subpasses.len(), 1);

        let subpass = &plan.subpasses[0];
        assert_eq!(subpass.colour.len(), 1);
        assert_eq!(subpass.colour[0].attachment, 0);
        assert!(subpass.input.is_empty());
        assert_eq!(subpass.depth.unwrap().attachment, 1);
    }

    #[test]
    fn test_single_subpass_keeps_external_edges() {
        let plan = plan_render_pass(&forward(), 1);
        assert_eq!(plan.dependencies.len(), 2);
        has_external_edges(&plan.dependencies, 0);
    }

    #[test]
    fn test_deferred_subpasses() {
        let plan = plan_render_pass(&gbuffer3(), 2);

        let geometry = &plan.subpasses[0];
        let colour: Vec<u32> = geometry.colour.iter().map(|r| r.attachment).collect();
        assert_eq!(colour, vec![1, 2, 3]);
        assert!(
            geometry
                .colour
                .iter()
                .all(|r| r.layout == vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
        );
        assert_eq!(geometry.depth.unwrap().attachment, 4);

        let lighting = &plan.subpasses[1];
        assert_eq!(lighting.colour.len(), 1);
        assert_eq!(lighting.colour[0].attachment, 0);
        assert!(lighting.depth.is_none());
        let input: Vec<u32> = lighting.input.iter().map(|r| r.attachment).collect();
        assert_eq!(input, vec![1, 2, 3]);
        assert!(
            lighting
                .input
                .iter()
                .all(|r| r.layout == vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
        );
    }

    #[test]
    fn test_deferred_dependency_chain() {
        let plan = plan_render_pass(&gbuffer3(), 2);
        let deps = &plan.dependencies;
        assert_eq!(deps.len(), 3);
        has_external_edges(deps, 1);

        let chain = &deps[1];
        assert_eq!(chain.src_subpass, 0);
        assert_eq!(chain.dst_subpass, 1);
        assert_eq!(chain.dst_stage_mask, vk::PipelineStageFlags::FRAGMENT_SHADER);
        assert_eq!(chain.dst_access_mask, vk::AccessFlags::SHADER_READ);
        assert!(
            deps.iter()
                .all(|d| d.dependency_flags == vk::DependencyFlags::BY_REGION)
        );
    }

    #[test]
    fn test_three_subpasses_chain_consecutively() {
        let plan = plan_render_pass(&gbuffer3(), 3);
        let deps = &plan.dependencies;
        assert_eq!(deps.len(), 4);
        has_external_edges(deps, 2);
        assert_eq!((deps[1].src_subpass, deps[1].dst_subpass), (0, 1));
        assert_eq!((deps[2].src_subpass, deps[2].dst_subpass), (1, 2));
        assert_eq!(
            deps[1].dst_stage_mask,
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
        );
    }

    #[test]
    fn test_attachment_descriptions() {
        let plan = plan_render_pass(&gbuffer3(), 2);
        assert!(
            plan.attachments
                .iter()
                .all(|a| a.load_op == vk::AttachmentLoadOp::CLEAR
                    && a.initial_layout == vk::ImageLayout::UNDEFINED)
        );
        assert_eq!(plan.attachments[0].store_op, vk::AttachmentStoreOp::STORE);
        assert_eq!(
            plan.attachments[0].final_layout,
            vk::ImageLayout::PRESENT_SRC_KHR
        );
        assert_eq!(plan.attachments[1].format, COLOUR_FORMAT);
        assert_eq!(plan.attachments[2].format, VEC4_FORMAT);
        assert_eq!(plan.attachments[4].format, DEPTH_FORMAT);
        assert_eq!(plan.attachments[4].store_op, vk::AttachmentStoreOp::DONT_CARE);
    }

    #[test]
    #[should_panic(expected = "present and a depth")]
    fn test_single_attachment_rejected() {
        plan_render_pass(&[AttachmentDesc::depth()], 1);
    }

    #[test]
    fn test_clear_values() {
        let values = clear_values(3);
        assert_eq!(values.len(), 3);
        unsafe {
            assert_eq!(values[0].color.float32, [0.0; 4]);
            assert_eq!(values[1].color.float32, [0.0; 4]);
            assert_eq!(values[2].depth_stencil.depth, 1.0);
            assert_eq!(values[2].depth_stencil.stencil, 0);
        }
    }
}
