//! Frame orchestrator.
//!
//! The [`Renderer`] owns every Vulkan object and drives one frame per
//! [`Renderer::tick`]. Objects that depend on the swapchain (descriptor
//! pool, depth buffer, technique, command buffers) live together in
//! `SwapchainBound` and are dropped and rebuilt as a unit.
//!
//! Command buffers are recorded once and resubmitted every frame. They are
//! re-recorded only by [`Renderer::repaint`] or a rebuild.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, error, info};

use vbparts_core::RuntimeSettings;
use vbparts_platform::{Surface, Window};
use vbparts_rhi::command::{CommandBuffer, CommandPool};
use vbparts_rhi::descriptor::DescriptorPool;
use vbparts_rhi::device::Device;
use vbparts_rhi::instance::Instance;
use vbparts_rhi::physical_device::select_physical_device;
use vbparts_rhi::sampler::Sampler;
use vbparts_rhi::shader::COMPILED_SHADER_DIR;
use vbparts_rhi::swapchain::Swapchain;
use vbparts_rhi::sync::{Fence, FrameSlot, MAX_FRAMES_IN_FLIGHT};
use vbparts_rhi::vk;

use crate::context::BuildContext;
use crate::depth_buffer::DepthBuffer;
use crate::error::{RendererError, RendererResult};
use crate::frame::{
    Acquired, FrameCursor, FrameState, TickOutcome, classify_acquire, classify_present,
};
use crate::overlay::{Overlay, Rebuild, WidgetState};
use crate::particles::ParticleSettings;
use crate::particles::settings::DEFINES_FILE;
use crate::technique::scene::TEXTURE_DIR;
use crate::technique::{FrameInputs, SceneOptions, Technique, TechniqueKind};

/// Everything rebuilt when the swapchain changes.
///
/// Fields drop in declaration order: the technique's framebuffer
/// attachments go before the descriptor pool, and the swapchain last.
struct SwapchainBound {
    graphics_cmds: Vec<CommandBuffer>,
    compute_cmd: Option<CommandBuffer>,
    technique: Technique,
    _descriptor_pool: DescriptorPool,
    _depth: DepthBuffer,
    swapchain: Swapchain,
}

fn missing_swapchain() -> RendererError {
    RendererError::Fatal("Swapchain-bound resources are missing".to_string())
}

/// Main renderer.
///
/// Field order is drop order. Swapchain-bound objects go first, the
/// surface and instance last.
pub struct Renderer {
    bound: Option<SwapchainBound>,
    overlay: Option<Box<dyn Overlay>>,
    slots: Vec<FrameSlot>,
    compute_fence: Fence,
    sampler: Sampler,
    compute_pool: CommandPool,
    graphics_pool: CommandPool,
    particle_settings: ParticleSettings,
    options: SceneOptions,
    technique_kind: TechniqueKind,
    show_ui: bool,
    cursor: FrameCursor,
    resize_requested: bool,
    minimized: bool,
    width: u32,
    height: u32,
    shader_dir: PathBuf,
    texture_dir: PathBuf,
    device: Arc<Device>,
    surface: Surface,
    instance: Instance,
}

impl Renderer {
    /// Creates the device, swapchain and the technique selected in
    /// `settings`, and records the first set of command buffers.
    ///
    /// # Errors
    ///
    /// Returns an error if the defines file is unreadable or any GPU object
    /// fails to create. Startup failures are not retried.
    pub fn new(window: &Window, settings: &RuntimeSettings) -> RendererResult<Self> {
        let (width, height) = window.size();
        info!("Initializing renderer ({}x{})", width, height);

        let particle_settings = ParticleSettings::load(settings, DEFINES_FILE)?;

        let instance = Instance::new(cfg!(debug_assertions))?;
        let surface = window.create_surface(&instance)?;
        let physical_device =
            select_physical_device(instance.handle(), surface.handle(), surface.loader())?;
        let device = Device::new(&instance, &physical_device)?;

        let graphics_pool = CommandPool::new(device.clone(), device.graphics_family())?;
        let compute_pool = CommandPool::new(device.clone(), device.compute_family())?;
        let sampler = Sampler::new(device.clone())?;
        let slots = (0..MAX_FRAMES_IN_FLIGHT)
            .map(|_| FrameSlot::new(device.clone()))
            .collect::<Result<Vec<_>, _>>()?;
        // Unsignaled: only waited on after a compute submission
        let compute_fence = Fence::new(device.clone(), false)?;

        let mut renderer = Self {
            bound: None,
            overlay: None,
            slots,
            compute_fence,
            sampler,
            compute_pool,
            graphics_pool,
            particle_settings,
            options: SceneOptions::default(),
            technique_kind: settings.technique.into(),
            show_ui: settings.show_ui,
            cursor: FrameCursor::new(),
            resize_requested: false,
            minimized: false,
            width,
            height,
            shader_dir: PathBuf::from(COMPILED_SHADER_DIR),
            texture_dir: PathBuf::from(TEXTURE_DIR),
            device,
            surface,
            instance,
        };

        renderer.bound = Some(renderer.create_bound()?);
        renderer.record_graphics_cmds()?;

        info!(
            "Renderer initialized: {}, {} particles in {} mode, {} frames in flight",
            renderer.technique_kind.name(),
            renderer.particle_settings.count(),
            renderer.particle_settings.mode().name(),
            MAX_FRAMES_IN_FLIGHT
        );
        Ok(renderer)
    }

    /// Builds the swapchain and everything that depends on it.
    fn create_bound(&self) -> RendererResult<SwapchainBound> {
        let mut swapchain = Swapchain::new(
            &self.instance,
            self.device.clone(),
            self.surface.handle(),
            self.width,
            self.height,
        )?;
        let extent = swapchain.extent();
        let descriptor_pool = DescriptorPool::for_renderer(self.device.clone())?;
        let depth = DepthBuffer::new(self.device.clone(), &self.graphics_pool, extent)?;

        let ctx = BuildContext {
            device: &self.device,
            descriptor_pool: &descriptor_pool,
            command_pool: &self.graphics_pool,
            sampler: &self.sampler,
            depth_view: depth.view(),
            present_format: swapchain.format(),
            extent,
            image_count: swapchain.image_count() as usize,
            shader_dir: &self.shader_dir,
            texture_dir: &self.texture_dir,
        };
        let mut technique = Technique::new(&ctx, self.technique_kind, &self.particle_settings)?;

        swapchain.create_framebuffers(
            &technique.as_dyn().framebuffer_views(),
            technique.as_dyn().render_pass().handle(),
        )?;

        let graphics_cmds = self
            .graphics_pool
            .allocate_command_buffers(swapchain.image_count())?;

        let compute_cmd = if technique.as_dyn().has_compute() {
            let cmd = self
                .compute_pool
                .allocate_command_buffers(1)?
                .pop()
                .ok_or_else(|| RendererError::Fatal("No compute command buffer".to_string()))?;
            cmd.begin_reusable()?;
            technique.as_dyn_mut().record_compute(&cmd)?;
            cmd.end()?;
            debug!("Recorded particle compute commands");
            Some(cmd)
        } else {
            None
        };

        Ok(SwapchainBound {
            graphics_cmds,
            compute_cmd,
            technique,
            _descriptor_pool: descriptor_pool,
            _depth: depth,
            swapchain,
        })
    }

    /// Drops the swapchain-bound objects and returns their command buffers
    /// to the pools. The device must be idle.
    fn release_bound(&mut self) {
        if let Some(old) = self.bound.take() {
            self.graphics_pool.free_command_buffers(&old.graphics_cmds);
            if let Some(cmd) = &old.compute_cmd {
                self.compute_pool
                    .free_command_buffers(std::slice::from_ref(cmd));
            }
        }
    }

    /// Re-records every per-image graphics command buffer.
    fn record_graphics_cmds(&mut self) -> RendererResult<()> {
        let widgets = self.widgets();
        let bound = self.bound.as_ref().ok_or_else(missing_swapchain)?;
        let technique = bound.technique.as_dyn();

        for (image_index, cmd) in bound.graphics_cmds.iter().enumerate() {
            cmd.begin_reusable()?;
            let render_pass = technique.record_graphics(
                cmd,
                bound.swapchain.framebuffer(image_index),
                image_index,
                &self.options,
            );
            if self.show_ui {
                if let Some(overlay) = self.overlay.as_mut() {
                    overlay.record(cmd, image_index, &widgets);
                }
            }
            render_pass.end(cmd);
            cmd.end()?;
        }

        debug!(
            "Recorded {} graphics command buffers",
            bound.graphics_cmds.len()
        );
        Ok(())
    }

    /// Renders and presents one frame.
    ///
    /// A stale swapchain is rebuilt and reported as
    /// [`TickOutcome::Rebuilt`]; nothing is drawn while minimized.
    ///
    /// # Errors
    ///
    /// Returns [`RendererError::Fatal`] for any acquire, submit or present
    /// failure other than an out-of-date swapchain, or an error if a
    /// rebuild fails.
    pub fn tick(&mut self, inputs: &FrameInputs) -> RendererResult<TickOutcome> {
        if self.minimized {
            return Ok(TickOutcome::Skipped);
        }

        let slot = &self.slots[self.cursor.slot()];
        slot.in_flight().wait(u64::MAX)?;
        let image_available = slot.image_available().handle();
        let render_finished = slot.render_finished().handle();
        let in_flight = slot.in_flight().handle();

        let bound = self.bound.as_ref().ok_or_else(missing_swapchain)?;
        let compute_submitted = match &bound.compute_cmd {
            Some(cmd) => {
                let command_buffers = [cmd.handle()];
                let submit_info = vk::SubmitInfo::default().command_buffers(&command_buffers);
                // SAFETY: the compute buffer is fully recorded and the compute
                // fence was reset after its last wait.
                unsafe {
                    self.device
                        .submit_compute(&[submit_info], self.compute_fence.handle())
                        .map_err(|e| {
                            RendererError::Fatal(format!("Compute submission failed: {e}"))
                        })?;
                }
                self.cursor.enter(FrameState::ComputeSubmitted);
                true
            }
            None => false,
        };

        self.cursor.enter(FrameState::Acquiring);
        let acquired = classify_acquire(bound.swapchain.acquire_next_image(image_available))?;
        let image_index = match acquired {
            Acquired::Image(index) => index,
            Acquired::Stale => {
                debug!("Swapchain out of date on acquire");
                self.rebuild_stale(compute_submitted)?;
                return Ok(TickOutcome::Rebuilt);
            }
        };

        let bound = self.bound.as_mut().ok_or_else(missing_swapchain)?;
        bound.technique.as_dyn_mut().per_frame_update(
            image_index as usize,
            inputs,
            &self.options,
        )?;

        self.slots[self.cursor.slot()].in_flight().reset()?;

        let wait_semaphores = [image_available];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [render_finished];
        let command_buffers = [bound.graphics_cmds[image_index as usize].handle()];
        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        // SAFETY: the command buffer is recorded, image_available is pending
        // from the acquire above and in_flight was just reset.
        unsafe {
            self.device
                .submit_graphics(&[submit_info], in_flight)
                .map_err(|e| RendererError::Fatal(format!("Graphics submission failed: {e}")))?;
        }
        self.cursor.enter(FrameState::GraphicsSubmitted);

        self.cursor.enter(FrameState::Presenting);
        let present_result =
            bound
                .swapchain
                .present(self.device.present_queue(), image_index, render_finished);
        if classify_present(present_result, self.resize_requested)? {
            debug!("Swapchain stale or resized after present");
            self.rebuild_stale(compute_submitted)?;
            return Ok(TickOutcome::Rebuilt);
        }

        if compute_submitted {
            self.compute_fence.wait(u64::MAX)?;
            self.compute_fence.reset()?;
        }
        self.cursor.advance();
        Ok(TickOutcome::Presented)
    }

    /// Rebuild path of [`Renderer::tick`]. Leaves the compute fence
    /// unsignaled again if this tick submitted compute work.
    fn rebuild_stale(&mut self, compute_submitted: bool) -> RendererResult<()> {
        self.cursor.enter(FrameState::Resizing);
        self.rebuild()?;
        if compute_submitted {
            self.compute_fence.reset()?;
        }
        self.cursor.finish_rebuild();
        Ok(())
    }

    /// Waits for the device, then recreates the swapchain, depth buffer,
    /// descriptor pool, technique and command buffers.
    ///
    /// # Errors
    ///
    /// Returns an error if any recreation fails. The renderer is unusable
    /// afterwards.
    pub fn rebuild(&mut self) -> RendererResult<()> {
        self.device.wait_idle()?;
        self.release_bound();

        self.bound = Some(self.create_bound()?);
        self.record_graphics_cmds()?;
        self.resize_requested = false;

        info!(
            "Rebuilt {} for {}x{}",
            self.technique_kind.name(),
            self.width,
            self.height
        );
        Ok(())
    }

    /// Waits for the device and re-records the graphics command buffers.
    ///
    /// # Errors
    ///
    /// Returns an error if waiting or recording fails.
    pub fn repaint(&mut self) -> RendererResult<()> {
        self.device.wait_idle()?;
        self.record_graphics_cmds()
    }

    /// Notes a new window size. The swapchain is rebuilt after the next
    /// present. A zero size pauses rendering until a real size arrives.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            debug!("Window minimized, pausing");
            self.minimized = true;
            return;
        }

        if self.minimized || width != self.width || height != self.height {
            debug!(
                "Resize requested: {}x{} -> {}x{}",
                self.width, self.height, width, height
            );
            self.width = width;
            self.height = height;
            self.resize_requested = true;
        }
        self.minimized = false;
    }

    /// Installs the overlay and re-records so it shows up.
    ///
    /// # Errors
    ///
    /// Returns an error if re-recording fails.
    pub fn set_overlay(&mut self, overlay: Box<dyn Overlay>) -> RendererResult<()> {
        self.overlay = Some(overlay);
        self.repaint()
    }

    /// Snapshot of every runtime control.
    pub fn widgets(&self) -> WidgetState {
        let particles = &self.particle_settings;
        WidgetState {
            show_ui: self.show_ui,
            technique: self.technique_kind,
            debug_view: self.options.debug_view,
            particles_only: self.options.particles_only,
            mode: particles.mode(),
            count: particles.count(),
            complexity: particles.complexity(),
            cutout: particles.cutout(),
            half_size: particles.half_size,
            spread: particles.density,
            gravity: particles.gravity,
            initial_upwards_force: particles.initial_upwards_force,
        }
    }

    /// Applies an edit to the runtime controls and performs whatever
    /// rebuild or repaint it requires.
    ///
    /// # Errors
    ///
    /// Returns an error if the defines file cannot be rewritten or the
    /// rebuild fails.
    pub fn edit_widgets(&mut self, edit: impl FnOnce(&mut WidgetState)) -> RendererResult<Rebuild> {
        let before = self.widgets();
        let mut after = before;
        edit(&mut after);
        if after.technique != before.technique {
            after.debug_view = 0;
        }
        let after = after.clamped();
        let rebuild = after.rebuild_from(&before);

        self.apply_widgets(&before, &after)?;
        match rebuild {
            Rebuild::Swapchain => self.rebuild()?,
            Rebuild::Repaint => self.repaint()?,
            Rebuild::None => {}
        }
        Ok(rebuild)
    }

    fn apply_widgets(&mut self, before: &WidgetState, after: &WidgetState) -> RendererResult<()> {
        if after.technique != before.technique {
            info!("Switching to {}", after.technique.name());
        }
        self.technique_kind = after.technique;
        self.show_ui = after.show_ui;
        self.options = SceneOptions {
            particles_only: after.particles_only,
            debug_view: after.debug_view,
        };

        let particles = &mut self.particle_settings;
        particles.set_mode(after.mode);
        particles.set_count(after.count);
        if after.complexity != before.complexity {
            particles.set_complexity(after.complexity)?;
        }
        if after.cutout != before.cutout {
            particles.set_cutout(after.cutout)?;
        }
        particles.half_size = after.half_size;
        particles.density = after.spread;
        particles.gravity = after.gravity;
        particles.initial_upwards_force = after.initial_upwards_force;

        if let Some(bound) = self.bound.as_mut() {
            bound
                .technique
                .as_dyn_mut()
                .particles_mut()
                .apply_settings(&self.particle_settings);
        }
        Ok(())
    }

    /// Swapchain width divided by height.
    pub fn aspect_ratio(&self) -> f32 {
        self.bound.as_ref().map_or_else(
            || self.width as f32 / self.height.max(1) as f32,
            |bound| bound.swapchain.aspect_ratio(),
        )
    }

    #[inline]
    pub fn particle_settings(&self) -> &ParticleSettings {
        &self.particle_settings
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            error!("Failed to wait for device idle during renderer drop: {:?}", e);
        }
        self.release_bound();
        info!("Renderer destroyed");
    }
}
