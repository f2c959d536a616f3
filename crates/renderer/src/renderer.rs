//! Main renderer orchestration.
//!
//! [`Renderer`] pairs a [`FrameScheduler`] with a [`RenderContext`], the
//! [`FrameBackend`] that owns every Vulkan object needed to draw one mesh.
//!
//! # Resource Destruction Order
//!
//! Vulkan objects must be destroyed before whatever they were created from.
//! Fields are declared in destruction order:
//! 1. Frame slots (fences and semaphores)
//! 2. Swapchain-sized targets: command buffers, framebuffers, pipeline,
//!    render pass, depth buffer, uniform buffers and their descriptors
//! 3. Mesh buffers, layouts, shader modules, command pool
//! 4. Swapchain, surface, device
//! 5. Instance

use std::sync::Arc;

use ash::vk;
use tracing::{debug, error, info};

use vkframe_core::ViewerConfig;
use vkframe_platform::{ResizeSignal, Surface, Window};
use vkframe_resources::MeshData;
use vkframe_rhi::buffer::{Buffer, BufferUsage};
use vkframe_rhi::command::{CommandBuffer, CommandPool};
use vkframe_rhi::descriptor::{DescriptorPool, DescriptorSetLayout, write_uniform_buffer};
use vkframe_rhi::device::Device;
use vkframe_rhi::instance::Instance;
use vkframe_rhi::physical_device::select_physical_device;
use vkframe_rhi::pipeline::{MeshPipelineDesc, Pipeline, PipelineLayout, full_scissor};
use vkframe_rhi::render_pass::{Framebuffer, RenderPass};
use vkframe_rhi::shader::{Shader, ShaderStage};
use vkframe_rhi::swapchain::Swapchain;
use vkframe_rhi::sync::FrameSync;
use vkframe_rhi::{RhiError, RhiResult};

use crate::MAX_FRAMES_IN_FLIGHT;
use crate::depth_buffer::{DepthBuffer, find_depth_format};
use crate::error::RendererResult;
use crate::frame_scheduler::{FrameBackend, FrameScheduler, FrameStatus, RecreateOutcome};
use crate::ubo::{Camera, MatrixBuffer, Spin, aspect_ratio};

/// Everything sized by the swapchain. Rebuilt as a unit on recreation.
///
/// Released through [`FrameTargets::release`] in [`TargetPart::TEARDOWN_ORDER`],
/// never by field drop order.
struct FrameTargets {
    /// One pre-recorded command buffer per swapchain image.
    command_buffers: Vec<CommandBuffer>,
    framebuffers: Vec<Framebuffer>,
    pipeline: Pipeline,
    render_pass: RenderPass,
    depth_buffer: DepthBuffer,
    descriptor_sets: Vec<vk::DescriptorSet>,
    descriptor_pool: DescriptorPool,
    /// One [`MatrixBuffer`] per swapchain image.
    uniform_buffers: Vec<Buffer>,
}

/// Groups of [`FrameTargets`] objects, named for teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TargetPart {
    CommandBuffers,
    Framebuffers,
    Pipeline,
    RenderPass,
    DepthBuffer,
    DescriptorPool,
    UniformBuffers,
}

impl TargetPart {
    /// Each part is released before anything it references.
    const TEARDOWN_ORDER: [TargetPart; 7] = [
        TargetPart::CommandBuffers,
        TargetPart::Framebuffers,
        TargetPart::Pipeline,
        TargetPart::RenderPass,
        TargetPart::DepthBuffer,
        TargetPart::DescriptorPool,
        TargetPart::UniformBuffers,
    ];
}

impl FrameTargets {
    /// Frees the command buffers back to `pool` and destroys the remaining
    /// objects in [`TargetPart::TEARDOWN_ORDER`].
    ///
    /// The device must be idle.
    fn release(self, pool: &CommandPool) {
        let FrameTargets {
            command_buffers,
            framebuffers,
            pipeline,
            render_pass,
            depth_buffer,
            descriptor_sets,
            descriptor_pool,
            uniform_buffers,
        } = self;

        let mut command_buffers = Some(command_buffers);
        let mut framebuffers = Some(framebuffers);
        let mut pipeline = Some(pipeline);
        let mut render_pass = Some(render_pass);
        let mut depth_buffer = Some(depth_buffer);
        let mut descriptors = Some((descriptor_sets, descriptor_pool));
        let mut uniform_buffers = Some(uniform_buffers);

        for part in TargetPart::TEARDOWN_ORDER {
            match part {
                TargetPart::CommandBuffers => {
                    if let Some(buffers) = command_buffers.take() {
                        pool.free_command_buffers(&buffers);
                    }
                }
                TargetPart::Framebuffers => drop(framebuffers.take()),
                TargetPart::Pipeline => drop(pipeline.take()),
                TargetPart::RenderPass => drop(render_pass.take()),
                TargetPart::DepthBuffer => drop(depth_buffer.take()),
                // Sets are returned with their pool.
                TargetPart::DescriptorPool => drop(descriptors.take()),
                TargetPart::UniformBuffers => drop(uniform_buffers.take()),
            }
        }
        debug!("Frame targets released");
    }
}

/// Device-local mesh geometry.
struct MeshBuffers {
    vertex_buffer: Buffer,
    index_buffer: Buffer,
    index_count: u32,
}

impl MeshBuffers {
    fn upload(device: &Arc<Device>, pool: &CommandPool, mesh: &MeshData) -> RhiResult<Self> {
        let vertex_buffer = Buffer::new_device_local(
            device.clone(),
            pool,
            BufferUsage::Vertex,
            mesh.vertex_bytes(),
        )?;
        let index_buffer =
            Buffer::new_device_local(device.clone(), pool, BufferUsage::Index, mesh.index_bytes())?;

        Ok(Self {
            vertex_buffer,
            index_buffer,
            index_count: mesh.indices.len() as u32,
        })
    }
}

/// GPU side of the frame loop for a single spinning mesh.
pub struct RenderContext {
    targets: Option<FrameTargets>,
    mesh: MeshBuffers,
    pipeline_layout: PipelineLayout,
    descriptor_set_layout: DescriptorSetLayout,
    vertex_shader: Shader,
    fragment_shader: Shader,
    command_pool: CommandPool,
    swapchain: Swapchain,
    surface: Surface,
    device: Arc<Device>,
    instance: Instance,

    resize: ResizeSignal,
    depth_format: vk::Format,
    clear_color: [f32; 4],
    camera: Camera,
    spin: Spin,
    proj: glam::Mat4,
}

impl RenderContext {
    fn targets(&self) -> RhiResult<&FrameTargets> {
        self.targets.as_ref().ok_or_else(|| {
            RhiError::SwapchainError("frame targets are missing after a failed rebuild".to_string())
        })
    }

    /// Creates the swapchain-sized objects and records one command buffer per
    /// image.
    fn build_targets(&self) -> RhiResult<FrameTargets> {
        let extent = self.swapchain.extent();
        let image_count = self.swapchain.image_count();

        let depth_buffer = DepthBuffer::new(
            self.device.clone(),
            &self.command_pool,
            extent,
            self.depth_format,
        )?;
        let render_pass = RenderPass::color_depth(
            self.device.clone(),
            self.swapchain.format(),
            self.depth_format,
        )?;
        let pipeline = Pipeline::mesh(
            self.device.clone(),
            &MeshPipelineDesc {
                vertex_shader: &self.vertex_shader,
                fragment_shader: &self.fragment_shader,
                layout: &self.pipeline_layout,
                render_pass: &render_pass,
                extent,
                cull_mode: vk::CullModeFlags::BACK,
                polygon_mode: vk::PolygonMode::FILL,
            },
        )?;
        let framebuffers = Framebuffer::for_swapchain(
            &self.device,
            &render_pass,
            self.swapchain.image_views(),
            depth_buffer.image_view(),
            extent,
        )?;

        let uniform_buffers = (0..image_count)
            .map(|_| {
                Buffer::new(
                    self.device.clone(),
                    BufferUsage::Uniform,
                    MatrixBuffer::SIZE as vk::DeviceSize,
                )
            })
            .collect::<RhiResult<Vec<_>>>()?;

        let descriptor_pool =
            DescriptorPool::for_uniform_buffers(self.device.clone(), image_count as u32)?;
        let descriptor_sets =
            descriptor_pool.allocate(&self.descriptor_set_layout, image_count as u32)?;
        for (&set, buffer) in descriptor_sets.iter().zip(&uniform_buffers) {
            write_uniform_buffer(
                &self.device,
                set,
                buffer.handle(),
                MatrixBuffer::SIZE as vk::DeviceSize,
            );
        }

        let command_buffers = self
            .command_pool
            .allocate_command_buffers(image_count as u32)?;

        let targets = FrameTargets {
            command_buffers,
            framebuffers,
            pipeline,
            render_pass,
            depth_buffer,
            descriptor_sets,
            descriptor_pool,
            uniform_buffers,
        };
        self.record_command_buffers(&targets)?;

        debug!(
            "Built frame targets for {} image(s) at {}x{}, depth {:?}, {} descriptor set(s)",
            image_count,
            extent.width,
            extent.height,
            targets.depth_buffer.format(),
            targets.descriptor_pool.max_sets()
        );
        Ok(targets)
    }

    /// Records the fixed draw for every swapchain image.
    fn record_command_buffers(&self, targets: &FrameTargets) -> RhiResult<()> {
        let extent = self.swapchain.extent();
        let clear_values = [
            vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: self.clear_color,
                },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: 1.0,
                    stencil: 0,
                },
            },
        ];

        let per_image = targets
            .command_buffers
            .iter()
            .zip(&targets.framebuffers)
            .zip(&targets.descriptor_sets);

        for ((cmd, framebuffer), &descriptor_set) in per_image {
            cmd.begin_reusable()?;

            let begin_info = vk::RenderPassBeginInfo::default()
                .render_pass(targets.render_pass.handle())
                .framebuffer(framebuffer.handle())
                .render_area(full_scissor(extent))
                .clear_values(&clear_values);

            cmd.begin_render_pass(&begin_info);
            cmd.bind_graphics_pipeline(targets.pipeline.handle());
            cmd.bind_vertex_buffers(0, &[self.mesh.vertex_buffer.handle()], &[0]);
            cmd.bind_index_buffer(self.mesh.index_buffer.handle(), 0, vk::IndexType::UINT32);
            cmd.bind_graphics_descriptor_sets(self.pipeline_layout.handle(), &[descriptor_set]);
            cmd.draw_indexed(self.mesh.index_count, 1);
            cmd.end_render_pass();

            cmd.end()?;
        }

        Ok(())
    }

    fn destroy_targets(&mut self) {
        if let Some(targets) = self.targets.take() {
            targets.release(&self.command_pool);
        }
    }

    fn rebuild_targets(&mut self) -> RhiResult<()> {
        let targets = self.build_targets()?;
        let extent = self.swapchain.extent();
        self.proj = self
            .camera
            .projection(aspect_ratio(extent.width, extent.height));
        self.targets = Some(targets);
        Ok(())
    }
}

impl FrameBackend for RenderContext {
    type Slot = FrameSync;

    fn acquire_next_image(&mut self, slot: &FrameSync) -> Result<(u32, bool), vk::Result> {
        self.swapchain
            .acquire_next_image(slot.image_available_handle())
    }

    fn update_uniforms(&mut self, image_index: u32) -> RhiResult<()> {
        let matrices = MatrixBuffer {
            world: self.spin.world(),
            view: self.camera.view(),
            proj: self.proj,
        };

        let buffer = self
            .targets()?
            .uniform_buffers
            .get(image_index as usize)
            .ok_or_else(|| {
                RhiError::SwapchainError(format!("no uniform buffer for image {}", image_index))
            })?;
        buffer.write_data(0, bytemuck::bytes_of(&matrices))
    }

    fn submit(&mut self, slot: &FrameSync, image_index: u32) -> RhiResult<()> {
        let command_buffer = self
            .targets()?
            .command_buffers
            .get(image_index as usize)
            .ok_or_else(|| {
                RhiError::SwapchainError(format!("no command buffer for image {}", image_index))
            })?
            .handle();

        let wait_semaphores = [slot.image_available_handle()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [command_buffer];
        let signal_semaphores = [slot.render_finished_handle()];

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        // The slot fence was reset by the scheduler and every referenced
        // object lives in `self.targets`, which is only torn down after a
        // device-wide idle.
        unsafe {
            self.device
                .submit_graphics(&[submit_info], slot.in_flight_fence_handle())
        }
    }

    fn present(&mut self, slot: &FrameSync, image_index: u32) -> Result<bool, vk::Result> {
        self.swapchain.present(
            self.device.present_queue(),
            image_index,
            slot.render_finished_handle(),
        )
    }

    fn recreate_swapchain(&mut self) -> RhiResult<RecreateOutcome> {
        let (width, height) = self.resize.framebuffer_size();
        if width == 0 || height == 0 {
            debug!(
                "Framebuffer is {}x{}, deferring swapchain rebuild",
                width, height
            );
            return Ok(RecreateOutcome::Deferred);
        }

        debug!(
            "Rebuilding swapchain for surface {:?} at {}x{}",
            self.surface.handle(),
            width,
            height
        );
        self.device.wait_idle()?;
        self.destroy_targets();
        self.swapchain.recreate(width, height)?;
        self.rebuild_targets()?;

        Ok(RecreateOutcome::Rebuilt)
    }

    fn image_count(&self) -> usize {
        self.swapchain.image_count()
    }
}

/// Renders one mesh spinning in front of a fixed camera.
pub struct Renderer {
    scheduler: FrameScheduler<FrameSync>,
    context: RenderContext,
}

impl Renderer {
    /// Creates a renderer for `window`.
    ///
    /// Loads the mesh and SPIR-V shaders named in `config`, builds the
    /// swapchain and everything sized by it, and pre-records one command
    /// buffer per swapchain image.
    ///
    /// # Errors
    ///
    /// Returns an error if any Vulkan object cannot be created or an asset
    /// fails to load.
    pub fn new(window: &mut Window, config: &ViewerConfig) -> RendererResult<Self> {
        let resize = window.subscribe_resize();
        let (width, height) = window.framebuffer_size();

        info!("Initializing Vulkan renderer ({}x{})", width, height);

        let surface_extensions = window.required_extensions()?;
        let instance = Instance::new(c"vkframe", config.validation, &surface_extensions)?;
        let surface = window.create_surface(instance.entry(), instance.handle())?;

        let physical_device_info =
            select_physical_device(instance.handle(), surface.handle(), surface.loader())?;
        let device = Device::new(&instance, &physical_device_info)?;
        let depth_format = find_depth_format(&instance, &device)?;

        let swapchain = Swapchain::new(
            &instance,
            device.clone(),
            surface.handle(),
            surface.loader(),
            width,
            height,
        )?;
        let command_pool = CommandPool::new(device.clone(), device.graphics_family())?;

        let mesh_data = MeshData::load(&config.assets.mesh)?;
        let mesh = MeshBuffers::upload(&device, &command_pool, &mesh_data)?;

        let vertex_shader = Shader::from_spirv_file(
            device.clone(),
            &config.assets.vertex_shader,
            ShaderStage::Vertex,
        )?;
        let fragment_shader = Shader::from_spirv_file(
            device.clone(),
            &config.assets.fragment_shader,
            ShaderStage::Fragment,
        )?;

        let descriptor_set_layout = DescriptorSetLayout::uniform_buffer(device.clone())?;
        let pipeline_layout = PipelineLayout::new(device.clone(), &[descriptor_set_layout.handle()])?;

        let camera = Camera::from(&config.camera);
        let mut context = RenderContext {
            targets: None,
            mesh,
            pipeline_layout,
            descriptor_set_layout,
            vertex_shader,
            fragment_shader,
            command_pool,
            swapchain,
            surface,
            device,
            instance,
            resize,
            depth_format,
            clear_color: config.clear_color,
            camera,
            spin: Spin::new(config.spin_speed),
            proj: glam::Mat4::IDENTITY,
        };
        context.rebuild_targets()?;

        // Created after the context so a failure here still drops them
        // before the instance.
        let slots = (0..MAX_FRAMES_IN_FLIGHT)
            .map(|_| FrameSync::new(context.device.clone()))
            .collect::<RhiResult<Vec<_>>>()?;
        let scheduler = FrameScheduler::new(slots, context.image_count());

        info!(
            "Renderer initialized: {} swapchain images, {} frames in flight, {} triangles, validation {}",
            context.image_count(),
            MAX_FRAMES_IN_FLIGHT,
            mesh_data.triangle_count(),
            if context.instance.has_validation() { "on" } else { "off" }
        );

        Ok(Self { scheduler, context })
    }

    /// Advances the spin by `delta_time` seconds and renders one frame.
    ///
    /// A pending resize notification from the window is handed to the
    /// scheduler first, so the swapchain is rebuilt after this frame's
    /// present.
    ///
    /// # Errors
    ///
    /// Returns an error only for unrecoverable failures; stale swapchains are
    /// rebuilt in place and reported as [`FrameStatus::Dropped`].
    pub fn draw(&mut self, delta_time: f32) -> RhiResult<FrameStatus> {
        if self.context.resize.take() {
            debug!(
                "Window resized to {:?}",
                self.context.resize.framebuffer_size()
            );
            self.scheduler.notify_resized();
        }

        self.context.spin.advance(delta_time);
        self.scheduler.draw_frame(&mut self.context)
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        if let Err(e) = self.context.device.wait_idle() {
            error!("Renderer::drop: failed to wait for device idle: {}", e);
        }
        self.context.destroy_targets();
        info!("Renderer destroyed");
    }
}
