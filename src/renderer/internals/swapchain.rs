use std::sync::Arc;
use ash::prelude::VkResult;
use ash::vk;
use color_eyre::eyre::OptionExt;
use color_eyre::Result;
use crate::renderer::backend::{Acquire, Extent, SwapchainExt, SwapchainStatus};
use crate::renderer::config::RenderConfig;
use crate::renderer::contexts::device_ctx::device::RenderDevice;
use crate::renderer::contexts::frame_ctx::frame::Frame;
use crate::renderer::contexts::frame_ctx::FrameSlots;
use crate::renderer::internals::render_pass::RenderPass;
use crate::renderer::resources::image::Image;

/// Everything that exists once per presentable image
struct SwapchainImage {
    framebuffer: vk::Framebuffer,
    view: vk::ImageView,
    depth: Image,
    device: Arc<ash::Device>,
}

impl SwapchainImage {
    fn new(
        image: vk::Image,
        format: vk::Format,
        depth_format: vk::Format,
        extent: vk::Extent2D,
        render_pass: vk::RenderPass,
        dev: &RenderDevice,
    ) -> Result<Self> {
        let device = dev.logical.clone();

        let view = {
            let view_info = vk::ImageViewCreateInfo::default()
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(format)
                .components(vk::ComponentMapping {
                    r: vk::ComponentSwizzle::R,
                    g: vk::ComponentSwizzle::G,
                    b: vk::ComponentSwizzle::B,
                    a: vk::ComponentSwizzle::A,
                })
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                })
                .image(image);
            unsafe { device.create_image_view(&view_info, None)? }
        };

        let depth = Image::new_depth_image(
            extent.width,
            extent.height,
            depth_format,
            dev.memory_allocator(),
            device.clone(),
        )?;

        let framebuffer = {
            let attachments = [view, depth.view];
            let framebuffer_info = vk::FramebufferCreateInfo::default()
                .render_pass(render_pass)
                .attachments(&attachments)
                .width(extent.width)
                .height(extent.height)
                .layers(1);
            unsafe { device.create_framebuffer(&framebuffer_info, None)? }
        };

        Ok(Self {
            framebuffer,
            view,
            depth,
            device,
        })
    }
}

impl Drop for SwapchainImage {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_framebuffer(self.framebuffer, None);
            self.device.destroy_image_view(self.view, None);
        }
    }
}

struct SwapchainHandle {
    handle: vk::SwapchainKHR,
    loader: ash::khr::swapchain::Device,
}

impl Drop for SwapchainHandle {
    fn drop(&mut self) {
        unsafe {
            self.loader.destroy_swapchain(self.handle, None);
        }
    }
}

/// Presentable images of the window surface and the resources sized after them.
///
/// Responsibilities:
/// - Create the swapchain, reusing the render pass and sync objects of a previous one
/// - Keep one image view, depth image and framebuffer per swapchain image
/// - Throttle the CPU with one fence per in-flight slot
pub struct Swapchain {
    // Field order is drop order: per-image resources go before the swapchain itself
    images: Vec<SwapchainImage>,
    // Fence of the slot that last rendered into each image, null if none yet
    images_in_flight: Vec<vk::Fence>,
    frames: Vec<Frame>,
    slots: FrameSlots,
    render_pass: RenderPass,
    handle: SwapchainHandle,

    surface_format: vk::SurfaceFormatKHR,
    depth_format: vk::Format,
    present_mode: vk::PresentModeKHR,
    extent: vk::Extent2D,
    timeout_ns: u64,

    graphics_queue: vk::Queue,
    present_queue: vk::Queue,
    device: Arc<ash::Device>,
}

impl Swapchain {
    pub fn new(
        dev: &RenderDevice,
        extent: Extent,
        previous: Option<Swapchain>,
        config: &RenderConfig,
    ) -> Result<Self> {
        let surface = dev.surface();
        let capabilities = surface.capabilities(dev.physical)?;
        let image_extent = extent_from_capabilities(&capabilities, extent.into());
        let min_image_count = choose_image_count(&capabilities);

        let (
            surface_format,
            depth_format,
            present_mode,
            render_pass,
            frames,
            slots,
            old_handle,
        ) = match previous {
            Some(previous) => {
                let Swapchain {
                    images,
                    frames,
                    slots,
                    render_pass,
                    handle,
                    surface_format,
                    depth_format,
                    present_mode,
                    ..
                } = previous;
                // The old images can go now; only the handle is needed to create the new swapchain
                drop(images);
                (surface_format, depth_format, present_mode, render_pass, frames, slots, Some(handle))
            }
            None => {
                let surface_format = choose_surface_format(&surface.formats(dev.physical)?)
                    .ok_or_eyre("Surface reports no formats")?;
                let present_mode = choose_present_mode(
                    &surface.present_modes(dev.physical)?,
                    config.vsync,
                );
                let depth_format = dev.find_depth_format()?;
                let render_pass = RenderPass::new(
                    dev.logical.clone(),
                    surface_format.format,
                    depth_format,
                )?;
                let frames = (0..config.max_frames_in_flight)
                    .map(|_| Frame::new(dev.logical.clone()))
                    .collect::<Result<Vec<_>>>()?;
                let slots = FrameSlots::new(config.max_frames_in_flight);
                (surface_format, depth_format, present_mode, render_pass, frames, slots, None)
            }
        };

        let queue_family_indices = [
            dev.graphics_queue.family.index,
            dev.present_queue.family.index,
        ];
        let swapchain_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface.handle)
            .min_image_count(min_image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(image_extent)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .pre_transform(capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .image_array_layers(1)
            .old_swapchain(old_handle.as_ref().map_or(vk::SwapchainKHR::null(), |old| old.handle));
        let swapchain_info = if dev.graphics_queue.family != dev.present_queue.family {
            swapchain_info
                .image_sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(&queue_family_indices)
        } else {
            swapchain_info.image_sharing_mode(vk::SharingMode::EXCLUSIVE)
        };

        let loader = dev.swapchain_loader().clone();
        let handle = SwapchainHandle {
            handle: unsafe { loader.create_swapchain(&swapchain_info, None)? },
            loader,
        };
        // Retired by the create call above
        drop(old_handle);

        let images = unsafe { handle.loader.get_swapchain_images(handle.handle)? }
            .into_iter()
            .map(|image| {
                SwapchainImage::new(
                    image,
                    surface_format.format,
                    depth_format,
                    image_extent,
                    render_pass.handle,
                    dev,
                )
            })
            .collect::<Result<Vec<_>>>()?;
        let images_in_flight = vec![vk::Fence::null(); images.len()];

        log::info!(
            "Created swapchain: {}x{}, {} images, {:?}, {:?}, {} frames in flight",
            image_extent.width,
            image_extent.height,
            images.len(),
            surface_format.format,
            present_mode,
            slots.count(),
        );

        Ok(Self {
            images,
            images_in_flight,
            frames,
            slots,
            render_pass,
            handle,

            surface_format,
            depth_format,
            present_mode,
            extent: image_extent,
            timeout_ns: config.acquire_timeout_ns(),

            graphics_queue: dev.graphics_queue.handle,
            present_queue: dev.present_queue.handle,
            device: dev.logical.clone(),
        })
    }
}

impl SwapchainExt for Swapchain {
    type CommandBuffer = vk::CommandBuffer;
    type RenderPass = vk::RenderPass;

    fn image_count(&self) -> usize {
        self.images.len()
    }

    fn extent(&self) -> Extent {
        self.extent.into()
    }

    fn render_pass(&self) -> vk::RenderPass {
        self.render_pass.handle
    }

    fn acquire_next_image(&mut self) -> Result<Acquire> {
        let frame = &self.frames[self.slots.current()];
        unsafe {
            self.device
                .wait_for_fences(&[frame.in_flight_fence], true, self.timeout_ns)?;
        }

        let acquired = unsafe {
            self.handle.loader.acquire_next_image(
                self.handle.handle,
                self.timeout_ns,
                frame.image_available,
                vk::Fence::null(),
            )
        };
        let (index, suboptimal) = match acquired {
            Ok(acquired) => acquired,
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => return Ok(Acquire::SurfaceStale),
            Err(e) => return Err(e.into()),
        };

        // An earlier slot may still be rendering into this image
        let image_fence = self.images_in_flight[index as usize];
        if image_fence != vk::Fence::null() {
            unsafe {
                self.device
                    .wait_for_fences(&[image_fence], true, self.timeout_ns)?;
            }
        }

        Ok(Acquire::Image { index, suboptimal })
    }

    fn submit_command_buffers(
        &mut self,
        command_buffer: vk::CommandBuffer,
        image_index: u32,
    ) -> Result<SwapchainStatus> {
        let frame = &self.frames[self.slots.current()];
        self.images_in_flight[image_index as usize] = frame.in_flight_fence;

        let wait_semaphores = [frame.image_available];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [command_buffer];
        let signal_semaphores = [frame.render_finished];
        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            self.device.reset_fences(&[frame.in_flight_fence])?;
            self.device.queue_submit(
                self.graphics_queue,
                &[submit_info],
                frame.in_flight_fence,
            )?;
        }

        let swapchains = [self.handle.handle];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&signal_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);
        let presented: VkResult<bool> = unsafe {
            self.handle.loader.queue_present(self.present_queue, &present_info)
        };

        self.slots.advance();

        match presented {
            Ok(false) => Ok(SwapchainStatus::Success),
            Ok(true) => Ok(SwapchainStatus::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(SwapchainStatus::SurfaceStale),
            Err(e) => Err(e.into()),
        }
    }

    fn cmd_begin_render_pass(
        &self,
        command_buffer: vk::CommandBuffer,
        image_index: u32,
        clear_color: [f32; 4],
    ) {
        let clear_values = [
            vk::ClearValue {
                color: vk::ClearColorValue { float32: clear_color },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue { depth: 1.0, stencil: 0 },
            },
        ];
        let render_pass_info = vk::RenderPassBeginInfo::default()
            .render_pass(self.render_pass.handle)
            .framebuffer(self.images[image_index as usize].framebuffer)
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: self.extent,
            })
            .clear_values(&clear_values);

        unsafe {
            self.device.cmd_begin_render_pass(
                command_buffer,
                &render_pass_info,
                vk::SubpassContents::INLINE,
            );
        }
    }

    fn cmd_set_viewport_and_scissor(&self, command_buffer: vk::CommandBuffer) {
        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: self.extent.width as f32,
            height: self.extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        let scissor = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: self.extent,
        };
        unsafe {
            self.device.cmd_set_viewport(command_buffer, 0, &[viewport]);
            self.device.cmd_set_scissor(command_buffer, 0, &[scissor]);
        }
    }

    fn cmd_end_render_pass(&self, command_buffer: vk::CommandBuffer) {
        unsafe {
            self.device.cmd_end_render_pass(command_buffer);
        }
    }
}

/// B8G8R8A8_SRGB with non-linear sRGB if offered, otherwise whatever comes first
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .find(|format| {
            format.format == vk::Format::B8G8R8A8_SRGB
                && format.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| {
            let fallback = formats.first();
            if let Some(format) = fallback {
                log::warn!("Preferred surface format unavailable, using {:?}", format.format);
            }
            fallback
        })
        .copied()
}

/// FIFO is the only mode every surface supports, so it is the vsync mode and the fallback
pub fn choose_present_mode(modes: &[vk::PresentModeKHR], vsync: bool) -> vk::PresentModeKHR {
    if !vsync && modes.contains(&vk::PresentModeKHR::MAILBOX) {
        vk::PresentModeKHR::MAILBOX
    } else {
        vk::PresentModeKHR::FIFO
    }
}

pub fn extent_from_capabilities(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    desired: vk::Extent2D,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        capabilities.current_extent
    } else {
        vk::Extent2D {
            width: desired.width.clamp(
                capabilities.min_image_extent.width,
                capabilities.max_image_extent.width,
            ),
            height: desired.height.clamp(
                capabilities.min_image_extent.height,
                capabilities.max_image_extent.height,
            ),
        }
    }
}

pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let min = capabilities.min_image_count;
    let max = capabilities.max_image_count;
    // Recommended to request at least one more image than the minimum
    // to prevent having to wait on driver to complete internal operations
    // before another image can be acquired
    if max > 0 && min + 1 > max {
        max
    } else {
        min + 1
    }
}
