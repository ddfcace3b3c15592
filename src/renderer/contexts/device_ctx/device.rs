use std::ffi::{c_char, CStr};
use std::mem::ManuallyDrop;
use std::sync::{Arc, Mutex};
use ash::vk;
use color_eyre::eyre::{eyre, OptionExt};
use color_eyre::Result;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use smallvec::SmallVec;
use crate::renderer::backend::{Extent, RenderDeviceExt};
use crate::renderer::config::RenderConfig;
use crate::renderer::contexts::device_ctx::instance::RenderInstance;
use crate::renderer::contexts::device_ctx::queue::{find_queue_families, Queue, QueueFamily};
use crate::renderer::contexts::device_ctx::surface::Surface;
use crate::renderer::internals::swapchain::Swapchain;

/// Depth formats in order of preference
const DEPTH_FORMAT_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
];

/// Logical device plus everything the frame loop allocates from it.
///
/// Responsibilities:
/// - Pick a physical device that can render to and present on the window surface
/// - Own the graphics and present queues and the command pool
/// - Own the GPU memory allocator
pub struct RenderDevice {
    pub logical: Arc<ash::Device>,
    pub physical: vk::PhysicalDevice,

    pub graphics_queue: Queue,
    pub present_queue: Queue,

    command_pool: vk::CommandPool,
    memory_allocator: ManuallyDrop<Arc<Mutex<Allocator>>>,
    swapchain_loader: ash::khr::swapchain::Device,

    // Destroyed after the logical device
    surface: Surface,
    instance: RenderInstance,
}

impl RenderDevice {
    pub fn new<W: HasDisplayHandle + HasWindowHandle>(window: &W) -> Result<Self> {
        let display_handle = window.display_handle()?.as_raw();
        let window_handle = window.window_handle()?.as_raw();

        let instance = RenderInstance::new(display_handle)?;
        let surface = Surface::new(&instance, display_handle, window_handle)?;

        let (
            physical_device,
            graphics_queue_family,
            present_queue_family,
        ) = Self::select_physical_device(&instance.instance, &surface)?;

        let (
            logical_device,
            graphics_queue,
            present_queue,
        ) = Self::create_logical_device(
            &instance.instance,
            physical_device,
            graphics_queue_family,
            present_queue_family,
        )?;

        let memory_allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.instance.clone(),
            device: logical_device.clone(),
            physical_device,
            debug_settings: gpu_allocator::AllocatorDebugSettings {
                log_memory_information: cfg!(debug_assertions),
                log_leaks_on_shutdown: true,
                store_stack_traces: false,
                log_allocations: false,
                log_frees: false,
                log_stack_traces: false,
            },
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        })?;

        let command_pool = {
            let command_pool_info = vk::CommandPoolCreateInfo::default()
                .queue_family_index(graphics_queue.family.index)
                // Allow the pool to reset individual command buffers
                .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
            unsafe { logical_device.create_command_pool(&command_pool_info, None)? }
        };

        let swapchain_loader = ash::khr::swapchain::Device::new(
            &instance.instance,
            &logical_device,
        );

        let props = unsafe { instance.instance.get_physical_device_properties(physical_device) };
        log::info!(
            "Selected physical device: {:?} ({:?})",
            props.device_name_as_c_str().unwrap_or(c"<unknown>"),
            props.device_type,
        );

        Ok(Self {
            logical: Arc::new(logical_device),
            physical: physical_device,

            graphics_queue,
            present_queue,

            command_pool,
            memory_allocator: ManuallyDrop::new(Arc::new(Mutex::new(memory_allocator))),
            swapchain_loader,

            surface,
            instance,
        })
    }

    pub fn memory_allocator(&self) -> Arc<Mutex<Allocator>> {
        Arc::clone(&self.memory_allocator)
    }

    pub fn surface(&self) -> &Surface {
        &self.surface
    }

    pub fn swapchain_loader(&self) -> &ash::khr::swapchain::Device {
        &self.swapchain_loader
    }

    pub fn find_supported_format(
        &self,
        candidates: &[vk::Format],
        tiling: vk::ImageTiling,
        features: vk::FormatFeatureFlags,
    ) -> Result<vk::Format> {
        candidates
            .iter()
            .copied()
            .find(|format| {
                let props = unsafe {
                    self.instance
                        .instance
                        .get_physical_device_format_properties(self.physical, *format)
                };
                match tiling {
                    vk::ImageTiling::LINEAR => props.linear_tiling_features.contains(features),
                    vk::ImageTiling::OPTIMAL => props.optimal_tiling_features.contains(features),
                    _ => false,
                }
            })
            .ok_or_eyre("Failed to find supported format")
    }

    pub fn find_depth_format(&self) -> Result<vk::Format> {
        self.find_supported_format(
            &DEPTH_FORMAT_CANDIDATES,
            vk::ImageTiling::OPTIMAL,
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
        )
    }

    fn select_physical_device(
        instance: &ash::Instance,
        surface: &Surface,
    ) -> Result<(vk::PhysicalDevice, QueueFamily, QueueFamily)> {
        let req_device_exts = Self::get_required_device_extensions();

        unsafe {
            instance
                .enumerate_physical_devices()?
                .into_iter()
                // Filter out devices that do not contain the required device extensions
                .filter(|device| {
                    let supported_extensions = instance
                        .enumerate_device_extension_properties(*device)
                        .unwrap_or_default();

                    req_device_exts.iter().all(|req_ext| {
                        let req_ext_supported = supported_extensions
                            .iter()
                            .any(|sup_ext| sup_ext.extension_name_as_c_str().is_ok_and(|name| name == *req_ext));
                        if !req_ext_supported {
                            log::debug!("Device extension not supported: {:?}", req_ext);
                        }
                        req_ext_supported
                    })
                })
                // A swapchain needs at least one format and one present mode
                .filter(|device| {
                    let has_formats = surface.formats(*device).is_ok_and(|f| !f.is_empty());
                    let has_present_modes = surface.present_modes(*device).is_ok_and(|m| !m.is_empty());
                    has_formats && has_present_modes
                })
                // Filter out devices that do not contain the required queues
                .filter_map(|device| {
                    let props = instance.get_physical_device_queue_family_properties(device);
                    let (graphics_index, present_index) = find_queue_families(
                        &props,
                        |i| surface.supports_queue_family(device, i),
                    )?;
                    Some((
                        device,
                        QueueFamily::new(graphics_index),
                        QueueFamily::new(present_index),
                    ))
                })
                .min_by_key(|(device, _, _)| {
                    let props = instance.get_physical_device_properties(*device);
                    match props.device_type {
                        vk::PhysicalDeviceType::DISCRETE_GPU => 0,
                        vk::PhysicalDeviceType::INTEGRATED_GPU => 1,
                        vk::PhysicalDeviceType::VIRTUAL_GPU => 2,
                        vk::PhysicalDeviceType::CPU => 3,
                        vk::PhysicalDeviceType::OTHER => 4,
                        _ => 5,
                    }
                })
                .ok_or_eyre("No suitable physical device found")
        }
    }

    fn create_logical_device(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        graphics_queue_family: QueueFamily,
        present_queue_family: QueueFamily,
    ) -> Result<(ash::Device, Queue, Queue)> {
        let queue_priorities = [1.0];
        let mut queue_create_infos: SmallVec<[vk::DeviceQueueCreateInfo; 2]> = SmallVec::new();
        queue_create_infos.push(
            vk::DeviceQueueCreateInfo::default()
                .queue_family_index(graphics_queue_family.index)
                .queue_priorities(&queue_priorities),
        );
        if present_queue_family != graphics_queue_family {
            queue_create_infos.push(
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(present_queue_family.index)
                    .queue_priorities(&queue_priorities),
            );
        }

        // Create device
        let device = {
            let enabled_extension_names = Self::get_required_device_extensions()
                .iter()
                .map(|ext| ext.as_ptr())
                .collect::<Vec<*const c_char>>();
            let enabled_features = vk::PhysicalDeviceFeatures::default();

            let device_create_info = vk::DeviceCreateInfo::default()
                .queue_create_infos(&queue_create_infos)
                .enabled_extension_names(&enabled_extension_names)
                .enabled_features(&enabled_features);

            unsafe {
                instance.create_device(physical_device, &device_create_info, None)?
            }
        };

        let graphics_queue = unsafe {
            let queue = device.get_device_queue(graphics_queue_family.index, 0);
            Queue::new(graphics_queue_family, queue)
        };
        let present_queue = unsafe {
            let queue = device.get_device_queue(present_queue_family.index, 0);
            Queue::new(present_queue_family, queue)
        };

        Ok((device, graphics_queue, present_queue))
    }

    fn get_required_device_extensions() -> Vec<&'static CStr> {
        vec![
            ash::khr::swapchain::NAME,

            #[cfg(target_os = "macos")]
            ash::khr::portability_subset::NAME,
        ]
    }
}

impl RenderDeviceExt for RenderDevice {
    type CommandBuffer = vk::CommandBuffer;
    type Swapchain = Swapchain;

    fn wait_idle(&self) -> Result<()> {
        unsafe {
            self.logical.device_wait_idle()?;
        }
        Ok(())
    }

    fn create_swapchain(
        &self,
        extent: Extent,
        previous: Option<Swapchain>,
        config: &RenderConfig,
    ) -> Result<Swapchain> {
        Swapchain::new(self, extent, previous, config)
    }

    fn allocate_command_buffers(&self, count: usize) -> Result<Vec<vk::CommandBuffer>> {
        let command_buffer_count = u32::try_from(count)
            .map_err(|_| eyre!("Too many command buffers requested: {}", count))?;
        let command_buffer_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.command_pool)
            .command_buffer_count(command_buffer_count)
            .level(vk::CommandBufferLevel::PRIMARY);
        Ok(unsafe {
            self.logical.allocate_command_buffers(&command_buffer_info)?
        })
    }

    fn free_command_buffers(&self, command_buffers: &[vk::CommandBuffer]) {
        unsafe {
            self.logical.free_command_buffers(self.command_pool, command_buffers);
        }
    }

    fn begin_command_buffer(&self, command_buffer: vk::CommandBuffer) -> Result<()> {
        // The pool allows per-buffer reset, so beginning implicitly resets the previous recording
        let begin_info = vk::CommandBufferBeginInfo::default();
        unsafe {
            self.logical.begin_command_buffer(command_buffer, &begin_info)?;
        }
        Ok(())
    }

    fn end_command_buffer(&self, command_buffer: vk::CommandBuffer) -> Result<()> {
        unsafe {
            self.logical.end_command_buffer(command_buffer)?;
        }
        Ok(())
    }
}

impl Drop for RenderDevice {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = self.logical.device_wait_idle() {
                log::error!("Failed to wait for device idle on device drop: {}", e);
            }
            self.logical.destroy_command_pool(self.command_pool, None);
            // The allocator frees its memory blocks through the device, so it goes first
            ManuallyDrop::drop(&mut self.memory_allocator);
            self.logical.destroy_device(None);
        }
    }
}
