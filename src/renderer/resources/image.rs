use std::sync::{Arc, Mutex};
use ash::vk;
use color_eyre::eyre::Result;
use color_eyre::eyre::eyre;
use gpu_allocator::{
    vulkan::{Allocation, AllocationCreateDesc, AllocationScheme, Allocator},
    MemoryLocation,
};

pub struct ImageCreateInfo {
    pub format: vk::Format,
    pub extent: vk::Extent3D,
    pub usage: vk::ImageUsageFlags,
    pub aspect: vk::ImageAspectFlags,
    pub name: String,
}

/// GPU-only image with a single view covering it
pub struct Image {
    pub image: vk::Image,
    pub view: vk::ImageView,

    allocation: Option<Allocation>,
    memory_allocator: Arc<Mutex<Allocator>>,
    device: Arc<ash::Device>,
}

impl Image {
    fn new(
        create_info: &ImageCreateInfo,
        memory_allocator: Arc<Mutex<Allocator>>,
        device: Arc<ash::Device>,
    ) -> Result<Self> {
        let image = {
            let info = vk::ImageCreateInfo::default()
                .format(create_info.format)
                .usage(create_info.usage)
                .extent(create_info.extent)
                .image_type(vk::ImageType::TYPE_2D)
                .mip_levels(1)
                .array_layers(1)
                .samples(vk::SampleCountFlags::TYPE_1)
                .tiling(vk::ImageTiling::OPTIMAL)
                .initial_layout(vk::ImageLayout::UNDEFINED)
                .sharing_mode(vk::SharingMode::EXCLUSIVE);
            unsafe { device.create_image(&info, None)? }
        };
        let allocation = match bind_memory(image, &create_info.name, &memory_allocator, &device) {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { device.destroy_image(image, None) };
                return Err(e);
            }
        };

        let view_info = vk::ImageViewCreateInfo::default()
            .view_type(vk::ImageViewType::TYPE_2D)
            .image(image)
            .format(create_info.format)
            .subresource_range(vk::ImageSubresourceRange {
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
                aspect_mask: create_info.aspect,
            });
        // From here on Drop owns the cleanup; a null view is ignored by destroy_image_view
        let mut result = Self {
            image,
            view: vk::ImageView::null(),

            allocation: Some(allocation),
            memory_allocator,
            device,
        };
        result.view = unsafe { result.device.create_image_view(&view_info, None)? };

        Ok(result)
    }

    /// Create a special type of image used for depth buffer
    pub fn new_depth_image(
        width: u32,
        height: u32,
        format: vk::Format,
        memory_allocator: Arc<Mutex<Allocator>>,
        device: Arc<ash::Device>,
    ) -> Result<Self> {
        let create_info = ImageCreateInfo {
            format,
            extent: vk::Extent3D {
                width,
                height,
                depth: 1,
            },
            usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            aspect: depth_aspect(format),
            name: "Depth Image".into(),
        };
        Self::new(&create_info, memory_allocator, device)
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_image_view(self.view, None);
        }
        if let Some(allocation) = self.allocation.take() {
            match self.memory_allocator.lock() {
                Ok(mut allocator) => {
                    if let Err(e) = allocator.free(allocation) {
                        log::error!("Failed to free image memory: {}", e);
                    }
                }
                Err(e) => log::error!("Memory allocator lock poisoned: {}", e),
            }
        }
        unsafe {
            self.device.destroy_image(self.image, None);
        }
    }
}

/// Allocate dedicated memory for `image` and bind it, freeing the allocation again if binding fails
fn bind_memory(
    image: vk::Image,
    name: &str,
    memory_allocator: &Mutex<Allocator>,
    device: &ash::Device,
) -> Result<Allocation> {
    let requirements = unsafe { device.get_image_memory_requirements(image) };
    let mut allocator = memory_allocator
        .lock()
        .map_err(|e| eyre!(e.to_string()))?;
    let allocation = allocator.allocate(&AllocationCreateDesc {
        name,
        requirements,
        location: MemoryLocation::GpuOnly,
        linear: false,
        allocation_scheme: AllocationScheme::DedicatedImage(image),
    })?;

    let bound = unsafe {
        device.bind_image_memory(image, allocation.memory(), allocation.offset())
    };
    if let Err(e) = bound {
        if let Err(free_err) = allocator.free(allocation) {
            log::error!("Failed to free image memory after bind failure: {}", free_err);
        }
        return Err(e.into());
    }

    Ok(allocation)
}

/// Views of combined depth/stencil formats must cover both aspects to be used as attachments
pub fn depth_aspect(format: vk::Format) -> vk::ImageAspectFlags {
    match format {
        vk::Format::D16_UNORM_S8_UINT
        | vk::Format::D24_UNORM_S8_UINT
        | vk::Format::D32_SFLOAT_S8_UINT => {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        }
        _ => vk::ImageAspectFlags::DEPTH,
    }
}
