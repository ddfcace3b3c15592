use ash::vk;
use color_eyre::Result;
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use crate::renderer::contexts::device_ctx::instance::RenderInstance;

/// Vulkan surface of the window the renderer presents to
pub struct Surface {
    pub handle: vk::SurfaceKHR,
    pub loader: ash::khr::surface::Instance,
}

impl Surface {
    pub fn new(
        instance: &RenderInstance,
        display_handle: RawDisplayHandle,
        window_handle: RawWindowHandle,
    ) -> Result<Self> {
        let handle = unsafe {
            ash_window::create_surface(
                &instance.entry,
                &instance.instance,
                display_handle,
                window_handle,
                None,
            )?
        };
        let loader = ash::khr::surface::Instance::new(&instance.entry, &instance.instance);
        Ok(Self { handle, loader })
    }

    pub fn capabilities(&self, physical: vk::PhysicalDevice) -> Result<vk::SurfaceCapabilitiesKHR> {
        Ok(unsafe {
            self.loader
                .get_physical_device_surface_capabilities(physical, self.handle)?
        })
    }

    pub fn formats(&self, physical: vk::PhysicalDevice) -> Result<Vec<vk::SurfaceFormatKHR>> {
        Ok(unsafe {
            self.loader
                .get_physical_device_surface_formats(physical, self.handle)?
        })
    }

    pub fn present_modes(&self, physical: vk::PhysicalDevice) -> Result<Vec<vk::PresentModeKHR>> {
        Ok(unsafe {
            self.loader
                .get_physical_device_surface_present_modes(physical, self.handle)?
        })
    }

    pub fn supports_queue_family(&self, physical: vk::PhysicalDevice, family_index: u32) -> bool {
        unsafe {
            self.loader
                .get_physical_device_surface_support(physical, family_index, self.handle)
                .unwrap_or(false)
        }
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        unsafe {
            self.loader.destroy_surface(self.handle, None);
        }
    }
}
