use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use ash::vk;
use crate::renderer::resources::pipeline::PipelineBuildError;

/// Where `build.rs` writes compiled SPIR-V
const SHADERS_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/shaders-built");

/// Path of a compiled shader, e.g. `shader_path("simple_shader.vert")`
pub fn shader_path(file_name: &str) -> PathBuf {
    Path::new(SHADERS_DIR).join(format!("{}.spv", file_name))
}

pub struct GraphicsShader {
    pub vert_mod: vk::ShaderModule,
    pub frag_mod: vk::ShaderModule,
    device: Arc<ash::Device>,
}

impl GraphicsShader {
    pub fn new(
        vert_path: &Path,
        frag_path: &Path,
        device: Arc<ash::Device>,
    ) -> Result<Self, PipelineBuildError> {
        let vert_mod = create_shader_module(vert_path, &device)?;
        let frag_mod = match create_shader_module(frag_path, &device) {
            Ok(module) => module,
            Err(e) => {
                unsafe { device.destroy_shader_module(vert_mod, None) };
                return Err(e);
            }
        };
        Ok(Self { vert_mod, frag_mod, device })
    }
}

impl Drop for GraphicsShader {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_shader_module(self.vert_mod, None);
            self.device.destroy_shader_module(self.frag_mod, None);
        }
    }
}

fn create_shader_module(
    filepath: &Path,
    device: &ash::Device,
) -> Result<vk::ShaderModule, PipelineBuildError> {
    let shader_load_error = |source| PipelineBuildError::ShaderLoad {
        path: filepath.to_path_buf(),
        source,
    };
    let mut file = File::open(filepath).map_err(shader_load_error)?;
    // read_spv checks the size and realigns the bytes to u32 words
    let code = ash::util::read_spv(&mut file).map_err(shader_load_error)?;

    let shader_module_info = vk::ShaderModuleCreateInfo::default()
        .code(&code);

    unsafe {
        device
            .create_shader_module(&shader_module_info, None)
            .map_err(PipelineBuildError::ShaderModule)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shader_path_keeps_stage_in_name() {
        let path = shader_path("simple_shader.frag");
        assert!(path.ends_with("shaders-built/simple_shader.frag.spv"));
    }
}
