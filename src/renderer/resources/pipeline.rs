use std::path::{Path, PathBuf};
use std::sync::Arc;
use ash::vk;
use color_eyre::Result;
use thiserror::Error;
use crate::renderer::resources::shader::GraphicsShader;
use crate::renderer::resources::vertex::VertexInputDescription;

#[derive(Debug, Error)]
pub enum PipelineBuildError {
    #[error("cannot create graphics pipeline: no pipeline layout provided in config")]
    MissingPipelineLayout,
    #[error("cannot create graphics pipeline: no render pass provided in config")]
    MissingRenderPass,
    #[error("failed to load shader {path:?}")]
    ShaderLoad {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to create shader module: {0}")]
    ShaderModule(vk::Result),
    #[error("failed to create graphics pipeline: {0}")]
    Compile(vk::Result),
}

/// Fixed-function state of a graphics pipeline.
///
/// Starts from the defaults below and is adjusted with the `with_*` methods.
/// The render pass and pipeline layout are borrowed handles; both must outlive
/// any pipeline built from this config.
#[derive(Clone)]
pub struct PipelineConfig {
    pub vertex_input: VertexInputDescription,
    pub input_assembly: vk::PipelineInputAssemblyStateCreateInfo<'static>,
    pub rasterization: vk::PipelineRasterizationStateCreateInfo<'static>,
    pub multisample: vk::PipelineMultisampleStateCreateInfo<'static>,
    pub color_blend_attachment: vk::PipelineColorBlendAttachmentState,
    pub depth_stencil: vk::PipelineDepthStencilStateCreateInfo<'static>,
    pub dynamic_states: Vec<vk::DynamicState>,
    pub pipeline_layout: Option<vk::PipelineLayout>,
    pub render_pass: Option<vk::RenderPass>,
    pub subpass: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            vertex_input: VertexInputDescription::default(),
            input_assembly: Self::default_input_assembly_info(),
            rasterization: Self::default_rasterization_info(),
            multisample: Self::default_multisample_info(),
            color_blend_attachment: Self::default_color_blend_state(),
            depth_stencil: Self::default_depth_stencil_info(),
            // Viewport and scissor are set per frame so a resize never needs a new pipeline
            dynamic_states: vec![vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR],
            pipeline_layout: None,
            render_pass: None,
            subpass: 0,
        }
    }
}

impl PipelineConfig {
    pub fn with_pipeline_layout(mut self, layout: vk::PipelineLayout) -> Self {
        self.pipeline_layout = Some(layout);
        self
    }

    pub fn with_render_pass(mut self, render_pass: vk::RenderPass, subpass: u32) -> Self {
        self.render_pass = Some(render_pass);
        self.subpass = subpass;
        self
    }

    pub fn with_vertex_input(mut self, description: VertexInputDescription) -> Self {
        self.vertex_input = description;
        self
    }

    pub fn with_input_topology(mut self, topology: vk::PrimitiveTopology) -> Self {
        self.input_assembly.topology = topology;
        self.input_assembly.primitive_restart_enable = vk::FALSE;
        self
    }

    pub fn with_polygon_mode(mut self, mode: vk::PolygonMode) -> Self {
        self.rasterization.polygon_mode = mode;
        self.rasterization.line_width = 1.0;
        self
    }

    pub fn with_cull_mode(
        mut self,
        cull_mode: vk::CullModeFlags,
        front_face: vk::FrontFace,
    ) -> Self {
        self.rasterization.cull_mode = cull_mode;
        self.rasterization.front_face = front_face;
        self
    }

    // Make sure the transparent object is rendered AFTER the opaque ones
    pub fn with_alpha_blending_enabled(mut self) -> Self {
        let blend = &mut self.color_blend_attachment;
        blend.color_write_mask = vk::ColorComponentFlags::RGBA;
        blend.blend_enable = vk::TRUE;
        blend.src_color_blend_factor = vk::BlendFactor::SRC_ALPHA;
        blend.dst_color_blend_factor = vk::BlendFactor::ONE_MINUS_SRC_ALPHA;
        blend.color_blend_op = vk::BlendOp::ADD;
        blend.src_alpha_blend_factor = vk::BlendFactor::ONE;
        blend.dst_alpha_blend_factor = vk::BlendFactor::ZERO;
        blend.alpha_blend_op = vk::BlendOp::ADD;
        self
    }

    pub fn with_depth_test(
        mut self,
        enable: bool,
        compare: Option<vk::CompareOp>,
    ) -> Self {
        self.depth_stencil.depth_test_enable = enable.into();
        self.depth_stencil.depth_write_enable = enable.into();
        self.depth_stencil.depth_compare_op = if enable {
            compare.unwrap_or(vk::CompareOp::LESS)
        } else {
            vk::CompareOp::ALWAYS
        };
        self
    }

    /// A pipeline can't be built without somewhere to bind resources and something to render into
    pub fn validate(&self) -> Result<(vk::PipelineLayout, vk::RenderPass), PipelineBuildError> {
        let layout = self
            .pipeline_layout
            .ok_or(PipelineBuildError::MissingPipelineLayout)?;
        let render_pass = self
            .render_pass
            .ok_or(PipelineBuildError::MissingRenderPass)?;
        Ok((layout, render_pass))
    }

    fn default_input_assembly_info() -> vk::PipelineInputAssemblyStateCreateInfo<'static> {
        vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false)
    }

    fn default_rasterization_info() -> vk::PipelineRasterizationStateCreateInfo<'static> {
        vk::PipelineRasterizationStateCreateInfo::default()
            .depth_clamp_enable(false)
            // Discards all primitives before rasterization stage if true
            .rasterizer_discard_enable(false)
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(vk::CullModeFlags::NONE)
            .front_face(vk::FrontFace::CLOCKWISE)
            // No depth bias
            .depth_bias_enable(false)
            .depth_bias_constant_factor(0.0)
            .depth_bias_clamp(0.0)
            .depth_bias_slope_factor(0.0)
    }

    fn default_color_blend_state() -> vk::PipelineColorBlendAttachmentState {
        // Opaque: write every channel, no blending
        vk::PipelineColorBlendAttachmentState::default()
            .color_write_mask(vk::ColorComponentFlags::RGBA)
            .blend_enable(false)
            .src_color_blend_factor(vk::BlendFactor::ONE)
            .dst_color_blend_factor(vk::BlendFactor::ZERO)
            .color_blend_op(vk::BlendOp::ADD)
            .src_alpha_blend_factor(vk::BlendFactor::ONE)
            .dst_alpha_blend_factor(vk::BlendFactor::ZERO)
            .alpha_blend_op(vk::BlendOp::ADD)
    }

    fn default_multisample_info() -> vk::PipelineMultisampleStateCreateInfo<'static> {
        vk::PipelineMultisampleStateCreateInfo::default()
            .sample_shading_enable(false)
            // 1 sample per pixel means no multisampling
            .rasterization_samples(vk::SampleCountFlags::TYPE_1)
            .min_sample_shading(1.0)
            .alpha_to_coverage_enable(false)
            .alpha_to_one_enable(false)
    }

    fn default_depth_stencil_info() -> vk::PipelineDepthStencilStateCreateInfo<'static> {
        vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(true)
            .depth_write_enable(true)
            .depth_compare_op(vk::CompareOp::LESS)
            .depth_bounds_test_enable(false)
            .min_depth_bounds(0.0)
            .max_depth_bounds(1.0)
            .stencil_test_enable(false)
    }
}

/// A compiled graphics pipeline together with the shader modules it was built from
pub struct Pipeline {
    handle: vk::Pipeline,
    _shader: GraphicsShader,
    device: Arc<ash::Device>,
}

impl Pipeline {
    pub fn new(
        device: Arc<ash::Device>,
        vert_path: &Path,
        frag_path: &Path,
        config: &PipelineConfig,
    ) -> Result<Self, PipelineBuildError> {
        let (pipeline_layout, render_pass) = config.validate()?;
        let shader = GraphicsShader::new(vert_path, frag_path, device.clone())?;

        let shader_stages = [
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::VERTEX)
                .module(shader.vert_mod)
                .name(c"main"),
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::FRAGMENT)
                .module(shader.frag_mod)
                .name(c"main"),
        ];

        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_attribute_descriptions(&config.vertex_input.attributes)
            .vertex_binding_descriptions(&config.vertex_input.bindings)
            .flags(config.vertex_input.flags);

        // Counts only; the actual viewport and scissor are dynamic
        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);

        let color_blend_attachments = [config.color_blend_attachment];
        let color_blend_info = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(false)
            .logic_op(vk::LogicOp::COPY)
            .attachments(&color_blend_attachments);

        let dynamic_info = vk::PipelineDynamicStateCreateInfo::default()
            .dynamic_states(&config.dynamic_states);

        let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&config.input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&config.rasterization)
            .multisample_state(&config.multisample)
            .color_blend_state(&color_blend_info)
            .depth_stencil_state(&config.depth_stencil)
            .dynamic_state(&dynamic_info)
            .layout(pipeline_layout)
            .render_pass(render_pass)
            .subpass(config.subpass);

        let handle = unsafe {
            device
                .create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
                .map_err(|(_, e)| PipelineBuildError::Compile(e))?
        }
        .into_iter()
        .next()
        .ok_or(PipelineBuildError::Compile(vk::Result::ERROR_UNKNOWN))?;

        Ok(Self {
            handle,
            _shader: shader,
            device,
        })
    }

    pub fn bind(&self, command_buffer: vk::CommandBuffer) {
        unsafe {
            self.device.cmd_bind_pipeline(
                command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                self.handle,
            );
        }
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline(self.handle, None);
        }
    }
}

/// Owned pipeline layout with a set of push-constant ranges and no descriptor sets
pub struct PipelineLayout {
    pub handle: vk::PipelineLayout,
    device: Arc<ash::Device>,
}

impl PipelineLayout {
    pub fn new(
        device: Arc<ash::Device>,
        push_constant_ranges: &[vk::PushConstantRange],
    ) -> Result<Self> {
        let layout_info = vk::PipelineLayoutCreateInfo::default()
            .push_constant_ranges(push_constant_ranges);
        let handle = unsafe { device.create_pipeline_layout(&layout_info, None)? };
        Ok(Self { handle, device })
    }
}

impl Drop for PipelineLayout {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline_layout(self.handle, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    #[test]
    fn default_config_is_opaque_depth_tested_triangles() {
        let config = PipelineConfig::default();
        assert_eq!(config.input_assembly.topology, vk::PrimitiveTopology::TRIANGLE_LIST);
        assert_eq!(config.rasterization.polygon_mode, vk::PolygonMode::FILL);
        assert_eq!(config.rasterization.cull_mode, vk::CullModeFlags::NONE);
        assert_eq!(config.multisample.rasterization_samples, vk::SampleCountFlags::TYPE_1);
        assert_eq!(config.color_blend_attachment.blend_enable, vk::FALSE);
        assert_eq!(config.color_blend_attachment.color_write_mask, vk::ColorComponentFlags::RGBA);
        assert_eq!(config.depth_stencil.depth_test_enable, vk::TRUE);
        assert_eq!(config.depth_stencil.depth_compare_op, vk::CompareOp::LESS);
        assert_eq!(
            config.dynamic_states,
            vec![vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR],
        );
    }

    #[test]
    fn config_without_layout_is_rejected() {
        let config = PipelineConfig::default()
            .with_render_pass(vk::RenderPass::from_raw(1), 0);
        assert!(matches!(
            config.validate(),
            Err(PipelineBuildError::MissingPipelineLayout)
        ));
    }

    #[test]
    fn config_without_render_pass_is_rejected() {
        let config = PipelineConfig::default()
            .with_pipeline_layout(vk::PipelineLayout::from_raw(1));
        assert!(matches!(
            config.validate(),
            Err(PipelineBuildError::MissingRenderPass)
        ));
    }

    #[test]
    fn complete_config_validates() {
        let layout = vk::PipelineLayout::from_raw(7);
        let render_pass = vk::RenderPass::from_raw(9);
        let config = PipelineConfig::default()
            .with_pipeline_layout(layout)
            .with_render_pass(render_pass, 0);
        assert_eq!(config.validate().unwrap(), (layout, render_pass));
    }

    #[test]
    fn disabling_depth_test_stops_depth_writes() {
        let config = PipelineConfig::default().with_depth_test(false, None);
        assert_eq!(config.depth_stencil.depth_test_enable, vk::FALSE);
        assert_eq!(config.depth_stencil.depth_write_enable, vk::FALSE);
        assert_eq!(config.depth_stencil.depth_compare_op, vk::CompareOp::ALWAYS);
    }

    #[test]
    fn builders_adjust_fixed_function_state() {
        let config = PipelineConfig::default()
            .with_input_topology(vk::PrimitiveTopology::LINE_LIST)
            .with_polygon_mode(vk::PolygonMode::LINE)
            .with_cull_mode(vk::CullModeFlags::BACK, vk::FrontFace::COUNTER_CLOCKWISE)
            .with_alpha_blending_enabled();
        assert_eq!(config.input_assembly.topology, vk::PrimitiveTopology::LINE_LIST);
        assert_eq!(config.rasterization.polygon_mode, vk::PolygonMode::LINE);
        assert_eq!(config.rasterization.cull_mode, vk::CullModeFlags::BACK);
        assert_eq!(config.rasterization.front_face, vk::FrontFace::COUNTER_CLOCKWISE);
        assert_eq!(config.color_blend_attachment.blend_enable, vk::TRUE);
    }

    #[test]
    fn shader_load_error_names_the_file() {
        let err = PipelineBuildError::ShaderLoad {
            path: PathBuf::from("missing.vert.spv"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
        };
        assert!(err.to_string().contains("missing.vert.spv"));
    }
}
