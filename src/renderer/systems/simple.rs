use std::mem::size_of;
use std::sync::Arc;
use ash::vk;
use color_eyre::Result;
use crate::renderer::resources::pipeline::{Pipeline, PipelineConfig, PipelineLayout};
use crate::renderer::resources::shader::shader_path;
use crate::renderer::resources::vertex::Vertex;
use crate::renderer::shader_data::SimplePushConstantData;
use crate::renderer::systems::RenderSystem;
use crate::scene::GameObject;

const PUSH_STAGES: vk::ShaderStageFlags = vk::ShaderStageFlags::from_raw(
    vk::ShaderStageFlags::VERTEX.as_raw() | vk::ShaderStageFlags::FRAGMENT.as_raw(),
);

/// Forward shading with a per-object transform and tint pushed before each draw
pub struct SimpleRenderSystem {
    // Declared first so the pipeline is destroyed before the layout it was built with
    pipeline: Pipeline,
    pipeline_layout: PipelineLayout,
    device: Arc<ash::Device>,
}

impl SimpleRenderSystem {
    pub fn new(device: Arc<ash::Device>, render_pass: vk::RenderPass) -> Result<Self> {
        let pipeline_layout = PipelineLayout::new(device.clone(), &[push_constant_range()])?;

        let config = PipelineConfig::default()
            .with_pipeline_layout(pipeline_layout.handle)
            .with_render_pass(render_pass, 0)
            .with_vertex_input(Vertex::input_description());
        let pipeline = Pipeline::new(
            device.clone(),
            &shader_path("simple_shader.vert"),
            &shader_path("simple_shader.frag"),
            &config,
        )?;
        log::debug!("Built simple render system pipeline");

        Ok(Self {
            pipeline,
            pipeline_layout,
            device,
        })
    }
}

impl RenderSystem for SimpleRenderSystem {
    fn render(&self, command_buffer: vk::CommandBuffer, objects: &[GameObject]) {
        self.pipeline.bind(command_buffer);

        for object in objects {
            let Some(model) = object.model.as_ref() else {
                continue;
            };
            let push = SimplePushConstantData::new(object.transform.mat4(), object.color);
            unsafe {
                self.device.cmd_push_constants(
                    command_buffer,
                    self.pipeline_layout.handle,
                    PUSH_STAGES,
                    0,
                    bytemuck::bytes_of(&push),
                );
            }
            model.bind(command_buffer);
            model.draw(command_buffer);
        }
    }
}

fn push_constant_range() -> vk::PushConstantRange {
    vk::PushConstantRange {
        stage_flags: PUSH_STAGES,
        offset: 0,
        size: size_of::<SimplePushConstantData>() as u32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_range_covers_both_stages_and_whole_block() {
        let range = push_constant_range();
        assert!(range.stage_flags.contains(vk::ShaderStageFlags::VERTEX));
        assert!(range.stage_flags.contains(vk::ShaderStageFlags::FRAGMENT));
        assert_eq!(range.offset, 0);
        assert_eq!(range.size, 80);
    }
}
