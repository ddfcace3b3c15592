mod window;

use std::f32::consts::TAU;
use std::sync::Arc;
use std::time::Instant;
use color_eyre::Result;
use glam::Vec3;
use crate::app::window::{WindowConfig, WindowSurface};
use crate::renderer::backend::RenderDeviceExt;
use crate::renderer::config::RenderConfig;
use crate::renderer::contexts::device_ctx::device::RenderDevice;
use crate::renderer::resources::model::{cube_vertices, Model};
use crate::renderer::systems::simple::SimpleRenderSystem;
use crate::renderer::systems::RenderSystem;
use crate::renderer::Renderer;
use crate::scene::GameObject;

/// Radians per second around the y and x axes
const SPIN_RATE: Vec3 = Vec3::new(0.3, 0.6, 0.0);

pub struct App {
    // Dropped top to bottom: GPU objects go before the renderer and device, the window goes last
    game_objects: Vec<GameObject>,
    render_system: SimpleRenderSystem,
    renderer: Renderer<RenderDevice>,
    device: Arc<RenderDevice>,
    window: WindowSurface,

    prev_frame_time: Instant,
}

impl App {
    pub fn new() -> Result<Self> {
        let mut window = WindowSurface::new(WindowConfig::default())?;
        let device = Arc::new(RenderDevice::new(window.window())?);
        let renderer = Renderer::new(device.clone(), &mut window, RenderConfig::default())?;
        let render_system = SimpleRenderSystem::new(
            device.logical.clone(),
            renderer.swapchain_render_pass()?,
        )?;
        let game_objects = Self::load_game_objects(&device)?;

        Ok(Self {
            game_objects,
            render_system,
            renderer,
            device,
            window,

            prev_frame_time: Instant::now(),
        })
    }

    fn load_game_objects(device: &RenderDevice) -> Result<Vec<GameObject>> {
        let cube = Arc::new(Model::new(device, &cube_vertices(Vec3::ZERO))?);

        let mut object = GameObject::new().with_model(cube);
        object.transform.translation = Vec3::new(0.0, 0.0, 0.5);
        object.transform.scale = Vec3::splat(0.5);

        Ok(vec![object])
    }

    /// Render until the window is closed, then wait for the GPU before anything is torn down
    pub fn run(&mut self) -> Result<()> {
        while self.window.poll_events() {
            let now = Instant::now();
            let delta_time_secs = now.duration_since(self.prev_frame_time).as_secs_f32();
            self.prev_frame_time = now;

            for object in &mut self.game_objects {
                let rotation = object.transform.rotation + SPIN_RATE * delta_time_secs;
                object.transform.rotation = Vec3::new(
                    rotation.x.rem_euclid(TAU),
                    rotation.y.rem_euclid(TAU),
                    rotation.z.rem_euclid(TAU),
                );
            }

            let Some(command_buffer) = self.renderer.begin_frame(&mut self.window)? else {
                continue;
            };
            self.renderer.begin_swapchain_render_pass(command_buffer)?;
            self.render_system.render(command_buffer, &self.game_objects);
            self.renderer.end_swapchain_render_pass(command_buffer)?;
            self.renderer.end_frame(&mut self.window)?;
        }

        self.device.wait_idle()
    }
}

impl Drop for App {
    fn drop(&mut self) {
        // `run` may have bailed out mid-loop with frames still executing
        if let Err(e) = self.device.wait_idle() {
            log::error!("Failed to wait for device idle on app drop: {:?}", e);
        }
    }
}
