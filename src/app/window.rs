use std::time::Duration;
use color_eyre::eyre::{eyre, OptionExt};
use color_eyre::Result;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::error::OsError;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::keyboard::{Key, NamedKey};
use winit::platform::pump_events::{EventLoopExtPumpEvents, PumpStatus};
use winit::window::{Window, WindowId};
use crate::renderer::backend::{Extent, PresentationSurface};

#[derive(Debug, Clone)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "vkframe".into(),
            width: 800,
            height: 600,
        }
    }
}

/// Event handler state, filled in by winit callbacks while the loop is pumped
struct WindowState {
    config: WindowConfig,
    window: Option<Result<Window, OsError>>,
    window_id: Option<WindowId>,

    resized: bool,
    close_requested: bool,
}

impl WindowState {
    fn new(config: WindowConfig) -> Self {
        Self {
            config,
            window: None,
            window_id: None,
            resized: false,
            close_requested: false,
        }
    }
}

impl ApplicationHandler for WindowState {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() || self.window_id.is_some() {
            return;
        }

        let attributes = Window::default_attributes()
            .with_title(self.config.title.clone())
            .with_inner_size(PhysicalSize::new(self.config.width, self.config.height))
            .with_resizable(true);
        self.window = Some(event_loop.create_window(attributes));
    }

    fn window_event(
        &mut self,
        _event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        if self.window_id.is_some_and(|id| id != window_id) {
            return;
        }

        match event {
            WindowEvent::CloseRequested => {
                self.close_requested = true;
            }
            WindowEvent::Resized(_) | WindowEvent::ScaleFactorChanged { .. } => {
                self.resized = true;
            }
            WindowEvent::KeyboardInput {
                event:
                KeyEvent {
                    logical_key: Key::Named(NamedKey::Escape),
                    state: ElementState::Pressed,
                    ..
                },
                ..
            } => {
                self.close_requested = true;
            }
            _ => {}
        }
    }
}

/// A window whose event loop is pumped by the caller rather than run to completion,
/// so the frame loop stays in control.
pub struct WindowSurface {
    window: Window,
    state: WindowState,
    event_loop: EventLoop<()>,
}

impl WindowSurface {
    pub fn new(config: WindowConfig) -> Result<Self> {
        let mut event_loop = EventLoop::new()?;
        let mut state = WindowState::new(config);

        // The window can only be created once the loop has delivered `resumed`
        while state.window.is_none() {
            if let PumpStatus::Exit(code) =
                event_loop.pump_app_events(Some(Duration::ZERO), &mut state)
            {
                return Err(eyre!("Event loop exited with code {} before the window opened", code));
            }
        }
        let window = state
            .window
            .take()
            .ok_or_eyre("Window was not created")??;
        state.window_id = Some(window.id());
        log::info!(
            "Opened window \"{}\" ({}x{})",
            state.config.title,
            state.config.width,
            state.config.height,
        );

        Ok(Self {
            window,
            state,
            event_loop,
        })
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    /// Process pending events without blocking. Returns false once the window should close.
    pub fn poll_events(&mut self) -> bool {
        let status = self
            .event_loop
            .pump_app_events(Some(Duration::ZERO), &mut self.state);
        !self.state.close_requested && matches!(status, PumpStatus::Continue)
    }
}

impl PresentationSurface for WindowSurface {
    fn drawable_extent(&self) -> Extent {
        self.window.inner_size().into()
    }

    fn was_resized(&self) -> bool {
        self.state.resized
    }

    fn reset_resized_flag(&mut self) {
        self.state.resized = false;
    }

    fn wait_events(&mut self) -> Result<()> {
        match self.event_loop.pump_app_events(None, &mut self.state) {
            PumpStatus::Exit(code) => {
                Err(eyre!("Event loop exited with code {} while waiting for events", code))
            }
            PumpStatus::Continue if self.state.close_requested => {
                Err(eyre!("Window closed while waiting for a drawable surface"))
            }
            PumpStatus::Continue => Ok(()),
        }
    }
}
