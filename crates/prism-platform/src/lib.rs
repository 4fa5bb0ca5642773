// SPDX-License-Identifier: CEPL-1.0
//! Native window and event pumping on top of winit.
//!
//! The event loop is pumped from the render loop instead of owning it, so the
//! caller decides when a frame happens.
pub use winit;

use anyhow::{anyhow, Context, Result};
use prism_render::{EventPump, PumpStatus, RenderSize};
use std::time::Duration;
use tracing::{debug, info};
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::error::OsError;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::platform::pump_events::{EventLoopExtPumpEvents, PumpStatus as LoopStatus};
use winit::raw_window_handle::{
    DisplayHandle, HandleError, HasDisplayHandle, HasWindowHandle, WindowHandle,
};
use winit::window::{Window, WindowId};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub resizable: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "prism".to_owned(),
            width: 512,
            height: 512,
            resizable: false,
        }
    }
}

fn render_size(size: PhysicalSize<u32>) -> RenderSize {
    RenderSize::new(size.width, size.height)
}

struct WindowState {
    config: WindowConfig,
    created: Option<Window>,
    window_id: Option<WindowId>,
    create_error: Option<OsError>,
    close_requested: bool,
    resized: bool,
}

impl ApplicationHandler for WindowState {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window_id.is_some() {
            return;
        }
        let attrs = Window::default_attributes()
            .with_title(self.config.title.clone())
            .with_inner_size(PhysicalSize::new(self.config.width, self.config.height))
            .with_resizable(self.config.resizable);
        match event_loop.create_window(attrs) {
            Ok(window) => {
                self.window_id = Some(window.id());
                self.created = Some(window);
            }
            Err(e) => {
                self.create_error = Some(e);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, _event_loop: &ActiveEventLoop, id: WindowId, event: WindowEvent) {
        if self.window_id != Some(id) {
            return;
        }
        match event {
            WindowEvent::CloseRequested | WindowEvent::Destroyed => {
                info!("close requested");
                self.close_requested = true;
            }
            WindowEvent::Resized(size) => {
                debug!("resized to {}x{}", size.width, size.height);
                self.resized = true;
            }
            _ => {}
        }
    }
}

/// Dropping it closes the window before the event loop goes away.
pub struct PlatformWindow {
    window: Window,
    state: WindowState,
    event_loop: EventLoop<()>,
}

impl PlatformWindow {
    /// Create the event loop and pump it until the window exists.
    pub fn open(config: WindowConfig) -> Result<Self> {
        let mut event_loop = EventLoop::new().context("creating the event loop")?;
        let mut state = WindowState {
            config,
            created: None,
            window_id: None,
            create_error: None,
            close_requested: false,
            resized: false,
        };

        let window = loop {
            let status = event_loop.pump_app_events(Some(Duration::ZERO), &mut state);
            if let Some(e) = state.create_error.take() {
                return Err(anyhow!("creating the window: {e}"));
            }
            if let Some(window) = state.created.take() {
                break window;
            }
            if let LoopStatus::Exit(code) = status {
                return Err(anyhow!("event loop exited ({code}) before a window was created"));
            }
        };

        let size = window.inner_size();
        info!(
            "window \"{}\" open at {}x{}",
            state.config.title, size.width, size.height
        );
        Ok(Self {
            window,
            state,
            event_loop,
        })
    }
}

impl EventPump for PlatformWindow {
    fn pump_events(&mut self) -> PumpStatus {
        let status = self
            .event_loop
            .pump_app_events(Some(Duration::ZERO), &mut self.state);
        if self.state.close_requested || matches!(status, LoopStatus::Exit(_)) {
            PumpStatus::Exit
        } else {
            PumpStatus::Continue
        }
    }

    fn framebuffer_size(&self) -> RenderSize {
        render_size(self.window.inner_size())
    }

    fn take_resized(&mut self) -> bool {
        std::mem::take(&mut self.state.resized)
    }
}

impl HasWindowHandle for PlatformWindow {
    fn window_handle(&self) -> Result<WindowHandle<'_>, HandleError> {
        self.window.window_handle()
    }
}

impl HasDisplayHandle for PlatformWindow {
    fn display_handle(&self) -> Result<DisplayHandle<'_>, HandleError> {
        self.window.display_handle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_window_is_fixed_512() {
        let cfg = WindowConfig::default();
        assert_eq!((cfg.width, cfg.height), (512, 512));
        assert!(!cfg.resizable);
        assert_eq!(cfg.title, "prism");
    }

    #[test]
    fn minimized_size_is_empty() {
        assert!(render_size(PhysicalSize::new(0, 0)).is_empty());
        assert_eq!(
            render_size(PhysicalSize::new(640, 480)),
            RenderSize::new(640, 480)
        );
    }
}
