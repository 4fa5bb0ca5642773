// SPDX-License-Identifier: CEPL-1.0
//! Backend-neutral contracts between the window collaborator and a renderer,
//! plus the outer render loop that ties them together.
use anyhow::Result;
use tracing::{debug, info};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RenderSize {
    pub width: u32,
    pub height: u32,
}

impl RenderSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// A minimized window reports a zero-area framebuffer.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PumpStatus {
    Continue,
    Exit,
}

/// What the render loop needs from the windowing side.
pub trait EventPump {
    /// Drain pending window events. Called once per loop iteration.
    fn pump_events(&mut self) -> PumpStatus;

    /// Current drawable size in physical pixels.
    fn framebuffer_size(&self) -> RenderSize;

    /// Returns `true` once after every observed resize.
    fn take_resized(&mut self) -> bool;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    Presented,
    /// Nothing was submitted: zero-area window or a stale swapchain that was rebuilt.
    Skipped,
}

pub trait Renderer {
    fn render(&mut self, size: RenderSize) -> Result<FrameOutcome>;
    fn resize(&mut self, size: RenderSize);
    /// Block until the GPU has finished every submitted frame.
    fn wait_idle(&mut self) -> Result<()>;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunStats {
    pub iterations: u64,
    pub presented: u64,
    pub skipped: u64,
}

/// Pump events and render until the window asks to close.
///
/// The renderer is always drained with [`Renderer::wait_idle`] before this
/// returns, including when a frame fails, so callers may drop GPU objects
/// right after.
pub fn run<R, P>(renderer: &mut R, pump: &mut P) -> Result<RunStats>
where
    R: Renderer + ?Sized,
    P: EventPump + ?Sized,
{
    let mut stats = RunStats::default();

    let outcome = loop {
        if pump.pump_events() == PumpStatus::Exit {
            break Ok(());
        }
        stats.iterations += 1;

        let size = pump.framebuffer_size();
        if pump.take_resized() {
            debug!("framebuffer resized to {}x{}", size.width, size.height);
            renderer.resize(size);
        }

        match renderer.render(size) {
            Ok(FrameOutcome::Presented) => stats.presented += 1,
            Ok(FrameOutcome::Skipped) => stats.skipped += 1,
            Err(e) => break Err(e),
        }
    };

    let drained = renderer.wait_idle();
    outcome?;
    drained?;

    info!(
        "render loop finished: {} presented, {} skipped",
        stats.presented, stats.skipped
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    struct ScriptedPump {
        remaining: u32,
        size: RenderSize,
        resize_at: Option<u32>,
    }

    impl EventPump for ScriptedPump {
        fn pump_events(&mut self) -> PumpStatus {
            if self.remaining == 0 {
                return PumpStatus::Exit;
            }
            self.remaining -= 1;
            PumpStatus::Continue
        }

        fn framebuffer_size(&self) -> RenderSize {
            self.size
        }

        fn take_resized(&mut self) -> bool {
            self.resize_at == Some(self.remaining)
        }
    }

    #[derive(Default)]
    struct CountingRenderer {
        frames: u32,
        resizes: u32,
        idle_waits: u32,
        fail_on: Option<u32>,
    }

    impl Renderer for CountingRenderer {
        fn render(&mut self, size: RenderSize) -> Result<FrameOutcome> {
            self.frames += 1;
            if self.fail_on == Some(self.frames) {
                return Err(anyhow!("device lost"));
            }
            if size.is_empty() {
                Ok(FrameOutcome::Skipped)
            } else {
                Ok(FrameOutcome::Presented)
            }
        }

        fn resize(&mut self, _size: RenderSize) {
            self.resizes += 1;
        }

        fn wait_idle(&mut self) -> Result<()> {
            self.idle_waits += 1;
            Ok(())
        }
    }

    #[test]
    fn renders_once_per_pump_and_drains() {
        let mut pump = ScriptedPump {
            remaining: 4,
            size: RenderSize::new(512, 512),
            resize_at: Some(1),
        };
        let mut renderer = CountingRenderer::default();

        let stats = run(&mut renderer, &mut pump).unwrap();

        assert_eq!(stats.iterations, 4);
        assert_eq!(stats.presented, 4);
        assert_eq!(renderer.resizes, 1);
        assert_eq!(renderer.idle_waits, 1);
    }

    #[test]
    fn zero_area_frames_are_skipped() {
        let mut pump = ScriptedPump {
            remaining: 3,
            size: RenderSize::new(0, 600),
            resize_at: None,
        };
        let mut renderer = CountingRenderer::default();

        let stats = run(&mut renderer, &mut pump).unwrap();
        assert_eq!(stats.skipped, 3);
        assert_eq!(stats.presented, 0);
    }

    #[test]
    fn failed_frame_still_waits_for_idle() {
        let mut pump = ScriptedPump {
            remaining: 10,
            size: RenderSize::new(64, 64),
            resize_at: None,
        };
        let mut renderer = CountingRenderer {
            fail_on: Some(2),
            ..Default::default()
        };

        let err = run(&mut renderer, &mut pump).unwrap_err();
        assert!(err.to_string().contains("device lost"));
        assert_eq!(renderer.frames, 2);
        assert_eq!(renderer.idle_waits, 1);
    }
}
