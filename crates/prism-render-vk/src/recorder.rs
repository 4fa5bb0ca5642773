// SPDX-License-Identifier: CEPL-1.0
use crate::error::{RenderError, Result};
use ash::vk;

/// Everything one frame's commands refer to.
#[derive(Clone, Copy, Debug)]
pub struct FrameTarget {
    pub render_pass: vk::RenderPass,
    pub framebuffer: vk::Framebuffer,
    pub extent: vk::Extent2D,
    pub pipeline: vk::Pipeline,
    pub clear_color: [f32; 4],
}

impl FrameTarget {
    pub fn full_area(&self) -> vk::Rect2D {
        vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: self.extent,
        }
    }

    pub fn viewport(&self) -> vk::Viewport {
        vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: self.extent.width as f32,
            height: self.extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }
}

pub const TRIANGLE_VERTEX_COUNT: u32 = 3;

/// The commands one frame is made of.
pub trait CommandSink {
    fn reset(&mut self) -> Result<()>;
    fn begin(&mut self) -> Result<()>;
    fn begin_render_pass(&mut self, target: &FrameTarget);
    fn bind_pipeline(&mut self, pipeline: vk::Pipeline);
    fn set_viewport(&mut self, viewport: vk::Viewport);
    fn set_scissor(&mut self, scissor: vk::Rect2D);
    fn draw(
        &mut self,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    );
    fn end_render_pass(&mut self);
    fn end(&mut self) -> Result<()>;
}

/// Records straight into a Vulkan command buffer.
pub struct DeviceCommands<'a> {
    device: &'a ash::Device,
    cmd: vk::CommandBuffer,
}

impl<'a> DeviceCommands<'a> {
    /// # Safety
    /// `cmd` must come from a pool created with `RESET_COMMAND_BUFFER` and
    /// must not be pending on the GPU.
    pub unsafe fn new(device: &'a ash::Device, cmd: vk::CommandBuffer) -> Self {
        Self { device, cmd }
    }
}

impl CommandSink for DeviceCommands<'_> {
    fn reset(&mut self) -> Result<()> {
        unsafe {
            self.device
                .reset_command_buffer(self.cmd, vk::CommandBufferResetFlags::empty())
        }
        .map_err(RenderError::CommandRecording)
    }

    fn begin(&mut self) -> Result<()> {
        let begin = vk::CommandBufferBeginInfo::default();
        unsafe { self.device.begin_command_buffer(self.cmd, &begin) }
            .map_err(RenderError::CommandRecording)
    }

    fn begin_render_pass(&mut self, target: &FrameTarget) {
        let clears = [vk::ClearValue {
            color: vk::ClearColorValue {
                float32: target.clear_color,
            },
        }];
        let rp_begin = vk::RenderPassBeginInfo::default()
            .render_pass(target.render_pass)
            .framebuffer(target.framebuffer)
            .render_area(target.full_area())
            .clear_values(&clears);
        unsafe {
            self.device
                .cmd_begin_render_pass(self.cmd, &rp_begin, vk::SubpassContents::INLINE)
        };
    }

    fn bind_pipeline(&mut self, pipeline: vk::Pipeline) {
        unsafe {
            self.device
                .cmd_bind_pipeline(self.cmd, vk::PipelineBindPoint::GRAPHICS, pipeline)
        };
    }

    fn set_viewport(&mut self, viewport: vk::Viewport) {
        unsafe { self.device.cmd_set_viewport(self.cmd, 0, &[viewport]) };
    }

    fn set_scissor(&mut self, scissor: vk::Rect2D) {
        unsafe { self.device.cmd_set_scissor(self.cmd, 0, &[scissor]) };
    }

    fn draw(
        &mut self,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) {
        unsafe {
            self.device
                .cmd_draw(self.cmd, vertex_count, instance_count, first_vertex, first_instance)
        };
    }

    fn end_render_pass(&mut self) {
        unsafe { self.device.cmd_end_render_pass(self.cmd) };
    }

    fn end(&mut self) -> Result<()> {
        unsafe { self.device.end_command_buffer(self.cmd) }.map_err(RenderError::CommandRecording)
    }
}

/// Reset and re-record one frame into `sink`.
pub fn record_commands<S>(sink: &mut S, target: &FrameTarget) -> Result<()>
where
    S: CommandSink + ?Sized,
{
    sink.reset()?;
    sink.begin()?;
    sink.begin_render_pass(target);
    sink.bind_pipeline(target.pipeline);
    // Declared dynamic in the pipeline: must be set before drawing.
    sink.set_viewport(target.viewport());
    sink.set_scissor(target.full_area());
    sink.draw(TRIANGLE_VERTEX_COUNT, 1, 0, 0);
    sink.end_render_pass();
    sink.end()
}

/// # Safety
/// `cmd` must come from a pool created with `RESET_COMMAND_BUFFER` and must
/// not be pending on the GPU.
pub unsafe fn record_frame(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    target: &FrameTarget,
) -> Result<()> {
    record_commands(&mut DeviceCommands::new(device, cmd), target)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(width: u32, height: u32) -> FrameTarget {
        FrameTarget {
            render_pass: vk::RenderPass::null(),
            framebuffer: vk::Framebuffer::null(),
            extent: vk::Extent2D { width, height },
            pipeline: vk::Pipeline::null(),
            clear_color: [0.0, 0.0, 0.0, 1.0],
        }
    }

    #[test]
    fn viewport_covers_extent_with_unit_depth() {
        let vp = target(800, 600).viewport();
        assert_eq!((vp.x, vp.y), (0.0, 0.0));
        assert_eq!((vp.width, vp.height), (800.0, 600.0));
        assert_eq!((vp.min_depth, vp.max_depth), (0.0, 1.0));
    }

    #[test]
    fn scissor_is_full_extent() {
        let area = target(512, 512).full_area();
        assert_eq!((area.offset.x, area.offset.y), (0, 0));
        assert_eq!((area.extent.width, area.extent.height), (512, 512));
    }

    #[derive(Debug, PartialEq)]
    enum Cmd {
        Reset,
        Begin,
        BeginRenderPass(vk::RenderPass, vk::Framebuffer, (u32, u32), [f32; 4]),
        BindPipeline(vk::Pipeline),
        SetViewport(f32, f32, f32, f32),
        SetScissor(i32, i32, u32, u32),
        Draw(u32, u32, u32, u32),
        EndRenderPass,
        End,
    }

    #[derive(Default)]
    struct CommandLog {
        cmds: Vec<Cmd>,
        fail_end: bool,
    }

    impl CommandSink for CommandLog {
        fn reset(&mut self) -> Result<()> {
            self.cmds.push(Cmd::Reset);
            Ok(())
        }

        fn begin(&mut self) -> Result<()> {
            self.cmds.push(Cmd::Begin);
            Ok(())
        }

        fn begin_render_pass(&mut self, t: &FrameTarget) {
            let area = t.full_area().extent;
            self.cmds.push(Cmd::BeginRenderPass(
                t.render_pass,
                t.framebuffer,
                (area.width, area.height),
                t.clear_color,
            ));
        }

        fn bind_pipeline(&mut self, pipeline: vk::Pipeline) {
            self.cmds.push(Cmd::BindPipeline(pipeline));
        }

        fn set_viewport(&mut self, v: vk::Viewport) {
            self.cmds.push(Cmd::SetViewport(v.x, v.y, v.width, v.height));
        }

        fn set_scissor(&mut self, s: vk::Rect2D) {
            self.cmds.push(Cmd::SetScissor(
                s.offset.x,
                s.offset.y,
                s.extent.width,
                s.extent.height,
            ));
        }

        fn draw(&mut self, vertices: u32, instances: u32, first_vertex: u32, first_instance: u32) {
            self.cmds
                .push(Cmd::Draw(vertices, instances, first_vertex, first_instance));
        }

        fn end_render_pass(&mut self) {
            self.cmds.push(Cmd::EndRenderPass);
        }

        fn end(&mut self) -> Result<()> {
            self.cmds.push(Cmd::End);
            if self.fail_end {
                return Err(RenderError::CommandRecording(
                    vk::Result::ERROR_OUT_OF_HOST_MEMORY,
                ));
            }
            Ok(())
        }
    }

    #[test]
    fn frame_is_recorded_in_order() {
        use ash::vk::Handle;
        let mut t = target(640, 480);
        t.render_pass = vk::RenderPass::from_raw(1);
        t.framebuffer = vk::Framebuffer::from_raw(2);
        t.pipeline = vk::Pipeline::from_raw(3);

        let mut log = CommandLog::default();
        record_commands(&mut log, &t).unwrap();

        assert_eq!(
            log.cmds,
            vec![
                Cmd::Reset,
                Cmd::Begin,
                Cmd::BeginRenderPass(
                    t.render_pass,
                    t.framebuffer,
                    (640, 480),
                    [0.0, 0.0, 0.0, 1.0]
                ),
                Cmd::BindPipeline(t.pipeline),
                Cmd::SetViewport(0.0, 0.0, 640.0, 480.0),
                Cmd::SetScissor(0, 0, 640, 480),
                Cmd::Draw(3, 1, 0, 0),
                Cmd::EndRenderPass,
                Cmd::End,
            ]
        );
    }

    #[test]
    fn failed_end_is_a_recording_error() {
        let mut log = CommandLog {
            fail_end: true,
            ..Default::default()
        };
        let err = record_commands(&mut log, &target(64, 64)).unwrap_err();
        assert!(matches!(err, RenderError::CommandRecording(_)));
        assert_eq!(log.cmds.last(), Some(&Cmd::End));
    }
}
