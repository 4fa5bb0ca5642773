// SPDX-License-Identifier: CEPL-1.0
use ash::vk;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Which startup object failed to come up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InitStage {
    Loader,
    Instance,
    Surface,
    DebugMessenger,
    DeviceEnumeration,
    Device,
    CommandPool,
    CommandBuffers,
    SyncObjects,
    Framebuffer,
}

impl fmt::Display for InitStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InitStage::Loader => "vulkan loader",
            InitStage::Instance => "instance",
            InitStage::Surface => "surface",
            InitStage::DebugMessenger => "debug messenger",
            InitStage::DeviceEnumeration => "physical device enumeration",
            InitStage::Device => "logical device",
            InitStage::CommandPool => "command pool",
            InitStage::CommandBuffers => "command buffers",
            InitStage::SyncObjects => "sync objects",
            InitStage::Framebuffer => "framebuffer",
        };
        f.write_str(name)
    }
}

/// Sub-step of pipeline construction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineStage {
    ShaderModule,
    Layout,
    RenderPass,
    Pipeline,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStage::ShaderModule => "shader module",
            PipelineStage::Layout => "pipeline layout",
            PipelineStage::RenderPass => "render pass",
            PipelineStage::Pipeline => "graphics pipeline",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("failed to create {stage}: {result}")]
    Initialization { stage: InitStage, result: vk::Result },

    #[error("failed to load the vulkan library: {0}")]
    Loader(String),

    #[error("window handle unavailable: {0}")]
    WindowHandle(#[from] raw_window_handle::HandleError),

    #[error("no discrete GPU with graphics, present and swapchain support")]
    NoSuitableDevice,

    #[error("swapchain creation failed: {0}")]
    SwapchainCreation(vk::Result),

    #[error("swapchain image view creation failed: {0}")]
    ImageViewCreation(vk::Result),

    #[error("failed to read shader {}", path.display())]
    ShaderLoad {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("shader blob is not valid SPIR-V")]
    InvalidShader(#[source] std::io::Error),

    #[error("failed to create {stage}: {result}")]
    PipelineCreation {
        stage: PipelineStage,
        result: vk::Result,
    },

    #[error("timed out waiting for a swapchain image")]
    AcquireTimeout,

    #[error("acquire_next_image failed: {0}")]
    Acquire(vk::Result),

    #[error("command buffer recording failed: {0}")]
    CommandRecording(vk::Result),

    #[error("queue submit failed: {0}")]
    Submit(vk::Result),

    #[error("queue present failed: {0}")]
    Presentation(vk::Result),

    #[error("waiting on the GPU failed: {0}")]
    Wait(vk::Result),
}

impl RenderError {
    pub(crate) fn init(stage: InitStage) -> impl FnOnce(vk::Result) -> Self {
        move |result| RenderError::Initialization { stage, result }
    }

    pub(crate) fn pipeline(stage: PipelineStage) -> impl FnOnce(vk::Result) -> Self {
        move |result| RenderError::PipelineCreation { stage, result }
    }
}

pub type Result<T> = std::result::Result<T, RenderError>;
